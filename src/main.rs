use clap::{Parser, Subcommand};
use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error, info};
use qsim::qasm::message::QasmMessage;
use qsim::qasm::*;
use qsim::{EngineConfig, Gateway};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

const QSIM_VERSION: &str = env!("CARGO_PKG_VERSION");
// requests in flight between the reader and the worker
const QUEUE_DEPTH: usize = 64;

#[derive(Parser, Debug)]
#[command(name = "qsim", version = QSIM_VERSION,
    about = "quantum register simulation engine driven by tagged text instruction messages",
    long_about = None)]
struct Cli {
    /// JSON engine configuration file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Enable debug logging.
    #[arg(long, global = true)]
    verbose: bool,
    /// Seed for reproducible random measurement and tokens.
    #[arg(long, global = true)]
    seed: Option<u64>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replays a file of wire messages, one per line, and prints each response.
    Run {
        /// Message script path
        script: PathBuf,
    },
    /// Allocates 2 qubits, applies H on qubit 0 and measures.
    Demo,
    /// Prints the qsim version.
    Version,
}

fn load_config(cli: &Cli) -> Result<EngineConfig, String> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path).map_err(|e| e.to_string())?,
        None => EngineConfig::default(),
    };
    if cli.seed.is_some() {
        config.rng_seed = cli.seed;
    }
    Ok(config)
}

// blank lines and # / // comments are skipped
fn script_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with("//"))
        .map(str::to_string)
        .collect()
}

// single consumer: dispatch is serialized through one worker thread
fn spawn_worker(gateway: Arc<Gateway>, requests: Receiver<String>, responses: Sender<String>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for line in requests {
            let reply = gateway.handle_text(&line);
            if responses.send(reply).is_err() {
                break;
            }
        }
        debug!("worker drained");
    })
}

fn run_lines(gateway: Arc<Gateway>, lines: Vec<String>) -> Result<(), String> {
    let (req_tx, req_rx) = bounded::<String>(QUEUE_DEPTH);
    let (resp_tx, resp_rx) = bounded::<String>(QUEUE_DEPTH);
    let worker = spawn_worker(gateway, req_rx, resp_tx);

    let feeder = thread::spawn(move || {
        for line in lines {
            if req_tx.send(line).is_err() {
                break;
            }
        }
    });
    for reply in resp_rx {
        println!("{}", reply);
    }
    feeder.join().map_err(|_| "message feeder panicked".to_string())?;
    worker.join().map_err(|_| "dispatch worker panicked".to_string())?;
    Ok(())
}

fn demo(config: EngineConfig) -> Result<(), String> {
    let gateway = Gateway::new(EngineConfig {
        require_token: false,
        ..config
    });
    let allocate = QasmMessage::new(1, MessageId::Allocate).with_param(TAG_QREG_QN, 2);
    let resp = gateway.handle(&allocate);
    println!("{}", resp.encode());
    let handle: u32 = resp.param_as(TAG_QREG_H).map_err(|e| e.to_string())?;

    let script = [
        QasmMessage::new(2, MessageId::Reset).with_param(TAG_QREG_H, handle),
        QasmMessage::new(3, MessageId::Transform)
            .with_param(TAG_QREG_H, handle)
            .with_param(TAG_F_TYPE, FunctionType::H.code())
            .with_param(TAG_F_SIZE, 2)
            .with_param(TAG_F_REP, 1)
            .with_param(TAG_F_LSQ, 0),
        QasmMessage::new(4, MessageId::Measure)
            .with_param(TAG_QREG_H, handle)
            .with_param(TAG_MEAS_QIDX, 0)
            .with_param(TAG_MEAS_QLEN, 2)
            .with_param(TAG_MEAS_RAND, 0)
            .with_param(TAG_MEAS_COLLAPSE, 1),
        QasmMessage::new(5, MessageId::Peek).with_param(TAG_QREG_H, handle),
        QasmMessage::new(6, MessageId::Release).with_param(TAG_QREG_H, handle),
    ];
    for msg in &script {
        println!("{}", gateway.handle(msg).encode());
    }
    Ok(())
}

fn main() -> Result<(), String> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = load_config(&cli)?;
    config.validate().map_err(|e| e.to_string())?;

    match &cli.command {
        Commands::Run { script } => {
            let text = fs::read_to_string(script)
                .map_err(|e| format!("error reading script {}: {}", script.display(), e))?;
            let lines = script_lines(&text);
            info!("replaying {} messages from {}", lines.len(), script.display());
            let gateway = Arc::new(Gateway::new(config));
            run_lines(Arc::clone(&gateway), lines)?;
            gateway.with_qcpu(|qcpu| debug!("{}", qcpu.dump()));
        }
        Commands::Demo => {
            if let Err(e) = demo(config) {
                error!("demo failed: {}", e);
                return Err(e);
            }
        }
        Commands::Version => {
            println!("qsim version {}", QSIM_VERSION);
        }
    }
    Ok(())
}
