use crate::config::EngineConfig;
use crate::device::gap_filling::FunctionChain;
use crate::device::gates::{Gate1q, GateKernel};
use crate::device::{CpuDevice, DeviceBackend};
use crate::error::QsimError;
use crate::instructions::block::{swap_q1, BlockInstruction};
use crate::instructions::qml::{feature_map, qnet_real_amplitude};
use crate::instructions::{classify, parse_instruction, CoreInstruction, Instruction, InstructionKind, Transform};
use crate::qasm::function_arg::*;
use crate::qasm::message::QasmMessage;
use crate::qasm::*;
use crate::qcpu::QCpu;
use crate::runtime::measurement::*;
use crate::runtime::QuantumRegister;
use crate::session::{ClientRegistry, Gateway};
use num_complex::Complex64;
use proptest::prelude::*;
use std::f64::consts::{FRAC_1_SQRT_2, PI};
use std::sync::Arc;

// --- common test helpers ---

// creates an initial state vector for n qubits, with |0...0> = 1.0.
fn initial_state(num_qubits: usize) -> Vec<Complex64> {
    basis_state(num_qubits, 0)
}

fn basis_state(num_qubits: usize, idx: usize) -> Vec<Complex64> {
    let mut amps = vec![Complex64::new(0.0, 0.0); 1 << num_qubits];
    amps[idx] = Complex64::new(1.0, 0.0);
    amps
}

// asserts that two complex numbers are approximately equal.
fn assert_complex_approx_eq(a: Complex64, b: Complex64, epsilon: f64) {
    assert!((a.re - b.re).abs() < epsilon, "real parts differ: {} vs {}", a.re, b.re);
    assert!((a.im - b.im).abs() < epsilon, "imaginary parts differ: {} vs {}", a.im, b.im);
}

// asserts that two vectors of complex numbers are approximately equal.
fn assert_amps_approx_eq(actual: &[Complex64], expected: &[Complex64], epsilon: f64) {
    assert_eq!(actual.len(), expected.len(), "amplitude vectors have different lengths");
    for i in 0..actual.len() {
        assert_complex_approx_eq(actual[i], expected[i], epsilon);
    }
}

fn test_config() -> EngineConfig {
    EngineConfig {
        rng_seed: Some(7),
        require_token: false,
        ..EngineConfig::default()
    }
}

fn register(n: usize) -> QuantumRegister {
    QuantumRegister::new(n, Arc::new(CpuDevice::new()), Some(11)).unwrap()
}

fn h(lsq: i32) -> Transform {
    Transform::gate_1q(FunctionType::H, 1, lsq, Vec::new())
}

fn x(lsq: i32) -> Transform {
    Transform::gate_1q(FunctionType::X, 1, lsq, Vec::new())
}

fn cx(c: i32, t: i32) -> Transform {
    Transform::gate_2q(FunctionType::CX, 1, c.min(t), IndexRange::single(c - c.min(t)), IndexRange::single(t - c.min(t)))
}

fn allocate(qcpu: &mut QCpu, counter: i32, n: usize) -> u32 {
    let resp = qcpu.execute(&QasmMessage::new(counter, MessageId::Allocate).with_param(TAG_QREG_QN, n));
    assert!(resp.is_ok(), "allocate failed: {}", resp);
    resp.param_as(TAG_QREG_H).unwrap()
}

fn transform_msg(counter: i32, handle: u32, ftype: FunctionType, fsize: i64, frep: i32, flsq: i32) -> QasmMessage {
    QasmMessage::new(counter, MessageId::Transform)
        .with_param(TAG_QREG_H, handle)
        .with_param(TAG_F_TYPE, ftype.code())
        .with_param(TAG_F_SIZE, fsize)
        .with_param(TAG_F_REP, frep)
        .with_param(TAG_F_LSQ, flsq)
}

fn measure_msg(counter: i32, handle: u32, qidx: i32, qlen: i32, randomize: bool, collapse: bool) -> QasmMessage {
    QasmMessage::new(counter, MessageId::Measure)
        .with_param(TAG_QREG_H, handle)
        .with_param(TAG_MEAS_QIDX, qidx)
        .with_param(TAG_MEAS_QLEN, qlen)
        .with_param(TAG_MEAS_RAND, randomize as i32)
        .with_param(TAG_MEAS_COLLAPSE, collapse as i32)
}

fn peek(qcpu: &mut QCpu, handle: u32) -> Vec<Complex64> {
    let resp = qcpu.execute(&QasmMessage::new(99, MessageId::Peek).with_param(TAG_QREG_H, handle));
    assert!(resp.is_ok(), "peek failed: {}", resp);
    parse_state_array(resp.param(TAG_QREG_ST_VALS).unwrap()).unwrap()
}

fn error_text(resp: &QasmMessage) -> String {
    assert!(!resp.is_ok(), "expected a failure response: {}", resp);
    resp.param(TAG_ERROR).unwrap_or_default().to_string()
}

// --- function argument tests ---

#[test]
fn test_index_range_parse_and_print() {
    assert_eq!(IndexRange::parse("(1, 3)").unwrap(), IndexRange::new(1, 3));
    assert_eq!(IndexRange::parse("()").unwrap(), IndexRange::EMPTY);
    assert_eq!(IndexRange::parse("(-1, -1)").unwrap(), IndexRange::EMPTY);
    assert!(IndexRange::parse("(-1, 2)").is_err());
    assert!(IndexRange::parse("1, 2").is_err());
    assert_eq!(IndexRange::new(0, 2).to_string(), "(0, 2)");
    assert_eq!(IndexRange::new(2, 4).span(), 3);
    assert!(!IndexRange::new(3, 1).is_consistent());
}

#[test]
fn test_form_and_gap() {
    let c = IndexRange::single(4);
    let t = IndexRange::new(0, 1);
    assert_eq!(ctrange_to_form(&c, &t), Form::Direct);
    assert_eq!(ctrange_gap(&c, &t), 2);
    assert_eq!(ctrange_to_form(&t, &c), Form::Inverse);
    assert_eq!(ctrange_gap(&t, &c), 2);
    assert_eq!(ctrange_to_form(&IndexRange::EMPTY, &t), Form::Null);
    assert_eq!(ctrange_gap(&IndexRange::EMPTY, &t), 0);
}

#[test]
fn test_function_args_with_ranges() {
    let args = parse_args("[(1, 1)|R,(0, 0)|R,0.5|D,3|I]").unwrap();
    assert_eq!(
        args,
        vec![
            FunctionArg::Range(IndexRange::single(1)),
            FunctionArg::Range(IndexRange::single(0)),
            FunctionArg::Real(0.5),
            FunctionArg::Int(3),
        ]
    );
    assert_eq!(args[3].as_f64(), Some(3.0));
    assert_eq!(args[0].as_f64(), None);
    assert_eq!(parse_args(&args_to_string(&args)).unwrap(), args);
    assert!(parse_args("null").unwrap().is_empty());
    assert!(parse_args("").unwrap().is_empty());
    assert!(parse_args("[1.0|Q]").is_err());
}

#[test]
fn test_state_array_and_index_list_text() {
    let amps = vec![Complex64::new(FRAC_1_SQRT_2, 0.0), Complex64::new(0.0, -FRAC_1_SQRT_2)];
    let text = state_array_to_string(&amps);
    assert_amps_approx_eq(&parse_state_array(&text).unwrap(), &amps, 1e-15);
    assert_eq!(index_list_to_string(&[1, 5]), "[1, 5]");
    assert_eq!(parse_index_list("[1, 5]").unwrap(), vec![1, 5]);
    assert!(parse_index_list("[]").unwrap().is_empty());
}

// --- message codec tests ---

#[test]
fn test_message_encode_decode() {
    let msg = QasmMessage::new(42, MessageId::Transform)
        .with_param(TAG_QREG_H, 3)
        .with_param(TAG_F_TYPE, FunctionType::Rx.code())
        .with_param(TAG_F_ARGS, args_to_string(&[FunctionArg::Real(0.25)]));
    let text = msg.encode();
    assert!(text.starts_with("42|14|"));
    assert!(text.ends_with(':'));
    assert_eq!(QasmMessage::decode(&text).unwrap(), msg);
}

#[test]
fn test_message_decode_failures() {
    assert!(matches!(QasmMessage::decode("12"), Err(QsimError::Syntax(_))));
    assert!(matches!(QasmMessage::decode("|10|qr_n=2:"), Err(QsimError::Syntax(_))));
    assert!(matches!(QasmMessage::decode("x|10|qr_n=2:"), Err(QsimError::Syntax(_))));
    assert!(matches!(QasmMessage::decode("1|99|"), Err(QsimError::Syntax(_))));
}

#[test]
fn test_message_decode_keeps_params_before_malformed_pair() {
    let msg = QasmMessage::decode("5|10|qr_n=3:broken:qr_h=1:\r\n").unwrap();
    assert_eq!(msg.counter, 5);
    assert_eq!(msg.id, MessageId::Allocate);
    assert_eq!(msg.param(TAG_QREG_QN), Some("3"));
    assert!(!msg.has_param(TAG_QREG_H));
}

#[test]
fn test_mandatory_tags() {
    let msg = QasmMessage::new(1, MessageId::Measure).with_param(TAG_QREG_H, 1);
    assert!(matches!(msg.check_syntax(), Err(QsimError::Syntax(_))));
    let msg = msg.with_param(TAG_MEAS_QIDX, 0).with_param(TAG_MEAS_QLEN, -1);
    assert!(msg.check_syntax().is_ok());
    assert!(QasmMessage::new(1, MessageId::Nope).check_syntax().is_ok());
}

#[test]
fn test_message_values_with_separators() {
    let msg = QasmMessage::new(3, MessageId::Response)
        .with_param(TAG_ERROR, "a:b=c|d\\e")
        .with_param(TAG_RESULT, VAL_NOK);
    let text = msg.encode();
    assert_eq!(text, "3|20|error=a\\:b=c|d\\\\e:result=Not-Ok:");
    assert_eq!(QasmMessage::decode(&text).unwrap(), msg);
}

#[test]
fn test_error_response_keeps_result_over_wire() {
    let err = QsimError::Syntax("wrong parameter [x=1]: bad".to_string());
    let resp = QasmMessage::error_response(4, &err);
    let decoded = QasmMessage::decode(&resp.encode()).unwrap();
    assert_eq!(decoded.param(TAG_RESULT), Some(VAL_NOK));
    assert_eq!(decoded.param(TAG_ERROR), Some(err.to_string().as_str()));
}

// --- instruction decoding tests ---

#[test]
fn test_classify_by_function_type() {
    let core = transform_msg(1, 1, FunctionType::CX, 4, 1, 0);
    let block = transform_msg(1, 1, FunctionType::SwapQ1, 4, 1, 0);
    let qml = transform_msg(1, 1, FunctionType::FeatureMap, 0, 1, 0);
    assert_eq!(classify(&core).unwrap(), InstructionKind::Core);
    assert_eq!(classify(&block).unwrap(), InstructionKind::Block);
    assert_eq!(classify(&qml).unwrap(), InstructionKind::Qml);
    let alloc = QasmMessage::new(1, MessageId::Allocate).with_param(TAG_QREG_QN, 2);
    assert_eq!(classify(&alloc).unwrap(), InstructionKind::Core);
    assert!(classify(&QasmMessage::new(1, MessageId::Register)).is_err());
}

#[test]
fn test_measure_defaults() {
    let msg = QasmMessage::new(1, MessageId::Measure).with_param(TAG_QREG_H, 4);
    match CoreInstruction::from_message(&msg).unwrap() {
        CoreInstruction::Measure {
            handle,
            qidx,
            qlen,
            randomize,
            collapse,
        } => {
            assert_eq!((handle, qidx, qlen, randomize, collapse), (4, 0, -1, true, true));
        }
        other => panic!("unexpected instruction {:?}", other),
    }
}

#[test]
fn test_one_qubit_size_rejected() {
    let msg = transform_msg(1, 1, FunctionType::H, 4, 1, 0);
    let err = parse_instruction(&msg).unwrap_err();
    assert!(err.to_string().starts_with("core instruction transformation syntax error"));
}

#[test]
fn test_rotation_needs_argument() {
    let msg = transform_msg(1, 1, FunctionType::Rx, 2, 1, 0);
    assert!(parse_instruction(&msg).is_err());
    let msg = msg.with_param(TAG_F_ARGS, "[0.5|D]");
    assert!(parse_instruction(&msg).is_ok());
}

#[test]
fn test_missing_size_invalidates_transform() {
    let msg = QasmMessage::new(1, MessageId::Transform)
        .with_param(TAG_QREG_H, 1)
        .with_param(TAG_F_TYPE, FunctionType::H.code())
        .with_param(TAG_F_REP, 1)
        .with_param(TAG_F_LSQ, 0);
    let err = parse_instruction(&msg).unwrap_err();
    assert!(matches!(err, QsimError::Validation { .. }));
}

#[test]
fn test_nqubit_target_width_must_match() {
    // 1-qubit inner gate over a 2-qubit target range
    let msg = transform_msg(1, 1, FunctionType::MCSLRU, 8, 1, 0)
        .with_param(TAG_F_CRANGE, "(2, 2)")
        .with_param(TAG_F_TRANGE, "(0, 1)")
        .with_param(TAG_F_UTYPE, FunctionType::X.code());
    assert!(parse_instruction(&msg).is_err());

    let msg = transform_msg(1, 1, FunctionType::MCSLRU, 8, 1, 0)
        .with_param(TAG_F_CRANGE, "(1, 2)")
        .with_param(TAG_F_TRANGE, "(0, 0)")
        .with_param(TAG_F_UTYPE, FunctionType::X.code());
    assert!(parse_instruction(&msg).is_ok());
}

#[test]
fn test_nqubit_inner_two_qubit_ranges_from_args() {
    let msg = transform_msg(1, 1, FunctionType::MCSLRU, 8, 1, 0)
        .with_param(TAG_F_CRANGE, "(2, 2)")
        .with_param(TAG_F_TRANGE, "(0, 1)")
        .with_param(TAG_F_UTYPE, FunctionType::CX.code())
        .with_param(TAG_F_ARGS, "[(0, 0)|R,(1, 1)|R]");
    match parse_instruction(&msg).unwrap() {
        Instruction::Core(CoreInstruction::Transform { transform, .. }) => {
            assert_eq!(transform.ucrange, IndexRange::single(0));
            assert_eq!(transform.utrange, IndexRange::single(1));
            assert_eq!(transform.inner_form(), Form::Inverse);
        }
        other => panic!("unexpected instruction {:?}", other),
    }
}

#[test]
fn test_ccx_needs_two_controls() {
    assert!(parse_instruction(&transform_msg(1, 1, FunctionType::CCX, 8, 1, 0)).is_ok());
    assert!(parse_instruction(&transform_msg(1, 1, FunctionType::CCX, 16, 1, 0)).is_err());
}

// --- block decomposition tests ---

#[test]
fn test_swap_q1_unwinds_to_three_cx() {
    let cxs = swap_q1(0);
    assert_eq!(cxs.len(), 3);
    assert!(cxs.iter().all(|t| t.ftype == FunctionType::CX));
    assert_eq!(cxs[0].form(), Form::Direct);
    assert_eq!(cxs[1].form(), Form::Inverse);
    assert_eq!(cxs[2].form(), Form::Direct);
}

#[test]
fn test_swap_qn_iterates_grid() {
    let block = BlockInstruction::new(1, FunctionType::SwapQn, 16, 1, 0);
    let out = block.unwind(4).unwrap();
    assert_eq!(out.len(), 4 * 3);
    let offsets: Vec<i32> = out.iter().step_by(3).map(|t| t.flsq).collect();
    assert_eq!(offsets, vec![1, 2, 0, 1]);
}

#[test]
fn test_block_unwind_checks_register_span() {
    let fits = BlockInstruction::new(1, FunctionType::SwapQ1, 4, 2, 1);
    assert_eq!(fits.unwind(5).unwrap().len(), 6);
    let err = fits.unwind(4).unwrap_err();
    assert!(err.to_string().contains("inconsistent LSQ value"));
    let far = BlockInstruction::new(1, FunctionType::SwapQ1, 4, 2, i32::MAX - 1);
    assert!(far.unwind(2).is_err());
    let many = BlockInstruction::new(1, FunctionType::SwapQ1, 4, i32::MAX, 0);
    let err = many.unwind(2).unwrap_err();
    assert!(err.to_string().contains("function repetitions exceeds qureg size"));
}

#[test]
fn test_cswap_block_validation() {
    let ok = BlockInstruction::new(1, FunctionType::CswapQ1, 8, 1, 0)
        .with_ranges(IndexRange::single(2), IndexRange::new(0, 1));
    assert!(ok.validate().is_ok());
    assert_eq!(ok.unwind(3).unwrap().len(), 3);
    let no_ranges = BlockInstruction::new(1, FunctionType::CswapQ1, 8, 1, 0);
    assert!(no_ranges.validate().is_err());
    let bad_size = BlockInstruction::new(1, FunctionType::SwapQn, 8, 1, 0);
    assert!(bad_size.validate().is_err());
}

#[test]
fn test_feature_map_shapes() {
    let x = [0.1, 0.2, 0.3];
    let z = feature_map(FeatureMapType::PauliZ, &x, 2, Entanglement::Linear);
    assert_eq!(z.len(), 2 * (1 + 3));
    assert_eq!(z[0].ftype, FunctionType::H);
    assert_eq!(z[0].frep, 3);
    assert_eq!(z[1].args, vec![FunctionArg::Real(0.2)]);

    let zz = feature_map(FeatureMapType::PauliZZ, &x, 1, Entanglement::Linear);
    assert_eq!(zz.len(), 1 + 3 + 2 * 3);
    let circ = feature_map(FeatureMapType::PauliZZ, &x, 1, Entanglement::Circular);
    assert_eq!(circ.len(), 1 + 3 + 3 * 3);
    assert!(circ.iter().all(|t| t.validate().is_ok()));
}

#[test]
fn test_qnet_layers() {
    let n = 3;
    let params: Vec<f64> = (0..n * 3).map(|i| i as f64 * 0.1).collect();
    let lin = qnet_real_amplitude(n, &params, 2, Entanglement::Linear);
    // 3 ry layers, 2 entangling layers of n-1 gates
    assert_eq!(lin.len(), 3 * 3 + 2 * 2);
    let last = lin.last().unwrap();
    assert_eq!(last.ftype, FunctionType::Ry);
    assert_eq!(last.args, vec![FunctionArg::Real(params[8])]);
    let circ = qnet_real_amplitude(n, &params, 2, Entanglement::Circular);
    assert_eq!(circ.len(), 3 * 3 + 2 * 3);
    assert!(circ.iter().all(|t| t.validate().is_ok()));
}

// --- gate element tests ---

#[test]
fn test_hadamard_elements() {
    let g = Gate1q::new(FunctionType::H, 0.0);
    assert_complex_approx_eq(g.element(0, 0), Complex64::new(FRAC_1_SQRT_2, 0.0), 1e-12);
    assert_complex_approx_eq(g.element(0, 1), Complex64::new(FRAC_1_SQRT_2, 0.0), 1e-12);
    assert_complex_approx_eq(g.element(1, 0), Complex64::new(FRAC_1_SQRT_2, 0.0), 1e-12);
    assert_complex_approx_eq(g.element(1, 1), Complex64::new(-FRAC_1_SQRT_2, 0.0), 1e-12);
}

#[test]
fn test_y_and_rz_elements() {
    let y = Gate1q::new(FunctionType::Y, 0.0);
    assert_complex_approx_eq(y.element(0, 1), Complex64::new(0.0, -1.0), 1e-12);
    assert_complex_approx_eq(y.element(1, 0), Complex64::new(0.0, 1.0), 1e-12);
    let rz = Gate1q::new(FunctionType::Rz, PI);
    assert_complex_approx_eq(rz.element(0, 0), Complex64::new(0.0, -1.0), 1e-12);
    assert_complex_approx_eq(rz.element(1, 1), Complex64::new(0.0, 1.0), 1e-12);
    assert_complex_approx_eq(rz.element(0, 1), Complex64::new(0.0, 0.0), 1e-12);
}

#[test]
fn test_gap_filled_element_matches_kronecker() {
    // H on qubit 1 of 3
    let chain = FunctionChain::new(GateKernel::One(Gate1q::new(FunctionType::H, 0.0)), 1, 1, 3).unwrap();
    let hg = Gate1q::new(FunctionType::H, 0.0);
    for i in 0..8 {
        for j in 0..8 {
            let expected = if (i >> 2) == (j >> 2) && (i & 1) == (j & 1) {
                hg.element((i >> 1) & 1, (j >> 1) & 1)
            } else {
                Complex64::new(0.0, 0.0)
            };
            assert_complex_approx_eq(chain.element(i, j), expected, 1e-12);
        }
    }
}

#[test]
fn test_gap_filling_rejects_out_of_range() {
    let kernel = GateKernel::One(Gate1q::new(FunctionType::X, 0.0));
    assert!(FunctionChain::new(kernel, 3, 0, 2).is_err());
    assert!(FunctionChain::new(kernel, 1, 2, 2).is_err());
    assert!(FunctionChain::new(kernel, 2, 0, 2).is_ok());
}

#[test]
fn test_device_set_state_bounds() {
    let dev = CpuDevice::new();
    let mut buf = initial_state(2);
    dev.set_state(&mut buf, 3).unwrap();
    assert_amps_approx_eq(&buf, &basis_state(2, 3), 1e-12);
    assert!(dev.set_state(&mut buf, 4).is_err());
}

// --- register engine tests ---

#[test]
fn test_allocation_invariant() {
    for n in 1..=6 {
        let mut reg = register(n);
        assert_eq!(reg.total_states(), 1 << n);
        assert_amps_approx_eq(reg.peek(), &initial_state(n), 1e-12);
    }
}

#[test]
fn test_cx_flips_target_when_control_set() {
    let mut reg = register(2);
    reg.set_pure_state(0b10).unwrap();
    reg.transform(&cx(1, 0)).unwrap();
    assert_amps_approx_eq(reg.peek(), &basis_state(2, 0b11), 1e-12);
}

#[test]
fn test_cx_inverse_form() {
    let mut reg = register(3);
    // control qubit 0, target qubit 2
    let t = Transform::controlled_nq(
        8,
        0,
        IndexRange::single(0),
        IndexRange::single(2),
        FunctionType::X,
        IndexRange::EMPTY,
        IndexRange::EMPTY,
        Vec::new(),
    );
    reg.set_pure_state(0b001).unwrap();
    reg.transform(&t).unwrap();
    assert_amps_approx_eq(reg.peek(), &basis_state(3, 0b101), 1e-12);
    reg.set_pure_state(0b100).unwrap();
    reg.transform(&t).unwrap();
    assert_amps_approx_eq(reg.peek(), &basis_state(3, 0b100), 1e-12);
}

#[test]
fn test_toffoli() {
    let mut reg = register(3);
    let ccx = Transform {
        fsize: 8,
        ..Transform::gate_1q(FunctionType::CCX, 1, 0, Vec::new())
    };
    reg.set_pure_state(0b110).unwrap();
    reg.transform(&ccx).unwrap();
    assert_amps_approx_eq(reg.peek(), &basis_state(3, 0b111), 1e-12);
    reg.set_pure_state(0b010).unwrap();
    reg.transform(&ccx).unwrap();
    assert_amps_approx_eq(reg.peek(), &basis_state(3, 0b010), 1e-12);
}

#[test]
fn test_repeated_hadamard_spreads_uniformly() {
    let mut reg = register(3);
    reg.transform(&Transform::gate_1q(FunctionType::H, 3, 0, Vec::new())).unwrap();
    let amp = Complex64::new(1.0 / 8f64.sqrt(), 0.0);
    assert_amps_approx_eq(reg.peek(), &vec![amp; 8], 1e-12);
}

#[test]
fn test_transform_swaps_mirrors_and_clears_sync() {
    let mut reg = register(2);
    assert!(reg.is_in_sync());
    let before = reg.active_mirror();
    reg.transform(&x(0)).unwrap();
    assert!(!reg.is_in_sync());
    assert_ne!(reg.active_mirror(), before);
    reg.peek();
    assert!(reg.is_in_sync());
}

#[test]
fn test_set_amplitudes_size_checked() {
    let mut reg = register(1);
    let amps = vec![Complex64::new(FRAC_1_SQRT_2, 0.0), Complex64::new(0.0, FRAC_1_SQRT_2)];
    reg.set_amplitudes(&amps).unwrap();
    assert!(reg.is_in_sync());
    assert_amps_approx_eq(reg.peek(), &amps, 1e-12);
    assert!(reg.set_amplitudes(&initial_state(2)).is_err());
    assert!(reg.set_pure_state(2).is_err());
}

#[test]
fn test_failed_transform_leaves_state() {
    let mut reg = register(2);
    reg.transform(&h(0)).unwrap();
    let before = reg.peek().to_vec();
    let mirror = reg.active_mirror();
    assert!(reg.transform(&Transform::gate_1q(FunctionType::X, 3, 0, Vec::new())).is_err());
    assert!(reg.transform(&x(2)).is_err());
    assert_eq!(reg.active_mirror(), mirror);
    assert_amps_approx_eq(reg.peek(), &before, 1e-12);
}

// --- measurement tests ---

#[test]
fn test_get_state_bitval() {
    assert_eq!(get_state_bitval(0b110110, 1, 3), 0b011);
    assert_eq!(get_state_bitval(0b110110, 0, 0), 0);
    assert_eq!(get_state_bitval(0b110110, 4, 2), 0b11);
}

#[test]
fn test_normalize_span() {
    assert_eq!(normalize_span(4, 0, -1).unwrap(), (0, 4));
    assert_eq!(normalize_span(4, 1, -1).unwrap(), (1, 3));
    assert_eq!(normalize_span(4, -1, 2).unwrap(), (0, 4));
    assert_eq!(normalize_span(4, 2, 2).unwrap(), (2, 2));
    assert!(normalize_span(4, 4, 1).is_err());
    assert!(normalize_span(4, 2, 3).is_err());
}

#[test]
fn test_selection_rules() {
    let probs = [0.1, 0.6, 0.3];
    assert_eq!(select_max(&probs), 1);
    // smallest probability still reaching the sample
    assert_eq!(select_random(&probs, 0.25), 2);
    assert_eq!(select_random(&probs, 0.05), 0);
    // nothing reaches the sample
    assert_eq!(select_random(&probs, 0.9), 1);
}

#[test]
fn test_pauli_z_eigenvalues() {
    assert_eq!(eigenvalues(Observable::PauliZ, 2), vec![1.0, -1.0, -1.0, 1.0]);
    assert_eq!(eigenvalues(Observable::Computational, 2), vec![1.0; 4]);
    assert_eq!(eigenvalues(Observable::PauliZ, 0), vec![1.0]);
}

#[test]
fn test_measure_collapse_idempotent() {
    let mut reg = register(3);
    reg.transform(&Transform::gate_1q(FunctionType::H, 3, 0, Vec::new())).unwrap();
    let first = reg.measure(0, -1, false, true, 10).unwrap();
    let second = reg.measure(0, -1, false, true, 10).unwrap();
    assert_eq!(first.st_idx, second.st_idx);
    assert!((second.probability - 1.0).abs() < 1e-9);
    assert_eq!(second.indices, Some(vec![first.st_idx]));
    let probs = reg.get_probabilities();
    assert!((probs[first.st_idx] - 1.0).abs() < 1e-9);
}

#[test]
fn test_partial_measure_keeps_other_qubits() {
    let mut reg = register(2);
    reg.transform(&h(1)).unwrap();
    reg.transform(&x(0)).unwrap();
    let outcome = reg.measure(0, 1, false, true, 10).unwrap();
    assert_eq!(outcome.st_idx, 1);
    assert!((outcome.probability - 1.0).abs() < 1e-9);
    assert_eq!(outcome.indices, Some(vec![1, 3]));
    let amp = Complex64::new(FRAC_1_SQRT_2, 0.0);
    let zero = Complex64::new(0.0, 0.0);
    assert_amps_approx_eq(reg.peek(), &[zero, amp, zero, amp], 1e-12);
}

#[test]
fn test_index_list_capped() {
    let mut reg = register(4);
    let outcome = reg.measure(0, 1, false, true, 2).unwrap();
    assert_eq!(outcome.indices, None);
}

#[test]
fn test_non_collapsing_measure_preserves_probabilities() {
    let mut reg = register(2);
    reg.transform(&h(0)).unwrap();
    reg.transform(&cx(0, 1)).unwrap();
    let before = reg.get_probabilities();
    let outcome = reg.measure(0, -1, true, false, 10).unwrap();
    assert!(outcome.indices.is_none());
    let after = reg.get_probabilities();
    assert!((after.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    assert_eq!(before, after);
}

#[test]
fn test_sub_state_probabilities_partial_span() {
    let amps: Vec<Complex64> = (0..16).map(|i| Complex64::new(i as f64, 0.5)).collect();
    let norm: f64 = amps.iter().map(|a| a.norm_sqr()).sum();
    let amps: Vec<Complex64> = amps.iter().map(|a| *a / norm.sqrt()).collect();
    for (idx, len) in [(0, 0), (0, 2), (1, 2), (2, 2), (1, 3), (0, 4)] {
        let mut expected = vec![0.0; 1 << len];
        for (i, a) in amps.iter().enumerate() {
            expected[get_state_bitval(i, idx, len)] += a.norm_sqr();
        }
        let probs = sub_state_probabilities(&amps, idx, len);
        assert_eq!(probs.len(), expected.len());
        for (p, e) in probs.iter().zip(&expected) {
            assert!((p - e).abs() < 1e-12, "span ({}, {}): {} vs {}", idx, len, p, e);
        }
    }
}

#[test]
fn test_expectation_over_sub_register() {
    let mut reg = register(3);
    reg.transform(&h(0)).unwrap();
    reg.transform(&x(1)).unwrap();
    let theta = PI / 3.0;
    reg.transform(&Transform::gate_1q(FunctionType::Ry, 1, 2, vec![FunctionArg::Real(theta)]))
        .unwrap();
    // qubits 1 and 2: p(01) = cos^2, p(11) = sin^2, eigenvalues -1 and +1
    let z = reg.expectation(-1, 1, 2, Observable::PauliZ).unwrap();
    assert!((z + theta.cos()).abs() < 1e-12);
    let p01 = (theta / 2.0).cos().powi(2);
    assert!((reg.expectation(0b01, 1, 2, Observable::PauliZ).unwrap() + p01).abs() < 1e-12);
    assert!(reg.expectation(0b00, 1, 2, Observable::PauliZ).unwrap().abs() < 1e-12);
    assert!((reg.expectation(-1, 1, 2, Observable::Computational).unwrap() - 1.0).abs() < 1e-12);
}

#[test]
fn test_expectation_values() {
    let mut reg = register(2);
    assert!((reg.expectation(-1, 0, -1, Observable::PauliZ).unwrap() - 1.0).abs() < 1e-12);
    reg.transform(&x(1)).unwrap();
    assert!((reg.expectation(-1, 1, 1, Observable::PauliZ).unwrap() + 1.0).abs() < 1e-12);
    assert!((reg.expectation(-1, 0, 1, Observable::PauliZ).unwrap() - 1.0).abs() < 1e-12);
    reg.transform(&h(0)).unwrap();
    assert!(reg.expectation(-1, 0, 1, Observable::PauliZ).unwrap().abs() < 1e-12);
    assert!((reg.expectation(-1, 0, -1, Observable::Computational).unwrap() - 1.0).abs() < 1e-12);
    // single term p(2)·eigen(2)
    assert!((reg.expectation(2, 0, -1, Observable::PauliZ).unwrap() + 0.5).abs() < 1e-12);
    assert!(reg.expectation(7, 0, -1, Observable::PauliZ).is_err());
}

// --- dispatcher tests ---

#[test]
fn test_handles_start_at_one_and_reset() {
    let mut qcpu = QCpu::new(test_config());
    assert_eq!(allocate(&mut qcpu, 1, 2), 1);
    assert_eq!(allocate(&mut qcpu, 2, 3), 2);
    assert_eq!(qcpu.qubit_count(2).unwrap(), 3);
    assert!(qcpu.dump().contains("[2] 3 qubits"));
    qcpu.reset();
    assert_eq!(qcpu.register_count(), 0);
    assert_eq!(allocate(&mut qcpu, 3, 1), 1);
}

#[test]
fn test_unknown_handle() {
    let mut qcpu = QCpu::new(test_config());
    let resp = qcpu.execute(&QasmMessage::new(8, MessageId::Reset).with_param(TAG_QREG_H, 5));
    assert_eq!(resp.counter, 8);
    assert_eq!(error_text(&resp), "wrong qreg handle provided [5]");
}

#[test]
fn test_allocate_limit() {
    let mut qcpu = QCpu::new(EngineConfig {
        max_qubits: 4,
        ..test_config()
    });
    let resp = qcpu.execute(&QasmMessage::new(1, MessageId::Allocate).with_param(TAG_QREG_QN, 5));
    assert!(!resp.is_ok());
    let resp = qcpu.execute(&QasmMessage::new(1, MessageId::Allocate).with_param(TAG_QREG_QN, 0));
    assert!(error_text(&resp).contains("core instruction transformation syntax error"));
}

#[test]
fn test_release_then_use() {
    let mut qcpu = QCpu::new(test_config());
    let h = allocate(&mut qcpu, 1, 2);
    let resp = qcpu.execute(&QasmMessage::new(2, MessageId::Release).with_param(TAG_QREG_H, h));
    assert!(resp.is_ok());
    let resp = qcpu.execute(&QasmMessage::new(3, MessageId::Peek).with_param(TAG_QREG_H, h));
    assert!(!resp.is_ok());
}

#[test]
fn test_hadamard_measure_scenario() {
    let mut qcpu = QCpu::new(test_config());
    let h = allocate(&mut qcpu, 1, 2);
    assert!(qcpu.execute(&QasmMessage::new(2, MessageId::Reset).with_param(TAG_QREG_H, h)).is_ok());
    assert!(qcpu.execute(&transform_msg(3, h, FunctionType::H, 2, 1, 0)).is_ok());
    let resp = qcpu.execute(&measure_msg(4, h, 0, 2, false, true));
    assert!(resp.is_ok());
    let p: f64 = resp.param_as(TAG_MEAS_ST_PROB).unwrap();
    assert!((p - 0.5).abs() < 1e-9);
    let st: usize = resp.param_as(TAG_MEAS_ST_IDX).unwrap();
    let idxs = parse_index_list(resp.param(TAG_MEAS_ST_IDXS).unwrap()).unwrap();
    assert_eq!(idxs, vec![st]);
    let amps = peek(&mut qcpu, h);
    let nonzero: Vec<usize> = (0..amps.len()).filter(|&i| amps[i].norm() > 1e-9).collect();
    assert_eq!(nonzero, vec![st]);
    assert!((amps[st].norm() - 1.0).abs() < 1e-9);
}

#[test]
fn test_oversized_transform_rejected_without_change() {
    let mut qcpu = QCpu::new(test_config());
    let h = allocate(&mut qcpu, 1, 2);
    assert!(qcpu.execute(&transform_msg(2, h, FunctionType::H, 2, 1, 0)).is_ok());
    let before = peek(&mut qcpu, h);
    let resp = qcpu.execute(&transform_msg(3, h, FunctionType::CCX, 8, 1, 0));
    assert!(!resp.is_ok());
    assert_amps_approx_eq(&peek(&mut qcpu, h), &before, 1e-12);
}

#[test]
fn test_swap_block_exchanges_qubits() {
    let mut qcpu = QCpu::new(test_config());
    let h = allocate(&mut qcpu, 1, 2);
    let set = QasmMessage::new(2, MessageId::Set)
        .with_param(TAG_QREG_H, h)
        .with_param(TAG_QREG_ST_IDX, 0b10);
    assert!(qcpu.execute(&set).is_ok());
    assert!(qcpu.execute(&transform_msg(3, h, FunctionType::SwapQ1, 4, 1, 0)).is_ok());
    assert_amps_approx_eq(&peek(&mut qcpu, h), &basis_state(2, 0b01), 1e-12);
}

#[test]
fn test_swap_qn_moves_upper_half_down() {
    let mut qcpu = QCpu::new(test_config());
    let h = allocate(&mut qcpu, 1, 4);
    let set = QasmMessage::new(2, MessageId::Set)
        .with_param(TAG_QREG_H, h)
        .with_param(TAG_QREG_ST_IDX, 0b0011);
    assert!(qcpu.execute(&set).is_ok());
    assert!(qcpu.execute(&transform_msg(3, h, FunctionType::SwapQn, 16, 1, 0)).is_ok());
    assert_amps_approx_eq(&peek(&mut qcpu, h), &basis_state(4, 0b1100), 1e-12);
}

#[test]
fn test_cswap_block() {
    let mut qcpu = QCpu::new(test_config());
    let h = allocate(&mut qcpu, 1, 3);
    let cswap = |counter| {
        transform_msg(counter, h, FunctionType::CswapQ1, 8, 1, 0)
            .with_param(TAG_F_CRANGE, "(2, 2)")
            .with_param(TAG_F_TRANGE, "(0, 1)")
    };
    let set = |counter, idx: usize| {
        QasmMessage::new(counter, MessageId::Set)
            .with_param(TAG_QREG_H, h)
            .with_param(TAG_QREG_ST_IDX, idx)
    };
    assert!(qcpu.execute(&set(2, 0b110)).is_ok());
    assert!(qcpu.execute(&cswap(3)).is_ok());
    assert_amps_approx_eq(&peek(&mut qcpu, h), &basis_state(3, 0b101), 1e-12);
    assert!(qcpu.execute(&set(4, 0b010)).is_ok());
    assert!(qcpu.execute(&cswap(5)).is_ok());
    assert_amps_approx_eq(&peek(&mut qcpu, h), &basis_state(3, 0b010), 1e-12);
}

fn set_basis(qcpu: &mut QCpu, handle: u32, idx: usize) {
    let set = QasmMessage::new(90, MessageId::Set)
        .with_param(TAG_QREG_H, handle)
        .with_param(TAG_QREG_ST_IDX, idx);
    assert!(qcpu.execute(&set).is_ok());
}

#[test]
fn test_cswap_qn_direct_and_inverse() {
    let mut qcpu = QCpu::new(test_config());
    let h = allocate(&mut qcpu, 1, 5);
    let cswap = |counter, crange: &str, trange: &str| {
        transform_msg(counter, h, FunctionType::CswapQn, 32, 1, 0)
            .with_param(TAG_F_CRANGE, crange)
            .with_param(TAG_F_TRANGE, trange)
    };
    // control on top, pairs (0,1) <-> (2,3)
    set_basis(&mut qcpu, h, 0b10110);
    assert!(qcpu.execute(&cswap(2, "(4, 4)", "(0, 3)")).is_ok());
    assert_amps_approx_eq(&peek(&mut qcpu, h), &basis_state(5, 0b11001), 1e-12);
    set_basis(&mut qcpu, h, 0b00110);
    assert!(qcpu.execute(&cswap(3, "(4, 4)", "(0, 3)")).is_ok());
    assert_amps_approx_eq(&peek(&mut qcpu, h), &basis_state(5, 0b00110), 1e-12);
    // control at the bottom, pairs (1,2) <-> (3,4)
    set_basis(&mut qcpu, h, 0b01101);
    assert!(qcpu.execute(&cswap(4, "(0, 0)", "(1, 4)")).is_ok());
    assert_amps_approx_eq(&peek(&mut qcpu, h), &basis_state(5, 0b10011), 1e-12);
}

#[test]
fn test_inverse_cswap_q1_with_gap() {
    let mut qcpu = QCpu::new(test_config());
    let h = allocate(&mut qcpu, 1, 4);
    let cswap = |counter| {
        transform_msg(counter, h, FunctionType::CswapQ1, 16, 1, 0)
            .with_param(TAG_F_CRANGE, "(0, 0)")
            .with_param(TAG_F_TRANGE, "(2, 3)")
    };
    set_basis(&mut qcpu, h, 0b0101);
    assert!(qcpu.execute(&cswap(2)).is_ok());
    assert_amps_approx_eq(&peek(&mut qcpu, h), &basis_state(4, 0b1001), 1e-12);
    set_basis(&mut qcpu, h, 0b0110);
    assert!(qcpu.execute(&cswap(3)).is_ok());
    assert_amps_approx_eq(&peek(&mut qcpu, h), &basis_state(4, 0b0110), 1e-12);
}

#[test]
fn test_long_range_controlled_cx() {
    let mut qcpu = QCpu::new(test_config());
    let h = allocate(&mut qcpu, 1, 4);
    let mcslru = |counter| {
        transform_msg(counter, h, FunctionType::MCSLRU, 16, 1, 0)
            .with_param(TAG_F_CRANGE, "(3, 3)")
            .with_param(TAG_F_TRANGE, "(0, 1)")
            .with_param(TAG_F_UTYPE, FunctionType::CX.code())
            .with_param(TAG_F_ARGS, "[(1, 1)|R,(0, 0)|R]")
    };
    set_basis(&mut qcpu, h, 0b1010);
    assert!(qcpu.execute(&mcslru(2)).is_ok());
    assert_amps_approx_eq(&peek(&mut qcpu, h), &basis_state(4, 0b1011), 1e-12);
    // outer control clear
    set_basis(&mut qcpu, h, 0b0010);
    assert!(qcpu.execute(&mcslru(3)).is_ok());
    assert_amps_approx_eq(&peek(&mut qcpu, h), &basis_state(4, 0b0010), 1e-12);
}

#[test]
fn test_block_lsq_overflow_rejected() {
    let mut qcpu = QCpu::new(test_config());
    let h = allocate(&mut qcpu, 1, 2);
    assert!(qcpu.execute(&transform_msg(2, h, FunctionType::H, 2, 1, 0)).is_ok());
    let before = peek(&mut qcpu, h);
    let resp = qcpu.execute(&transform_msg(3, h, FunctionType::SwapQ1, 4, 2, i32::MAX - 1));
    assert!(error_text(&resp).contains("function repetitions exceeds qureg size"));
    let resp = qcpu.execute(&transform_msg(4, h, FunctionType::SwapQ1, 4, 1, i32::MAX - 1));
    assert!(error_text(&resp).contains("inconsistent LSQ value"));
    assert_amps_approx_eq(&peek(&mut qcpu, h), &before, 1e-12);
}

#[test]
fn test_block_is_atomic() {
    let mut qcpu = QCpu::new(test_config());
    let h = allocate(&mut qcpu, 1, 3);
    assert!(qcpu.execute(&transform_msg(2, h, FunctionType::X, 2, 1, 0)).is_ok());
    let before = peek(&mut qcpu, h);
    // a 4-qubit swap only partially fits a 3-qubit register
    let resp = qcpu.execute(&transform_msg(3, h, FunctionType::SwapQn, 16, 1, 0));
    assert!(!resp.is_ok());
    assert_amps_approx_eq(&peek(&mut qcpu, h), &before, 1e-12);
}

#[test]
fn test_feature_map_block() {
    let mut qcpu = QCpu::new(test_config());
    let h = allocate(&mut qcpu, 1, 2);
    let fmap = QasmMessage::new(2, MessageId::Transform)
        .with_param(TAG_QREG_H, h)
        .with_param(TAG_F_TYPE, FunctionType::FeatureMap.code())
        .with_param(TAG_FQML_REP, 1)
        .with_param(TAG_FQML_SUBTYPE, FeatureMapType::PauliZ.code())
        .with_param(TAG_F_ARGS, "[0.0|D,0.0|D]");
    assert!(qcpu.execute(&fmap).is_ok());
    // zero features leave the uniform superposition
    assert_amps_approx_eq(&peek(&mut qcpu, h), &vec![Complex64::new(0.5, 0.0); 4], 1e-12);

    let too_many = fmap.clone().with_param(TAG_F_ARGS, "[0.1|D,0.2|D,0.3|D]");
    let err = error_text(&qcpu.execute(&too_many));
    assert!(err.contains("exceeds qureg size"));
}

#[test]
fn test_circular_zz_feature_map_state() {
    let mut qcpu = QCpu::new(test_config());
    let h = allocate(&mut qcpu, 1, 3);
    let x = [0.1, 0.2, 0.3];
    let fmap = QasmMessage::new(2, MessageId::Transform)
        .with_param(TAG_QREG_H, h)
        .with_param(TAG_F_TYPE, FunctionType::FeatureMap.code())
        .with_param(TAG_FQML_REP, 1)
        .with_param(TAG_FQML_SUBTYPE, FeatureMapType::PauliZZ.code())
        .with_param(TAG_FQML_ENTANG, Entanglement::Circular.code())
        .with_param(TAG_F_ARGS, "[0.1|D,0.2|D,0.3|D]");
    assert!(qcpu.execute(&fmap).is_ok());

    // every CX-PS-CX pair adds phase 2x(t) when control and target differ,
    // the wrap pair runs from qubit 2 to qubit 0
    let bit = |b: usize, q: usize| ((b >> q) & 1) as f64;
    let xor = |b: usize, c: usize, t: usize| (((b >> c) ^ (b >> t)) & 1) as f64;
    let expected: Vec<Complex64> = (0..8)
        .map(|b| {
            let single: f64 = (0..3).map(|q| x[q] * bit(b, q)).sum();
            let pairs = x[0] * xor(b, 2, 0) + x[1] * xor(b, 0, 1) + x[2] * xor(b, 1, 2);
            Complex64::from_polar(1.0 / 8f64.sqrt(), 2.0 * (single + pairs))
        })
        .collect();
    assert_amps_approx_eq(&peek(&mut qcpu, h), &expected, 1e-9);
}

#[test]
fn test_qml_repetitions_capped() {
    let mut qcpu = QCpu::new(EngineConfig {
        max_block_repetitions: 4,
        ..test_config()
    });
    let h = allocate(&mut qcpu, 1, 2);
    let before = peek(&mut qcpu, h);
    let fmap = |rep: i32| {
        QasmMessage::new(2, MessageId::Transform)
            .with_param(TAG_QREG_H, h)
            .with_param(TAG_F_TYPE, FunctionType::FeatureMap.code())
            .with_param(TAG_FQML_REP, rep)
            .with_param(TAG_FQML_SUBTYPE, FeatureMapType::PauliZ.code())
            .with_param(TAG_F_ARGS, "[0.1|D,0.2|D]")
    };
    let err = error_text(&qcpu.execute(&fmap(i32::MAX)));
    assert!(err.contains("exceed the block limit [4]"));
    assert_amps_approx_eq(&peek(&mut qcpu, h), &before, 1e-12);
    assert!(qcpu.execute(&fmap(4)).is_ok());
}

#[test]
fn test_qnet_block() {
    let mut qcpu = QCpu::new(test_config());
    let h = allocate(&mut qcpu, 1, 2);
    let qnet = |args: &str| {
        QasmMessage::new(2, MessageId::Transform)
            .with_param(TAG_QREG_H, h)
            .with_param(TAG_F_TYPE, FunctionType::QNet.code())
            .with_param(TAG_FQML_REP, 1)
            .with_param(TAG_FQML_QNET_TYPE, QNetLayout::RealAmplitude.code())
            .with_param(TAG_FQML_ENTANG, Entanglement::Linear.code())
            .with_param(TAG_F_ARGS, args)
    };
    // Ry(pi) on qubit 0 then CX(0 -> 1), second layer idle
    assert!(qcpu.execute(&qnet("[3.141592653589793|D,0.0|D,0.0|D,0.0|D]")).is_ok());
    let amps = peek(&mut qcpu, h);
    assert!((amps[0b11].norm() - 1.0).abs() < 1e-9);
    assert!(!qcpu.execute(&qnet("[0.0|D,0.0|D,0.0|D]")).is_ok());
}

#[test]
fn test_peek_limit() {
    let mut qcpu = QCpu::new(EngineConfig {
        peek_max_qubits: 2,
        ..test_config()
    });
    let h = allocate(&mut qcpu, 1, 3);
    let resp = qcpu.execute(&QasmMessage::new(2, MessageId::Peek).with_param(TAG_QREG_H, h));
    assert!(error_text(&resp).contains("peek refused"));
}

#[test]
fn test_expect_response() {
    let mut qcpu = QCpu::new(test_config());
    let h = allocate(&mut qcpu, 1, 1);
    assert!(qcpu.execute(&transform_msg(2, h, FunctionType::X, 2, 1, 0)).is_ok());
    let resp = qcpu.execute(
        &QasmMessage::new(3, MessageId::Expect)
            .with_param(TAG_QREG_H, h)
            .with_param(TAG_EXP_OBS_OP, Observable::PauliZ.code()),
    );
    let value: f64 = resp.param_as(TAG_EXP_ST_VAL).unwrap();
    assert!((value + 1.0).abs() < 1e-12);
}

// --- gateway tests ---

#[test]
fn test_client_registry_revokes_old_token() {
    let mut clients = ClientRegistry::new(Some(3));
    let first = clients.register("alice");
    let second = clients.register("alice");
    assert_ne!(first, second);
    assert!(!clients.is_registered(&first));
    assert_eq!(clients.client_id(&second), Some("alice"));
    assert!(clients.unregister(&second));
    assert!(!clients.unregister(&second));
    assert!(clients.is_empty());
}

#[test]
fn test_gateway_token_flow() {
    let gateway = Gateway::new(EngineConfig {
        rng_seed: Some(1),
        ..EngineConfig::default()
    });
    let denied = QasmMessage::decode(&gateway.handle_text("4|10|qr_n=2:")).unwrap();
    assert_eq!(denied.counter, 4);
    assert_eq!(error_text(&denied), "unrecognised token");

    let reg = QasmMessage::decode(&gateway.handle_text("5|1|id=tester:")).unwrap();
    assert!(reg.is_ok());
    let token = reg.param(TAG_CLIENT_TOKEN).unwrap().to_string();
    let alloc = gateway.handle_text(&format!("6|10|qr_n=2:token={}:", token));
    let alloc = QasmMessage::decode(&alloc).unwrap();
    assert!(alloc.is_ok());
    assert_eq!(alloc.counter, 6);
    assert_eq!(alloc.param(TAG_QREG_H), Some("1"));

    let unreg = QasmMessage::decode(&gateway.handle_text(&format!("7|2|token={}:", token))).unwrap();
    assert!(unreg.is_ok());
    assert_eq!(gateway.client_count(), 0);
}

#[test]
fn test_gateway_syntax_errors() {
    let gateway = Gateway::new(test_config());
    let resp = QasmMessage::decode(&gateway.handle_text("9")).unwrap();
    assert_eq!(resp.param(TAG_RESULT), Some(VAL_NOK));
    assert!(error_text(&resp).starts_with("message syntax wrong"));
    let resp = QasmMessage::decode(&gateway.handle_text("10|16|qr_h=1:")).unwrap();
    assert_eq!(resp.counter, 10);
    assert_eq!(resp.param(TAG_RESULT), Some(VAL_NOK));
    assert_eq!(
        error_text(&resp),
        "message syntax wrong, message [16] missing parameter [qr_mQidx]"
    );
    // a parameter parse failure quotes the offending tag and value
    let resp = QasmMessage::decode(&gateway.handle_text("11|10|qr_n=two:")).unwrap();
    assert_eq!(resp.param(TAG_RESULT), Some(VAL_NOK));
    assert!(error_text(&resp).contains("[qr_n] value [two]"));
}

#[test]
fn test_config_from_json() {
    let config = EngineConfig::from_json_str(r#"{"max_qubits": 12, "rng_seed": 5}"#).unwrap();
    assert_eq!(config.max_qubits, 12);
    assert_eq!(config.rng_seed, Some(5));
    assert_eq!(config.peek_max_qubits, 10);
    assert!(config.require_token);
    assert_eq!(config.max_block_repetitions, 256);
    assert!(matches!(
        EngineConfig::from_json_str(r#"{"max_qubits": 0}"#),
        Err(QsimError::Config(_))
    ));
    assert!(matches!(
        EngineConfig::from_json_str(r#"{"max_block_repetitions": 0}"#),
        Err(QsimError::Config(_))
    ));
}

// --- property tests ---

fn arb_message() -> impl Strategy<Value = QasmMessage> {
    let ids = prop::sample::select(vec![
        MessageId::Allocate,
        MessageId::Measure,
        MessageId::Transform,
        MessageId::Expect,
        MessageId::Response,
    ]);
    let params = prop::collection::btree_map("[a-zA-Z_]{1,10}", "[a-zA-Z0-9_.,()\\[\\] |:=\\\\-]{0,16}", 0..6);
    (any::<i32>(), ids, params).prop_map(|(counter, id, params)| QasmMessage { counter, id, params })
}

fn arb_gate() -> impl Strategy<Value = FunctionType> {
    prop::sample::select(vec![
        FunctionType::H,
        FunctionType::X,
        FunctionType::Y,
        FunctionType::Z,
        FunctionType::SX,
        FunctionType::PS,
        FunctionType::T,
        FunctionType::S,
        FunctionType::Rx,
        FunctionType::Ry,
        FunctionType::Rz,
    ])
}

proptest! {
    #[test]
    fn prop_message_round_trip(msg in arb_message()) {
        prop_assert_eq!(QasmMessage::decode(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn prop_self_inverse_gates(n in 1usize..5, q in 0usize..4, use_h in any::<bool>()) {
        prop_assume!(q < n);
        let mut reg = register(n);
        let gate = if use_h { h(q as i32) } else { x(q as i32) };
        reg.transform(&gate).unwrap();
        reg.transform(&gate).unwrap();
        prop_assert!(reg.peek().iter().zip(initial_state(n)).all(|(a, b)| (a - b).norm() < 1e-9));
    }

    #[test]
    fn prop_single_qubit_gates_are_unitary(ftype in arb_gate(), phi in -PI..PI) {
        let g = Gate1q::new(ftype, phi);
        for i in 0..2 {
            for j in 0..2 {
                let dot: Complex64 = (0..2).map(|k| g.element(i, k) * g.element(j, k).conj()).sum();
                let expected = if i == j { 1.0 } else { 0.0 };
                prop_assert!((dot - Complex64::new(expected, 0.0)).norm() < 1e-9);
            }
        }
    }

    #[test]
    fn prop_probabilities_sum_to_one(
        n in 1usize..5,
        gates in prop::collection::vec((arb_gate(), 0usize..4, -PI..PI), 1..8),
        qidx in 0i32..4,
    ) {
        let mut reg = register(n);
        for (ftype, q, phi) in gates {
            let t = Transform::gate_1q(ftype, 1, (q % n) as i32, vec![FunctionArg::Real(phi)]);
            reg.transform(&t).unwrap();
        }
        let total: f64 = reg.get_probabilities().iter().sum();
        prop_assert!((total - 1.0).abs() < 1e-9);
        let qidx = qidx % n as i32;
        let sub: f64 = sub_state_probabilities(reg.peek(), qidx as usize, 1).iter().sum();
        prop_assert!((sub - 1.0).abs() < 1e-9);
        let z = reg.expectation(-1, qidx, -1, Observable::PauliZ).unwrap();
        prop_assert!((-1.0 - 1e-9..=1.0 + 1e-9).contains(&z));
    }
}
