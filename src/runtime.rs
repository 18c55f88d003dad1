// register engine: per-register state, host/device mirrors and statistics

pub mod measurement;
pub mod quantum_register;

pub use self::measurement::{get_state_bitval, MeasureOutcome};
pub use self::quantum_register::QuantumRegister;
