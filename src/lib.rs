// quantum register simulation engine driven by tagged text messages

pub mod config; // engine limits and defaults
pub mod device; // matrix-free gate kernels
pub mod error; // error taxonomy
pub mod instructions; // core / block / qml instruction decoding
pub mod qasm; // wire format
pub mod qcpu; // dispatcher and handle registry
pub mod runtime; // register engine
pub mod session; // client tokens and text gateway

#[cfg(test)] // for testing
mod test;

pub use crate::config::EngineConfig;
pub use crate::error::{QsimError, QsimResult};
pub use crate::qasm::message::QasmMessage;
pub use crate::qcpu::QCpu;
pub use crate::session::Gateway;
