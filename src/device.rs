// matrix-free gate application. the device owns nothing but the kernel; the
// register hands it the active mirror and the scratch mirror for each step.

pub mod cpu; // rayon backend
pub mod gap_filling;
pub mod gates;

use crate::error::{QsimError, QsimResult};
use crate::instructions::Transform;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

pub use self::cpu::CpuDevice;
pub use self::gap_filling::FunctionChain;
pub use self::gates::GateKernel;

// operator elements below this magnitude are treated as exact zeros
pub const DEVICE_EPSILON: f64 = 1e-21;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Cpu,
}

pub trait DeviceBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    // |st_idx> into `state`
    fn set_state(&self, state: &mut [Complex64], st_idx: usize) -> QsimResult<()> {
        if st_idx >= state.len() {
            return Err(QsimError::execution(format!(
                "state index [{}] out of range [{}]",
                st_idx,
                state.len()
            )));
        }
        state.iter_mut().for_each(|a| *a = Complex64::new(0.0, 0.0));
        state[st_idx] = Complex64::new(1.0, 0.0);
        Ok(())
    }

    // out = F · input, both buffers cover the whole register
    fn apply(&self, chain: &FunctionChain, input: &[Complex64], out: &mut [Complex64]) -> QsimResult<()>;
}

// build the full-register operator for one transform
pub fn prepare(transform: &Transform, qubits: u32) -> QsimResult<FunctionChain> {
    let kernel = GateKernel::from_transform(transform)?;
    let frep = u32::try_from(transform.frep)
        .map_err(|_| QsimError::execution(format!("illegal function repetitions [{}]", transform.frep)))?;
    let flsq = u32::try_from(transform.flsq)
        .map_err(|_| QsimError::execution(format!("illegal function LSQ [{}]", transform.flsq)))?;
    FunctionChain::new(kernel, frep, flsq, qubits)
}

// two equally sized device buffers; exactly one holds the current state
#[derive(Debug, Clone, PartialEq)]
pub struct StateMirrors {
    bufs: [Vec<Complex64>; 2],
    active: usize,
}

impl StateMirrors {
    pub fn new(len: usize) -> Self {
        StateMirrors {
            bufs: [vec![Complex64::new(0.0, 0.0); len], vec![Complex64::new(0.0, 0.0); len]],
            active: 0,
        }
    }

    pub fn active(&self) -> &[Complex64] {
        &self.bufs[self.active]
    }

    pub fn active_mut(&mut self) -> &mut [Complex64] {
        &mut self.bufs[self.active]
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    // (current, scratch)
    pub fn split(&mut self) -> (&[Complex64], &mut [Complex64]) {
        let [a, b] = &mut self.bufs;
        if self.active == 0 {
            (a.as_slice(), b.as_mut_slice())
        } else {
            (b.as_slice(), a.as_mut_slice())
        }
    }

    // the scratch buffer becomes current
    pub fn swap(&mut self) {
        self.active ^= 1;
    }
}
