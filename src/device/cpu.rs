use crate::device::{BackendKind, DeviceBackend, FunctionChain};
use crate::error::{QsimError, QsimResult};
use log::trace;
use num_complex::Complex64;
use rayon::prelude::*;

#[derive(Debug, Default, Clone, Copy)]
pub struct CpuDevice;

impl CpuDevice {
    pub fn new() -> Self {
        CpuDevice
    }
}

impl DeviceBackend for CpuDevice {
    fn kind(&self) -> BackendKind {
        BackendKind::Cpu
    }

    fn apply(&self, chain: &FunctionChain, input: &[Complex64], out: &mut [Complex64]) -> QsimResult<()> {
        let tot_states = 1usize << chain.qubits;
        if input.len() != tot_states || out.len() != tot_states {
            return Err(QsimError::execution(format!(
                "device buffers of [{}]/[{}] states do not fit [{}] qubits",
                input.len(),
                out.len(),
                chain.qubits
            )));
        }
        let block = chain.block_size();
        let stride = chain.lsq_stride();
        trace!(
            "cpu kernel: {} states, block {} stride {}",
            tot_states,
            block,
            stride
        );

        // each output element only couples to inputs in its own block that
        // share its lsq padding bits
        out.par_iter_mut().enumerate().for_each(|(idx, y)| {
            let block_start = (idx / block) * block;
            *y = (block_start + idx % stride..block_start + block)
                .step_by(stride)
                .fold(Complex64::new(0.0, 0.0), |acc, k| {
                    let x = input[k];
                    if x.re == 0.0 && x.im == 0.0 {
                        acc
                    } else {
                        acc + x * chain.element(idx, k)
                    }
                });
        });
        Ok(())
    }
}
