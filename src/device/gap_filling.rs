// a transform covers only part of the register; the rest is padded with
// identity blocks so every (row, column) pair of the full operator can be
// evaluated without building the matrix

use crate::device::gates::GateKernel;
use crate::device::DEVICE_EPSILON;
use crate::error::{QsimError, QsimResult};
use num_complex::Complex64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Segment {
    // identity over `size` basis states
    Identity(usize),
    Gate,
}

// the full operator as a kronecker chain, MSQ first
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionChain {
    pub kernel: GateKernel,
    pub segments: Vec<Segment>,
    pub frep: u32,
    pub flsq: u32,
    pub qubits: u32,
}

impl FunctionChain {
    pub fn new(kernel: GateKernel, frep: u32, flsq: u32, qubits: u32) -> QsimResult<Self> {
        let fsize = kernel.size();
        let tot_states = 1usize << qubits;
        if fsize > tot_states {
            return Err(QsimError::execution(format!(
                "function size [{}] exceeds qureg states [{}]",
                fsize, tot_states
            )));
        }
        let covered = kernel.width() * frep;
        if frep == 0 || covered + flsq > qubits {
            return Err(QsimError::execution(format!(
                "function msq [{}] out of qureg range [{}]",
                (flsq + covered) as i64 - 1,
                qubits
            )));
        }
        let fmsq = flsq + covered - 1;

        let mut segments = Vec::with_capacity(frep as usize + 2);
        if fmsq < qubits - 1 {
            segments.push(Segment::Identity(1usize << (qubits - fmsq - 1)));
        }
        segments.extend(std::iter::repeat(Segment::Gate).take(frep as usize));
        if flsq > 0 {
            segments.push(Segment::Identity(1usize << flsq));
        }

        Ok(FunctionChain {
            kernel,
            segments,
            frep,
            flsq,
            qubits,
        })
    }

    // states spanned by the gate segments plus the lsq padding
    pub fn block_size(&self) -> usize {
        1usize << (self.kernel.width() * self.frep + self.flsq)
    }

    pub fn lsq_stride(&self) -> usize {
        1usize << self.flsq
    }

    // element (i, j) of the full operator, walked from the LSQ end
    pub fn element(&self, mut i: usize, mut j: usize) -> Complex64 {
        let gate_size = self.kernel.size();
        let mut val = Complex64::new(1.0, 0.0);
        for seg in self.segments.iter().rev() {
            let size = match seg {
                Segment::Identity(size) => *size,
                Segment::Gate => gate_size,
            };
            let (si, sj) = (i % size, j % size);
            val *= match seg {
                Segment::Identity(_) if si == sj => Complex64::new(1.0, 0.0),
                Segment::Identity(_) => return Complex64::new(0.0, 0.0),
                Segment::Gate => self.kernel.element(si, sj),
            };
            if val.norm() < DEVICE_EPSILON {
                return Complex64::new(0.0, 0.0);
            }
            i /= size;
            j /= size;
        }
        val
    }
}
