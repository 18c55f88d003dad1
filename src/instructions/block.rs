use crate::error::{QsimError, QsimResult};
use crate::instructions::core_instr::Transform;
use crate::instructions::{as_invalid, exact_log2, KIND_BLOCK};
use crate::qasm::function_arg::{ctrange_gap, ctrange_to_form, IndexRange};
use crate::qasm::message::QasmMessage;
use crate::qasm::*;
use log::debug;
use serde::{Deserialize, Serialize};

// swap and controlled-swap patterns, unwound into primitive transforms
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BlockInstruction {
    pub handle: u32,
    pub ftype: FunctionType,
    pub fsize: i64,
    pub frep: i32,
    pub flsq: i32,
    pub crange: IndexRange,
    pub trange: IndexRange,
}

impl BlockInstruction {
    pub fn new(handle: u32, ftype: FunctionType, fsize: i64, frep: i32, flsq: i32) -> Self {
        BlockInstruction {
            handle,
            ftype,
            fsize,
            frep,
            flsq,
            crange: IndexRange::EMPTY,
            trange: IndexRange::EMPTY,
        }
    }

    pub fn with_ranges(mut self, crange: IndexRange, trange: IndexRange) -> Self {
        self.crange = crange;
        self.trange = trange;
        self
    }

    pub fn from_message(msg: &QasmMessage) -> QsimResult<Self> {
        let block = Self::decode(msg).map_err(|e| as_invalid(KIND_BLOCK, e))?;
        block.validate()?;
        Ok(block)
    }

    fn decode(msg: &QasmMessage) -> QsimResult<Self> {
        let code: i32 = msg.param_as(TAG_F_TYPE)?;
        let ftype = FunctionType::from_code(code)
            .ok_or_else(|| QsimError::Syntax(format!("unhandled function type [{}]", code)))?;
        Ok(BlockInstruction {
            handle: msg.param_as(TAG_QREG_H)?,
            ftype,
            fsize: msg.param_as(TAG_F_SIZE)?,
            frep: msg.param_as(TAG_F_REP)?,
            flsq: msg.param_as(TAG_F_LSQ)?,
            crange: msg.param_range(TAG_F_CRANGE)?,
            trange: msg.param_range(TAG_F_TRANGE)?,
        })
    }

    pub fn validate(&self) -> QsimResult<()> {
        let invalid = |reason: String| Err(QsimError::validation(KIND_BLOCK, reason));

        if self.ftype.class() != FunctionClass::Block {
            return invalid(format!("illegal block type value [{}]", self.ftype.code()));
        }
        if self.flsq < 0 {
            return invalid(format!("illegal function LSQ value [{}]", self.flsq));
        }
        if self.frep < 1 {
            return invalid(format!("illegal function repetitions value [{}]", self.frep));
        }
        let Some(fb_n) = exact_log2(self.fsize).map(|n| n as i32) else {
            return invalid(format!("block size [{}] is not a power of 2", self.fsize));
        };

        match self.ftype {
            FunctionType::SwapQ1 => {
                if fb_n != 2 {
                    return invalid(format!("illegal 1-qubit swap size [{}]", self.fsize));
                }
            }
            FunctionType::SwapQn => {
                if fb_n < 2 || fb_n % 2 != 0 {
                    return invalid(format!("illegal n-qubit swap size [{}]", self.fsize));
                }
            }
            _ => {
                // controlled swaps: single control qubit apart from the swapped span
                if self.crange.is_empty() || self.trange.is_empty() {
                    return invalid("controlled swap needs control and target ranges".to_string());
                }
                if !self.crange.is_consistent() || !self.trange.is_consistent() {
                    return invalid(format!("inconsistent ranges {} {}", self.crange, self.trange));
                }
                if self.crange.span() != 1 {
                    return invalid(format!("control range {} must cover 1 qubit", self.crange));
                }
                let gapn = self.gap();
                if gapn < 0 {
                    return invalid(format!(
                        "overlapping control and target ranges {} {}",
                        self.crange, self.trange
                    ));
                }
                let swapped = fb_n - gapn - 1;
                let ok = match self.ftype {
                    FunctionType::CswapQ1 => swapped == 2,
                    _ => swapped >= 2 && swapped % 2 == 0,
                };
                if !ok {
                    return invalid(format!(
                        "block size [{}] inconsistent with gap [{}]",
                        self.fsize, gapn
                    ));
                }
                if self.trange.span() != swapped {
                    return invalid(format!(
                        "target range {} does not cover the swapped qubits [{}]",
                        self.trange, swapped
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn form(&self) -> Form {
        ctrange_to_form(&self.crange, &self.trange)
    }

    pub fn gap(&self) -> i32 {
        ctrange_gap(&self.crange, &self.trange)
    }

    fn width(&self) -> i32 {
        exact_log2(self.fsize).map_or(0, |n| n as i32)
    }

    // ordered core transforms equivalent to the block on a register of
    // `qubits` qubits, repetitions stacked upward from the block lsq
    pub fn unwind(&self, qubits: usize) -> QsimResult<Vec<Transform>> {
        self.validate()?;
        let fb_n = self.width();
        let covered = i64::from(self.frep) * i64::from(fb_n);
        if covered > qubits as i64 {
            return Err(QsimError::execution(format!(
                "function repetitions exceeds qureg size, [{}]^[{}] > [{}] qubits",
                self.fsize, self.frep, qubits
            )));
        }
        if covered + i64::from(self.flsq) > qubits as i64 {
            return Err(QsimError::execution(format!(
                "inconsistent LSQ value [{}] for [{}]^[{}] on [{}] qubits",
                self.flsq, self.fsize, self.frep, qubits
            )));
        }
        let mut out = Vec::new();
        for r in 0..self.frep {
            let base = i32::try_from(i64::from(self.flsq) + i64::from(r) * i64::from(fb_n))
                .map_err(|_| QsimError::execution(format!("block lsq out of range for repetition [{}]", r)))?;
            match self.ftype {
                FunctionType::SwapQ1 => out.extend(swap_q1(base)),
                FunctionType::SwapQn => out.extend(swap_qn(fb_n, base)),
                FunctionType::CswapQ1 => out.extend(cswap_q1(fb_n, base, self.form())),
                FunctionType::CswapQn => out.extend(cswap_qn(fb_n, self.gap(), base, self.form())),
                other => {
                    return Err(QsimError::validation(
                        KIND_BLOCK,
                        format!("unhandled block type [{}]", other.code()),
                    ))
                }
            }
        }
        debug!(
            "block {} unwound into {} transforms",
            self.ftype.name(),
            out.len()
        );
        Ok(out)
    }
}

// three alternating CX on qubits (lsq, lsq+1)
pub fn swap_q1(lsq: i32) -> [Transform; 3] {
    let hi = IndexRange::single(1);
    let lo = IndexRange::single(0);
    [
        Transform::gate_2q(FunctionType::CX, 1, lsq, hi, lo),
        Transform::gate_2q(FunctionType::CX, 1, lsq, lo, hi),
        Transform::gate_2q(FunctionType::CX, 1, lsq, hi, lo),
    ]
}

// adjacent-pair exchanges over a k x k grid move the upper k qubits below the
// lower k qubits
pub fn swap_qn(fb_n: i32, lsq: i32) -> Vec<Transform> {
    let k = fb_n / 2;
    (0..k * k)
        .flat_map(|i| swap_q1(grid_offset(i, k) + lsq))
        .collect()
}

// each CX of a 1-qubit swap becomes a multi-controlled CX whose outer control
// is the block control qubit
pub fn cswap_q1(fb_n: i32, lsq: i32, form: Form) -> Vec<Transform> {
    let (crange, trange) = match form {
        Form::Inverse => (IndexRange::single(0), IndexRange::new(fb_n - 2, fb_n - 1)),
        _ => (IndexRange::single(fb_n - 1), IndexRange::new(0, 1)),
    };
    swap_q1(0)
        .into_iter()
        .map(|cx| {
            Transform::controlled_nq(
                1i64 << fb_n,
                lsq,
                crange,
                trange,
                FunctionType::CX,
                cx.crange,
                cx.trange,
                Vec::new(),
            )
        })
        .collect()
}

// grid of 1-qubit controlled swaps, each sized to reach from its pair to the
// control qubit
pub fn cswap_qn(fb_n: i32, gapn: i32, lsq: i32, form: Form) -> Vec<Transform> {
    let k = (fb_n - gapn - 1) / 2;
    let mut out = Vec::new();
    for i in 0..k * k {
        let qidx = grid_offset(i, k);
        match form {
            Form::Inverse => {
                // control at the bottom, pair sits above the gap
                let sub_n = qidx + gapn + 3;
                out.extend(cswap_q1(sub_n, lsq, Form::Inverse));
            }
            _ => {
                // control at the top, pair at qidx
                let sub_n = fb_n - qidx;
                out.extend(cswap_q1(sub_n, lsq + qidx, Form::Direct));
            }
        }
    }
    out
}

fn grid_offset(i: i32, k: i32) -> i32 {
    (i % k) + k - 1 - (i / k)
}
