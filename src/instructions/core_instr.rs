use crate::error::{QsimError, QsimResult};
use crate::instructions::{as_invalid, exact_log2, KIND_CORE};
use crate::qasm::function_arg::{ctrange_gap, ctrange_to_form, parse_state_array, FunctionArg, IndexRange};
use crate::qasm::message::QasmMessage;
use crate::qasm::*;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum StateSetup {
    // basis state index
    Pure(usize),
    // full amplitude array
    Amplitudes(Vec<Complex64>),
}

// one primitive gate application. the inner (u-) fields only matter for
// controlled-U and n-qubit controlled functions
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Transform {
    pub ftype: FunctionType,
    pub fsize: i64,
    pub frep: i32,
    pub flsq: i32,
    pub crange: IndexRange,
    pub trange: IndexRange,
    pub args: Vec<FunctionArg>,
    pub utype: Option<FunctionType>,
    pub ucrange: IndexRange,
    pub utrange: IndexRange,
    pub uargs: Vec<FunctionArg>,
}

impl Transform {
    pub fn gate_1q(ftype: FunctionType, frep: i32, flsq: i32, args: Vec<FunctionArg>) -> Self {
        Transform {
            ftype,
            fsize: 2,
            frep,
            flsq,
            crange: IndexRange::EMPTY,
            trange: IndexRange::EMPTY,
            args,
            utype: None,
            ucrange: IndexRange::EMPTY,
            utrange: IndexRange::EMPTY,
            uargs: Vec::new(),
        }
    }

    pub fn gate_2q(
        ftype: FunctionType,
        frep: i32,
        flsq: i32,
        crange: IndexRange,
        trange: IndexRange,
    ) -> Self {
        Transform {
            fsize: 4,
            crange,
            trange,
            ..Transform::gate_1q(ftype, frep, flsq, Vec::new())
        }
    }

    // controlled-U with the given 1-qubit target function
    pub fn controlled_u(
        utype: FunctionType,
        uargs: Vec<FunctionArg>,
        frep: i32,
        flsq: i32,
        crange: IndexRange,
        trange: IndexRange,
    ) -> Self {
        Transform {
            utype: Some(utype),
            uargs,
            ..Transform::gate_2q(FunctionType::CU, frep, flsq, crange, trange)
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn controlled_nq(
        fsize: i64,
        flsq: i32,
        crange: IndexRange,
        trange: IndexRange,
        utype: FunctionType,
        ucrange: IndexRange,
        utrange: IndexRange,
        uargs: Vec<FunctionArg>,
    ) -> Self {
        Transform {
            ftype: FunctionType::MCSLRU,
            fsize,
            frep: 1,
            flsq,
            crange,
            trange,
            args: Vec::new(),
            utype: Some(utype),
            ucrange,
            utrange,
            uargs,
        }
    }

    // control/target layout, an unspecified layout reads as direct
    pub fn form(&self) -> Form {
        match ctrange_to_form(&self.crange, &self.trange) {
            Form::Null => Form::Direct,
            form => form,
        }
    }

    pub fn gap(&self) -> i32 {
        ctrange_gap(&self.crange, &self.trange)
    }

    pub fn inner_form(&self) -> Form {
        match ctrange_to_form(&self.ucrange, &self.utrange) {
            Form::Null => Form::Direct,
            form => form,
        }
    }

    // qubits spanned by one application of the function
    pub fn width(&self) -> u32 {
        exact_log2(self.fsize).unwrap_or(0)
    }

    pub fn validate(&self) -> QsimResult<()> {
        let invalid = |reason: String| Err(QsimError::validation(KIND_CORE, reason));

        if self.flsq < 0 {
            return invalid(format!("illegal function LSQ value [{}]", self.flsq));
        }
        if self.frep < 1 {
            return invalid(format!("illegal function repetitions value [{}]", self.frep));
        }
        for range in [&self.crange, &self.trange, &self.ucrange, &self.utrange] {
            if !range.is_consistent() {
                return invalid(format!("inconsistent index range {}", range));
            }
        }

        match self.ftype.class() {
            FunctionClass::Q1 => {
                if self.fsize != 2 {
                    return invalid(format!("illegal 1-qubit function size [{}]", self.fsize));
                }
                check_gate_args(self.ftype, &self.args)
            }
            FunctionClass::Q2 => {
                if self.fsize != 4 {
                    return invalid(format!("illegal 2-qubit function size [{}]", self.fsize));
                }
                check_disjoint(&self.crange, &self.trange)?;
                if self.ftype == FunctionType::CU {
                    match self.utype {
                        Some(u) if u.class() == FunctionClass::Q1 => check_gate_args(u, &self.uargs),
                        Some(u) => invalid(format!("illegal controlled-U function type [{}]", u.code())),
                        None => invalid("missing controlled-U function type".to_string()),
                    }
                } else {
                    Ok(())
                }
            }
            FunctionClass::Qn => self.validate_nqubit(),
            _ => invalid(format!("function type [{}] is not a core function", self.ftype.code())),
        }
    }

    fn validate_nqubit(&self) -> QsimResult<()> {
        let invalid = |reason: String| Err(QsimError::validation(KIND_CORE, reason));

        let Some(fn_) = exact_log2(self.fsize) else {
            return invalid(format!("n-qubit function size [{}] is not a power of 2", self.fsize));
        };
        check_disjoint(&self.crange, &self.trange)?;
        let gapn = self.gap();
        if gapn < 0 {
            return invalid(format!("overlapping control and target ranges {} {}", self.crange, self.trange));
        }

        let (fun, ctrln) = match self.ftype {
            FunctionType::CCX => {
                if !self.trange.is_empty() && self.trange.span() != 1 {
                    return invalid(format!("CCX target range {} must cover 1 qubit", self.trange));
                }
                (1, fn_ as i32 - 1 - gapn)
            }
            _ => {
                let Some(u) = self.utype else {
                    return invalid("missing n-qubit target function type".to_string());
                };
                let Some(fun) = u.inner_width() else {
                    return invalid(format!("illegal n-qubit target function type [{}]", u.code()));
                };
                if u == FunctionType::CU {
                    return invalid("controlled-U cannot be a n-qubit target function".to_string());
                }
                if self.trange.is_empty() || self.crange.is_empty() {
                    return invalid("n-qubit function needs control and target ranges".to_string());
                }
                if self.trange.span() != fun as i32 {
                    return invalid(format!(
                        "target range {} does not match target function width [{}]",
                        self.trange, fun
                    ));
                }
                if fun == 2 {
                    if self.ucrange.is_empty() || self.utrange.is_empty() {
                        return invalid("2-qubit target function needs inner ranges".to_string());
                    }
                    check_disjoint(&self.ucrange, &self.utrange)?;
                }
                check_gate_args(u, &self.uargs)?;
                (fun as i32, fn_ as i32 - fun as i32 - gapn)
            }
        };

        if ctrln < 1 {
            return invalid(format!(
                "no control qubits left, size [{}] target [{}] gap [{}]",
                self.fsize, fun, gapn
            ));
        }
        if self.ftype == FunctionType::CCX && ctrln != 2 {
            return invalid(format!("CCX needs 2 control qubits, found [{}]", ctrln));
        }
        if !self.crange.is_empty() && self.crange.span() != ctrln {
            return invalid(format!(
                "control range {} does not match control width [{}]",
                self.crange, ctrln
            ));
        }
        Ok(())
    }
}

// rotation style gates need a real-valued argument
fn check_gate_args(ftype: FunctionType, args: &[FunctionArg]) -> QsimResult<()> {
    use FunctionType::*;
    let needs_arg = matches!(ftype, PS | Rx | Ry | Rz);
    if needs_arg && !args.last().is_some_and(|a| a.as_f64().is_some()) {
        return Err(QsimError::validation(
            KIND_CORE,
            format!("function {} needs a real argument", ftype.name()),
        ));
    }
    Ok(())
}

fn check_disjoint(crange: &IndexRange, trange: &IndexRange) -> QsimResult<()> {
    if crange.is_empty() || trange.is_empty() {
        return Ok(());
    }
    if crange.start <= trange.stop && trange.start <= crange.stop {
        return Err(QsimError::validation(
            KIND_CORE,
            format!("overlapping control and target ranges {} {}", crange, trange),
        ));
    }
    Ok(())
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum CoreInstruction {
    Allocate {
        qubits: i32,
    },
    Release {
        handle: u32,
    },
    Reset {
        handle: u32,
    },
    Set {
        handle: u32,
        setup: StateSetup,
    },
    Peek {
        handle: u32,
    },
    // qlen -1 measures the whole register from qidx
    Measure {
        handle: u32,
        qidx: i32,
        qlen: i32,
        randomize: bool,
        collapse: bool,
    },
    // st_idx -1 sums over every sub-state
    Expect {
        handle: u32,
        st_idx: i64,
        qidx: i32,
        qlen: i32,
        observable: Observable,
    },
    Transform {
        handle: u32,
        transform: Transform,
    },
}

impl CoreInstruction {
    pub fn from_message(msg: &QasmMessage) -> QsimResult<Self> {
        let instr = Self::decode(msg).map_err(|e| as_invalid(KIND_CORE, e))?;
        instr.validate()?;
        Ok(instr)
    }

    fn decode(msg: &QasmMessage) -> QsimResult<Self> {
        let instr = match msg.id {
            MessageId::Allocate => CoreInstruction::Allocate {
                qubits: msg.param_as(TAG_QREG_QN)?,
            },
            MessageId::Release => CoreInstruction::Release {
                handle: msg.param_as(TAG_QREG_H)?,
            },
            MessageId::Reset => CoreInstruction::Reset {
                handle: msg.param_as(TAG_QREG_H)?,
            },
            MessageId::Peek => CoreInstruction::Peek {
                handle: msg.param_as(TAG_QREG_H)?,
            },
            MessageId::Set => {
                let handle = msg.param_as(TAG_QREG_H)?;
                let setup = match msg.param(TAG_QREG_ST_VALS) {
                    Some(vals) => StateSetup::Amplitudes(parse_state_array(vals)?),
                    None => StateSetup::Pure(msg.param_or(TAG_QREG_ST_IDX, 0usize)?),
                };
                CoreInstruction::Set { handle, setup }
            }
            MessageId::Measure => CoreInstruction::Measure {
                handle: msg.param_as(TAG_QREG_H)?,
                qidx: msg.param_or(TAG_MEAS_QIDX, 0)?,
                qlen: msg.param_or(TAG_MEAS_QLEN, -1)?,
                randomize: msg.param_bool_or(TAG_MEAS_RAND, true),
                collapse: msg.param_bool_or(TAG_MEAS_COLLAPSE, true),
            },
            MessageId::Expect => {
                let code: i32 = msg.param_or(TAG_EXP_OBS_OP, Observable::Computational.code())?;
                let observable = Observable::from_code(code)
                    .ok_or_else(|| QsimError::validation(KIND_CORE, format!("unknown observable [{}]", code)))?;
                CoreInstruction::Expect {
                    handle: msg.param_as(TAG_QREG_H)?,
                    st_idx: msg.param_or(TAG_EXP_ST_IDX, -1)?,
                    qidx: msg.param_or(TAG_EXP_QIDX, 0)?,
                    qlen: msg.param_or(TAG_EXP_QLEN, -1)?,
                    observable,
                }
            }
            MessageId::Transform => CoreInstruction::Transform {
                handle: msg.param_as(TAG_QREG_H)?,
                transform: decode_transform(msg)?,
            },
            other => {
                return Err(QsimError::Syntax(format!(
                    "unhandled core message id [{}]",
                    other.code()
                )))
            }
        };
        Ok(instr)
    }

    pub fn handle(&self) -> Option<u32> {
        match self {
            CoreInstruction::Allocate { .. } => None,
            CoreInstruction::Release { handle }
            | CoreInstruction::Reset { handle }
            | CoreInstruction::Set { handle, .. }
            | CoreInstruction::Peek { handle }
            | CoreInstruction::Measure { handle, .. }
            | CoreInstruction::Expect { handle, .. }
            | CoreInstruction::Transform { handle, .. } => Some(*handle),
        }
    }

    pub fn validate(&self) -> QsimResult<()> {
        match self {
            CoreInstruction::Allocate { qubits } if *qubits < 1 => Err(QsimError::validation(
                KIND_CORE,
                format!("illegal qubit count [{}]", qubits),
            )),
            CoreInstruction::Set {
                setup: StateSetup::Amplitudes(amps),
                ..
            } if amps.is_empty() => Err(QsimError::validation(KIND_CORE, "empty state array")),
            CoreInstruction::Transform { transform, .. } => transform.validate(),
            _ => Ok(()),
        }
    }
}

fn decode_transform(msg: &QasmMessage) -> QsimResult<Transform> {
    let code: i32 = msg.param_as(TAG_F_TYPE)?;
    let ftype = FunctionType::from_code(code)
        .ok_or_else(|| QsimError::Syntax(format!("unhandled function type [{}]", code)))?;
    let utype = match msg.param(TAG_F_UTYPE) {
        Some(_) => {
            let ucode: i32 = msg.param_as(TAG_F_UTYPE)?;
            let u = FunctionType::from_code(ucode).ok_or_else(|| {
                QsimError::validation(KIND_CORE, format!("illegal target function type [{}]", ucode))
            })?;
            Some(u)
        }
        None => None,
    };

    let mut transform = Transform {
        ftype,
        fsize: msg.param_as(TAG_F_SIZE)?,
        frep: msg.param_as(TAG_F_REP)?,
        flsq: msg.param_as(TAG_F_LSQ)?,
        crange: msg.param_range(TAG_F_CRANGE)?,
        trange: msg.param_range(TAG_F_TRANGE)?,
        args: Vec::new(),
        utype,
        ucrange: IndexRange::EMPTY,
        utrange: IndexRange::EMPTY,
        uargs: Vec::new(),
    };

    if !msg.has_param(TAG_F_ARGS) {
        return Ok(transform);
    }
    let args = msg.param_args(TAG_F_ARGS)?;
    match ftype.class() {
        // 1-qubit: as passed
        FunctionClass::Q1 => transform.args = args,
        // controlled-U: arguments of the target function, others take none
        FunctionClass::Q2 => {
            if ftype == FunctionType::CU {
                transform.uargs = args;
            }
        }
        FunctionClass::Qn => match utype.and_then(FunctionType::inner_width) {
            Some(1) => transform.uargs = args,
            Some(_) => {
                // [<inner crange>|R, <inner trange>|R, <optional arg>]
                transform.ucrange = args
                    .first()
                    .and_then(FunctionArg::as_range)
                    .ok_or_else(|| QsimError::Syntax("missing inner control range".to_string()))?;
                transform.utrange = args
                    .get(1)
                    .and_then(FunctionArg::as_range)
                    .ok_or_else(|| QsimError::Syntax("missing inner target range".to_string()))?;
                transform.uargs = args.iter().skip(2).copied().collect();
                transform.args = args;
            }
            None => transform.args = args,
        },
        _ => {}
    }
    Ok(transform)
}
