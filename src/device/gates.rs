// closed-form matrix elements f(i, j) of every supported gate. rows and
// columns are local sub-register indices, LSQ = bit 0

use crate::error::{QsimError, QsimResult};
use crate::instructions::Transform;
use crate::qasm::{FunctionClass, FunctionType, Form};
use num_complex::Complex64;
use std::f64::consts::{FRAC_1_SQRT_2, FRAC_PI_2, FRAC_PI_4};

const ZERO: Complex64 = Complex64::new(0.0, 0.0);
const ONE: Complex64 = Complex64::new(1.0, 0.0);

#[inline]
fn sign(k: usize) -> f64 {
    if k % 2 == 0 {
        1.0
    } else {
        -1.0
    }
}

#[inline]
fn identity(i: usize, j: usize) -> Complex64 {
    if i == j {
        ONE
    } else {
        ZERO
    }
}

// diag(1, e^{i phi})
#[inline]
fn phase_shift(phi: f64, i: usize, j: usize) -> Complex64 {
    match (i, j) {
        (0, 0) => ONE,
        (1, 1) => Complex64::from_polar(1.0, phi),
        _ => ZERO,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gate1q {
    pub ftype: FunctionType,
    pub arg: f64,
}

impl Gate1q {
    pub fn new(ftype: FunctionType, arg: f64) -> Self {
        Gate1q { ftype, arg }
    }

    pub fn element(&self, i: usize, j: usize) -> Complex64 {
        use FunctionType::*;
        let phi = self.arg;
        match self.ftype {
            H => Complex64::new(if j < 1 { 1.0 } else { sign(i) } * FRAC_1_SQRT_2, 0.0),
            X => {
                if i != j {
                    ONE
                } else {
                    ZERO
                }
            }
            Y => {
                if i != j {
                    Complex64::new(0.0, sign(i + 1))
                } else {
                    ZERO
                }
            }
            Z => {
                if i == j {
                    Complex64::new(sign(i), 0.0)
                } else {
                    ZERO
                }
            }
            SX => {
                if i == j {
                    Complex64::new(0.5, 0.5)
                } else {
                    Complex64::new(0.5, -0.5)
                }
            }
            PS => phase_shift(phi, i, j),
            S => phase_shift(FRAC_PI_2, i, j),
            T => phase_shift(FRAC_PI_4, i, j),
            Rx => {
                if i == j {
                    Complex64::new((phi / 2.0).cos(), 0.0)
                } else {
                    Complex64::new(0.0, -(phi / 2.0).sin())
                }
            }
            Ry => {
                if i == j {
                    Complex64::new((phi / 2.0).cos(), 0.0)
                } else {
                    Complex64::new(sign(i + 1) * (phi / 2.0).sin(), 0.0)
                }
            }
            Rz => {
                if i == j {
                    Complex64::from_polar(1.0, sign(i + 1) * phi / 2.0)
                } else {
                    ZERO
                }
            }
            // identity, also the filler for any width
            _ => identity(i, j),
        }
    }
}

// controlled-U on two qubits
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gate2q {
    pub u: Gate1q,
    pub form: Form,
}

impl Gate2q {
    // CX/CY/CZ are controlled-U with a fixed target function
    pub fn new(ftype: FunctionType, u: Option<Gate1q>, form: Form) -> QsimResult<Self> {
        let u = match ftype {
            FunctionType::CX => Gate1q::new(FunctionType::X, 0.0),
            FunctionType::CY => Gate1q::new(FunctionType::Y, 0.0),
            FunctionType::CZ => Gate1q::new(FunctionType::Z, 0.0),
            FunctionType::CU => u.ok_or_else(|| QsimError::execution("controlled-U without target function"))?,
            other => {
                return Err(QsimError::execution(format!(
                    "function type [{}] is not a 2-qubit gate",
                    other.code()
                )))
            }
        };
        Ok(Gate2q { u, form })
    }

    pub fn element(&self, i: usize, j: usize) -> Complex64 {
        match self.form {
            // target bit 0, control bit 1
            Form::Direct | Form::Null => {
                if i > 1 && j > 1 {
                    self.u.element(i % 2, j % 2)
                } else if i == j && i < 2 {
                    ONE
                } else {
                    ZERO
                }
            }
            // control bit 0, target bit 1
            Form::Inverse => {
                if i % 2 == 1 && j % 2 == 1 {
                    self.u.element(i / 2, j / 2)
                } else if i == j && i % 2 == 0 {
                    ONE
                } else {
                    ZERO
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TargetGate {
    One(Gate1q),
    Two(Gate2q),
}

impl TargetGate {
    pub fn width(&self) -> u32 {
        match self {
            TargetGate::One(_) => 1,
            TargetGate::Two(_) => 2,
        }
    }

    pub fn element(&self, i: usize, j: usize) -> Complex64 {
        match self {
            TargetGate::One(g) => g.element(i, j),
            TargetGate::Two(g) => g.element(i, j),
        }
    }
}

// multi-controlled short/long range U. bit layout from MSQ to LSQ:
// direct  = control | gap | target
// inverse = target | gap | control
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlledGate {
    pub ctrln: u32,
    pub gapn: u32,
    pub form: Form,
    pub target: TargetGate,
}

impl ControlledGate {
    pub fn width(&self) -> u32 {
        self.ctrln + self.gapn + self.target.width()
    }

    #[inline]
    fn split(&self, v: usize) -> (usize, usize, usize) {
        let fun = self.target.width();
        let field = |v: usize, shift: u32, len: u32| (v >> shift) & ((1usize << len) - 1);
        match self.form {
            Form::Inverse => (
                field(v, 0, self.ctrln),
                field(v, self.ctrln, self.gapn),
                field(v, self.ctrln + self.gapn, fun),
            ),
            _ => (
                field(v, fun + self.gapn, self.ctrln),
                field(v, fun, self.gapn),
                field(v, 0, fun),
            ),
        }
    }

    pub fn element(&self, i: usize, j: usize) -> Complex64 {
        let (ctrl_i, gap_i, tgt_i) = self.split(i);
        let (ctrl_j, gap_j, tgt_j) = self.split(j);
        // type-0: control or gap qubits would change
        if ctrl_i != ctrl_j || gap_i != gap_j {
            return ZERO;
        }
        let all_set = (1usize << self.ctrln) - 1;
        if ctrl_i == all_set {
            // type-U
            self.target.element(tgt_i, tgt_j)
        } else {
            // type-1
            identity(tgt_i, tgt_j)
        }
    }
}

// evaluator for one application of a transform function
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateKernel {
    One(Gate1q),
    Two(Gate2q),
    Controlled(ControlledGate),
}

// gate arguments reduce to the real value of the last one
fn last_arg(args: &[crate::qasm::function_arg::FunctionArg]) -> f64 {
    args.last().and_then(|a| a.as_f64()).unwrap_or(0.0)
}

impl GateKernel {
    pub fn from_transform(t: &Transform) -> QsimResult<Self> {
        match t.ftype.class() {
            FunctionClass::Q1 => Ok(GateKernel::One(Gate1q::new(t.ftype, last_arg(&t.args)))),
            FunctionClass::Q2 => {
                let u = t.utype.map(|u| Gate1q::new(u, last_arg(&t.uargs)));
                Ok(GateKernel::Two(Gate2q::new(t.ftype, u, t.form())?))
            }
            FunctionClass::Qn => {
                let fn_ = t.width();
                let gapn = t.gap().max(0) as u32;
                let target = match (t.ftype, t.utype) {
                    (FunctionType::CCX, _) => TargetGate::One(Gate1q::new(FunctionType::X, 0.0)),
                    (_, Some(u)) if u.class() == FunctionClass::Q1 => {
                        TargetGate::One(Gate1q::new(u, last_arg(&t.uargs)))
                    }
                    (_, Some(u)) => TargetGate::Two(Gate2q::new(
                        u,
                        None,
                        t.inner_form(),
                    )?),
                    (_, None) => return Err(QsimError::execution("n-qubit function without target function")),
                };
                let used = gapn + target.width();
                if fn_ <= used {
                    return Err(QsimError::execution(format!(
                        "n-qubit function size [{}] leaves no control qubits",
                        t.fsize
                    )));
                }
                Ok(GateKernel::Controlled(ControlledGate {
                    ctrln: fn_ - used,
                    gapn,
                    form: t.form(),
                    target,
                }))
            }
            _ => Err(QsimError::execution(format!(
                "unhandled function transformation type [{}]",
                t.ftype.code()
            ))),
        }
    }

    // qubits covered by one application
    pub fn width(&self) -> u32 {
        match self {
            GateKernel::One(_) => 1,
            GateKernel::Two(_) => 2,
            GateKernel::Controlled(g) => g.width(),
        }
    }

    pub fn size(&self) -> usize {
        1usize << self.width()
    }

    #[inline]
    pub fn element(&self, i: usize, j: usize) -> Complex64 {
        match self {
            GateKernel::One(g) => g.element(i, j),
            GateKernel::Two(g) => g.element(i, j),
            GateKernel::Controlled(g) => g.element(i, j),
        }
    }
}
