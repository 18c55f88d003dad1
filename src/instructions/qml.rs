use crate::error::{QsimError, QsimResult};
use crate::instructions::core_instr::Transform;
use crate::instructions::{as_invalid, KIND_QML};
use crate::qasm::function_arg::{FunctionArg, IndexRange};
use crate::qasm::message::QasmMessage;
use crate::qasm::*;
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum QmlSubtype {
    FeatureMap(FeatureMapType),
    QNet(QNetLayout),
}

// parameterized feature map / variational network block
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct QmlBlockInstruction {
    pub handle: u32,
    pub ftype: FunctionType,
    pub frep: i32,
    pub entanglement: Entanglement,
    pub subtype: QmlSubtype,
    pub args: Vec<FunctionArg>,
}

impl QmlBlockInstruction {
    pub fn from_message(msg: &QasmMessage) -> QsimResult<Self> {
        let block = Self::decode(msg).map_err(|e| as_invalid(KIND_QML, e))?;
        block.validate()?;
        Ok(block)
    }

    fn decode(msg: &QasmMessage) -> QsimResult<Self> {
        let invalid = |reason: String| QsimError::validation(KIND_QML, reason);

        let code: i32 = msg.param_as(TAG_F_TYPE)?;
        let ftype = FunctionType::from_code(code)
            .filter(|t| t.class() == FunctionClass::Qml)
            .ok_or_else(|| invalid(format!("illegal block type value [{}]", code)))?;

        let ent_code: i32 = msg.param_or(TAG_FQML_ENTANG, Entanglement::Linear.code())?;
        let entanglement = Entanglement::from_code(ent_code)
            .ok_or_else(|| invalid(format!("entanglement out of range [{}]", ent_code)))?;

        let subtype = match ftype {
            FunctionType::FeatureMap => {
                let sub: i32 = msg.param_as(TAG_FQML_SUBTYPE)?;
                let fmap = FeatureMapType::from_code(sub)
                    .ok_or_else(|| invalid(format!("feature map subtype out of range [{}]", sub)))?;
                QmlSubtype::FeatureMap(fmap)
            }
            _ => {
                let tag = if msg.has_param(TAG_FQML_SUBTYPE) {
                    TAG_FQML_SUBTYPE
                } else {
                    TAG_FQML_QNET_TYPE
                };
                let sub: i32 = msg.param_as(tag)?;
                let layout = QNetLayout::from_code(sub)
                    .ok_or_else(|| invalid(format!("q-network layout out of range [{}]", sub)))?;
                QmlSubtype::QNet(layout)
            }
        };

        Ok(QmlBlockInstruction {
            handle: msg.param_as(TAG_QREG_H)?,
            ftype,
            frep: msg.param_as(TAG_FQML_REP)?,
            entanglement,
            subtype,
            args: msg.param_args(TAG_F_ARGS)?,
        })
    }

    pub fn validate(&self) -> QsimResult<()> {
        let invalid = |reason: String| Err(QsimError::validation(KIND_QML, reason));

        if self.frep < 1 {
            return invalid(format!("illegal function repetitions value [{}]", self.frep));
        }
        let subtype_matches = matches!(
            (self.ftype, self.subtype),
            (FunctionType::FeatureMap, QmlSubtype::FeatureMap(_)) | (FunctionType::QNet, QmlSubtype::QNet(_))
        );
        if !subtype_matches {
            return invalid(format!("subtype {:?} does not fit block {}", self.subtype, self.ftype.name()));
        }
        if self.args.is_empty() {
            return invalid("missing block parameter vector".to_string());
        }
        if let Some(bad) = self.args.iter().find(|a| a.as_f64().is_none()) {
            return invalid(format!("non numeric block parameter [{}]", bad));
        }
        Ok(())
    }

    fn values(&self) -> Vec<f64> {
        self.args.iter().filter_map(FunctionArg::as_f64).collect()
    }

    // ordered core transforms for a register of `qubits` qubits, at most
    // `max_rep` repetitions
    pub fn unwind(&self, qubits: usize, max_rep: usize) -> QsimResult<Vec<Transform>> {
        self.validate()?;
        if self.frep as usize > max_rep {
            return Err(QsimError::execution(format!(
                "function repetitions [{}] exceed the block limit [{}]",
                self.frep, max_rep
            )));
        }
        let values = self.values();
        let out = match self.subtype {
            QmlSubtype::FeatureMap(fmap) => {
                if values.len() > qubits {
                    return Err(QsimError::execution(format!(
                        "feature vector size [{}] exceeds qureg size [{}]",
                        values.len(),
                        qubits
                    )));
                }
                feature_map(fmap, &values, self.frep, self.entanglement)
            }
            QmlSubtype::QNet(QNetLayout::RealAmplitude) => {
                let needed = qubits * (self.frep as usize + 1);
                if values.len() < needed {
                    return Err(QsimError::execution(format!(
                        "q-network needs [{}] parameters, got [{}]",
                        needed,
                        values.len()
                    )));
                }
                qnet_real_amplitude(qubits as i32, &values, self.frep, self.entanglement)
            }
        };
        debug!("QML block {} unwound into {} transforms", self.ftype.name(), out.len());
        Ok(out)
    }
}

fn phase(q: i32, x: f64) -> Transform {
    Transform::gate_1q(FunctionType::PS, 1, q, vec![FunctionArg::Real(2.0 * x)])
}

fn cx(c: i32, t: i32) -> Transform {
    Transform::gate_2q(FunctionType::CX, 1, c.min(t), IndexRange::single(c), IndexRange::single(t))
}

// multi-controlled X reaching from control c to target t, any distance
fn long_cx(c: i32, t: i32) -> Transform {
    let span = (c - t).abs() + 1;
    Transform::controlled_nq(
        1i64 << span,
        c.min(t),
        IndexRange::single(c),
        IndexRange::single(t),
        FunctionType::X,
        IndexRange::EMPTY,
        IndexRange::EMPTY,
        Vec::new(),
    )
}

// one qubit per feature: H on every qubit then PS(2x), pauli-zz adds
// CX-PS-CX triples along the entanglement topology
pub fn feature_map(fmap: FeatureMapType, x: &[f64], rep: i32, ent: Entanglement) -> Vec<Transform> {
    let n = x.len() as i32;
    let mut out = Vec::new();
    for _ in 0..rep {
        out.push(Transform::gate_1q(FunctionType::H, n, 0, Vec::new()));
        out.extend((0..n).map(|i| phase(i, x[i as usize])));
        if fmap == FeatureMapType::PauliZ {
            continue;
        }
        match ent {
            Entanglement::Linear => {
                for i in 1..n {
                    out.push(cx(i - 1, i));
                    out.push(phase(i, x[i as usize]));
                    out.push(cx(i - 1, i));
                }
            }
            Entanglement::Circular => {
                for i in 0..n {
                    // wrap-around pair spans the whole feature register
                    let ent_gate = if i == 0 {
                        (n > 2).then(|| long_cx(n - 1, 0))
                    } else {
                        Some(cx(i - 1, i))
                    };
                    out.extend(ent_gate.clone());
                    out.push(phase(i, x[i as usize]));
                    out.extend(ent_gate);
                }
            }
        }
    }
    out
}

// Ry layers with positional parameters, separated by unparameterized CX
// layers; the closing Ry layer has no entangling step after it
pub fn qnet_real_amplitude(n: i32, params: &[f64], rep: i32, ent: Entanglement) -> Vec<Transform> {
    let ry_layer = |b: i32| -> Vec<Transform> {
        (0..n)
            .map(|i| {
                let theta = params[(i + b * n) as usize];
                Transform::gate_1q(FunctionType::Ry, 1, i, vec![FunctionArg::Real(theta)])
            })
            .collect()
    };

    let mut out = Vec::new();
    for b in 0..rep {
        out.extend(ry_layer(b));
        match ent {
            Entanglement::Linear => out.extend((0..n - 1).map(|i| long_cx(i, i + 1))),
            Entanglement::Circular => {
                // n gates, the wrap pair on top of the n - 1 linear pairs
                if n > 1 {
                    out.push(long_cx(n - 1, 0));
                }
                out.extend((1..n).map(|i| long_cx(i - 1, i)));
            }
        }
        if b == rep - 1 {
            out.extend(ry_layer(b + 1));
        }
    }
    out
}
