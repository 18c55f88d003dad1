/*
    QASM WIRE VOCABULARY: MESSAGE IDS, PARAMETER TAGS AND FUNCTION CODES
*/

pub mod function_arg; // function arguments and index ranges
pub mod message; // message codec

use serde::{Deserialize, Serialize};

// separators
pub const FIELD_SEP: char = '|';
pub const PARAM_SEP: char = ':';
pub const PARVAL_SEP: char = '=';
// a value character following this one is literal
pub const VAL_ESCAPE: char = '\\';

// response values
pub const VAL_OK: &str = "Ok";
pub const VAL_NOK: &str = "Not-Ok";

// client tags
pub const TAG_CLIENT_ID: &str = "id";
pub const TAG_CLIENT_TOKEN: &str = "token";

// register tags
pub const TAG_QREG_QN: &str = "qr_n";
pub const TAG_QREG_H: &str = "qr_h";
pub const TAG_QREG_ST_IDX: &str = "qr_stIdx";
pub const TAG_QREG_ST_VALS: &str = "qr_stVals";

// measurement tags
pub const TAG_MEAS_QIDX: &str = "qr_mQidx";
pub const TAG_MEAS_QLEN: &str = "qr_mQlen";
pub const TAG_MEAS_RAND: &str = "qr_mRand";
pub const TAG_MEAS_COLLAPSE: &str = "qr_mStColl";
pub const TAG_MEAS_ST_IDX: &str = "qr_mStIdx";
pub const TAG_MEAS_ST_PROB: &str = "qr_mStPr";
pub const TAG_MEAS_ST_IDXS: &str = "qr_mStIdxs";

// expectation tags
pub const TAG_EXP_ST_IDX: &str = "qr_exStIdx";
pub const TAG_EXP_QIDX: &str = "qr_exQidx";
pub const TAG_EXP_QLEN: &str = "qr_exQlen";
pub const TAG_EXP_OBS_OP: &str = "qr_exObsOp";
pub const TAG_EXP_ST_VAL: &str = "qr_exStVal";

// transformation function tags
pub const TAG_F_TYPE: &str = "f_type";
pub const TAG_F_SIZE: &str = "f_size";
pub const TAG_F_REP: &str = "f_rep";
pub const TAG_F_LSQ: &str = "f_lsq";
pub const TAG_F_CRANGE: &str = "f_cRange";
pub const TAG_F_TRANGE: &str = "f_tRange";
pub const TAG_F_UTYPE: &str = "f_uType";
pub const TAG_F_ARGS: &str = "f_args";

// qml block tags
pub const TAG_FQML_REP: &str = "fqml_rep";
pub const TAG_FQML_ENTANG: &str = "fqml_entang_type";
pub const TAG_FQML_SUBTYPE: &str = "fqml_subtype";
pub const TAG_FQML_QNET_TYPE: &str = "fqml_qnet_type";

// response tags
pub const TAG_RESULT: &str = "result";
pub const TAG_ERROR: &str = "error";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageId {
    Nope,
    Register,
    Unregister,
    Allocate,
    Release,
    Reset,
    Set,
    Transform,
    Peek,
    Measure,
    Expect,
    Response,
}

impl MessageId {
    pub fn code(self) -> i32 {
        match self {
            MessageId::Nope => 0,
            MessageId::Register => 1,
            MessageId::Unregister => 2,
            MessageId::Allocate => 10,
            MessageId::Release => 11,
            MessageId::Reset => 12,
            MessageId::Set => 13,
            MessageId::Transform => 14,
            MessageId::Peek => 15,
            MessageId::Measure => 16,
            MessageId::Expect => 17,
            MessageId::Response => 20,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        let id = match code {
            0 => MessageId::Nope,
            1 => MessageId::Register,
            2 => MessageId::Unregister,
            10 => MessageId::Allocate,
            11 => MessageId::Release,
            12 => MessageId::Reset,
            13 => MessageId::Set,
            14 => MessageId::Transform,
            15 => MessageId::Peek,
            16 => MessageId::Measure,
            17 => MessageId::Expect,
            20 => MessageId::Response,
            _ => return None,
        };
        Some(id)
    }

    // client (un)registration
    pub fn is_control(self) -> bool {
        matches!(self, MessageId::Register | MessageId::Unregister)
    }

    // register instructions, allocate..expectation
    pub fn is_instruction(self) -> bool {
        (10..=17).contains(&self.code())
    }

    pub fn mandatory_tags(self) -> &'static [&'static str] {
        match self {
            MessageId::Register => &[TAG_CLIENT_ID],
            MessageId::Unregister => &[TAG_CLIENT_TOKEN],
            MessageId::Allocate => &[TAG_QREG_QN],
            MessageId::Release
            | MessageId::Reset
            | MessageId::Set
            | MessageId::Peek
            | MessageId::Expect => &[TAG_QREG_H],
            MessageId::Measure => &[TAG_QREG_H, TAG_MEAS_QIDX, TAG_MEAS_QLEN],
            MessageId::Transform => &[TAG_QREG_H, TAG_F_TYPE],
            MessageId::Nope | MessageId::Response => &[],
        }
    }
}

// gate class of a transformation function
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum FunctionClass {
    Q1,
    Q2,
    Qn,
    Block,
    Qml,
}

#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionType {
    // 1-qubit
    I,
    H,
    X,
    Y,
    Z,
    SX,
    PS,
    T,
    S,
    Rx,
    Ry,
    Rz,
    // 2-qubit
    CU,
    CX,
    CY,
    CZ,
    // n-qubit, multi-controlled short/long range U
    MCSLRU,
    CCX,
    // blocks
    SwapQ1,
    SwapQn,
    CswapQ1,
    CswapQn,
    // qml blocks
    FeatureMap,
    QNet,
}

impl FunctionType {
    pub fn code(self) -> i32 {
        use FunctionType::*;
        match self {
            I => 0,
            H => 1,
            X => 2,
            Y => 3,
            Z => 4,
            SX => 5,
            PS => 6,
            T => 7,
            S => 8,
            Rx => 9,
            Ry => 10,
            Rz => 11,
            CU => 12,
            CX => 13,
            CY => 14,
            CZ => 15,
            MCSLRU => 16,
            CCX => 17,
            SwapQ1 => 100,
            SwapQn => 101,
            CswapQ1 => 102,
            CswapQn => 103,
            FeatureMap => 200,
            QNet => 201,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        use FunctionType::*;
        let ftype = match code {
            0 => I,
            1 => H,
            2 => X,
            3 => Y,
            4 => Z,
            5 => SX,
            6 => PS,
            7 => T,
            8 => S,
            9 => Rx,
            10 => Ry,
            11 => Rz,
            12 => CU,
            13 => CX,
            14 => CY,
            15 => CZ,
            16 => MCSLRU,
            17 => CCX,
            100 => SwapQ1,
            101 => SwapQn,
            102 => CswapQ1,
            103 => CswapQn,
            200 => FeatureMap,
            201 => QNet,
            _ => return None,
        };
        Some(ftype)
    }

    pub fn class(self) -> FunctionClass {
        match self.code() {
            0..=11 => FunctionClass::Q1,
            12..=15 => FunctionClass::Q2,
            16..=17 => FunctionClass::Qn,
            100..=103 => FunctionClass::Block,
            _ => FunctionClass::Qml,
        }
    }

    // qubit width of a primitive gate usable as inner gate of an n-qubit function
    pub fn inner_width(self) -> Option<u32> {
        match self.class() {
            FunctionClass::Q1 => Some(1),
            FunctionClass::Q2 => Some(2),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        use FunctionType::*;
        match self {
            I => "I",
            H => "H",
            X => "X",
            Y => "Y",
            Z => "Z",
            SX => "SX",
            PS => "PS",
            T => "T",
            S => "S",
            Rx => "Rx",
            Ry => "Ry",
            Rz => "Rz",
            CU => "CU",
            CX => "CX",
            CY => "CY",
            CZ => "CZ",
            MCSLRU => "MCSLRU",
            CCX => "CCX",
            SwapQ1 => "SWAP_Q1",
            SwapQn => "SWAP_QN",
            CswapQ1 => "CSWAP_Q1",
            CswapQn => "CSWAP_QN",
            FeatureMap => "FMAP",
            QNet => "QNET",
        }
    }
}

// bit layout of a controlled function
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Form {
    Null,
    // control above target
    Direct,
    // target above control
    Inverse,
}

impl Form {
    pub fn code(self) -> i32 {
        match self {
            Form::Null => -1,
            Form::Direct => 0,
            Form::Inverse => 1,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Observable {
    Computational,
    PauliZ,
}

impl Observable {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Observable::Computational),
            1 => Some(Observable::PauliZ),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Observable::Computational => 0,
            Observable::PauliZ => 1,
        }
    }

    // eigenvalues of the single qubit operator for |0> and |1>
    pub fn eigenvalues(self) -> [f64; 2] {
        match self {
            Observable::Computational => [1.0, 1.0],
            Observable::PauliZ => [1.0, -1.0],
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Entanglement {
    Linear,
    Circular,
}

impl Entanglement {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Entanglement::Linear),
            1 => Some(Entanglement::Circular),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Entanglement::Linear => 0,
            Entanglement::Circular => 1,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum FeatureMapType {
    PauliZ,
    PauliZZ,
}

impl FeatureMapType {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(FeatureMapType::PauliZ),
            1 => Some(FeatureMapType::PauliZZ),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            FeatureMapType::PauliZ => 0,
            FeatureMapType::PauliZZ => 1,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum QNetLayout {
    RealAmplitude,
}

impl QNetLayout {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(QNetLayout::RealAmplitude),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            QNetLayout::RealAmplitude => 0,
        }
    }
}
