use crate::error::{QsimError, QsimResult};
use crate::qasm::Form;
use itertools::Itertools;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::fmt;

// null marker held by both fields of the empty range
pub const NULL_INDEX: i32 = -1;

const ARG_TYPE_SEP: char = '|';
const ARG_CODE_INT: &str = "I";
const ARG_CODE_REAL: &str = "D";
const ARG_CODE_RANGE: &str = "R";

// inclusive qubit span, or the empty sentinel
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct IndexRange {
    pub start: i32,
    pub stop: i32,
}

impl Default for IndexRange {
    fn default() -> Self {
        IndexRange::EMPTY
    }
}

impl IndexRange {
    pub const EMPTY: IndexRange = IndexRange {
        start: NULL_INDEX,
        stop: NULL_INDEX,
    };

    pub fn new(start: i32, stop: i32) -> Self {
        IndexRange { start, stop }
    }

    pub fn single(q: i32) -> Self {
        IndexRange { start: q, stop: q }
    }

    pub fn is_empty(&self) -> bool {
        self.start == NULL_INDEX && self.stop == NULL_INDEX
    }

    // either both fields null or both valid and ordered
    pub fn is_consistent(&self) -> bool {
        if self.is_empty() {
            return true;
        }
        self.start >= 0 && self.stop >= self.start
    }

    // qubits covered, zero for the empty range
    pub fn span(&self) -> i32 {
        if self.is_empty() {
            0
        } else {
            self.stop - self.start + 1
        }
    }

    pub fn parse(text: &str) -> QsimResult<Self> {
        let t = text.trim();
        if !t.starts_with('(') || !t.ends_with(')') {
            return Err(QsimError::Syntax(format!("wrong index range format [{}]", text)));
        }
        let inner = &t[1..t.len() - 1];
        if inner.trim().is_empty() {
            return Ok(IndexRange::EMPTY);
        }
        let (start, stop) = inner
            .split_once(',')
            .ok_or_else(|| QsimError::Syntax(format!("wrong index range format [{}]", text)))?;
        let start = parse_i32(start)?;
        let stop = parse_i32(stop)?;
        let range = IndexRange { start, stop };
        if (start == NULL_INDEX) != (stop == NULL_INDEX) {
            return Err(QsimError::Syntax(format!("inconsistent index range [{}]", text)));
        }
        Ok(range)
    }
}

impl fmt::Display for IndexRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.start, self.stop)
    }
}

// control above target is direct form, anything else inverse
pub fn ctrange_to_form(crange: &IndexRange, trange: &IndexRange) -> Form {
    if crange.is_empty() || trange.is_empty() {
        return Form::Null;
    }
    if crange.start > trange.stop {
        Form::Direct
    } else {
        Form::Inverse
    }
}

// qubits strictly between control and target ranges
pub fn ctrange_gap(crange: &IndexRange, trange: &IndexRange) -> i32 {
    match ctrange_to_form(crange, trange) {
        Form::Direct => crange.start - trange.stop - 1,
        Form::Inverse => trange.start - crange.stop - 1,
        Form::Null => 0,
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub enum FunctionArg {
    Int(i64),
    Real(f64),
    Range(IndexRange),
}

impl FunctionArg {
    pub fn parse(text: &str) -> QsimResult<Self> {
        let t = text.trim();
        let (value, code) = t
            .rsplit_once(ARG_TYPE_SEP)
            .ok_or_else(|| QsimError::Syntax(format!("missing function arg type [{}]", text)))?;
        match code.trim() {
            ARG_CODE_INT => value
                .trim()
                .parse::<i64>()
                .map(FunctionArg::Int)
                .map_err(|e| QsimError::Syntax(format!("wrong integer arg [{}], {}", value, e))),
            ARG_CODE_REAL => value
                .trim()
                .parse::<f64>()
                .map(FunctionArg::Real)
                .map_err(|e| QsimError::Syntax(format!("wrong real arg [{}], {}", value, e))),
            ARG_CODE_RANGE => IndexRange::parse(value).map(FunctionArg::Range),
            other => Err(QsimError::Syntax(format!("unknown function arg type [{}]", other))),
        }
    }

    // real view used by the gate formulas, integers widen
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FunctionArg::Int(v) => Some(*v as f64),
            FunctionArg::Real(v) => Some(*v),
            FunctionArg::Range(_) => None,
        }
    }

    pub fn as_range(&self) -> Option<IndexRange> {
        match self {
            FunctionArg::Range(r) => Some(*r),
            _ => None,
        }
    }
}

impl fmt::Display for FunctionArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionArg::Int(v) => write!(f, "{}{}{}", v, ARG_TYPE_SEP, ARG_CODE_INT),
            FunctionArg::Real(v) => write!(f, "{:?}{}{}", v, ARG_TYPE_SEP, ARG_CODE_REAL),
            FunctionArg::Range(r) => write!(f, "{}{}{}", r, ARG_TYPE_SEP, ARG_CODE_RANGE),
        }
    }
}

// splits on commas outside parentheses, ranges carry their own comma
fn split_top_level(text: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut depth = 0i32;
    let mut begin = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                items.push(&text[begin..i]);
                begin = i + 1;
            }
            _ => {}
        }
    }
    items.push(&text[begin..]);
    items
}

pub fn parse_args(text: &str) -> QsimResult<Vec<FunctionArg>> {
    let t = text.trim();
    if t.is_empty() || t == "null" {
        return Ok(Vec::new());
    }
    if !t.starts_with('[') || !t.ends_with(']') {
        return Err(QsimError::Syntax(format!("wrong function args format [{}]", text)));
    }
    let inner = &t[1..t.len() - 1];
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    split_top_level(inner)
        .into_iter()
        .map(FunctionArg::parse)
        .collect()
}

pub fn args_to_string(args: &[FunctionArg]) -> String {
    format!("[{}]", args.iter().join(","))
}

// "(re, im), (re, im), ..."
pub fn parse_state_array(text: &str) -> QsimResult<Vec<Complex64>> {
    let mut amps = Vec::new();
    let mut rest = text.trim();
    while !rest.is_empty() {
        let open = rest
            .find('(')
            .ok_or_else(|| QsimError::Syntax(format!("wrong state array format [{}]", rest)))?;
        let close = rest[open..]
            .find(')')
            .map(|c| c + open)
            .ok_or_else(|| QsimError::Syntax(format!("unterminated state value [{}]", rest)))?;
        let (re, im) = rest[open + 1..close]
            .split_once(',')
            .ok_or_else(|| QsimError::Syntax(format!("wrong state value [{}]", rest)))?;
        amps.push(Complex64::new(parse_f64(re)?, parse_f64(im)?));
        rest = rest[close + 1..].trim_start_matches(|c: char| c == ',' || c.is_whitespace());
    }
    Ok(amps)
}

pub fn state_array_to_string(amps: &[Complex64]) -> String {
    amps.iter()
        .map(|a| format!("({:?}, {:?})", a.re, a.im))
        .join(", ")
}

// "[i1, i2, ...]"
pub fn index_list_to_string(idxs: &[usize]) -> String {
    format!("[{}]", idxs.iter().join(", "))
}

pub fn parse_index_list(text: &str) -> QsimResult<Vec<usize>> {
    let t = text.trim();
    if !t.starts_with('[') || !t.ends_with(']') {
        return Err(QsimError::Syntax(format!("wrong index list format [{}]", text)));
    }
    let inner = t[1..t.len() - 1].trim();
    if inner.is_empty() {
        return Ok(Vec::new());
    }
    inner
        .split(',')
        .map(|s| {
            s.trim()
                .parse::<usize>()
                .map_err(|e| QsimError::Syntax(format!("wrong index [{}], {}", s, e)))
        })
        .collect()
}

fn parse_i32(text: &str) -> QsimResult<i32> {
    text.trim()
        .parse::<i32>()
        .map_err(|e| QsimError::Syntax(format!("wrong integer [{}], {}", text, e)))
}

fn parse_f64(text: &str) -> QsimResult<f64> {
    text.trim()
        .parse::<f64>()
        .map_err(|e| QsimError::Syntax(format!("wrong real [{}], {}", text, e)))
}
