use crate::error::{QsimError, QsimResult};
use crate::qasm::function_arg::{parse_args, FunctionArg, IndexRange};
use crate::qasm::{MessageId, FIELD_SEP, PARAM_SEP, PARVAL_SEP, TAG_ERROR, TAG_RESULT, VAL_ESCAPE, VAL_NOK, VAL_OK};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub type MessageParams = BTreeMap<String, String>;

// one decoded wire message: <counter>|<id>|<tag>=<val>:<tag>=<val>:...
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct QasmMessage {
    pub counter: i32,
    pub id: MessageId,
    pub params: MessageParams,
}

impl QasmMessage {
    pub fn new(counter: i32, id: MessageId) -> Self {
        QasmMessage {
            counter,
            id,
            params: MessageParams::new(),
        }
    }

    pub fn with_param(mut self, tag: &str, value: impl ToString) -> Self {
        self.add_param(tag, value);
        self
    }

    pub fn add_param(&mut self, tag: &str, value: impl ToString) {
        self.params.insert(tag.to_string(), value.to_string());
    }

    pub fn param(&self, tag: &str) -> Option<&str> {
        self.params.get(tag).map(String::as_str)
    }

    pub fn has_param(&self, tag: &str) -> bool {
        self.params.contains_key(tag)
    }

    // required typed value
    pub fn param_as<T: FromStr>(&self, tag: &str) -> QsimResult<T>
    where
        T::Err: fmt::Display,
    {
        let raw = self
            .param(tag)
            .ok_or_else(|| QsimError::Syntax(format!("missing parameter [{}]", tag)))?;
        raw.trim()
            .parse::<T>()
            .map_err(|e| QsimError::Syntax(format!("wrong parameter [{}] value [{}], {}", tag, raw, e)))
    }

    // optional typed value, absent tags fall back to the default
    pub fn param_or<T: FromStr>(&self, tag: &str, default: T) -> QsimResult<T>
    where
        T::Err: fmt::Display,
    {
        if self.has_param(tag) {
            self.param_as(tag)
        } else {
            Ok(default)
        }
    }

    // "1" is the only true value
    pub fn param_bool_or(&self, tag: &str, default: bool) -> bool {
        match self.param(tag) {
            Some(v) => v.trim() == "1",
            None => default,
        }
    }

    pub fn param_range(&self, tag: &str) -> QsimResult<IndexRange> {
        match self.param(tag) {
            Some(v) => IndexRange::parse(v),
            None => Ok(IndexRange::EMPTY),
        }
    }

    pub fn param_args(&self, tag: &str) -> QsimResult<Vec<FunctionArg>> {
        match self.param(tag) {
            Some(v) => parse_args(v),
            None => Ok(Vec::new()),
        }
    }

    pub fn is_control(&self) -> bool {
        self.id.is_control()
    }

    pub fn is_instruction(&self) -> bool {
        self.id.is_instruction()
    }

    // mandatory tag presence for the message id
    pub fn check_syntax(&self) -> QsimResult<()> {
        for tag in self.id.mandatory_tags() {
            if !self.has_param(tag) {
                warn!("message [{}] missing parameter [{}]", self.id.code(), tag);
                return Err(QsimError::Syntax(format!(
                    "message [{}] missing parameter [{}]",
                    self.id.code(),
                    tag
                )));
            }
        }
        Ok(())
    }

    pub fn encode(&self) -> String {
        let mut out = format!("{}{}{}{}", self.counter, FIELD_SEP, self.id.code(), FIELD_SEP);
        for (tag, value) in &self.params {
            out.push_str(tag);
            out.push(PARVAL_SEP);
            escape_value_into(value, &mut out);
            out.push(PARAM_SEP);
        }
        out
    }

    // fails when counter or id are missing; a malformed parameter stops the
    // parameter scan but keeps the pairs parsed so far
    pub fn decode(text: &str) -> QsimResult<Self> {
        let text = text.trim_end_matches(['\r', '\n', '\0']);
        let (counter, rest) = split_field(text)?;
        let (id, mut rest) = split_field(rest)?;

        let counter = counter
            .trim()
            .parse::<i32>()
            .map_err(|e| QsimError::Syntax(format!("wrong counter [{}], {}", counter, e)))?;
        let code = id
            .trim()
            .parse::<i32>()
            .map_err(|e| QsimError::Syntax(format!("wrong id [{}], {}", id, e)))?;
        let id = MessageId::from_code(code)
            .ok_or_else(|| QsimError::Syntax(format!("unhandled message id [{}]", code)))?;

        let mut msg = QasmMessage::new(counter, id);
        while !rest.is_empty() {
            let Some(end) = find_param_end(rest) else {
                warn!("wrong parameter format [{}]", rest);
                break;
            };
            let pair = &rest[..end];
            let Some((tag, value)) = pair.split_once(PARVAL_SEP) else {
                warn!("wrong parameter tag-value format [{}]", pair);
                break;
            };
            msg.params.insert(tag.to_string(), unescape_value(value));
            rest = &rest[end + 1..];
        }
        debug!("decoded message {}", msg);
        Ok(msg)
    }

    pub fn response(counter: i32) -> Self {
        QasmMessage::new(counter, MessageId::Response)
    }

    pub fn ok_response(counter: i32) -> Self {
        QasmMessage::response(counter).with_param(TAG_RESULT, VAL_OK)
    }

    pub fn error_response(counter: i32, err: &QsimError) -> Self {
        QasmMessage::response(counter)
            .with_param(TAG_RESULT, VAL_NOK)
            .with_param(TAG_ERROR, err)
    }

    pub fn is_ok(&self) -> bool {
        self.param(TAG_RESULT) == Some(VAL_OK)
    }
}

impl fmt::Display for QasmMessage {
    // long values are cut for log output
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} id={} [", self.counter, self.id.code())?;
        for (tag, value) in &self.params {
            if value.len() < 100 {
                write!(f, " {}={}", tag, value)?;
            } else {
                let head: String = value.chars().take(100).collect();
                write!(f, " {}={}...", tag, head)?;
            }
        }
        write!(f, " ]")
    }
}

// values may carry separators, the pair separator and the escape itself are
// prefixed with the escape
fn escape_value_into(value: &str, out: &mut String) {
    for c in value.chars() {
        if c == PARAM_SEP || c == VAL_ESCAPE {
            out.push(VAL_ESCAPE);
        }
        out.push(c);
    }
}

fn unescape_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == VAL_ESCAPE {
            // a dangling escape is kept as is
            out.push(chars.next().unwrap_or(VAL_ESCAPE));
        } else {
            out.push(c);
        }
    }
    out
}

// first pair separator that is not escaped
fn find_param_end(text: &str) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if escaped {
            escaped = false;
        } else if c == VAL_ESCAPE {
            escaped = true;
        } else if c == PARAM_SEP {
            return Some(i);
        }
    }
    None
}

// leading field up to the next separator, which must not be at index 0
fn split_field(text: &str) -> QsimResult<(&str, &str)> {
    match text.find(FIELD_SEP) {
        Some(idx) if idx >= 1 => Ok((&text[..idx], &text[idx + 1..])),
        _ => Err(QsimError::Syntax(format!("wrong message format [{}]", text))),
    }
}
