use thiserror::Error;

// error taxonomy for the whole pipeline. the display text of each variant is
// what ends up in the `error` tag of a not-ok response.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum QsimError {
    // malformed wire text or missing mandatory tags
    #[error("message syntax wrong, {0}")]
    Syntax(String),

    // a decoded instruction failed its semantic checks
    #[error("{kind} transformation syntax error, {reason}")]
    Validation { kind: &'static str, reason: String },

    #[error("wrong qreg handle provided [{0}]")]
    UnknownHandle(u32),

    // span/size failures raised while executing against a register
    #[error("{0}")]
    Execution(String),

    #[error("unrecognised token")]
    Token,

    #[error("configuration error, {0}")]
    Config(String),
}

impl QsimError {
    pub fn validation(kind: &'static str, reason: impl Into<String>) -> Self {
        QsimError::Validation {
            kind,
            reason: reason.into(),
        }
    }

    pub fn execution(reason: impl Into<String>) -> Self {
        QsimError::Execution(reason.into())
    }
}

pub type QsimResult<T> = Result<T, QsimError>;
