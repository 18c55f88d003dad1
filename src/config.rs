use crate::error::{QsimError, QsimResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

// collapsed index lists are only returned below this many free qubits
pub const MEASURE_MAX_INDEX_VEC_SIZE: usize = 10;
// peek refuses registers above this size
pub const PEEK_MAX_QUBITS: usize = 10;
pub const DEFAULT_MAX_QUBITS: usize = 24;
// QML blocks repeating more often than this are refused before unwinding
pub const MAX_BLOCK_REPETITIONS: usize = 256;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub measure_max_index_vec_size: usize,
    pub peek_max_qubits: usize,
    pub max_qubits: usize,
    pub max_block_repetitions: usize,
    // fixed seed makes random measurement reproducible
    pub rng_seed: Option<u64>,
    // instruction messages must carry a registered client token
    pub require_token: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            measure_max_index_vec_size: MEASURE_MAX_INDEX_VEC_SIZE,
            peek_max_qubits: PEEK_MAX_QUBITS,
            max_qubits: DEFAULT_MAX_QUBITS,
            max_block_repetitions: MAX_BLOCK_REPETITIONS,
            rng_seed: None,
            require_token: true,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(text: &str) -> QsimResult<Self> {
        let config: EngineConfig =
            serde_json::from_str(text).map_err(|e| QsimError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> QsimResult<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| QsimError::Config(format!("cannot read {}, {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> QsimResult<()> {
        if self.max_qubits == 0 || self.max_qubits > 40 {
            return Err(QsimError::Config(format!(
                "max_qubits must be within [1, 40], got {}",
                self.max_qubits
            )));
        }
        if self.max_block_repetitions == 0 {
            return Err(QsimError::Config("max_block_repetitions must be at least 1".to_string()));
        }
        Ok(())
    }
}
