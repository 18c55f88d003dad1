// instruction dispatcher: owns the register registry and the handle counter,
// routes decoded instructions and packs their results into responses

use crate::config::EngineConfig;
use crate::device::{CpuDevice, DeviceBackend};
use crate::error::{QsimError, QsimResult};
use crate::instructions::{
    parse_instruction, BlockInstruction, CoreInstruction, Instruction, QmlBlockInstruction, StateSetup, Transform,
};
use crate::qasm::function_arg::{index_list_to_string, state_array_to_string};
use crate::qasm::message::QasmMessage;
use crate::qasm::*;
use crate::runtime::QuantumRegister;
use log::{debug, error, info, warn};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

const FIRST_HANDLE: u32 = 1;

// result tags of a successful instruction, in response order
pub type ResultParams = Vec<(&'static str, String)>;

pub struct QCpu {
    config: EngineConfig,
    device: Arc<dyn DeviceBackend>,
    registers: BTreeMap<u32, QuantumRegister>,
    next_handle: u32,
}

impl QCpu {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_device(config, Arc::new(CpuDevice::new()))
    }

    pub fn with_device(config: EngineConfig, device: Arc<dyn DeviceBackend>) -> Self {
        info!("qcpu started on {:?} device, max {} qubits", device.kind(), config.max_qubits);
        QCpu {
            config,
            device,
            registers: BTreeMap::new(),
            next_handle: FIRST_HANDLE,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // drop every register, handles restart from 1
    pub fn reset(&mut self) {
        let dropped = self.registers.len();
        self.registers.clear();
        self.next_handle = FIRST_HANDLE;
        info!("qcpu reset, {} registers released", dropped);
    }

    pub fn register_count(&self) -> usize {
        self.registers.len()
    }

    pub fn qubit_count(&self, handle: u32) -> QsimResult<usize> {
        self.qureg(handle).map(QuantumRegister::qubits)
    }

    pub fn qureg(&self, handle: u32) -> QsimResult<&QuantumRegister> {
        self.registers.get(&handle).ok_or(QsimError::UnknownHandle(handle))
    }

    pub fn qureg_mut(&mut self, handle: u32) -> QsimResult<&mut QuantumRegister> {
        self.registers.get_mut(&handle).ok_or(QsimError::UnknownHandle(handle))
    }

    // one line per live register
    pub fn dump(&self) -> String {
        let mut out = format!("qcpu: {} registers, next handle {}\n", self.registers.len(), self.next_handle);
        for (h, reg) in &self.registers {
            let _ = writeln!(
                out,
                "  [{}] {} qubits, {} states, mirror {}, {}",
                h,
                reg.qubits(),
                reg.total_states(),
                reg.active_mirror(),
                if reg.is_in_sync() { "in sync" } else { "device ahead" }
            );
        }
        out
    }

    // full request -> response path; failures become not-ok responses
    pub fn execute(&mut self, msg: &QasmMessage) -> QasmMessage {
        let result = msg
            .check_syntax()
            .and_then(|_| parse_instruction(msg))
            .and_then(|instr| self.run(&instr));
        match result {
            Ok(params) => {
                let mut resp = QasmMessage::ok_response(msg.counter);
                for (tag, value) in params {
                    resp.add_param(tag, value);
                }
                resp
            }
            Err(e) => {
                warn!("instruction #{} failed: {}", msg.counter, e);
                QasmMessage::error_response(msg.counter, &e)
            }
        }
    }

    pub fn run(&mut self, instr: &Instruction) -> QsimResult<ResultParams> {
        match instr {
            Instruction::Core(core) => self.exec_core(core),
            Instruction::Block(block) => self.exec_block(block).map(|_| Vec::new()),
            Instruction::Qml(qml) => self.exec_qml(qml).map(|_| Vec::new()),
        }
    }

    pub fn allocate(&mut self, qubits: usize) -> QsimResult<u32> {
        if qubits == 0 || qubits > self.config.max_qubits {
            return Err(QsimError::execution(format!(
                "qureg size [{}] out of range [1, {}]",
                qubits, self.config.max_qubits
            )));
        }
        let handle = self.next_handle;
        let seed = self.config.rng_seed.map(|s| s.wrapping_add(handle as u64));
        let reg = QuantumRegister::new(qubits, Arc::clone(&self.device), seed).map_err(|e| {
            error!("allocation of {} qubits failed: {}", qubits, e);
            e
        })?;
        self.registers.insert(handle, reg);
        self.next_handle += 1;
        debug!("qureg [{}] allocated with {} qubits", handle, qubits);
        Ok(handle)
    }

    pub fn release(&mut self, handle: u32) -> QsimResult<()> {
        self.registers
            .remove(&handle)
            .map(|_| debug!("qureg [{}] released", handle))
            .ok_or(QsimError::UnknownHandle(handle))
    }

    fn exec_core(&mut self, instr: &CoreInstruction) -> QsimResult<ResultParams> {
        let max_index_vec_size = self.config.measure_max_index_vec_size;
        let peek_max_qubits = self.config.peek_max_qubits;
        match instr {
            CoreInstruction::Allocate { qubits } => {
                let handle = self.allocate(*qubits as usize)?;
                Ok(vec![(TAG_QREG_H, handle.to_string())])
            }
            CoreInstruction::Release { handle } => self.release(*handle).map(|_| Vec::new()),
            CoreInstruction::Reset { handle } => self.qureg_mut(*handle)?.reset().map(|_| Vec::new()),
            CoreInstruction::Set { handle, setup } => {
                let reg = self.qureg_mut(*handle)?;
                match setup {
                    StateSetup::Pure(st_idx) => reg.set_pure_state(*st_idx)?,
                    StateSetup::Amplitudes(amps) => reg.set_amplitudes(amps)?,
                }
                Ok(Vec::new())
            }
            CoreInstruction::Peek { handle } => {
                let reg = self.qureg_mut(*handle)?;
                if reg.qubits() > peek_max_qubits {
                    return Err(QsimError::execution(format!(
                        "peek refused for [{}] qubits, limit is [{}]",
                        reg.qubits(),
                        peek_max_qubits
                    )));
                }
                Ok(vec![(TAG_QREG_ST_VALS, state_array_to_string(reg.peek()))])
            }
            CoreInstruction::Measure {
                handle,
                qidx,
                qlen,
                randomize,
                collapse,
            } => {
                let outcome =
                    self.qureg_mut(*handle)?
                        .measure(*qidx, *qlen, *randomize, *collapse, max_index_vec_size)?;
                let mut params = vec![
                    (TAG_MEAS_ST_IDX, outcome.st_idx.to_string()),
                    (TAG_MEAS_ST_PROB, outcome.probability.to_string()),
                ];
                if let Some(idxs) = outcome.indices {
                    params.push((TAG_MEAS_ST_IDXS, index_list_to_string(&idxs)));
                }
                Ok(params)
            }
            CoreInstruction::Expect {
                handle,
                st_idx,
                qidx,
                qlen,
                observable,
            } => {
                let value = self
                    .qureg_mut(*handle)?
                    .expectation(*st_idx, *qidx, *qlen, *observable)?;
                Ok(vec![(TAG_EXP_ST_VAL, value.to_string())])
            }
            CoreInstruction::Transform { handle, transform } => {
                self.qureg_mut(*handle)?.transform(transform)?;
                Ok(Vec::new())
            }
        }
    }

    fn exec_block(&mut self, block: &BlockInstruction) -> QsimResult<()> {
        let reg = self.qureg_mut(block.handle)?;
        let transforms = block.unwind(reg.qubits())?;
        apply_unwound(reg, &transforms)
    }

    fn exec_qml(&mut self, qml: &QmlBlockInstruction) -> QsimResult<()> {
        let max_rep = self.config.max_block_repetitions;
        let reg = self.qureg_mut(qml.handle)?;
        let transforms = qml.unwind(reg.qubits(), max_rep)?;
        apply_unwound(reg, &transforms)
    }
}

// every unwound transform is checked before the register changes
fn apply_unwound(reg: &mut QuantumRegister, transforms: &[Transform]) -> QsimResult<()> {
    transforms.iter().try_for_each(Transform::validate)?;
    reg.transform_all(transforms)
}
