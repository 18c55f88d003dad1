use crate::device::{self, DeviceBackend, FunctionChain, StateMirrors};
use crate::error::{QsimError, QsimResult};
use crate::instructions::Transform;
use crate::qasm::Observable;
use crate::runtime::measurement::{self, MeasureOutcome};
use log::{debug, trace, warn};
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::fmt;
use std::sync::Arc;

// largest register the index arithmetic can address
pub const MAX_REGISTER_QUBITS: usize = 40;

// one allocated register. the host array and the active device mirror only
// differ while `in_sync` is false
pub struct QuantumRegister {
    n: usize,
    tot_states: usize,
    host: Vec<Complex64>,
    mirrors: StateMirrors,
    in_sync: bool,
    device: Arc<dyn DeviceBackend>,
    rng: StdRng,
}

impl fmt::Debug for QuantumRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuantumRegister")
            .field("n", &self.n)
            .field("tot_states", &self.tot_states)
            .field("active_mirror", &self.mirrors.active_index())
            .field("in_sync", &self.in_sync)
            .field("device", &self.device.kind())
            .finish()
    }
}

impl QuantumRegister {
    pub fn new(n: usize, device: Arc<dyn DeviceBackend>, seed: Option<u64>) -> QsimResult<Self> {
        if n == 0 || n > MAX_REGISTER_QUBITS {
            return Err(QsimError::execution(format!("illegal qureg size [{}]", n)));
        }
        let tot_states = 1usize << n;
        // seeded registers replay the same measurement sequence
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        let mut reg = QuantumRegister {
            n,
            tot_states,
            host: vec![Complex64::new(0.0, 0.0); tot_states],
            mirrors: StateMirrors::new(tot_states),
            in_sync: false,
            device,
            rng,
        };
        reg.reset()?;
        debug!("allocated {}-qubit register ({} states)", n, tot_states);
        Ok(reg)
    }

    pub fn qubits(&self) -> usize {
        self.n
    }

    pub fn total_states(&self) -> usize {
        self.tot_states
    }

    pub fn is_in_sync(&self) -> bool {
        self.in_sync
    }

    pub fn active_mirror(&self) -> usize {
        self.mirrors.active_index()
    }

    // device -> host
    fn sync(&mut self) {
        if !self.in_sync {
            self.host.copy_from_slice(self.mirrors.active());
            self.in_sync = true;
            trace!("register synced from mirror {}", self.mirrors.active_index());
        }
    }

    // host -> device
    fn align(&mut self) {
        self.mirrors.active_mut().copy_from_slice(&self.host);
        self.in_sync = true;
    }

    pub fn reset(&mut self) -> QsimResult<()> {
        self.set_pure_state(0)
    }

    pub fn set_pure_state(&mut self, st_idx: usize) -> QsimResult<()> {
        if st_idx >= self.tot_states {
            return Err(QsimError::execution(format!(
                "state index [{}] out of range [{}]",
                st_idx, self.tot_states
            )));
        }
        self.device.set_state(self.mirrors.active_mut(), st_idx)?;
        self.in_sync = false;
        self.sync();
        Ok(())
    }

    pub fn set_amplitudes(&mut self, amps: &[Complex64]) -> QsimResult<()> {
        if amps.len() != self.tot_states {
            return Err(QsimError::execution(format!(
                "state array size [{}] does not match qureg states [{}]",
                amps.len(),
                self.tot_states
            )));
        }
        self.host.copy_from_slice(amps);
        self.align();
        if let Err(e) = self.validate_state() {
            warn!("custom state accepted as is: {}", e);
        }
        Ok(())
    }

    // span checks first, then the full-register operator
    pub fn check_transform(&self, t: &Transform) -> QsimResult<FunctionChain> {
        let width = t.width() as i64;
        let covered = width * t.frep as i64;
        if covered > self.n as i64 {
            return Err(QsimError::execution(format!(
                "function repetitions exceeds qureg size, [{}]^[{}] > [{}]",
                t.fsize, t.frep, self.tot_states
            )));
        }
        if covered + t.flsq as i64 > self.n as i64 {
            return Err(QsimError::execution(format!(
                "inconsistent LSQ value [{}] for [{}]^[{}] on [{}] states",
                t.flsq, t.fsize, t.frep, self.tot_states
            )));
        }
        device::prepare(t, self.n as u32)
    }

    fn apply_chain(&mut self, chain: &FunctionChain) -> QsimResult<()> {
        let (input, out) = self.mirrors.split();
        self.device.apply(chain, input, out)?;
        self.mirrors.swap();
        self.in_sync = false;
        Ok(())
    }

    pub fn transform(&mut self, t: &Transform) -> QsimResult<()> {
        let chain = self.check_transform(t)?;
        self.apply_chain(&chain)?;
        trace!("{} applied, active mirror {}", t.ftype.name(), self.mirrors.active_index());
        Ok(())
    }

    // all-or-nothing: every transform is bound-checked before the first runs
    pub fn transform_all(&mut self, transforms: &[Transform]) -> QsimResult<()> {
        let chains = transforms
            .iter()
            .map(|t| self.check_transform(t))
            .collect::<QsimResult<Vec<_>>>()?;
        for chain in &chains {
            self.apply_chain(chain)?;
        }
        debug!("{} transforms applied", chains.len());
        Ok(())
    }

    pub fn peek(&mut self) -> &[Complex64] {
        self.sync();
        &self.host
    }

    pub fn get_probabilities(&mut self) -> Vec<f64> {
        self.sync();
        self.host.par_iter().map(|a| a.norm_sqr()).collect()
    }

    pub fn validate_state(&mut self) -> QsimResult<()> {
        self.sync();
        let has_nan = self.host.par_iter().any(|a| a.re.is_nan() || a.im.is_nan());
        let has_inf = self.host.par_iter().any(|a| a.re.is_infinite() || a.im.is_infinite());
        if has_nan {
            return Err(QsimError::execution("quantum state contains NaN values"));
        }
        if has_inf {
            return Err(QsimError::execution("quantum state contains infinite values"));
        }
        let norm_sqr_sum: f64 = self.host.par_iter().map(|a| a.norm_sqr()).sum();
        if (norm_sqr_sum - 1.0).abs() > 1e-9 {
            return Err(QsimError::execution(format!(
                "quantum state is not normalized, norm squared {}",
                norm_sqr_sum
            )));
        }
        Ok(())
    }

    // uniform sample in (0, 1]
    fn sample(&mut self) -> f64 {
        1.0 - self.rng.gen::<f64>()
    }

    pub fn measure(
        &mut self,
        qidx: i32,
        qlen: i32,
        randomize: bool,
        collapse: bool,
        max_index_vec_size: usize,
    ) -> QsimResult<MeasureOutcome> {
        let (idx, len) = measurement::normalize_span(self.n, qidx, qlen)?;
        self.sync();
        let probs = measurement::sub_state_probabilities(&self.host, idx, len);
        let st_idx = if randomize {
            let sample = self.sample();
            measurement::select_random(&probs, sample)
        } else {
            measurement::select_max(&probs)
        };
        let probability = probs[st_idx];
        debug!(
            "measured sub-state {} of qubits [{}, +{}] with probability {:.6}",
            st_idx, idx, len, probability
        );

        let mut indices = None;
        if collapse {
            measurement::collapse(&mut self.host, idx, len, st_idx, probability)?;
            self.align();
            if self.n - len <= max_index_vec_size {
                indices = Some(measurement::matching_indices(self.n, idx, len, st_idx));
            }
        }
        Ok(MeasureOutcome {
            st_idx,
            probability,
            indices,
        })
    }

    pub fn expectation(&mut self, st_idx: i64, qidx: i32, qlen: i32, observable: Observable) -> QsimResult<f64> {
        let (idx, len) = measurement::normalize_span(self.n, qidx, qlen)?;
        self.sync();
        let probs = measurement::sub_state_probabilities(&self.host, idx, len);
        let eigen = measurement::eigenvalues(observable, len);
        let single = usize::try_from(st_idx).ok();
        measurement::expectation(&probs, &eigen, single)
    }
}
