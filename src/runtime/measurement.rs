// sub-register statistics: probability reduction, outcome selection,
// collapse and observable expectation

use crate::error::{QsimError, QsimResult};
use crate::qasm::Observable;
use num_complex::Complex64;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

// outcomes below this probability are never collapsed onto
pub const MEASURE_EPSILON: f64 = 1e-12;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MeasureOutcome {
    pub st_idx: usize,
    pub probability: f64,
    // full-register indices left non-zero by the collapse, when small enough
    pub indices: Option<Vec<usize>>,
}

// `len` bits of `val` starting at bit `idx`
#[inline]
pub fn get_state_bitval(val: usize, idx: usize, len: usize) -> usize {
    if len >= usize::BITS as usize {
        return val >> idx;
    }
    (val >> idx) & ((1usize << len) - 1)
}

// negative start or length selects the whole register; a length of -1 with
// a valid start runs to the top qubit
pub fn normalize_span(qubits: usize, qidx: i32, qlen: i32) -> QsimResult<(usize, usize)> {
    let (idx, len) = if qidx < 0 {
        (0, qubits as i64)
    } else if qlen < 0 {
        (qidx as i64, qubits as i64 - qidx as i64)
    } else {
        (qidx as i64, qlen as i64)
    };
    if idx > qubits as i64 - 1 {
        return Err(QsimError::execution(format!(
            "qubit index [{}] out of range for [{}] qubits",
            idx, qubits
        )));
    }
    if len < 0 || len > qubits as i64 - idx {
        return Err(QsimError::execution(format!(
            "qubit span [{}, {}] out of range for [{}] qubits",
            idx, len, qubits
        )));
    }
    Ok((idx as usize, len as usize))
}

// probability of each 2^len sub-state of bits [idx, idx+len)
pub fn sub_state_probabilities(amps: &[Complex64], idx: usize, len: usize) -> Vec<f64> {
    if 1usize << len == amps.len() {
        return amps.par_iter().map(|a| a.norm_sqr()).collect();
    }
    // each sub-state sums the amplitudes spread over the free bits around it
    let free = amps.len().trailing_zeros() as usize - len;
    let lo_mask = (1usize << idx) - 1;
    (0..1usize << len)
        .into_par_iter()
        .map(|s| {
            (0..1usize << free)
                .into_par_iter()
                .map(|f| {
                    let i = ((f >> idx) << (idx + len)) | (s << idx) | (f & lo_mask);
                    amps[i].norm_sqr()
                })
                .sum::<f64>()
        })
        .collect()
}

// greedy scan: keep the smallest probability that still reaches the sample;
// when nothing reaches it fall back to the most likely outcome
pub fn select_random(probs: &[f64], sample: f64) -> usize {
    let mut best = f64::INFINITY;
    let mut selected = None;
    for (i, &p) in probs.iter().enumerate() {
        if p >= sample && p < best {
            best = p;
            selected = Some(i);
        }
    }
    selected.unwrap_or_else(|| select_max(probs))
}

// arg-max, first index wins ties
pub fn select_max(probs: &[f64]) -> usize {
    probs
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(bi, bp), (i, &p)| if p > bp { (i, p) } else { (bi, bp) })
        .0
}

// renormalize the matching amplitudes, zero the rest
pub fn collapse(amps: &mut [Complex64], idx: usize, len: usize, st_idx: usize, probability: f64) -> QsimResult<()> {
    if probability < MEASURE_EPSILON {
        return Err(QsimError::execution(format!(
            "cannot collapse onto sub-state [{}] of probability [{:e}]",
            st_idx, probability
        )));
    }
    let scale = 1.0 / probability.sqrt();
    amps.par_iter_mut().enumerate().for_each(|(i, amp)| {
        if get_state_bitval(i, idx, len) == st_idx {
            *amp *= scale;
        } else {
            *amp = Complex64::new(0.0, 0.0);
        }
    });
    Ok(())
}

// full-register indices whose sub-state bits match `st_idx`
pub fn matching_indices(qubits: usize, idx: usize, len: usize, st_idx: usize) -> Vec<usize> {
    (0..1usize << qubits)
        .filter(|&i| get_state_bitval(i, idx, len) == st_idx)
        .collect()
}

// per-qubit eigenvalues kronecker-multiplied over `len` qubits; qubit 0 is
// the fastest varying index
pub fn eigenvalues(observable: Observable, len: usize) -> Vec<f64> {
    let per_qubit = observable.eigenvalues();
    (0..len).fold(vec![1.0], |acc, _| {
        per_qubit
            .iter()
            .flat_map(|e| acc.iter().map(move |a| e * a))
            .collect()
    })
}

// Σ eigen(i)·p(i), or a single term when `st_idx` is given
pub fn expectation(probs: &[f64], eigen: &[f64], st_idx: Option<usize>) -> QsimResult<f64> {
    match st_idx {
        Some(i) => {
            let (p, e) = probs.get(i).zip(eigen.get(i)).ok_or_else(|| {
                QsimError::execution(format!("sub-state index [{}] out of range [{}]", i, probs.len()))
            })?;
            Ok(p * e)
        }
        None => Ok(probs.iter().zip(eigen).map(|(p, e)| p * e).sum()),
    }
}
