//! Batch and online trainers.
use ndarray::Array1;

use crate::data_handling::Dataset;
use crate::error::{ClassifierError, Result};
use crate::evaluation::HoldoutReport;

pub mod lbfgs;
pub mod maxent;
pub mod online;

pub use lbfgs::{Lbfgs, Minimizer, Objective, Progress, SolverOutcome, SolverStatus};
pub use maxent::MaxEntTrainer;
pub use online::{AveragedPerceptron, OnlineScheduler, PostStep, Subgradient, UpdatePolicy};

/// Result of one call to [`Trainer::fit`].
#[derive(Debug, Clone)]
pub struct TrainOutcome {
    pub weights: Array1<f64>,
    /// Final solver status; `None` for the online schedulers.
    pub status: Option<SolverStatus>,
    /// Solver iterations or online epochs.
    pub iterations: usize,
    /// Holdout evaluation of the returned weights.
    pub holdout: Option<HoldoutReport>,
}

impl TrainOutcome {
    pub fn num_active(&self) -> usize {
        self.weights.iter().filter(|w| **w != 0.0).count()
    }
}

pub trait Trainer: Send + Sync {
    /// Trains on every instance outside the `holdout` group.
    fn fit(&self, data: &Dataset, holdout: Option<i32>) -> Result<TrainOutcome>;
}

/// Training instances as `(index, true candidate)` pairs.
///
/// Fails on the first instance that has no candidate or not exactly one
/// true candidate.
pub(crate) fn training_set(data: &Dataset, holdout: Option<i32>) -> Result<Vec<(usize, usize)>> {
    data.require_finalized()?;
    let num_labels = data.num_labels();
    let mut set = Vec::with_capacity(data.len());
    for (i, inst) in data.iter().enumerate() {
        if Some(inst.group) == holdout {
            continue;
        }
        if inst.num_candidates(num_labels) == 0 {
            return Err(ClassifierError::DegenerateInstance {
                index: i,
                reason: "no candidate".to_string(),
            });
        }
        match (inst.num_truths(num_labels), inst.true_index(num_labels)) {
            (1, Some(t)) => set.push((i, t)),
            (0, _) => {
                return Err(ClassifierError::DegenerateInstance {
                    index: i,
                    reason: "no true candidate".to_string(),
                })
            }
            (n, _) => {
                return Err(ClassifierError::DegenerateInstance {
                    index: i,
                    reason: format!("{} true candidates", n),
                })
            }
        }
    }
    Ok(set)
}
