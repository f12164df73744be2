//! Fold assignment and the cross-validation driver.
use rayon::prelude::*;
use serde::Serialize;

use crate::data_handling::Dataset;
use crate::error::Result;
use crate::evaluation::{evaluate, HoldoutReport};
use crate::train::Trainer;

/// Round-robin group ids `i mod n_folds` for `n` instances in file order.
pub fn create_folds(n: usize, n_folds: usize) -> Vec<i32> {
    if n_folds == 0 {
        return vec![0; n];
    }
    (0..n).map(|i| (i % n_folds) as i32).collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct CrossValidation {
    /// One report per fold, in fold order.
    pub folds: Vec<HoldoutReport>,
    pub mean_accuracy: f64,
    pub mean_micro_f1: f64,
}

impl CrossValidation {
    pub fn log(&self) {
        for report in &self.folds {
            log::info!("===== Cross validation ({}/{}) =====", report.group + 1, self.folds.len());
            report.log();
        }
        log::info!("===== Cross validation summary =====");
        log::info!("Mean accuracy: {:.4}", self.mean_accuracy);
        log::info!("Mean micro F1: {:.4}", self.mean_micro_f1);
    }
}

/// Trains once per group `0..n_folds` with that group held out.
///
/// Folds share nothing but the read-only dataset and run on the rayon pool.
pub fn cross_validate(data: &Dataset, trainer: &dyn Trainer, n_folds: usize) -> Result<CrossValidation> {
    let folds = (0..n_folds as i32)
        .into_par_iter()
        .map(|group| {
            log::debug!("Training fold {} of {}", group + 1, n_folds);
            let outcome = trainer.fit(data, Some(group))?;
            Ok(outcome
                .holdout
                .unwrap_or_else(|| evaluate(data, outcome.weights.view(), group)))
        })
        .collect::<Result<Vec<_>>>()?;

    let n = folds.len().max(1) as f64;
    let mean_accuracy = folds.iter().map(|r| r.accuracy.value()).sum::<f64>() / n;
    let mean_micro_f1 = folds.iter().map(|r| r.micro.f1).sum::<f64>() / n;
    Ok(CrossValidation {
        folds,
        mean_accuracy,
        mean_micro_f1,
    })
}
