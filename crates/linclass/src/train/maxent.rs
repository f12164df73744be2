//! Maximum-entropy (log-linear) training with the L-BFGS solver.
use std::time::Instant;

use ndarray::{Array1, Zip};
use rayon::prelude::*;

use crate::config::{Regularization, TrainConfig};
use crate::data_handling::Dataset;
use crate::error::Result;
use crate::evaluation::evaluate;
use crate::models::classifier_trait::Classifier;
use crate::models::linear::LinearClassifier;
use crate::train::lbfgs::{Lbfgs, Minimizer, Objective, Progress};
use crate::train::{training_set, TrainOutcome, Trainer};

/// Instances per task of the parallel sweep. Partial sums are reduced in
/// chunk order, so the result does not depend on the thread count.
const CHUNK_SIZE: usize = 512;

pub struct MaxEntTrainer {
    config: TrainConfig,
}

impl MaxEntTrainer {
    pub fn new(config: TrainConfig) -> Self {
        MaxEntTrainer { config }
    }
}

struct LogLinear<'a> {
    data: &'a Dataset,
    training: &'a [(usize, usize)],
    oexps: Array1<f64>,
    c2: f64,
    user_start: usize,
    parallel: bool,
}

impl LogLinear<'_> {
    /// Negative log-likelihood and model expectations over `items`.
    fn sweep(&self, x: &Array1<f64>, items: &[(usize, usize)]) -> (f64, Array1<f64>) {
        let data = self.data;
        let num_labels = data.num_labels();
        let mut mexps = Array1::zeros(x.len());
        let mut loss = 0.0;
        let mut cls = LinearClassifier::new(x.view(), data.features());

        for &(i, truth) in items {
            let inst = &data.instances[i];
            if !cls.classify(inst, num_labels, true) {
                continue;
            }
            loss -= inst.weight * cls.log_prob(truth);
            for (k, cand) in inst.candidates(num_labels).enumerate() {
                let p = cls.prob(k);
                if p != 0.0 {
                    cls.gradient_contribution(&mut mexps, cand.attributes, cand.label, inst.weight * p);
                }
            }
        }
        (loss, mexps)
    }
}

impl Objective for LogLinear<'_> {
    fn evaluate(&mut self, x: &Array1<f64>, g: &mut Array1<f64>) -> f64 {
        let (mut loss, mexps) = if self.parallel {
            self.training
                .par_chunks(CHUNK_SIZE)
                .map(|chunk| self.sweep(x, chunk))
                .collect::<Vec<_>>()
                .into_iter()
                .fold((0.0, Array1::zeros(x.len())), |(l, mut acc), (part, m)| {
                    acc += &m;
                    (l + part, acc)
                })
        } else {
            self.sweep(x, self.training)
        };

        Zip::from(&mut *g)
            .and(&mexps)
            .and(&self.oexps)
            .for_each(|g, &m, &o| *g = m - o);

        if self.c2 != 0.0 {
            let mut norm = 0.0;
            for i in self.user_start..x.len() {
                g[i] += self.c2 * x[i];
                norm += x[i] * x[i];
            }
            loss += 0.5 * self.c2 * norm;
        }
        loss
    }
}

impl Trainer for MaxEntTrainer {
    fn fit(&self, data: &Dataset, holdout: Option<i32>) -> Result<TrainOutcome> {
        let training = training_set(data, holdout)?;
        let num_labels = data.num_labels();
        let num_features = data.num_features();
        let cfg = &self.config;

        log::info!("Training a maximum entropy model");
        cfg.log_parameters();
        log::info!(
            "{} training instances, {} features",
            training.len(),
            num_features
        );

        // Observation expectations are fixed for the whole run.
        let mut oexps = Array1::zeros(num_features);
        for &(i, truth) in &training {
            let inst = &data.instances[i];
            let cand = inst.candidate(truth, num_labels);
            crate::models::linear::add_features(
                &mut oexps,
                data.features(),
                cand.attributes,
                cand.label,
                inst.weight,
            );
        }

        let (c1, c2) = cfg.regularization_coefficients();
        let solver = Lbfgs::new(&cfg.lbfgs).with_l1(c1);
        let mut objective = LogLinear {
            data,
            training: &training,
            oexps,
            c2,
            user_start: data.user_feature_start(),
            parallel: cfg.parallel,
        };

        let mut clock = Instant::now();
        let mut progress = |p: &Progress| {
            let active = p.x.iter().filter(|w| **w != 0.0).count();
            log::info!("***** Iteration #{} *****", p.iteration);
            log::info!("Log-likelihood: {}", -p.fx);
            log::info!("Feature norm: {}", p.xnorm);
            log::info!("Error norm: {}", p.gnorm);
            log::info!("Active features: {}", active);
            log::info!("Line search trials: {}", p.num_linesearch);
            log::info!("Line search step: {}", p.step);
            log::info!(
                "Seconds required for this iteration: {:.3}",
                clock.elapsed().as_secs_f64()
            );
            clock = Instant::now();

            if let Some(group) = holdout {
                evaluate(data, p.x.view(), group).log();
            }
            true
        };

        let started = Instant::now();
        let mut x = Array1::zeros(num_features);
        let outcome = solver.minimize(&mut x, &mut objective, &mut progress);

        if outcome.status.is_converged() {
            log::info!("{}", outcome.status);
        } else {
            log::warn!("{}", outcome.status);
        }
        log::info!(
            "Total seconds required for training: {:.3}",
            started.elapsed().as_secs_f64()
        );
        if cfg.regularization == Regularization::L1 {
            log::info!(
                "Active features: {}",
                x.iter().filter(|w| **w != 0.0).count()
            );
        }

        let report = holdout.map(|group| evaluate(data, x.view(), group));
        Ok(TrainOutcome {
            weights: x,
            status: Some(outcome.status),
            iterations: outcome.iterations,
            holdout: report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_handling::{Instance, SparseVector, TaskKind};

    fn xor_like() -> Dataset {
        let mut data = Dataset::new(TaskKind::Multiclass);
        let a = data.attributes.intern("a").unwrap();
        let b = data.attributes.intern("b").unwrap();
        let x = data.labels.intern("X").unwrap();
        let y = data.labels.intern("Y").unwrap();
        for i in 0..20 {
            let inst = if i % 2 == 0 {
                Instance::multiclass(Some(x), SparseVector::from(vec![(a, 1.0)]))
            } else {
                Instance::multiclass(Some(y), SparseVector::from(vec![(b, 1.0)]))
            };
            data.push(inst.with_group(i % 4));
        }
        data.set_dense(true);
        data.finalize(&[]);
        data
    }

    #[test]
    fn separable_multiclass_is_learned() {
        let data = xor_like();
        let out = MaxEntTrainer::new(TrainConfig::default()).fit(&data, None).unwrap();
        let report = evaluate(&data, out.weights.view(), 0);
        assert_eq!(report.accuracy.matches(), report.accuracy.total());
        assert!(out.status.unwrap().is_converged());
    }

    #[test]
    fn parallel_sweep_matches_sequential() {
        let data = xor_like();
        let mut cfg = TrainConfig::default();
        cfg.lbfgs.max_iterations = 5;
        let seq = MaxEntTrainer::new(cfg.clone()).fit(&data, Some(3)).unwrap();
        cfg.parallel = true;
        let par = MaxEntTrainer::new(cfg).fit(&data, Some(3)).unwrap();
        // A single chunk covers this dataset, so the sums are identical.
        assert_eq!(seq.weights, par.weights);
        assert!(seq.holdout.is_some());
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let data = xor_like();
        let training = training_set(&data, None).unwrap();
        let n = data.num_features();
        let mut obj = LogLinear {
            data: &data,
            training: &training,
            oexps: Array1::zeros(n),
            c2: 0.04,
            user_start: 0,
            parallel: false,
        };
        for &(i, t) in &training {
            let inst = &data.instances[i];
            let cand = inst.candidate(t, data.num_labels());
            crate::models::linear::add_features(&mut obj.oexps, data.features(), cand.attributes, cand.label, 1.0);
        }

        let x = Array1::from_iter((0..n).map(|i| 0.3 * i as f64 - 0.4));
        let mut g = Array1::zeros(n);
        let f = obj.evaluate(&x, &mut g);
        let h = 1e-6;
        for k in 0..n {
            let mut xh = x.clone();
            xh[k] += h;
            let mut scratch = Array1::zeros(n);
            let fh = obj.evaluate(&xh, &mut scratch);
            assert!(((fh - f) / h - g[k]).abs() < 1e-3, "feature {}", k);
        }
    }
}
