//! Online schedulers: one epoch-driving loop with pluggable update rules.
use std::time::Instant;

use ndarray::Array1;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::config::{Loss, OnlineParams, TrainConfig};
use crate::data_handling::{Dataset, Instance};
use crate::error::Result;
use crate::evaluation::evaluate;
use crate::features::FeatureSpace;
use crate::models::classifier_trait::Classifier;
use crate::models::linear::{add_features, LinearClassifier};
use crate::train::{training_set, TrainOutcome, Trainer};

/// Per-instance update rule driven by [`OnlineScheduler`].
pub trait UpdatePolicy: Clone + Send + Sync {
    fn name(&self) -> &'static str;

    /// Resets the state before the first epoch over `num_instances` instances.
    fn begin(&mut self, data: &Dataset, num_instances: usize);

    /// Processes one instance whose true candidate is `truth`; returns its loss.
    fn update(&mut self, data: &Dataset, instance: &Instance, truth: usize) -> f64;

    /// Weights to evaluate with and to return.
    fn weights(&self) -> Array1<f64>;
}

/// Repeats the policy over the training instances for a number of epochs.
pub struct OnlineScheduler<P: UpdatePolicy> {
    policy: P,
    params: OnlineParams,
}

impl<P: UpdatePolicy> OnlineScheduler<P> {
    pub fn new(policy: P, params: OnlineParams) -> Self {
        OnlineScheduler { policy, params }
    }
}

impl<P: UpdatePolicy> Trainer for OnlineScheduler<P> {
    fn fit(&self, data: &Dataset, holdout: Option<i32>) -> Result<TrainOutcome> {
        let mut order = training_set(data, holdout)?;
        let mut policy = self.policy.clone();
        let mut rng = StdRng::seed_from_u64(self.params.seed);

        log::info!("Training with {}", policy.name());
        log::info!(
            "{} training instances, {} features",
            order.len(),
            data.num_features()
        );
        policy.begin(data, order.len());

        let started = Instant::now();
        let mut report = None;
        for epoch in 1..=self.params.max_epochs {
            let clock = Instant::now();
            if self.params.shuffle {
                order.shuffle(&mut rng);
            }

            let mut loss = 0.0;
            for &(i, truth) in &order {
                loss += policy.update(data, &data.instances[i], truth);
            }

            let w = policy.weights();
            log::info!("***** Epoch #{} *****", epoch);
            log::info!("Loss: {}", loss);
            log::info!("Feature norm: {}", w.dot(&w).sqrt());
            log::info!(
                "Seconds required for this epoch: {:.3}",
                clock.elapsed().as_secs_f64()
            );
            if let Some(group) = holdout {
                let r = evaluate(data, w.view(), group);
                r.log();
                report = Some(r);
            }
        }
        log::info!(
            "Total seconds required for training: {:.3}",
            started.elapsed().as_secs_f64()
        );

        Ok(TrainOutcome {
            weights: policy.weights(),
            status: None,
            iterations: self.params.max_epochs,
            holdout: report,
        })
    }
}

/// Index of the best-scoring candidate of `inst`.
fn predict(w: &Array1<f64>, space: &FeatureSpace, inst: &Instance, num_labels: usize) -> usize {
    let mut cls = LinearClassifier::new(w.view(), space);
    cls.classify(inst, num_labels, false);
    cls.argmax()
}

/// Perceptron whose returned weights are the average over all updates.
///
/// The average is kept with the usual trick: `u` accumulates `c * delta`, so
/// the mean of all iterates is `w - u / c`.
#[derive(Debug, Clone, Default)]
pub struct AveragedPerceptron {
    w: Array1<f64>,
    u: Array1<f64>,
    c: f64,
}

impl AveragedPerceptron {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&mut self, space: &FeatureSpace, inst: &Instance, k: usize, num_labels: usize, sign: f64) {
        let cand = inst.candidate(k, num_labels);
        let delta = sign * inst.weight;
        add_features(&mut self.w, space, cand.attributes, cand.label, delta);
        add_features(&mut self.u, space, cand.attributes, cand.label, self.c * delta);
    }
}

impl UpdatePolicy for AveragedPerceptron {
    fn name(&self) -> &'static str {
        "averaged perceptron"
    }

    fn begin(&mut self, data: &Dataset, _num_instances: usize) {
        self.w = Array1::zeros(data.num_features());
        self.u = Array1::zeros(data.num_features());
        self.c = 1.0;
    }

    fn update(&mut self, data: &Dataset, inst: &Instance, truth: usize) -> f64 {
        let num_labels = data.num_labels();
        let argmax = predict(&self.w, data.features(), inst, num_labels);
        let mut loss = 0.0;
        if argmax != truth {
            self.add(data.features(), inst, truth, num_labels, 1.0);
            self.add(data.features(), inst, argmax, num_labels, -1.0);
            loss = inst.weight;
        }
        self.c += 1.0;
        loss
    }

    fn weights(&self) -> Array1<f64> {
        if self.c <= 0.0 {
            return self.w.clone();
        }
        &self.w - &(&self.u / self.c)
    }
}

/// What follows the sub-gradient step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostStep {
    /// Pegasos: `eta = 1 / (lambda t)`, weight decay and projection onto the
    /// L2 ball of radius `1 / sqrt(lambda)`.
    Projection,
    /// Truncated gradient: `eta = eta0 / (1 + t / N)`, with periodic
    /// truncation of small weights toward zero.
    Truncation,
}

/// Sub-gradient descent on the logistic or hinge loss.
///
/// Weights are stored as `scale * v` so that the Pegasos decay and
/// projection cost O(1) per instance; `norm2` tracks `||w||^2`.
#[derive(Debug, Clone)]
pub struct Subgradient {
    loss: Loss,
    post: PostStep,
    sigma: f64,
    eta0: f64,
    period: usize,
    theta: f64,
    v: Array1<f64>,
    scale: f64,
    norm2: f64,
    lambda: f64,
    num_instances: f64,
    user_start: usize,
    t: usize,
}

impl Subgradient {
    pub fn new(loss: Loss, post: PostStep, config: &TrainConfig) -> Self {
        Subgradient {
            loss,
            post,
            sigma: config.sigma,
            eta0: config.online.eta,
            period: config.online.period.max(1),
            theta: config.online.theta,
            v: Array1::zeros(0),
            scale: 1.0,
            norm2: 0.0,
            lambda: 0.0,
            num_instances: 1.0,
            user_start: 0,
            t: 0,
        }
    }

    /// Per-candidate loss derivatives with respect to the scores.
    fn score_gradient(&self, data: &Dataset, inst: &Instance, truth: usize) -> (Vec<f64>, f64) {
        let num_labels = data.num_labels();
        let mut cls = LinearClassifier::new(self.v.view(), data.features()).scaled(self.scale);
        cls.classify(inst, num_labels, self.loss == Loss::Logistic);
        let n = cls.len();
        let mut coefs = vec![0.0; n];

        match self.loss {
            Loss::Logistic => {
                for (k, c) in coefs.iter_mut().enumerate() {
                    *c = cls.prob(k);
                }
                coefs[truth] -= 1.0;
                (coefs, -cls.log_prob(truth))
            }
            Loss::Hinge => {
                // Most violating wrong candidate under a unit margin.
                let rival = (0..n)
                    .filter(|&k| k != truth)
                    .fold(None, |best: Option<usize>, k| match best {
                        Some(b) if cls.score(b) >= cls.score(k) => Some(b),
                        _ => Some(k),
                    });
                let Some(rival) = rival else {
                    return (coefs, 0.0);
                };
                let margin = cls.score(truth) - cls.score(rival);
                if margin < 1.0 {
                    coefs[truth] = -1.0;
                    coefs[rival] = 1.0;
                    (coefs, 1.0 - margin)
                } else {
                    (coefs, 0.0)
                }
            }
        }
    }

    /// `w[feature] += delta * value` through the scaled representation.
    fn add(&mut self, space: &FeatureSpace, inst: &Instance, k: usize, num_labels: usize, delta: f64) {
        let cand = inst.candidate(k, num_labels);
        for &(attr, value) in cand.attributes.iter() {
            if let Some(fid) = space.forward(attr, cand.label) {
                let before = self.scale * self.v[fid];
                self.v[fid] += delta * value / self.scale;
                let after = self.scale * self.v[fid];
                self.norm2 += after * after - before * before;
            }
        }
    }

    fn truncate(&mut self, eta: f64) {
        let gravity = eta * self.period as f64 / self.sigma;
        let theta = self.theta;
        let scale = self.scale;
        let mut norm2 = 0.0;
        for (i, v) in self.v.iter_mut().enumerate() {
            let w = scale * *v;
            if i >= self.user_start && w.abs() <= theta {
                let shrunk = if w > 0.0 {
                    (w - gravity).max(0.0)
                } else {
                    (w + gravity).min(0.0)
                };
                *v = shrunk / scale;
            }
            let w = scale * *v;
            norm2 += w * w;
        }
        self.norm2 = norm2;
    }
}

impl UpdatePolicy for Subgradient {
    fn name(&self) -> &'static str {
        match (self.post, self.loss) {
            (PostStep::Projection, Loss::Logistic) => "pegasos (logistic loss)",
            (PostStep::Projection, Loss::Hinge) => "pegasos (hinge loss)",
            (PostStep::Truncation, Loss::Logistic) => "truncated gradient (logistic loss)",
            (PostStep::Truncation, Loss::Hinge) => "truncated gradient (hinge loss)",
        }
    }

    fn begin(&mut self, data: &Dataset, num_instances: usize) {
        self.v = Array1::zeros(data.num_features());
        self.scale = 1.0;
        self.norm2 = 0.0;
        self.num_instances = num_instances.max(1) as f64;
        self.lambda = 1.0 / (self.sigma * self.sigma * self.num_instances);
        self.user_start = data.user_feature_start();
        self.t = 0;
    }

    fn update(&mut self, data: &Dataset, inst: &Instance, truth: usize) -> f64 {
        let num_labels = data.num_labels();
        self.t += 1;
        let t = self.t as f64;

        let eta = match self.post {
            PostStep::Projection => 1.0 / (self.lambda * t),
            PostStep::Truncation => self.eta0 / (1.0 + (t - 1.0) / self.num_instances),
        };

        let (coefs, loss) = self.score_gradient(data, inst, truth);

        if self.post == PostStep::Projection {
            let decay = 1.0 - eta * self.lambda;
            if decay <= 0.0 {
                self.v.fill(0.0);
                self.scale = 1.0;
                self.norm2 = 0.0;
            } else {
                self.scale *= decay;
                self.norm2 *= decay * decay;
            }
        }

        for (k, &c) in coefs.iter().enumerate() {
            if c != 0.0 {
                self.add(data.features(), inst, k, num_labels, -eta * c * inst.weight);
            }
        }

        match self.post {
            PostStep::Projection => {
                let radius2 = 1.0 / self.lambda;
                if self.norm2 > radius2 {
                    let shrink = (radius2 / self.norm2).sqrt();
                    self.scale *= shrink;
                    self.norm2 = radius2;
                }
            }
            PostStep::Truncation => {
                if self.t % self.period == 0 {
                    self.truncate(eta);
                }
            }
        }

        loss * inst.weight
    }

    fn weights(&self) -> Array1<f64> {
        &self.v * self.scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_handling::{SparseVector, TaskKind};

    fn separable() -> Dataset {
        let mut data = Dataset::new(TaskKind::Binary);
        let a = data.attributes.intern("a").unwrap();
        let b = data.attributes.intern("b").unwrap();
        for i in 0..12 {
            let inst = if i % 2 == 0 {
                Instance::binary(true, SparseVector::from(vec![(a, 1.0)]))
            } else {
                Instance::binary(false, SparseVector::from(vec![(b, 1.0)]))
            };
            data.push(inst);
        }
        data.finalize(&[]);
        data
    }

    fn params(epochs: usize) -> OnlineParams {
        OnlineParams {
            max_epochs: epochs,
            ..Default::default()
        }
    }

    #[test]
    fn perceptron_returns_average_of_iterates() {
        let data = separable();
        let out = OnlineScheduler::new(AveragedPerceptron::new(), params(1))
            .fit(&data, None)
            .unwrap();
        // Instance 0 is positive and scored 0, predicted negative: w = (1, 0)
        // after the first of 12 steps, never changing afterwards.
        // Averaged over 13 counters: 1 - 1 * 1 / 13.
        assert!((out.weights[0] - 12.0 / 13.0).abs() < 1e-12);
        assert_eq!(out.weights[1], 0.0);
    }

    #[test]
    fn every_policy_separates_the_data() {
        let data = separable();
        let cfg = TrainConfig::default();
        let policies = [
            Subgradient::new(Loss::Logistic, PostStep::Projection, &cfg),
            Subgradient::new(Loss::Hinge, PostStep::Projection, &cfg),
            Subgradient::new(Loss::Logistic, PostStep::Truncation, &cfg),
            Subgradient::new(Loss::Hinge, PostStep::Truncation, &cfg),
        ];
        for policy in policies {
            let name = policy.name();
            let out = OnlineScheduler::new(policy, params(10)).fit(&data, None).unwrap();
            assert!(out.weights[0] > 0.0, "{}: {:?}", name, out.weights);
            assert!(out.weights[1] <= 0.0, "{}: {:?}", name, out.weights);
        }
    }

    #[test]
    fn projection_keeps_weights_in_the_ball() {
        let data = separable();
        let mut cfg = TrainConfig::default();
        cfg.sigma = 0.1;
        let out = OnlineScheduler::new(
            Subgradient::new(Loss::Hinge, PostStep::Projection, &cfg),
            params(3),
        )
        .fit(&data, None)
        .unwrap();
        let lambda = 1.0 / (cfg.sigma * cfg.sigma * data.len() as f64);
        let norm = out.weights.dot(&out.weights).sqrt();
        assert!(norm <= 1.0 / lambda.sqrt() + 1e-9);
    }

    #[test]
    fn truncation_zeroes_small_weights() {
        let data = separable();
        let mut cfg = TrainConfig::default();
        cfg.sigma = 0.01;
        cfg.online.period = 1;
        let out = OnlineScheduler::new(
            Subgradient::new(Loss::Logistic, PostStep::Truncation, &cfg),
            params(2),
        )
        .fit(&data, None)
        .unwrap();
        assert_eq!(out.num_active(), 0);
    }

    #[test]
    fn shuffling_is_reproducible_for_a_seed() {
        let data = separable();
        let mut p = params(3);
        p.shuffle = true;
        p.seed = 7;
        let run = || {
            OnlineScheduler::new(AveragedPerceptron::new(), p.clone())
                .fit(&data, None)
                .unwrap()
                .weights
        };
        assert_eq!(run(), run());
    }
}
