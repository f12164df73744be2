use ndarray::{Array1, ArrayView1};

use crate::data_handling::SparseVector;
use crate::features::FeatureSpace;
use crate::models::classifier_trait::Classifier;

/// Linear scorer over a borrowed weight vector.
pub struct LinearClassifier<'a> {
    weights: ArrayView1<'a, f64>,
    space: &'a FeatureSpace,
    scores: Vec<f64>,
    probs: Vec<f64>,
    labels: Vec<usize>,
    argmax: usize,
    log_norm: f64,
    scale: f64,
}

/// `buffer[feature(attr, label)] += coefficient * value` over `attributes`.
pub fn add_features(
    buffer: &mut Array1<f64>,
    space: &FeatureSpace,
    attributes: &SparseVector,
    label: usize,
    coefficient: f64,
) {
    for &(attr, value) in attributes.iter() {
        if let Some(fid) = space.forward(attr, label) {
            buffer[fid] += coefficient * value;
        }
    }
}

impl<'a> LinearClassifier<'a> {
    pub fn new(weights: ArrayView1<'a, f64>, space: &'a FeatureSpace) -> Self {
        LinearClassifier {
            weights,
            space,
            scores: Vec::new(),
            probs: Vec::new(),
            labels: Vec::new(),
            argmax: 0,
            log_norm: 0.0,
            scale: 1.0,
        }
    }

    /// Multiplies every score by `scale`, for weights stored as `scale * v`.
    pub fn scaled(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    /// Log partition factor of the last `finalize(true)`.
    pub fn log_norm(&self) -> f64 {
        self.log_norm
    }
}

impl Classifier for LinearClassifier<'_> {
    fn resize(&mut self, n: usize) {
        self.scores.clear();
        self.scores.resize(n, 0.0);
        self.probs.clear();
        self.probs.resize(n, 0.0);
        self.labels.clear();
        self.labels.resize(n, 0);
        self.argmax = 0;
        self.log_norm = 0.0;
    }

    fn accumulate(&mut self, i: usize, attributes: &SparseVector, label: usize) {
        let mut score = 0.0;
        for &(attr, value) in attributes.iter() {
            if let Some(fid) = self.space.forward(attr, label) {
                if let Some(w) = self.weights.get(fid) {
                    score += w * value;
                }
            }
        }
        self.scores[i] = self.scale * score;
        self.labels[i] = label;
    }

    fn finalize(&mut self, probabilities: bool) -> bool {
        if self.scores.is_empty() {
            return false;
        }

        // First occurrence wins on ties.
        let mut argmax = 0;
        let mut vmax = self.scores[0];
        for (i, &s) in self.scores.iter().enumerate().skip(1) {
            if vmax < s {
                argmax = i;
                vmax = s;
            }
        }
        self.argmax = argmax;

        if probabilities {
            let mut sum = 0.0;
            for (p, &s) in self.probs.iter_mut().zip(self.scores.iter()) {
                *p = (s - vmax).exp();
                sum += *p;
            }
            for p in self.probs.iter_mut() {
                *p /= sum;
            }
            self.log_norm = vmax + sum.ln();
        }

        true
    }

    fn len(&self) -> usize {
        self.scores.len()
    }

    fn argmax(&self) -> usize {
        self.argmax
    }

    fn score(&self, i: usize) -> f64 {
        self.scores[i]
    }

    fn prob(&self, i: usize) -> f64 {
        self.probs[i]
    }

    fn log_prob(&self, i: usize) -> f64 {
        self.scores[i] - self.log_norm
    }

    fn label(&self, i: usize) -> usize {
        self.labels[i]
    }

    fn gradient_contribution(
        &self,
        buffer: &mut Array1<f64>,
        attributes: &SparseVector,
        label: usize,
        coefficient: f64,
    ) {
        add_features(buffer, self.space, attributes, label, coefficient);
    }
}
