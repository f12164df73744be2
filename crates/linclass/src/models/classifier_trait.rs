use ndarray::Array1;

use crate::data_handling::{Instance, SparseVector};

/// Scoring contract shared by the batch trainer, the online schedulers and
/// holdout evaluation.
///
/// A classifier scores the candidates of one instance at a time: `resize`,
/// `accumulate` every candidate, then `finalize` to obtain the argmax and,
/// optionally, the softmax probabilities.
pub trait Classifier {
    /// Prepare room for `n` candidates; previous scores are discarded.
    fn resize(&mut self, n: usize);

    /// Score candidate `i` as the dot product of its attributes with the
    /// weights of the features generated for `label`.
    fn accumulate(&mut self, i: usize, attributes: &SparseVector, label: usize);

    /// Returns `false` when no candidate was accumulated.
    fn finalize(&mut self, probabilities: bool) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn argmax(&self) -> usize;

    fn score(&self, i: usize) -> f64;

    fn prob(&self, i: usize) -> f64;

    /// `ln p(i)`, finite even when `prob(i)` underflows.
    fn log_prob(&self, i: usize) -> f64;

    fn label(&self, i: usize) -> usize;

    /// `buffer[feature(attr, label)] += coefficient * value` for each attribute.
    fn gradient_contribution(
        &self,
        buffer: &mut Array1<f64>,
        attributes: &SparseVector,
        label: usize,
        coefficient: f64,
    );

    /// Scores every candidate of `instance`.
    fn classify(&mut self, instance: &Instance, num_labels: usize, probabilities: bool) -> bool {
        let n = instance.num_candidates(num_labels);
        self.resize(n);
        for (i, cand) in instance.candidates(num_labels).enumerate() {
            self.accumulate(i, cand.attributes, cand.label);
        }
        self.finalize(probabilities)
    }
}
