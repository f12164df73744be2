//! Accuracy, precision/recall/F1 and confusion-matrix bookkeeping, plus the
//! holdout evaluation of a weight vector against one group of a dataset.
use std::fmt;

use ndarray::ArrayView1;
use serde::Serialize;

use crate::data_handling::Dataset;
use crate::models::classifier_trait::Classifier;
use crate::models::linear::LinearClassifier;

#[inline]
fn divide(a: f64, b: f64) -> f64 {
    if b != 0.0 {
        a / b
    } else {
        0.0
    }
}

/// Running (matches, total) counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Accuracy {
    matches: usize,
    total: usize,
}

impl Accuracy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, correct: bool) {
        self.matches += correct as usize;
        self.total += 1;
    }

    pub fn matches(&self) -> usize {
        self.matches
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn value(&self) -> f64 {
        divide(self.matches as f64, self.total as f64)
    }
}

impl fmt::Display for Accuracy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Accuracy: {:.4} ({}/{})",
            self.value(),
            self.matches,
            self.total
        )
    }
}

/// Counts of true positives, reference positives and predicted positives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LabelStat {
    pub num_match: usize,
    pub num_reference: usize,
    pub num_prediction: usize,
}

impl LabelStat {
    pub fn scores(&self) -> Prf {
        Prf::from_counts(self.num_match, self.num_prediction, self.num_reference)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Prf {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl Prf {
    pub fn from_counts(num_match: usize, num_prediction: usize, num_reference: usize) -> Self {
        let precision = divide(num_match as f64, num_prediction as f64);
        let recall = divide(num_match as f64, num_reference as f64);
        let f1 = divide(2.0 * precision * recall, precision + recall);
        Prf {
            precision,
            recall,
            f1,
        }
    }
}

/// Label-wise precision/recall counter.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Precall {
    stats: Vec<LabelStat>,
}

impl Precall {
    pub fn new(num_labels: usize) -> Self {
        Precall {
            stats: vec![LabelStat::default(); num_labels],
        }
    }

    pub fn resize(&mut self, num_labels: usize) {
        self.stats.resize(num_labels, LabelStat::default());
    }

    pub fn set(&mut self, predicted: usize, reference: usize) {
        self.stats[reference].num_reference += 1;
        self.stats[predicted].num_prediction += 1;
        if predicted == reference {
            self.stats[predicted].num_match += 1;
        }
    }

    pub fn stat(&self, label: usize) -> LabelStat {
        self.stats.get(label).copied().unwrap_or_default()
    }

    pub fn scores(&self, label: usize) -> Prf {
        self.stat(label).scores()
    }

    /// Pools the counts of `positives` and scores them once.
    pub fn micro(&self, positives: &[usize]) -> (Prf, LabelStat) {
        let mut total = LabelStat::default();
        for &l in positives {
            let s = self.stat(l);
            total.num_match += s.num_match;
            total.num_reference += s.num_reference;
            total.num_prediction += s.num_prediction;
        }
        (total.scores(), total)
    }

    /// Averages per-label scores over positive labels with non-zero support.
    pub fn macro_average(&self, positives: &[usize]) -> Prf {
        let mut n = 0usize;
        let mut sum = Prf::default();
        for &l in positives {
            let s = self.stat(l);
            if s.num_prediction > 0 || s.num_reference > 0 {
                let prf = s.scores();
                sum.precision += prf.precision;
                sum.recall += prf.recall;
                sum.f1 += prf.f1;
                n += 1;
            }
        }
        if n > 0 {
            let n = n as f64;
            sum.precision /= n;
            sum.recall /= n;
            sum.f1 /= n;
        }
        sum
    }
}

/// `labels x labels` counts indexed by (predicted, reference).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConfusionMatrix {
    num_labels: usize,
    cells: Vec<usize>,
}

impl ConfusionMatrix {
    pub fn new(num_labels: usize) -> Self {
        ConfusionMatrix {
            num_labels,
            cells: vec![0; num_labels * num_labels],
        }
    }

    pub fn add(&mut self, predicted: usize, reference: usize) {
        self.cells[predicted * self.num_labels + reference] += 1;
    }

    pub fn get(&self, predicted: usize, reference: usize) -> usize {
        self.cells[predicted * self.num_labels + reference]
    }

    pub fn num_labels(&self) -> usize {
        self.num_labels
    }

    pub fn to_precall(&self) -> Precall {
        let mut pr = Precall::new(self.num_labels);
        for p in 0..self.num_labels {
            for r in 0..self.num_labels {
                let n = self.get(p, r);
                pr.stats[r].num_reference += n;
                pr.stats[p].num_prediction += n;
                if p == r {
                    pr.stats[p].num_match += n;
                }
            }
        }
        pr
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LabelReport {
    pub label: String,
    pub stat: LabelStat,
    pub scores: Prf,
}

/// Result of scoring a frozen weight vector against one group.
#[derive(Debug, Clone, Serialize)]
pub struct HoldoutReport {
    pub group: i32,
    pub accuracy: Accuracy,
    pub micro: Prf,
    pub micro_counts: LabelStat,
    pub macro_average: Prf,
    pub labels: Vec<LabelReport>,
    pub matrix: ConfusionMatrix,
}

impl HoldoutReport {
    pub fn log(&self) {
        log::info!("{}", self.accuracy);
        if !self.labels.is_empty() {
            log::info!("Performance by label (#match, #model, #ref) (precision, recall, F1):");
            for l in &self.labels {
                log::info!(
                    "    {}: ({}, {}, {}) ({:.4}, {:.4}, {:.4})",
                    l.label,
                    l.stat.num_match,
                    l.stat.num_prediction,
                    l.stat.num_reference,
                    l.scores.precision,
                    l.scores.recall,
                    l.scores.f1
                );
            }
        }
        log::info!(
            "Micro P, R, F1: {:.4} ({}/{}), {:.4} ({}/{}), {:.4}",
            self.micro.precision,
            self.micro_counts.num_match,
            self.micro_counts.num_prediction,
            self.micro.recall,
            self.micro_counts.num_match,
            self.micro_counts.num_reference,
            self.micro.f1
        );
        log::info!(
            "Macro P, R, F1: {:.4}, {:.4}, {:.4}",
            self.macro_average.precision,
            self.macro_average.recall,
            self.macro_average.f1
        );
    }
}

/// Scores every instance of `group` with `weights` and tallies the results.
///
/// Instances without a true candidate count as errors and are left out of
/// the confusion matrix.
pub fn evaluate(data: &Dataset, weights: ArrayView1<f64>, group: i32) -> HoldoutReport {
    let num_labels = data.num_labels();
    let mut acc = Accuracy::new();
    let mut matrix = ConfusionMatrix::new(num_labels);
    let mut cls = LinearClassifier::new(weights.view(), data.features());

    for inst in data.iter().filter(|inst| inst.group == group) {
        if !cls.classify(inst, num_labels, false) {
            acc.set(false);
            continue;
        }
        let argmax = cls.argmax();
        let truth = inst.true_index(num_labels);
        acc.set(truth == Some(argmax));
        if let Some(t) = truth {
            let (p, r) = (cls.label(argmax), cls.label(t));
            if p < num_labels && r < num_labels {
                matrix.add(p, r);
            }
        }
    }

    let precall = matrix.to_precall();
    let positives = data.positive_labels();
    let (micro, micro_counts) = precall.micro(positives);
    let labels = positives
        .iter()
        .map(|&l| LabelReport {
            label: data.labels.resolve(l).unwrap_or("<unknown>").to_string(),
            stat: precall.stat(l),
            scores: precall.scores(l),
        })
        .collect();

    HoldoutReport {
        group,
        accuracy: acc,
        micro,
        micro_counts,
        macro_average: precall.macro_average(positives),
        labels,
        matrix,
    }
}
