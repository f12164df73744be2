//! Sparse instances and the dataset that owns them.
//!
//! Every task is presented to the classifier and the trainers as a list of
//! candidates per instance. A binary instance becomes two candidates (a
//! featureless negative one and the positive one carrying the features), a
//! multiclass instance gets one candidate per label sharing its attribute
//! vector, a selection instance one candidate per allowed label, and a ranking
//! instance stores its candidates explicitly.
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ClassifierError, Result};
use crate::features::FeatureSpace;
use crate::quark::Quark;

/// Name of the synthetic attribute injected when a bias term is requested.
pub const BIAS_ATTRIBUTE: &str = "__BIAS__";

/// Group of instances that belong to no fold.
pub const UNASSIGNED_GROUP: i32 = -1;

/// Label id of a candidate whose label is unknown to a frozen label table.
/// No feature is ever generated for it.
pub const UNKNOWN_LABEL: usize = usize::MAX;

/// Label ids of the binary task.
pub const NEGATIVE_LABEL: usize = 0;
pub const POSITIVE_LABEL: usize = 1;

static EMPTY: SparseVector = SparseVector(Vec::new());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Binary,
    Multiclass,
    Selection,
    Ranking,
}

impl FromStr for TaskKind {
    type Err = ClassifierError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "b" | "binary" => Ok(TaskKind::Binary),
            "m" | "multi" | "multiclass" => Ok(TaskKind::Multiclass),
            "s" | "selection" => Ok(TaskKind::Selection),
            "r" | "ranking" => Ok(TaskKind::Ranking),
            _ => Err(ClassifierError::UnknownTask(s.to_string())),
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            TaskKind::Binary => "binary",
            TaskKind::Multiclass => "multiclass",
            TaskKind::Selection => "selection",
            TaskKind::Ranking => "ranking",
        };
        f.write_str(name)
    }
}

/// Ordered `(id, value)` pairs. Repeated ids are legal and add up when scored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseVector(Vec<(usize, f64)>);

impl SparseVector {
    pub fn new() -> Self {
        SparseVector(Vec::new())
    }

    pub fn push(&mut self, id: usize, value: f64) {
        self.0.push((id, value));
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(usize, f64)> {
        self.0.iter()
    }
}

impl From<Vec<(usize, f64)>> for SparseVector {
    fn from(pairs: Vec<(usize, f64)>) -> Self {
        SparseVector(pairs)
    }
}

impl FromIterator<(usize, f64)> for SparseVector {
    fn from_iter<I: IntoIterator<Item = (usize, f64)>>(iter: I) -> Self {
        SparseVector(iter.into_iter().collect())
    }
}

/// A stored ranking candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub label: usize,
    pub attributes: SparseVector,
    pub truth: bool,
}

/// A borrowed view of one candidate of an instance.
#[derive(Debug, Clone, Copy)]
pub struct CandidateRef<'a> {
    pub label: usize,
    pub attributes: &'a SparseVector,
    pub truth: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstanceBody {
    Binary {
        label: bool,
        features: SparseVector,
    },
    /// `label` is `None` when the reference label is unknown to a frozen label table.
    /// `candidates` restricts the label set for selection instances.
    Labeled {
        label: Option<usize>,
        attributes: SparseVector,
        candidates: Option<Vec<usize>>,
    },
    Ranked {
        candidates: Vec<Candidate>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub weight: f64,
    pub group: i32,
    pub body: InstanceBody,
}

impl Instance {
    fn with_body(body: InstanceBody) -> Self {
        Instance {
            weight: 1.0,
            group: 0,
            body,
        }
    }

    pub fn binary(label: bool, features: SparseVector) -> Self {
        Self::with_body(InstanceBody::Binary { label, features })
    }

    pub fn multiclass(label: Option<usize>, attributes: SparseVector) -> Self {
        Self::with_body(InstanceBody::Labeled {
            label,
            attributes,
            candidates: None,
        })
    }

    pub fn selection(label: Option<usize>, attributes: SparseVector, candidates: Vec<usize>) -> Self {
        Self::with_body(InstanceBody::Labeled {
            label,
            attributes,
            candidates: Some(candidates),
        })
    }

    pub fn ranked(candidates: Vec<Candidate>) -> Self {
        Self::with_body(InstanceBody::Ranked { candidates })
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_group(mut self, group: i32) -> Self {
        self.group = group;
        self
    }

    /// Number of candidates given the total label count of the dataset.
    pub fn num_candidates(&self, num_labels: usize) -> usize {
        match &self.body {
            InstanceBody::Binary { .. } => 2,
            InstanceBody::Labeled { candidates, .. } => {
                candidates.as_ref().map(|c| c.len()).unwrap_or(num_labels)
            }
            InstanceBody::Ranked { candidates } => candidates.len(),
        }
    }

    pub fn candidate(&self, i: usize, _num_labels: usize) -> CandidateRef<'_> {
        match &self.body {
            InstanceBody::Binary { label, features } => {
                if i == 0 {
                    CandidateRef {
                        label: NEGATIVE_LABEL,
                        attributes: &EMPTY,
                        truth: !*label,
                    }
                } else {
                    CandidateRef {
                        label: POSITIVE_LABEL,
                        attributes: features,
                        truth: *label,
                    }
                }
            }
            InstanceBody::Labeled {
                label,
                attributes,
                candidates,
            } => {
                let l = candidates.as_ref().map(|c| c[i]).unwrap_or(i);
                CandidateRef {
                    label: l,
                    attributes,
                    truth: *label == Some(l),
                }
            }
            InstanceBody::Ranked { candidates } => {
                let c = &candidates[i];
                CandidateRef {
                    label: c.label,
                    attributes: &c.attributes,
                    truth: c.truth,
                }
            }
        }
    }

    pub fn candidates(&self, num_labels: usize) -> impl Iterator<Item = CandidateRef<'_>> {
        (0..self.num_candidates(num_labels)).map(move |i| self.candidate(i, num_labels))
    }

    /// Index of the first true candidate.
    pub fn true_index(&self, num_labels: usize) -> Option<usize> {
        self.candidates(num_labels).position(|c| c.truth)
    }

    pub fn num_truths(&self, num_labels: usize) -> usize {
        self.candidates(num_labels).filter(|c| c.truth).count()
    }
}

/// Instances together with the tables needed to interpret them.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub kind: TaskKind,
    pub instances: Vec<Instance>,
    pub attributes: Quark,
    pub labels: Quark,
    features: FeatureSpace,
    positive_labels: Vec<usize>,
    user_feature_start: usize,
    bias: f64,
    dense: bool,
    finalized: bool,
}

impl Dataset {
    pub fn new(kind: TaskKind) -> Self {
        let mut labels = Quark::new();
        if kind == TaskKind::Binary {
            labels.intern("-1");
            labels.intern("+1");
        }
        let features = match kind {
            TaskKind::Multiclass | TaskKind::Selection => FeatureSpace::expanded(),
            TaskKind::Binary | TaskKind::Ranking => FeatureSpace::identity(0),
        };
        Dataset {
            kind,
            instances: Vec::new(),
            attributes: Quark::new(),
            labels,
            features,
            positive_labels: Vec::new(),
            user_feature_start: 0,
            bias: 0.0,
            dense: false,
            finalized: false,
        }
    }

    /// Builds a finalized, frozen skeleton whose tables come from a stored model.
    pub fn frozen(
        kind: TaskKind,
        attributes: Quark,
        labels: Quark,
        features: FeatureSpace,
        bias: f64,
        negative_labels: &[String],
    ) -> Self {
        let mut attributes = attributes;
        let mut labels = labels;
        attributes.freeze();
        labels.freeze();
        let mut data = Dataset {
            kind,
            instances: Vec::new(),
            attributes,
            labels,
            features,
            positive_labels: Vec::new(),
            user_feature_start: 0,
            bias,
            dense: false,
            finalized: true,
        };
        data.user_feature_start = data.bias_feature_count();
        data.positive_labels = data.compute_positive_labels(negative_labels);
        data
    }

    /// Generate every attribute x label pair instead of only the observed ones.
    pub fn set_dense(&mut self, dense: bool) {
        self.dense = dense;
    }

    /// Interns the bias attribute, which must become attribute #0.
    pub fn reserve_bias(&mut self, bias: f64) -> Result<()> {
        if bias == 0.0 {
            return Ok(());
        }
        match self.attributes.intern(BIAS_ATTRIBUTE) {
            Some(0) => {
                self.bias = bias;
                Ok(())
            }
            other => Err(ClassifierError::InvalidData {
                line: 0,
                message: format!(
                    "the bias attribute could not obtain #0 (got {:?})",
                    other
                ),
            }),
        }
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }

    pub fn push(&mut self, instance: Instance) {
        self.instances.push(instance);
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Instance> {
        self.instances.iter()
    }

    pub fn num_labels(&self) -> usize {
        self.labels.len()
    }

    pub fn num_features(&self) -> usize {
        self.features.len()
    }

    pub fn features(&self) -> &FeatureSpace {
        &self.features
    }

    pub fn positive_labels(&self) -> &[usize] {
        &self.positive_labels
    }

    /// Index of the first feature subject to regularization.
    pub fn user_feature_start(&self) -> usize {
        self.user_feature_start
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn require_finalized(&self) -> Result<()> {
        if self.finalized {
            Ok(())
        } else {
            Err(ClassifierError::NotFinalized)
        }
    }

    fn bias_feature_count(&self) -> usize {
        if self.bias == 0.0 {
            0
        } else if self.features.is_expanded() {
            self.labels.len()
        } else {
            1
        }
    }

    fn compute_positive_labels(&self, negative_labels: &[String]) -> Vec<usize> {
        let negatives: HashSet<&str> = negative_labels.iter().map(|s| s.as_str()).collect();
        self.labels
            .iter()
            .filter(|(_, name)| !negatives.contains(name))
            .map(|(id, _)| id)
            .collect()
    }

    /// Settles label counts, the feature space and the positive label set.
    ///
    /// Calling it again on a finalized dataset does nothing.
    pub fn finalize(&mut self, negative_labels: &[String]) {
        if self.finalized {
            log::debug!("Dataset already finalized; skipping");
            return;
        }

        let num_labels = self.labels.len();
        match self.kind {
            TaskKind::Binary | TaskKind::Ranking => {
                self.features = FeatureSpace::identity(self.attributes.len());
            }
            TaskKind::Multiclass | TaskKind::Selection => {
                let mut space = FeatureSpace::expanded();
                if self.bias != 0.0 {
                    for l in 0..num_labels {
                        space.assign(0, l);
                    }
                }
                for inst in &self.instances {
                    for cand in inst.candidates(num_labels) {
                        if self.dense || cand.truth {
                            for &(a, _) in cand.attributes.iter() {
                                space.assign(a, cand.label);
                            }
                        }
                    }
                }
                self.features = space;
            }
        }

        self.user_feature_start = self.bias_feature_count();
        self.positive_labels = self.compute_positive_labels(negative_labels);
        self.finalized = true;

        log::info!(
            "Finalized {} dataset: {} instances, {} attributes, {} labels, {} features",
            self.kind,
            self.instances.len(),
            self.attributes.len(),
            num_labels,
            self.features.len()
        );
    }

    /// Assigns group `i mod n` to the `i`-th instance.
    pub fn split_round_robin(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        let folds = crate::cross_validation::create_folds(self.instances.len(), n);
        for (inst, group) in self.instances.iter_mut().zip(folds) {
            inst.group = group;
        }
    }

    pub fn groups(&self) -> Vec<i32> {
        let mut groups: Vec<i32> = self.instances.iter().map(|i| i.group).collect();
        groups.sort_unstable();
        groups.dedup();
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_instance_exposes_two_candidates() {
        let inst = Instance::binary(true, SparseVector::from(vec![(0, 1.0), (2, 0.5)]));
        assert_eq!(inst.num_candidates(2), 2);
        let neg = inst.candidate(0, 2);
        let pos = inst.candidate(1, 2);
        assert!(neg.attributes.is_empty());
        assert!(!neg.truth);
        assert!(pos.truth);
        assert_eq!(pos.attributes.len(), 2);
        assert_eq!(inst.true_index(2), Some(1));
    }

    #[test]
    fn selection_instance_limits_candidates() {
        let inst = Instance::selection(Some(3), SparseVector::from(vec![(1, 1.0)]), vec![1, 3]);
        assert_eq!(inst.num_candidates(5), 2);
        let labels: Vec<usize> = inst.candidates(5).map(|c| c.label).collect();
        assert_eq!(labels, vec![1, 3]);
        assert_eq!(inst.true_index(5), Some(1));
    }

    #[test]
    fn bias_must_take_the_first_attribute_id() {
        let mut data = Dataset::new(TaskKind::Multiclass);
        data.attributes.intern("a").unwrap();
        match data.reserve_bias(1.0) {
            Err(ClassifierError::InvalidData { line, message }) => {
                assert_eq!(line, 0);
                assert!(message.contains("#0"), "{}", message);
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(data.bias(), 0.0);

        let mut data = Dataset::new(TaskKind::Multiclass);
        data.reserve_bias(1.0).unwrap();
        data.reserve_bias(1.0).unwrap();
        assert_eq!(data.attributes.lookup(BIAS_ATTRIBUTE), Some(0));
        assert_eq!(data.attributes.len(), 1);
        // Zero disables the bias and touches nothing.
        let mut data = Dataset::new(TaskKind::Multiclass);
        data.reserve_bias(0.0).unwrap();
        assert!(data.attributes.is_empty());
    }

    #[test]
    fn task_kind_parses_short_names() {
        assert_eq!("m".parse::<TaskKind>().unwrap(), TaskKind::Multiclass);
        assert_eq!("Binary".parse::<TaskKind>().unwrap(), TaskKind::Binary);
        assert!("tree".parse::<TaskKind>().is_err());
    }

    #[test]
    fn finalize_generates_observed_pairs_only() {
        let mut data = Dataset::new(TaskKind::Multiclass);
        let a = data.attributes.intern("a").unwrap();
        let b = data.attributes.intern("b").unwrap();
        let x = data.labels.intern("X").unwrap();
        let y = data.labels.intern("Y").unwrap();
        data.push(Instance::multiclass(Some(x), SparseVector::from(vec![(a, 1.0)])));
        data.push(Instance::multiclass(Some(y), SparseVector::from(vec![(a, 1.0), (b, 1.0)])));
        data.finalize(&[]);
        assert_eq!(data.num_features(), 3);
        assert!(data.features().forward(b, x).is_none());
        assert_eq!(data.positive_labels(), &[x, y]);
    }
}
