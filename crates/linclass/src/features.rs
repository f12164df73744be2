//! Mapping from (attribute, label) pairs to feature ids.
use std::collections::HashMap;

/// How attributes of a candidate turn into weight-vector indices.
#[derive(Debug, Clone)]
pub enum FeatureSpace {
    /// Features are the attributes themselves (binary and ranking tasks).
    Identity { num_attributes: usize },
    /// Every generated (attribute, label) pair owns one feature id.
    Expanded {
        forward: HashMap<(usize, usize), usize>,
        backward: Vec<(usize, usize)>,
    },
}

impl FeatureSpace {
    pub fn identity(num_attributes: usize) -> Self {
        FeatureSpace::Identity { num_attributes }
    }

    pub fn expanded() -> Self {
        FeatureSpace::Expanded {
            forward: HashMap::new(),
            backward: Vec::new(),
        }
    }

    /// Name written into model headers.
    pub fn name(&self) -> &'static str {
        match self {
            FeatureSpace::Identity { .. } => "attribute",
            FeatureSpace::Expanded { .. } => "attribute-label",
        }
    }

    pub fn is_expanded(&self) -> bool {
        matches!(self, FeatureSpace::Expanded { .. })
    }

    /// Feature id for `attr` under `label`, or `None` if no such feature exists.
    #[inline]
    pub fn forward(&self, attr: usize, label: usize) -> Option<usize> {
        match self {
            FeatureSpace::Identity { num_attributes } => {
                if attr < *num_attributes {
                    Some(attr)
                } else {
                    None
                }
            }
            FeatureSpace::Expanded { forward, .. } => forward.get(&(attr, label)).copied(),
        }
    }

    /// Decomposes a feature id into its attribute and, for expanded spaces, its label.
    pub fn backward(&self, fid: usize) -> Option<(usize, Option<usize>)> {
        match self {
            FeatureSpace::Identity { num_attributes } => {
                if fid < *num_attributes {
                    Some((fid, None))
                } else {
                    None
                }
            }
            FeatureSpace::Expanded { backward, .. } => {
                backward.get(fid).map(|&(a, l)| (a, Some(l)))
            }
        }
    }

    /// Returns the feature id for the pair, creating it if necessary.
    pub fn assign(&mut self, attr: usize, label: usize) -> usize {
        match self {
            FeatureSpace::Identity { num_attributes } => {
                if attr >= *num_attributes {
                    *num_attributes = attr + 1;
                }
                attr
            }
            FeatureSpace::Expanded { forward, backward } => {
                *forward.entry((attr, label)).or_insert_with(|| {
                    backward.push((attr, label));
                    backward.len() - 1
                })
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            FeatureSpace::Identity { num_attributes } => *num_attributes,
            FeatureSpace::Expanded { backward, .. } => backward.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
