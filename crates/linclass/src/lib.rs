//! linclass: linear classifiers trained from sparse, tab-separated feature data.
//!
//! This crate provides the string interner, the sparse data model with
//! attribute x label feature expansion, a softmax scorer, a maximum-entropy
//! trainer driven by L-BFGS (with OWL-QN for L1), online schedulers (averaged
//! perceptron, Pegasos, truncated gradient) and the evaluation harness used for
//! holdout and cross-validation.
//!
//! Binary, multiclass, selection and ranking tasks all present their instances
//! as candidate lists, so every trainer works on every task.
pub mod config;
pub mod cross_validation;
pub mod data_handling;
pub mod error;
pub mod evaluation;
pub mod features;
pub mod io;
pub mod models;
pub mod quark;
pub mod train;

pub use error::{ClassifierError, Result};
