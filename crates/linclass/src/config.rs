use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::data_handling::TaskKind;
use crate::error::{ClassifierError, Result};

/// Central configuration of a training run.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TrainConfig {
    pub task: TaskKind,
    pub algorithm: Algorithm,
    pub regularization: Regularization,
    pub sigma: f64,
    /// Value of the bias attribute; `0.0` disables it.
    pub bias: f64,
    /// Generate every attribute x label pair for expanded feature spaces.
    pub dense: bool,
    pub negative_labels: Vec<String>,
    /// Number of round-robin groups; `0` keeps the groups assigned while reading.
    pub split: usize,
    pub holdout: Option<i32>,
    pub cross_validation: bool,
    /// Fan the objective sweep of the batch trainer out over rayon.
    pub parallel: bool,
    pub lbfgs: LbfgsParams,
    pub online: OnlineParams,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            task: TaskKind::Binary,
            algorithm: Algorithm::MaxEnt,
            regularization: Regularization::L2,
            sigma: 5.0,
            bias: 0.0,
            dense: false,
            negative_labels: vec!["-1".to_string(), "O".to_string()],
            split: 0,
            holdout: None,
            cross_validation: false,
            parallel: false,
            lbfgs: LbfgsParams::default(),
            online: OnlineParams::default(),
        }
    }
}

/// Solver settings of the batch trainer.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LbfgsParams {
    pub num_memories: usize,
    pub epsilon: f64,
    /// Length of the window used by the delta stopping test; `0` disables it.
    pub stop: usize,
    pub delta: f64,
    /// `0` means no limit.
    pub max_iterations: usize,
    pub linesearch: LineSearch,
    pub max_linesearch: usize,
}

impl Default for LbfgsParams {
    fn default() -> Self {
        LbfgsParams {
            num_memories: 6,
            epsilon: 1e-5,
            stop: 10,
            delta: 1e-5,
            max_iterations: 0,
            linesearch: LineSearch::MoreThuente,
            max_linesearch: 20,
        }
    }
}

/// Settings shared by the online schedulers.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct OnlineParams {
    pub max_epochs: usize,
    pub shuffle: bool,
    pub seed: u64,
    /// Initial learning rate of the truncated gradient schedule.
    pub eta: f64,
    /// Number of instances between two truncation steps.
    pub period: usize,
    /// Only weights with `|w| <= theta` are truncated.
    pub theta: f64,
}

impl Default for OnlineParams {
    fn default() -> Self {
        OnlineParams {
            max_epochs: 100,
            shuffle: false,
            seed: 0,
            eta: 0.1,
            period: 10,
            theta: f64::MAX,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Regularization {
    None,
    L1,
    L2,
}

impl FromStr for Regularization {
    type Err = ClassifierError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "" | "none" | "no" => Ok(Regularization::None),
            "l1" => Ok(Regularization::L1),
            "l2" => Ok(Regularization::L2),
            _ => Err(invalid("regularization", s)),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSearch {
    MoreThuente,
    Backtracking,
}

impl FromStr for LineSearch {
    type Err = ClassifierError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "morethuente" | "more_thuente" => Ok(LineSearch::MoreThuente),
            "backtracking" | "armijo" => Ok(LineSearch::Backtracking),
            _ => Err(invalid("lbfgs.linesearch", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loss {
    Logistic,
    Hinge,
}

/// Training algorithms, named `<optimizer>.<loss>` on the command line.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(try_from = "String", into = "String")]
pub enum Algorithm {
    MaxEnt,
    AveragedPerceptron,
    Pegasos(Loss),
    TruncatedGradient(Loss),
}

impl Algorithm {
    pub fn is_online(&self) -> bool {
        !matches!(self, Algorithm::MaxEnt)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Algorithm::MaxEnt => "lbfgs.logistic",
            Algorithm::AveragedPerceptron => "averaged_perceptron",
            Algorithm::Pegasos(Loss::Logistic) => "pegasos.logistic",
            Algorithm::Pegasos(Loss::Hinge) => "pegasos.hinge",
            Algorithm::TruncatedGradient(Loss::Logistic) => "truncated_gradient.logistic",
            Algorithm::TruncatedGradient(Loss::Hinge) => "truncated_gradient.hinge",
        };
        f.write_str(name)
    }
}

impl FromStr for Algorithm {
    type Err = ClassifierError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "maxent" | "lbfgs" | "lbfgs.logistic" => Ok(Algorithm::MaxEnt),
            "averaged_perceptron" | "perceptron" => Ok(Algorithm::AveragedPerceptron),
            "pegasos.logistic" => Ok(Algorithm::Pegasos(Loss::Logistic)),
            "pegasos.hinge" => Ok(Algorithm::Pegasos(Loss::Hinge)),
            "truncated_gradient.logistic" => Ok(Algorithm::TruncatedGradient(Loss::Logistic)),
            "truncated_gradient.hinge" => Ok(Algorithm::TruncatedGradient(Loss::Hinge)),
            _ => Err(ClassifierError::UnknownAlgorithm(s.to_string())),
        }
    }
}

impl TryFrom<String> for Algorithm {
    type Error = ClassifierError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Algorithm> for String {
    fn from(a: Algorithm) -> String {
        a.to_string()
    }
}

fn invalid(name: &str, value: &str) -> ClassifierError {
    ClassifierError::InvalidParameter {
        name: name.to_string(),
        value: value.to_string(),
    }
}

fn parse_value<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| invalid(name, value))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(name, value)),
    }
}

impl TrainConfig {
    pub fn new(task: TaskKind, algorithm: Algorithm) -> Self {
        TrainConfig {
            task,
            algorithm,
            ..Default::default()
        }
    }

    /// Overrides one named parameter, e.g. `set_param("lbfgs.num_memories", "10")`.
    pub fn set_param(&mut self, name: &str, value: &str) -> Result<()> {
        match name {
            "regularization" => self.regularization = value.parse()?,
            "regularization.sigma" => {
                let sigma: f64 = parse_value(name, value)?;
                if !(sigma > 0.0) {
                    return Err(invalid(name, value));
                }
                self.sigma = sigma;
            }
            "lbfgs.num_memories" => self.lbfgs.num_memories = parse_value(name, value)?,
            "lbfgs.epsilon" => self.lbfgs.epsilon = parse_value(name, value)?,
            "lbfgs.stop" => self.lbfgs.stop = parse_value(name, value)?,
            "lbfgs.delta" => self.lbfgs.delta = parse_value(name, value)?,
            "lbfgs.max_iterations" => self.lbfgs.max_iterations = parse_value(name, value)?,
            "lbfgs.linesearch" => self.lbfgs.linesearch = value.parse()?,
            "lbfgs.max_linesearch" => self.lbfgs.max_linesearch = parse_value(name, value)?,
            "online.max_epochs" => self.online.max_epochs = parse_value(name, value)?,
            "online.shuffle" => self.online.shuffle = parse_bool(name, value)?,
            "online.seed" => self.online.seed = parse_value(name, value)?,
            "online.eta" => self.online.eta = parse_value(name, value)?,
            "truncate.period" => {
                let period: usize = parse_value(name, value)?;
                if period == 0 {
                    return Err(invalid(name, value));
                }
                self.online.period = period;
            }
            "truncate.theta" => self.online.theta = parse_value(name, value)?,
            "parallel" => self.parallel = parse_bool(name, value)?,
            _ => return Err(invalid(name, value)),
        }
        Ok(())
    }

    /// Applies `name=value` overrides in order.
    pub fn apply_overrides<S: AsRef<str>>(&mut self, overrides: &[S]) -> Result<()> {
        for item in overrides {
            let item = item.as_ref();
            let (name, value) = item.split_once('=').ok_or_else(|| invalid(item, ""))?;
            self.set_param(name.trim(), value)?;
        }
        Ok(())
    }

    /// Line search actually used by the solver; L1 needs the orthant-wise backtracking.
    pub fn effective_linesearch(&self) -> LineSearch {
        if self.regularization == Regularization::L1 {
            LineSearch::Backtracking
        } else {
            self.lbfgs.linesearch
        }
    }

    /// Coefficients `(c1, c2)` of the L1 and L2 terms derived from `sigma`.
    pub fn regularization_coefficients(&self) -> (f64, f64) {
        match self.regularization {
            Regularization::None => (0.0, 0.0),
            Regularization::L1 => (1.0 / self.sigma, 0.0),
            Regularization::L2 => (0.0, 1.0 / (self.sigma * self.sigma)),
        }
    }

    /// Logs every parameter the chosen algorithm consumes.
    pub fn log_parameters(&self) {
        log::info!("Task: {}", self.task);
        log::info!("Algorithm: {}", self.algorithm);
        log::info!("regularization: {:?}", self.regularization);
        log::info!("regularization.sigma: {}", self.sigma);
        if self.algorithm.is_online() {
            log::info!("online.max_epochs: {}", self.online.max_epochs);
            log::info!("online.shuffle: {}", self.online.shuffle);
            log::info!("online.seed: {}", self.online.seed);
            if matches!(self.algorithm, Algorithm::TruncatedGradient(_)) {
                log::info!("online.eta: {}", self.online.eta);
                log::info!("truncate.period: {}", self.online.period);
                log::info!("truncate.theta: {}", self.online.theta);
            }
        } else {
            let p = &self.lbfgs;
            log::info!("lbfgs.num_memories: {}", p.num_memories);
            log::info!("lbfgs.epsilon: {}", p.epsilon);
            log::info!("lbfgs.stop: {}", p.stop);
            log::info!("lbfgs.delta: {}", p.delta);
            log::info!("lbfgs.max_iterations: {}", p.max_iterations);
            log::info!("lbfgs.linesearch: {:?}", self.effective_linesearch());
            log::info!("lbfgs.max_linesearch: {}", p.max_linesearch);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn algorithm_names_round_trip() {
        for name in [
            "lbfgs.logistic",
            "averaged_perceptron",
            "pegasos.logistic",
            "pegasos.hinge",
            "truncated_gradient.logistic",
            "truncated_gradient.hinge",
        ] {
            let algo: Algorithm = name.parse().unwrap();
            assert_eq!(algo.to_string(), name);
        }
        assert_eq!("maxent".parse::<Algorithm>().unwrap(), Algorithm::MaxEnt);
        assert!(matches!(
            "svm".parse::<Algorithm>(),
            Err(ClassifierError::UnknownAlgorithm(_))
        ));
    }

    #[test]
    fn set_param_updates_and_rejects() {
        let mut cfg = TrainConfig::default();
        cfg.set_param("lbfgs.num_memories", "10").unwrap();
        cfg.set_param("regularization", "L1").unwrap();
        cfg.set_param("online.shuffle", "true").unwrap();
        assert_eq!(cfg.lbfgs.num_memories, 10);
        assert_eq!(cfg.regularization, Regularization::L1);
        assert!(cfg.online.shuffle);
        assert_eq!(cfg.effective_linesearch(), LineSearch::Backtracking);

        assert!(cfg.set_param("lbfgs.epsilon", "tiny").is_err());
        assert!(cfg.set_param("no.such.param", "1").is_err());
        assert!(cfg.set_param("regularization.sigma", "-1").is_err());
    }

    #[test]
    fn regularization_coefficients_follow_sigma() {
        let mut cfg = TrainConfig::default();
        cfg.sigma = 2.0;
        assert_eq!(cfg.regularization_coefficients(), (0.0, 0.25));
        cfg.regularization = Regularization::L1;
        assert_eq!(cfg.regularization_coefficients(), (0.5, 0.0));
    }

    #[test]
    fn json_config_fills_missing_fields_with_defaults() {
        let cfg: TrainConfig = serde_json::from_str(
            r#"{"task": "ranking", "algorithm": "pegasos.hinge", "regularization": "l1", "lbfgs": {"num_memories": 3}}"#,
        )
        .unwrap();
        assert_eq!(cfg.task, TaskKind::Ranking);
        assert_eq!(cfg.algorithm, Algorithm::Pegasos(Loss::Hinge));
        assert_eq!(cfg.regularization, Regularization::L1);
        assert_eq!(cfg.lbfgs.num_memories, 3);
        assert_eq!(cfg.lbfgs.epsilon, LbfgsParams::default().epsilon);
        assert_eq!(cfg.sigma, 5.0);

        let json = serde_json::to_string(&cfg).unwrap();
        let back: TrainConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);

        assert!(serde_json::from_str::<TrainConfig>(r#"{"algorithm": "svm"}"#).is_err());
    }
}
