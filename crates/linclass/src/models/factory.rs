use crate::config::{Algorithm, TrainConfig};
use crate::train::{
    AveragedPerceptron, MaxEntTrainer, OnlineScheduler, PostStep, Subgradient, Trainer,
};

/// Build a boxed trainer from a `TrainConfig`.
pub fn build_trainer(config: &TrainConfig) -> Box<dyn Trainer> {
    let online = config.online.clone();
    match config.algorithm {
        Algorithm::MaxEnt => Box::new(MaxEntTrainer::new(config.clone())),
        Algorithm::AveragedPerceptron => {
            Box::new(OnlineScheduler::new(AveragedPerceptron::new(), online))
        }
        Algorithm::Pegasos(loss) => Box::new(OnlineScheduler::new(
            Subgradient::new(loss, PostStep::Projection, config),
            online,
        )),
        Algorithm::TruncatedGradient(loss) => Box::new(OnlineScheduler::new(
            Subgradient::new(loss, PostStep::Truncation, config),
            online,
        )),
    }
}
