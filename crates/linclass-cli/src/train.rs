//! The `train` subcommand.
use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::ArgMatches;

use linclass::config::{Algorithm, TrainConfig};
use linclass::cross_validation::{cross_validate, CrossValidation};
use linclass::data_handling::{Dataset, TaskKind};
use linclass::evaluation::HoldoutReport;
use linclass::io::{read_files, read_source, save_model, ReadOptions};
use linclass::models::factory::build_trainer;

use crate::util::{load_train_config, split_labels, validate_input_files};

/// Everything a training run needs, after merging the config file and the flags.
#[derive(Debug, Clone)]
pub struct TrainArgs {
    /// Data files; standard input when empty.
    pub files: Vec<PathBuf>,
    pub model: Option<PathBuf>,
    pub filter: Option<String>,
    pub config: TrainConfig,
}

impl TrainArgs {
    /// Config file first, then explicit flags, then `--set name=value` overrides.
    pub fn from_arguments(matches: &ArgMatches) -> Result<Self> {
        let mut config = match matches.get_one::<PathBuf>("config") {
            Some(path) => load_train_config(path)?,
            None => TrainConfig::default(),
        };

        if let Some(task) = matches.get_one::<String>("task") {
            config.task = task.parse::<TaskKind>()?;
        }
        if let Some(algorithm) = matches.get_one::<String>("algorithm") {
            config.algorithm = algorithm.parse::<Algorithm>()?;
        }
        if let Some(negative) = matches.get_one::<String>("negative") {
            config.negative_labels = split_labels(negative);
        }
        if let Some(&bias) = matches.get_one::<f64>("bias") {
            config.bias = bias;
        }
        if let Some(&split) = matches.get_one::<usize>("split") {
            config.split = split;
        }
        if let Some(&holdout) = matches.get_one::<i32>("holdout") {
            config.holdout = Some(holdout);
        }
        if matches.get_flag("cross_validate") {
            config.cross_validation = true;
        }
        if matches.get_flag("dense") {
            config.dense = true;
        }
        if matches.get_flag("parallel") {
            config.parallel = true;
        }
        let overrides: Vec<&String> = matches
            .get_many::<String>("set")
            .map(|values| values.collect())
            .unwrap_or_default();
        config.apply_overrides(&overrides)?;

        let files: Vec<PathBuf> = matches
            .get_many::<PathBuf>("files")
            .map(|values| values.cloned().collect())
            .unwrap_or_default();
        validate_input_files(&files)?;

        Ok(TrainArgs {
            files,
            model: matches.get_one::<PathBuf>("model").cloned(),
            filter: matches.get_one::<String>("filter").cloned(),
            config,
        })
    }
}

/// What a training run produced.
#[derive(Debug)]
pub enum TrainReport {
    Model {
        holdout: Option<HoldoutReport>,
        num_active: usize,
    },
    CrossValidation(CrossValidation),
}

fn read_dataset(args: &TrainArgs) -> Result<Dataset> {
    let config = &args.config;
    let options = ReadOptions {
        bias: config.bias,
        filter: args.filter.clone(),
    };
    let mut data = Dataset::new(config.task);
    data.set_dense(config.dense);
    if args.files.is_empty() {
        log::info!("Reading the data set from STDIN");
        let n = read_source(&mut data, io::stdin().lock(), 0, &options)?;
        log::info!("{} instances read from STDIN", n);
    } else {
        read_files(&mut data, &args.files, &options)?;
    }
    if config.split > 0 {
        data.split_round_robin(config.split);
    }
    data.finalize(&config.negative_labels);
    Ok(data)
}

pub fn run_training(args: &TrainArgs) -> Result<TrainReport> {
    let config = &args.config;
    let data = read_dataset(args)?;
    if data.is_empty() {
        anyhow::bail!("No instance in the data set");
    }
    let trainer = build_trainer(config);

    if config.cross_validation {
        let n_folds = if config.split > 0 {
            config.split
        } else {
            data.groups().len()
        };
        if n_folds < 2 {
            anyhow::bail!("Cross validation needs at least two groups; use --split or several files");
        }
        let cv = cross_validate(&data, trainer.as_ref(), n_folds)?;
        cv.log();
        return Ok(TrainReport::CrossValidation(cv));
    }

    let outcome = trainer.fit(&data, config.holdout)?;
    log::info!(
        "Training finished after {} iterations; {} active features",
        outcome.iterations,
        outcome.num_active()
    );
    if let Some(status) = &outcome.status {
        log::info!("Solver status: {:?}", status);
    }

    if let Some(path) = &args.model {
        log::info!("Storing the model to {}", path.display());
        save_model(path, &data, outcome.weights.view())
            .with_context(|| format!("Failed to write model: {}", path.display()))?;
    }

    Ok(TrainReport::Model {
        num_active: outcome.num_active(),
        holdout: outcome.holdout,
    })
}
