//! The `tag` subcommand: applies a stored model to labelled data.
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::ArgMatches;

use linclass::data_handling::{Dataset, TaskKind};
use linclass::evaluation::{evaluate, HoldoutReport};
use linclass::io::{load_model, read_files, ReadOptions};

use crate::util::{split_labels, validate_input_files};

#[derive(Debug, Clone)]
pub struct TagArgs {
    pub model: PathBuf,
    pub files: Vec<PathBuf>,
    /// Task to apply the model to; inferred from the model header when absent.
    pub task: Option<TaskKind>,
    /// Must match the bias used for training.
    pub bias: f64,
    pub negative_labels: Vec<String>,
    pub filter: Option<String>,
}

impl TagArgs {
    pub fn from_arguments(matches: &ArgMatches) -> Result<Self> {
        let model = matches
            .get_one::<PathBuf>("model")
            .cloned()
            .context("--model is required")?;
        let files: Vec<PathBuf> = matches
            .get_many::<PathBuf>("files")
            .map(|values| values.cloned().collect())
            .unwrap_or_default();
        if files.is_empty() {
            anyhow::bail!("No data file to tag");
        }
        validate_input_files(&files)?;

        let task = matches
            .get_one::<String>("task")
            .map(|t| t.parse::<TaskKind>())
            .transpose()?;
        let negative_labels = matches
            .get_one::<String>("negative")
            .map(|n| split_labels(n))
            .unwrap_or_else(|| vec!["-1".to_string(), "O".to_string()]);

        Ok(TagArgs {
            model,
            files,
            task,
            bias: matches.get_one::<f64>("bias").copied().unwrap_or(0.0),
            negative_labels,
            filter: matches.get_one::<String>("filter").cloned(),
        })
    }
}

/// Evaluates the model on every file; one report per file, in order.
pub fn run_tagging(args: &TagArgs) -> Result<Vec<HoldoutReport>> {
    let model = load_model(&args.model)
        .with_context(|| format!("Failed to load model: {}", args.model.display()))?;
    let task = args.task.unwrap_or_else(|| model.default_task());
    let (mut data, weights) =
        Dataset::frozen_from_model(&model, task, args.bias, &args.negative_labels)?;

    let options = ReadOptions {
        bias: args.bias,
        filter: args.filter.clone(),
    };
    read_files(&mut data, &args.files, &options)?;

    let reports: Vec<HoldoutReport> = (0..args.files.len() as i32)
        .map(|group| evaluate(&data, weights.view(), group))
        .collect();
    for (path, report) in args.files.iter().zip(&reports) {
        log::info!("===== Evaluation on {} =====", path.display());
        report.log();
    }
    Ok(reports)
}
