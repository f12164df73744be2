use std::path::PathBuf;

use clap::{Arg, ArgAction, Command, ValueHint};

pub mod tag;
pub mod train;
pub mod util;

fn files_arg(help: &'static str) -> Arg {
    Arg::new("files")
        .help(help)
        .num_args(0..)
        .value_parser(clap::value_parser!(PathBuf))
        .value_hint(ValueHint::FilePath)
}

fn task_arg() -> Arg {
    Arg::new("task")
        .short('t')
        .long("task")
        .help("Task type")
        .value_parser(["binary", "multi", "multiclass", "selection", "ranking"])
}

fn bias_arg() -> Arg {
    Arg::new("bias")
        .short('b')
        .long("bias")
        .help("Value of the bias attribute appended to every instance (0 disables it)")
        .value_parser(clap::value_parser!(f64))
}

fn negative_arg() -> Arg {
    Arg::new("negative")
        .short('n')
        .long("negative")
        .help("Labels excluded from precision/recall, separated by commas or spaces (default: -1,O)")
        .value_parser(clap::builder::NonEmptyStringValueParser::new())
}

fn filter_arg() -> Arg {
    Arg::new("filter")
        .short('f')
        .long("filter")
        .help("Keep only attributes whose name matches this regular expression")
        .value_parser(clap::builder::NonEmptyStringValueParser::new())
}

/// The `linclass` command line.
pub fn build_cli() -> Command {
    Command::new("linclass")
        .version(clap::crate_version!())
        .about("Train and evaluate linear classifiers on sparse textual features")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("train")
                .about("Train a model from tab-separated data files (STDIN when none is given)")
                .arg(files_arg("Training data files; file i becomes group i"))
                .arg(task_arg())
                .arg(
                    Arg::new("algorithm")
                        .short('a')
                        .long("algorithm")
                        .help("Training algorithm, e.g. maxent, averaged_perceptron, pegasos.hinge")
                        .value_parser(clap::builder::NonEmptyStringValueParser::new()),
                )
                .arg(
                    Arg::new("model")
                        .short('m')
                        .long("model")
                        .help("File the trained model is written to")
                        .value_parser(clap::value_parser!(PathBuf))
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .help("JSON training configuration; flags override its values")
                        .value_parser(clap::value_parser!(PathBuf))
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("set")
                        .short('p')
                        .long("set")
                        .help("Override a training parameter, e.g. --set lbfgs.max_iterations=50")
                        .action(ArgAction::Append)
                        .value_parser(clap::builder::NonEmptyStringValueParser::new()),
                )
                .arg(negative_arg())
                .arg(bias_arg())
                .arg(filter_arg())
                .arg(
                    Arg::new("split")
                        .short('g')
                        .long("split")
                        .help("Split the data into N groups round-robin")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    Arg::new("holdout")
                        .short('e')
                        .long("holdout")
                        .help("Group held out from training and used for evaluation")
                        .value_parser(clap::value_parser!(i32)),
                )
                .arg(
                    Arg::new("cross_validate")
                        .short('x')
                        .long("cross-validate")
                        .help("Run cross validation over every group")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("dense")
                        .long("dense")
                        .help("Generate every attribute x label feature")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("parallel")
                        .long("parallel")
                        .help("Spread the objective computation over all cores")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("tag")
                .about("Evaluate a stored model on labelled data")
                .arg(
                    Arg::new("model")
                        .short('m')
                        .long("model")
                        .help("Model file written by `linclass train`")
                        .required(true)
                        .value_parser(clap::value_parser!(PathBuf))
                        .value_hint(ValueHint::FilePath),
                )
                .arg(files_arg("Labelled data files"))
                .arg(task_arg())
                .arg(bias_arg())
                .arg(negative_arg())
                .arg(filter_arg()),
        )
}
