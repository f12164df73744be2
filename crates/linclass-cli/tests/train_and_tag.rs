use std::fs;
use std::path::Path;

use linclass::config::{Algorithm, Regularization};
use linclass::data_handling::TaskKind;
use linclass_cli::build_cli;
use linclass_cli::tag::{run_tagging, TagArgs};
use linclass_cli::train::{run_training, TrainArgs, TrainReport};
use tempfile::tempdir;

const WEATHER: &str = "\
# label\tattributes
sunny\ttemp=hot\thumid=low\twind=no
sunny\ttemp=mild\thumid=low\twind=no
rainy\ttemp=mild\thumid=high\twind=yes
rainy\ttemp=cold\thumid=high\twind=yes
cloudy\ttemp=mild\thumid=mid\twind=no
cloudy\ttemp=cold\thumid=mid\twind=no
";

fn train_args(args: &[&str]) -> TrainArgs {
    let mut argv = vec!["linclass", "train"];
    argv.extend_from_slice(args);
    let matches = build_cli().try_get_matches_from(argv).unwrap();
    let (_, sub) = matches.subcommand().unwrap();
    TrainArgs::from_arguments(sub).unwrap()
}

fn write(path: &Path, text: &str) {
    fs::write(path, text).unwrap();
}

#[test]
fn flags_override_the_config_file() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("train.txt");
    let config = dir.path().join("config.json");
    write(&data, WEATHER);
    write(
        &config,
        r#"{"task": "multiclass", "algorithm": "averaged_perceptron", "sigma": 2.0}"#,
    );

    let args = train_args(&[
        data.to_str().unwrap(),
        "--config",
        config.to_str().unwrap(),
        "--algorithm",
        "maxent",
        "--set",
        "regularization=L1",
        "--set",
        "lbfgs.max_iterations=50",
        "--negative",
        "cloudy",
    ]);
    assert_eq!(args.config.task, TaskKind::Multiclass);
    assert_eq!(args.config.algorithm, Algorithm::MaxEnt);
    assert_eq!(args.config.sigma, 2.0);
    assert_eq!(args.config.regularization, Regularization::L1);
    assert_eq!(args.config.lbfgs.max_iterations, 50);
    assert_eq!(args.config.negative_labels, vec!["cloudy".to_string()]);
}

#[test]
fn unknown_parameter_is_rejected_before_reading() {
    let matches = build_cli()
        .try_get_matches_from(["linclass", "train", "--set", "lbfgs.bogus=1"])
        .unwrap();
    let (_, sub) = matches.subcommand().unwrap();
    assert!(TrainArgs::from_arguments(sub).is_err());
}

#[test]
fn missing_file_is_an_error() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nope.txt");
    let matches = build_cli()
        .try_get_matches_from(["linclass", "train", missing.to_str().unwrap()])
        .unwrap();
    let (_, sub) = matches.subcommand().unwrap();
    assert!(TrainArgs::from_arguments(sub).is_err());
}

#[test]
fn trained_model_is_tagged_from_disk() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("train.txt");
    let model = dir.path().join("model.txt");
    write(&data, WEATHER);

    let args = train_args(&[
        data.to_str().unwrap(),
        "--task",
        "multi",
        "--bias",
        "1",
        "--model",
        model.to_str().unwrap(),
    ]);
    match run_training(&args).unwrap() {
        TrainReport::Model { num_active, holdout } => {
            assert!(num_active > 0);
            assert!(holdout.is_none());
        }
        other => panic!("unexpected report {:?}", other),
    }
    let header = fs::read_to_string(&model).unwrap();
    assert!(header.starts_with("@linclass\tlinear\tmulti\tattribute-label\n"));

    let matches = build_cli()
        .try_get_matches_from([
            "linclass",
            "tag",
            "--model",
            model.to_str().unwrap(),
            "--bias",
            "1",
            data.to_str().unwrap(),
        ])
        .unwrap();
    let (_, sub) = matches.subcommand().unwrap();
    let reports = run_tagging(&TagArgs::from_arguments(sub).unwrap()).unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].accuracy.total(), 6);
    assert_eq!(reports[0].accuracy.matches(), 6);
}

#[test]
fn cross_validation_over_split_groups() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("train.txt");
    let mut text = String::new();
    for i in 0..9 {
        // Class i / 3, group i % 3: every fold sees every class.
        text.push_str(if i / 3 == 0 {
            "A\ta\tx\n"
        } else if i / 3 == 1 {
            "B\tb\tx\n"
        } else {
            "C\tc\tx\n"
        });
    }
    write(&data, &text);

    let args = train_args(&[
        data.to_str().unwrap(),
        "--task",
        "multiclass",
        "--split",
        "3",
        "--cross-validate",
    ]);
    match run_training(&args).unwrap() {
        TrainReport::CrossValidation(cv) => {
            assert_eq!(cv.folds.len(), 3);
            assert!((cv.mean_accuracy - 1.0).abs() < 1e-12);
        }
        other => panic!("unexpected report {:?}", other),
    }
}

#[test]
fn cross_validation_needs_groups() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("train.txt");
    write(&data, "1\ta\n-1\tb\n");
    let args = train_args(&[data.to_str().unwrap(), "--cross-validate"]);
    assert!(run_training(&args).is_err());
}

#[test]
fn binary_holdout_reports_the_held_out_group() {
    let dir = tempdir().unwrap();
    let first = dir.path().join("a.txt");
    let second = dir.path().join("b.txt");
    write(&first, "+1\tgood\n-1\tbad\n+1\tgood\tx\n-1\tbad\tx\n");
    write(&second, "+1\tgood\n-1\tbad\n");

    let args = train_args(&[
        first.to_str().unwrap(),
        second.to_str().unwrap(),
        "--holdout",
        "1",
    ]);
    match run_training(&args).unwrap() {
        TrainReport::Model { holdout, .. } => {
            let report = holdout.expect("holdout report");
            assert_eq!(report.group, 1);
            assert_eq!(report.accuracy.total(), 2);
            assert_eq!(report.accuracy.matches(), 2);
        }
        other => panic!("unexpected report {:?}", other),
    }
}

#[test]
fn negative_labels_accept_spaces() {
    let args = train_args(&["--negative", "cloudy rainy"]);
    assert_eq!(
        args.config.negative_labels,
        vec!["cloudy".to_string(), "rainy".to_string()]
    );
}

#[test]
fn invalid_filter_fails_the_run() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("train.txt");
    write(&data, WEATHER);
    let args = train_args(&[data.to_str().unwrap(), "--task", "multi", "--filter", "temp=("]);
    let err = run_training(&args).unwrap_err();
    assert!(format!("{:#}", err).contains("filter"), "{:#}", err);
}
