use anyhow::Result;
use chrono::Local;
use log::LevelFilter;

use linclass_cli::build_cli;
use linclass_cli::tag::{run_tagging, TagArgs};
use linclass_cli::train::{run_training, TrainArgs};

fn main() -> Result<()> {
    env_logger::Builder::default()
        .filter_level(LevelFilter::Info)
        .parse_env(env_logger::Env::default().filter_or("LINCLASS_LOG", "info"))
        .init();

    let matches = build_cli().get_matches();
    let start = Local::now();
    log::info!("Start time: {}", start.format("%Y-%m-%d %H:%M:%S"));

    let result = match matches.subcommand() {
        Some(("train", sub_m)) => TrainArgs::from_arguments(sub_m)
            .and_then(|args| run_training(&args))
            .map(|_| ()),
        Some(("tag", sub_m)) => TagArgs::from_arguments(sub_m)
            .and_then(|args| run_tagging(&args))
            .map(|_| ()),
        _ => unreachable!("Subcommand is required by CLI configuration"),
    };

    let end = Local::now();
    log::info!("End time: {}", end.format("%Y-%m-%d %H:%M:%S"));
    log::info!("Elapsed: {:.3} sec", (end - start).num_milliseconds() as f64 / 1000.0);

    if let Err(e) = result {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
    Ok(())
}
