use linclass::config::{Algorithm, TrainConfig};
use linclass::data_handling::{Dataset, TaskKind};
use linclass::evaluation::evaluate;
use linclass::io::{read_source, ReadOptions};
use linclass::models::factory;

fn weather() -> Dataset {
    let _ = env_logger::builder().is_test(true).try_init();
    let text = "\
sunny\ttemp=high\thumid=low
rainy\ttemp=low\thumid=high\tcloud
sunny\ttemp=high\tcloud:0.2
rainy\thumid=high\tcloud
sunny\ttemp=high\thumid=low
rainy\ttemp=low\tcloud
";
    let mut data = Dataset::new(TaskKind::Multiclass);
    read_source(&mut data, text.as_bytes(), 0, &ReadOptions::default())
        .expect("failed to read the weather data");
    data.finalize(&TrainConfig::default().negative_labels);
    data
}

#[test]
fn test_factory_builds_and_fits_every_algorithm() {
    let data = weather();
    for name in [
        "lbfgs.logistic",
        "averaged_perceptron",
        "pegasos.logistic",
        "pegasos.hinge",
        "truncated_gradient.logistic",
        "truncated_gradient.hinge",
    ] {
        let mut config = TrainConfig::new(TaskKind::Multiclass, name.parse::<Algorithm>().unwrap());
        config.online.max_epochs = 20;
        config.sigma = 20.0;

        let trainer = factory::build_trainer(&config);
        let outcome = trainer.fit(&data, None).expect("training failed");
        assert_eq!(outcome.weights.len(), data.num_features(), "{}", name);

        let report = evaluate(&data, outcome.weights.view(), 0);
        assert_eq!(report.accuracy.total(), data.len());
        assert_eq!(
            report.accuracy.matches(),
            data.len(),
            "{} misclassified training data",
            name
        );
    }
}

#[test]
fn test_factory_batch_reports_solver_status() {
    let data = weather();
    let trainer = factory::build_trainer(&TrainConfig::new(TaskKind::Multiclass, Algorithm::MaxEnt));
    let outcome = trainer.fit(&data, None).unwrap();
    assert!(outcome.status.is_some());

    let trainer = factory::build_trainer(&TrainConfig::new(TaskKind::Multiclass, Algorithm::AveragedPerceptron));
    let outcome = trainer.fit(&data, None).unwrap();
    assert!(outcome.status.is_none());
}
