use ndarray::{Array1, Array2};
use ndarray_rand::{rand::SeedableRng, rand_distr::Normal, RandomExt};
use rand::{rngs::SmallRng, Rng};

use tabfuse_pipeline::{
    io::{self, Table},
    Driver, PipelineConfig, PipelineError, PipelineInputs, TestIndices,
};
use tabfuse_trees::HyperparameterTable;

const FEATURES: usize = 4;

/// `var_0` shifts with the label, the other features are noise
fn table(n: usize, labeled: bool, seed: u64) -> Table {
    let mut rng = SmallRng::seed_from_u64(seed);
    let targets = (0..n).map(|_| rng.gen_bool(0.3)).collect::<Array1<bool>>();
    let mut records = Array2::random_using((n, FEATURES), Normal::new(0.0f64, 1.0).unwrap(), &mut rng);
    for (i, y) in targets.iter().enumerate() {
        if *y {
            records[[i, 0]] += 1.5;
        }
    }
    records.mapv_inplace(|x: f64| (x * 1e4).round() / 1e4);
    Table {
        ids: (0..n).map(|i| format!("row_{}", i)).collect(),
        feature_names: (0..FEATURES).map(|i| format!("var_{}", i)).collect(),
        records,
        targets: if labeled { Some(targets) } else { None },
    }
}

fn quick_config(partition: &str, epochs: usize) -> PipelineConfig {
    let json = format!(
        r#"{{
            "partition": {},
            "trees": {{"n_folds": 3, "num_threads": 1, "num_boost_round": 60}},
            "fusion": {{"n_folds": 3, "epochs": {}, "batch_size": 32}}
        }}"#,
        partition, epochs
    );
    PipelineConfig::from_json(&json).unwrap()
}

fn indices() -> TestIndices {
    TestIndices {
        fake: (0..80).filter(|i| i % 2 == 0).collect(),
        public: (0..40).filter(|i| i % 2 == 1).collect(),
        private: (40..80).filter(|i| i % 2 == 1).collect(),
    }
}

#[test]
fn production_run_writes_every_test_row() {
    let driver = Driver::new(quick_config(r#""production""#, 4), HyperparameterTable::default());
    let output = driver
        .run(PipelineInputs {
            train: table(300, true, 1),
            test: table(80, false, 2),
            indices: Some(indices()),
        })
        .unwrap();

    assert!(output.test_auc.is_none());
    assert_eq!(output.predictions.oof.len(), 300);
    assert_eq!(output.predictions.test.len(), 40);
    assert_eq!(output.predictions.fake.len(), 40);
    assert_eq!(output.ensemble_report.features.len(), FEATURES);

    let submission = output.submission.unwrap();
    assert_eq!(submission.len(), 80);
    assert_eq!(submission.ids[7], "row_7");
    assert!(submission.targets.iter().all(|p| (0.0..=1.0).contains(p)));
    // row 0 is the first fake row, row 1 the first public row
    assert_eq!(submission.targets[0], f64::from(output.predictions.fake[0]));
    assert_eq!(submission.targets[1], f64::from(output.predictions.test[0]));

    let mut csv = Vec::new();
    io::write_submission(&mut csv, &submission.ids, &submission.targets).unwrap();
    let text = String::from_utf8(csv).unwrap();
    assert_eq!(text.lines().count(), 81);
    assert!(text.starts_with("ID_code,target\nrow_0,"));
}

#[test]
fn experimental_run_reports_test_auc() {
    let driver = Driver::new(
        quick_config(r#"{"experimental": {"train_len": 240, "seed": 42}}"#, 30),
        HyperparameterTable::default(),
    );
    let output = driver
        .run(PipelineInputs {
            train: table(300, true, 3),
            test: table(20, false, 4),
            indices: None,
        })
        .unwrap();

    assert!(output.submission.is_none());
    assert_eq!(output.predictions.oof.len(), 240);
    assert_eq!(output.predictions.test.len(), 60);
    // the fake partition is a copy of the held-out rows
    assert_eq!(output.predictions.fake, output.predictions.test);
    let auc = output.test_auc.unwrap();
    assert!(auc.is_finite() && auc > 0.5, "test auc {}", auc);
}

#[test]
fn rejects_inconsistent_inputs() {
    let driver = Driver::new(quick_config(r#""production""#, 4), HyperparameterTable::default());
    let missing_indices = driver.run(PipelineInputs {
        train: table(100, true, 5),
        test: table(80, false, 6),
        indices: None,
    });
    assert!(matches!(missing_indices, Err(PipelineError::MalformedInput(_))));

    let mut test = table(80, false, 6);
    test.feature_names[2] = "other".into();
    let renamed = driver.run(PipelineInputs {
        train: table(100, true, 5),
        test,
        indices: Some(indices()),
    });
    assert!(matches!(renamed, Err(PipelineError::MalformedInput(_))));

    let partial_table = HyperparameterTable::from_json(
        r#"{"features": {"var_0": {"max_bin": 64, "learning_rate": 0.1, "reg_alpha": 1.0, "num_leaves": 3}}}"#,
    )
    .unwrap();
    let strict = Driver::new(quick_config(r#""production""#, 4), partial_table);
    let missing_entry = strict.run(PipelineInputs {
        train: table(100, true, 5),
        test: table(80, false, 6),
        indices: Some(indices()),
    });
    assert!(matches!(missing_entry, Err(PipelineError::Trees(_))));
}
