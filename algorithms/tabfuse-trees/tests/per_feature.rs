use ndarray::{Array1, Array2};
use ndarray_rand::{rand::SeedableRng, rand_distr::Normal, RandomExt};
use rand::{rngs::SmallRng, Rng};

use tabfuse::prelude::*;
use tabfuse_trees::{
    GradientBoostedTrees, HyperparameterTable, PerFeatureEnsemble, Setting, TreesError,
};

/// Feature 0 shifts with the label, feature 1 is noise
fn synthetic(n: usize, seed: u64) -> (Array2<f64>, Array1<bool>) {
    let mut rng = SmallRng::seed_from_u64(seed);
    let targets = (0..n).map(|_| rng.gen_bool(0.3)).collect::<Array1<bool>>();
    let noise = Array2::random_using((n, 2), Normal::new(0.0f64, 1.0).unwrap(), &mut rng);
    let records = Array2::from_shape_fn((n, 2), |(i, j)| {
        if j == 0 && targets[i] {
            noise[[i, j]] + 1.5
        } else {
            noise[[i, j]]
        }
    });
    (records, targets)
}

fn quick_base() -> tabfuse_trees::GbdtParams {
    GradientBoostedTrees::<f64>::params()
        .num_boost_round(200)
        .num_threads(2)
}

#[test]
fn predictions_cover_every_partition() {
    let (records, targets) = synthetic(600, 11);
    let (test, test_targets) = synthetic(200, 12);
    let fake = test.slice(ndarray::s![..50, ..]).to_owned();
    let train = Dataset::new(records, targets.clone()).with_feature_names(vec!["signal", "noise"]);

    let (predictions, report) = PerFeatureEnsemble::params()
        .n_folds(4)
        .base(quick_base())
        .check()
        .unwrap()
        .fit_predict(
            &train,
            test.view(),
            fake.view(),
            Some(test_targets.as_slice().unwrap()),
        )
        .unwrap();

    assert_eq!(predictions.oof.view().dim(), (600, 2));
    assert_eq!(predictions.train.view().dim(), (600, 2));
    assert_eq!(predictions.test.view().dim(), (200, 2));
    assert_eq!(predictions.fake.view().dim(), (50, 2));
    for matrix in [&predictions.oof, &predictions.train, &predictions.test, &predictions.fake].iter() {
        assert!(matrix.is_complete());
        assert!(matrix.view().iter().all(|x| x.is_finite() && *x >= 0.0));
    }
    assert_eq!(predictions.oof.feature_names(), &["signal", "noise"]);

    assert_eq!(report.features.len(), 2);
    let signal = &report.features[0];
    assert_eq!(signal.name, "signal");
    assert_eq!(signal.best_iterations.len(), 4);
    assert!(signal.oof_auc > 0.75, "signal AUC was {}", signal.oof_auc);
    assert!(signal.cumulative_test_auc.unwrap() > 0.75);

    // the noise feature still produces a column
    let noise = &report.features[1];
    assert!(noise.oof_auc.is_finite());
    assert!(noise.cumulative_oof_auc < signal.cumulative_oof_auc + 0.05);

    // the reported AUC is the one of the stored held-out column
    let oof_auc = predictions
        .oof
        .column(0)
        .to_owned()
        .roc_auc(targets.as_slice().unwrap())
        .unwrap();
    assert!((oof_auc - signal.oof_auc).abs() < 1e-12);
}

#[test]
fn runs_are_deterministic() {
    let (records, targets) = synthetic(300, 5);
    let train = Dataset::new(records.clone(), targets);
    let params = PerFeatureEnsemble::params()
        .n_folds(3)
        .base(quick_base())
        .check()
        .unwrap();

    let (a, report_a) = params
        .fit_predict(&train, records.view(), records.view(), None)
        .unwrap();
    let (b, report_b) = params
        .fit_predict(&train, records.view(), records.view(), None)
        .unwrap();
    assert_eq!(a, b);
    assert_eq!(report_a, report_b);
    assert_ne!(report_a.features[0].seed, report_a.features[1].seed);
}

#[test]
fn selects_setting_with_lowest_oof_loss() {
    let (records, targets) = synthetic(400, 7);
    let train = Dataset::new(records.clone(), targets);

    // a learning rate this small barely moves away from p = 0.5
    let crippled = Setting {
        learning_rate: Some(1e-4),
        ..Setting::default()
    };
    let (_, report) = PerFeatureEnsemble::params()
        .n_folds(3)
        .base(quick_base().num_boost_round(50))
        .settings(vec![crippled, Setting::default()])
        .check()
        .unwrap()
        .fit_predict(&train, records.view(), records.view(), None)
        .unwrap();

    let signal = &report.features[0];
    assert_eq!(signal.setting_scores.len(), 2);
    assert_eq!(signal.chosen_setting, 1);
    assert!(signal.setting_scores[1] < signal.setting_scores[0]);
}

#[test]
fn uses_table_entries_by_name() {
    let (records, targets) = synthetic(200, 9);
    let train = Dataset::new(records.clone(), targets).with_feature_names(vec!["a", "b"]);
    let table = HyperparameterTable::from_json(
        r#"{"features": {"a": {"max_bin": 1, "learning_rate": 0.1, "reg_alpha": 0.0, "num_leaves": 4}}}"#,
    )
    .unwrap();

    // "a" picks up an invalid bin count, "b" has no entry and no default
    let result = PerFeatureEnsemble::params()
        .n_folds(3)
        .base(quick_base())
        .table(table)
        .check()
        .unwrap()
        .fit_predict(&train, records.view(), records.view(), None);
    assert!(matches!(result, Err(TreesError::TabfuseError(Error::Parameters(_)))));
}

#[test]
fn rejects_mismatched_partitions() {
    let (records, targets) = synthetic(100, 1);
    let train = Dataset::new(records.clone(), targets);
    let narrow = Array2::<f64>::zeros((10, 1));

    let params = PerFeatureEnsemble::params().n_folds(3).check().unwrap();
    let result = params.fit_predict(&train, narrow.view(), records.view(), None);
    assert!(matches!(
        result,
        Err(TreesError::TabfuseError(Error::ShapeMismatch { .. }))
    ));
}
