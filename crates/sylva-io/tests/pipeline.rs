//! End-to-end integration tests: libsvm/CSV -> grow -> PDP/jackknife -> CSV/JSON.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sylva_forest::{ForestConfig, ForestError, MTry, OobMode, Response, jackknife};
use sylva_io::{IoError, LibSvmReader, MatrixReader, ModelStore, ReportWriter};
use tempfile::TempDir;

/// Path to the test fixture directory.
fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// y = 3·x1 + noise, with an irrelevant x2.
fn write_regression_libsvm(dir: &Path, n: usize, seed: u64) -> PathBuf {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let path = dir.join("regression.libsvm");
    let mut f = fs::File::create(&path).unwrap();
    for _ in 0..n {
        let x1: f64 = rng.gen_range(0.0..1.0);
        let x2: f64 = rng.gen_range(0.0..1.0);
        let y = 3.0 * x1 + rng.gen_range(-0.05..0.05);
        writeln!(f, "{y:.6} 1:{x1:.6} 2:{x2:.6}").unwrap();
    }
    path
}

fn read_csv(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut rdr = csv::Reader::from_path(path).unwrap();
    let header = rdr.headers().unwrap().iter().map(str::to_string).collect();
    let rows = rdr
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect();
    (header, rows)
}

#[test]
fn libsvm_fixture_schema() {
    let m = LibSvmReader::new(&fixture_path("three_classes.libsvm"))
        .read()
        .expect("fixture should parse");

    assert_eq!(m.n_rows(), 60);
    assert_eq!(m.n_features(), 5);
    let label = m.feature("0").unwrap();
    assert!(label.is_categorical());
    assert_eq!(label.levels(), ["0", "1", "2"]);
    assert!(m.feature("4").unwrap().is_categorical());
    assert!(!m.feature("1").unwrap().is_categorical());
}

#[test]
fn classification_pdp_round_trip() {
    let m = LibSvmReader::new(&fixture_path("three_classes.libsvm"))
        .read()
        .unwrap();
    let result = ForestConfig::new(50)
        .unwrap()
        .with_seed(7)
        .fit(&m, "0")
        .unwrap();
    let forest = result.forest();

    let pd = forest
        .partial_dependence(&m, &["4"], Response::Probability(1))
        .unwrap();
    assert_eq!(pd.len(), 3);

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("reports").join("pdp.csv");
    let writer = ReportWriter::new(&path).unwrap();
    writer.write_partial_dependence(&["4"], &pd).unwrap();

    let (header, rows) = read_csv(&path);
    assert_eq!(header, vec!["4", "prediction"]);
    assert_eq!(rows.len(), 3);
    for (row, expected) in rows.iter().zip(&pd) {
        let grid: f64 = row[0].parse().unwrap();
        let mean: f64 = row[1].parse().unwrap();
        assert_eq!(grid, expected[0]);
        assert!((mean - expected[1]).abs() < 1e-12);
        assert!((0.0..=1.0).contains(&mean));
    }
}

#[test]
fn two_feature_pdp_writes_grid_product() {
    let dir = TempDir::new().unwrap();
    let data = write_regression_libsvm(dir.path(), 40, 3);
    let m = LibSvmReader::new(&data).read().unwrap();
    let forest = ForestConfig::new(20)
        .unwrap()
        .with_seed(1)
        .fit(&m, "0")
        .unwrap()
        .into_forest();

    let pd = forest
        .partial_dependence(&m, &["1", "2"], Response::Value)
        .unwrap();
    assert_eq!(pd.len(), 40 * 40);

    let path = dir.path().join("pdp2.csv");
    ReportWriter::new(&path)
        .unwrap()
        .write_partial_dependence(&["1", "2"], &pd)
        .unwrap();
    let (header, rows) = read_csv(&path);
    assert_eq!(header, vec!["1", "2", "prediction"]);
    assert_eq!(rows.len(), 1600);
}

#[test]
fn jackknife_fixture_to_csv() {
    let preds = MatrixReader::new(&fixture_path("preds.csv")).read().unwrap();
    let in_bag = MatrixReader::new(&fixture_path("n.csv")).read().unwrap();
    assert_eq!(preds.len(), 6);
    assert_eq!(in_bag[0].len(), 8);

    let estimates = jackknife(&preds, &in_bag).unwrap();
    assert_eq!(estimates.len(), 6);
    assert!(estimates.iter().all(|p| p.variance >= 0.0));
    assert_eq!(estimates[2].value, 4.0);
    assert_eq!(estimates[2].variance, 0.0);

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("jackknife.csv");
    ReportWriter::new(&path)
        .unwrap()
        .write_jackknife(&estimates)
        .unwrap();

    let (header, rows) = read_csv(&path);
    assert_eq!(header, vec!["prediction", "variance"]);
    assert_eq!(rows.len(), 6);
    let variance: f64 = rows[2][1].parse().unwrap();
    assert_eq!(variance, 0.0);
}

#[test]
fn jackknife_shape_mismatch_from_files() {
    let dir = TempDir::new().unwrap();
    let preds = dir.path().join("preds.csv");
    let n = dir.path().join("n.csv");
    fs::write(&preds, "1,2\n3,4\n").unwrap();
    fs::write(&n, "1,0\n0,1\n1,1\n").unwrap();

    let preds = MatrixReader::new(&preds).read().unwrap();
    let n = MatrixReader::new(&n).read().unwrap();
    assert!(matches!(
        jackknife(&preds, &n).unwrap_err(),
        ForestError::ShapeMismatch {
            expected_rows: 2,
            got_rows: 3,
            ..
        }
    ));
}

#[test]
fn forest_jackknife_regression() {
    let dir = TempDir::new().unwrap();
    let data = write_regression_libsvm(dir.path(), 80, 9);
    let m = LibSvmReader::new(&data).read().unwrap();
    let forest = ForestConfig::new(60)
        .unwrap()
        .with_seed(5)
        .with_m_try(MTry::All)
        .fit(&m, "0")
        .unwrap()
        .into_forest();

    let estimates = forest.jackknife(&m, Response::Value).unwrap();
    assert_eq!(estimates.len(), 80);
    assert!(estimates.iter().all(|p| p.variance >= 0.0 && p.variance.is_finite()));

    let path = dir.path().join("out").join("jk.csv");
    ReportWriter::new(&path)
        .unwrap()
        .write_jackknife(&estimates)
        .unwrap();
    assert_eq!(read_csv(&path).1.len(), 80);
}

#[test]
fn model_round_trip_and_prediction_report() {
    let m = LibSvmReader::new(&fixture_path("three_classes.libsvm"))
        .read()
        .unwrap();
    let forest = ForestConfig::new(25)
        .unwrap()
        .with_seed(42)
        .fit(&m, "0")
        .unwrap()
        .into_forest();

    let dir = TempDir::new().unwrap();
    let store = ModelStore::new(&dir.path().join("model.bin"));
    store.save(&forest).unwrap();
    let loaded = store.load().unwrap();

    let original = forest.predict_batch(&m).unwrap();
    let restored = loaded.predict_batch(&m).unwrap();
    assert_eq!(original, restored);

    let path = dir.path().join("predictions.csv");
    ReportWriter::new(&path)
        .unwrap()
        .write_predictions(&loaded, &restored)
        .unwrap();
    let (header, rows) = read_csv(&path);
    assert_eq!(header, vec!["row", "prediction", "label"]);
    assert_eq!(rows.len(), 60);
    for (row, &p) in rows.iter().zip(&restored) {
        assert_eq!(row[2], loaded.class_label(p as usize).unwrap());
    }
}

#[test]
fn sparse_test_file_missing_a_trained_column_still_predicts() {
    let dir = TempDir::new().unwrap();
    let train = write_regression_libsvm(dir.path(), 50, 4);
    let m = LibSvmReader::new(&train).read().unwrap();
    let forest = ForestConfig::new(10)
        .unwrap()
        .with_seed(2)
        .fit(&m, "0")
        .unwrap()
        .into_forest();

    // Column 2 is zero on every line, so a sparse writer omits it.
    let test = dir.path().join("test.libsvm");
    fs::write(&test, "0.3 1:0.1\n1.5 1:0.5\n2.7 1:0.9\n").unwrap();
    assert_eq!(LibSvmReader::new(&test).read().unwrap().n_features(), 2);

    let reader = forest
        .predictors()
        .iter()
        .chain(std::iter::once(forest.target()))
        .fold(LibSvmReader::new(&test).with_min_index(2), |reader, column| {
            reader.with_column_kind(column.name.clone(), column.kind)
        });
    let test_matrix = reader.read().unwrap();
    assert_eq!(test_matrix.n_features(), 3);
    assert!(!test_matrix.feature("2").unwrap().is_categorical());

    let predictions = forest.predict_batch(&test_matrix).unwrap();
    assert_eq!(predictions.len(), 3);
    assert!(predictions.iter().all(|p| p.is_finite()));
    assert!(predictions[0] < predictions[2]);
}

#[test]
fn growth_summary_json() {
    let m = LibSvmReader::new(&fixture_path("three_classes.libsvm"))
        .read()
        .unwrap();
    let result = ForestConfig::new(30)
        .unwrap()
        .with_seed(3)
        .with_oob_mode(OobMode::Enabled)
        .fit(&m, "0")
        .unwrap();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("summary.json");
    ReportWriter::new(&path).unwrap().write_summary(&result).unwrap();

    let content: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(content["target"], "0");
    assert_eq!(content["n_trees"].as_u64().unwrap(), 30);
    assert_eq!(content["n_rows"].as_u64().unwrap(), 60);
    assert_eq!(content["n_predictors"].as_u64().unwrap(), 4);
    assert_eq!(content["classes"].as_array().unwrap().len(), 3);
    assert_eq!(content["importances"].as_array().unwrap().len(), 4);

    let oob = &content["oob"];
    let error = oob["error"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&error));
    assert!(oob["n_oob_samples"].as_u64().unwrap() > 0);
}

#[test]
fn missing_inputs_are_reported() {
    assert!(matches!(
        LibSvmReader::new(Path::new("/nonexistent/train.libsvm")).read(),
        Err(IoError::FileNotFound { .. })
    ));
    assert!(matches!(
        MatrixReader::new(Path::new("/nonexistent/preds.csv")).read(),
        Err(IoError::FileNotFound { .. })
    ));
    assert!(matches!(
        ModelStore::new(Path::new("/nonexistent/model.bin")).load(),
        Err(IoError::ReadModel { .. })
    ));
}
