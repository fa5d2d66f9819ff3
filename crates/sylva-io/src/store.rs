//! Model persistence via bincode in a versioned envelope.

use std::path::{Path, PathBuf};

use sylva_forest::RandomForest;
use tracing::{debug, info, instrument};

use crate::IoError;

/// Current binary format version.
pub const FORMAT_VERSION: u32 = 1;

/// Envelope written to disk. `format_version` comes first so it can be
/// checked before the forest is decoded.
#[derive(serde::Serialize)]
struct EnvelopeRef<'a> {
    format_version: u32,
    n_trees: usize,
    n_predictors: usize,
    target: &'a str,
    forest: &'a RandomForest,
}

#[derive(serde::Deserialize)]
struct Envelope {
    format_version: u32,
    n_trees: usize,
    n_predictors: usize,
    target: String,
    forest: RandomForest,
}

/// Saves and loads forests at a fixed path.
pub struct ModelStore {
    path: PathBuf,
}

impl ModelStore {
    /// Create a store for the given model file path.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Return the model path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Save the forest, replacing any existing file.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::SerializeModel`] | bincode encoding failed |
    /// | [`IoError::WriteFile`] | file write failed |
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn save(&self, forest: &RandomForest) -> Result<(), IoError> {
        let envelope = EnvelopeRef {
            format_version: FORMAT_VERSION,
            n_trees: forest.n_trees(),
            n_predictors: forest.predictors().len(),
            target: &forest.target().name,
            forest,
        };

        let bytes =
            bincode::serialize(&envelope).map_err(|e| IoError::SerializeModel { source: e })?;

        std::fs::write(&self.path, &bytes).map_err(|e| IoError::WriteFile {
            path: self.path.clone(),
            source: e,
        })?;

        info!(
            size_bytes = bytes.len(),
            n_trees = forest.n_trees(),
            "model saved"
        );

        Ok(())
    }

    /// Load a forest, checking the format version first.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::ReadModel`] | file read failed |
    /// | [`IoError::IncompatibleModelVersion`] | format version mismatch |
    /// | [`IoError::DeserializeModel`] | bincode decoding failed |
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn load(&self) -> Result<RandomForest, IoError> {
        let bytes = std::fs::read(&self.path).map_err(|e| IoError::ReadModel {
            path: self.path.clone(),
            source: e,
        })?;

        let decode_error = |e| IoError::DeserializeModel {
            path: self.path.clone(),
            source: e,
        };

        let format_version: u32 = bincode::deserialize(&bytes).map_err(decode_error)?;
        if format_version != FORMAT_VERSION {
            return Err(IoError::IncompatibleModelVersion {
                expected: FORMAT_VERSION,
                found: format_version,
                path: self.path.clone(),
            });
        }

        let envelope: Envelope = bincode::deserialize(&bytes).map_err(decode_error)?;

        debug!(
            format_version = envelope.format_version,
            n_trees = envelope.n_trees,
            n_predictors = envelope.n_predictors,
            target = %envelope.target,
            "model loaded"
        );

        Ok(envelope.forest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sylva_forest::{Feature, FeatureMatrix, ForestConfig};
    use tempfile::TempDir;

    fn matrix() -> FeatureMatrix {
        FeatureMatrix::new(vec![
            Feature::numeric("x", vec![1.0, 2.0, 3.0, 10.0, 11.0, 12.0]),
            Feature::categorical("c", &["a", "b", "a", "b", "a", "b"]),
            Feature::categorical("y", &["lo", "lo", "lo", "hi", "hi", "hi"]),
        ])
        .unwrap()
    }

    fn train_simple_model() -> RandomForest {
        ForestConfig::new(5)
            .unwrap()
            .with_seed(42)
            .fit(&matrix(), "y")
            .unwrap()
            .into_forest()
    }

    #[test]
    fn round_trip_identical_predictions() {
        let dir = TempDir::new().unwrap();
        let store = ModelStore::new(&dir.path().join("model.bin"));

        let forest = train_simple_model();
        store.save(&forest).unwrap();
        let loaded = store.load().unwrap();

        let m = matrix();
        assert_eq!(
            forest.predict_batch(&m).unwrap(),
            loaded.predict_batch(&m).unwrap()
        );
        assert_eq!(forest.in_bag(), loaded.in_bag());
        assert_eq!(forest.target(), loaded.target());
        assert_eq!(forest.predictors(), loaded.predictors());
    }

    #[test]
    fn load_nonexistent_file_error() {
        let store = ModelStore::new(Path::new("/tmp/nonexistent_sylva_model_abc123.bin"));
        assert!(matches!(store.load().unwrap_err(), IoError::ReadModel { .. }));
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("future.bin");
        let mut bytes = bincode::serialize(&(FORMAT_VERSION + 1)).unwrap();
        bytes.extend_from_slice(b"whatever follows");
        std::fs::write(&path, &bytes).unwrap();

        let err = ModelStore::new(&path).load().unwrap_err();
        assert!(matches!(
            err,
            IoError::IncompatibleModelVersion { expected: 1, found: 2, .. }
        ));
    }

    #[test]
    fn load_corrupt_file_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("corrupt.bin");
        let mut bytes = bincode::serialize(&FORMAT_VERSION).unwrap();
        bytes.extend_from_slice(b"not a valid model");
        std::fs::write(&path, &bytes).unwrap();
        assert!(matches!(
            ModelStore::new(&path).load().unwrap_err(),
            IoError::DeserializeModel { .. }
        ));

        std::fs::write(&path, b"ab").unwrap();
        assert!(matches!(
            ModelStore::new(&path).load().unwrap_err(),
            IoError::DeserializeModel { .. }
        ));
    }
}
