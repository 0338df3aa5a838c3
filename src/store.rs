//! Persistence of the single current calibration artifact.
//!
//! The store holds exactly one artifact at a well-known location; each save
//! overwrites the previous one wholesale and a missing artifact is the
//! normal "not calibrated yet" state, not an error. Concurrent savers are
//! last-writer-wins; there is no lock or concurrency token.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::PersistenceError;
use crate::types::CalibrationArtifact;

#[async_trait]
pub trait CalibrationStore: Send + Sync {
    async fn save(&self, artifact: &CalibrationArtifact) -> Result<(), PersistenceError>;
    async fn load(&self) -> Result<Option<CalibrationArtifact>, PersistenceError>;
    async fn exists(&self) -> bool;
    async fn delete(&self) -> Result<(), PersistenceError>;
}

/// Filesystem-backed store: one pretty-printed JSON document at a fixed
/// path.
pub struct FsCalibrationStore {
    path: PathBuf,
}

impl FsCalibrationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl CalibrationStore for FsCalibrationStore {
    async fn save(&self, artifact: &CalibrationArtifact) -> Result<(), PersistenceError> {
        let json = serde_json::to_vec_pretty(artifact)?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(PersistenceError::Write)?;
        tracing::debug!(path = %self.path.display(), "calibration saved");
        Ok(())
    }

    async fn load(&self) -> Result<Option<CalibrationArtifact>, PersistenceError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(PersistenceError::Read(e)),
        };
        let artifact = serde_json::from_slice(&bytes)?;
        Ok(Some(artifact))
    }

    async fn exists(&self) -> bool {
        tokio::fs::metadata(&self.path).await.is_ok()
    }

    async fn delete(&self) -> Result<(), PersistenceError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PersistenceError::Write(e)),
        }
    }
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Default)]
pub struct InMemoryCalibrationStore {
    current: RwLock<Option<CalibrationArtifact>>,
}

impl InMemoryCalibrationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CalibrationStore for InMemoryCalibrationStore {
    async fn save(&self, artifact: &CalibrationArtifact) -> Result<(), PersistenceError> {
        *self.current.write().await = Some(artifact.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Option<CalibrationArtifact>, PersistenceError> {
        Ok(self.current.read().await.clone())
    }

    async fn exists(&self) -> bool {
        self.current.read().await.is_some()
    }

    async fn delete(&self) -> Result<(), PersistenceError> {
        *self.current.write().await = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correction::CorrectionModel;
    use chrono::Utc;
    use indexmap::IndexMap;

    fn sample_artifact() -> CalibrationArtifact {
        let mut factors = IndexMap::new();
        factors.insert(530u32, 1.4);
        factors.insert(620u32, 0.9);
        let model = CorrectionModel::from_factors(factors.clone());
        CalibrationArtifact {
            timestamp: Utc::now(),
            image_uri: "file:///tmp/chart.jpg".to_string(),
            color_samples: Vec::new(),
            spectral_response: factors,
            statistics: model.statistics(72, 4),
            black_regions: Vec::new(),
            baseline: 0.0,
            correction_curves: None,
        }
    }

    #[tokio::test]
    async fn in_memory_round_trip() {
        let store = InMemoryCalibrationStore::new();
        assert!(store.load().await.unwrap().is_none());
        assert!(!store.exists().await);

        let artifact = sample_artifact();
        store.save(&artifact).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, artifact);
        assert!(loaded.is_valid());

        store.delete().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fs_round_trip_and_missing_file_is_none() {
        let path = std::env::temp_dir().join(format!("spectracam-{}.json", uuid::Uuid::new_v4()));
        let store = FsCalibrationStore::new(&path);

        assert!(store.load().await.unwrap().is_none());

        let artifact = sample_artifact();
        store.save(&artifact).await.unwrap();
        assert!(store.exists().await);
        assert_eq!(store.load().await.unwrap().unwrap(), artifact);

        store.delete().await.unwrap();
        assert!(!store.exists().await);
        // Deleting again is not an error.
        store.delete().await.unwrap();
    }

    #[tokio::test]
    async fn save_overwrites_previous_artifact() {
        let store = InMemoryCalibrationStore::new();
        let first = sample_artifact();
        store.save(&first).await.unwrap();

        let mut second = sample_artifact();
        second.image_uri = "file:///tmp/other.jpg".to_string();
        store.save(&second).await.unwrap();

        assert_eq!(store.load().await.unwrap().unwrap().image_uri, second.image_uri);
    }
}
