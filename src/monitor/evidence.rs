//! Evidence files for detected violations.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::detection::{BoundingBox, ViolationCandidate, ViolationType};

#[derive(Debug, Error)]
pub enum EvidenceError {
    #[error("Failed to create evidence directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write evidence: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize evidence record: {0}")]
    Json(#[from] serde_json::Error),
}

/// JSON record stored next to each evidence image.
#[derive(Debug, Clone, Serialize)]
pub struct EvidenceRecord {
    pub violation_type: ViolationType,
    pub confidence: f64,
    pub bbox: BoundingBox,
    pub frame: Option<u64>,
    pub timestamp: DateTime<Local>,
    pub image: Option<PathBuf>,
}

/// Paths written for one violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedEvidence {
    /// Copy of the frame snapshot, if the detector provided one.
    pub image: Option<PathBuf>,
    pub record: PathBuf,
}

/// Directory of evidence images and records.
#[derive(Debug, Clone)]
pub struct EvidenceStore {
    dir: PathBuf,
}

impl EvidenceStore {
    /// Opens the store, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, EvidenceError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| EvidenceError::CreateDir {
                path: dir.clone(),
                source,
            })?;
        debug!("Evidence directory: {}", dir.display());
        Ok(Self { dir })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Stores evidence for a candidate found on a frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be copied or the record written.
    pub async fn save(
        &self,
        candidate: &ViolationCandidate,
        frame: Option<u64>,
        snapshot: Option<&Path>,
        timestamp: DateTime<Local>,
    ) -> Result<SavedEvidence, EvidenceError> {
        let stem = self.unique_stem(candidate.kind, timestamp);

        let image = match snapshot {
            Some(source) if source.is_file() => {
                let target = self.dir.join(format!("{stem}.jpg"));
                tokio::fs::copy(source, &target).await?;
                Some(target)
            }
            Some(source) => {
                debug!("Snapshot {} is missing, storing record only", source.display());
                None
            }
            None => None,
        };

        let record = EvidenceRecord {
            violation_type: candidate.kind,
            confidence: candidate.confidence,
            bbox: candidate.bbox,
            frame,
            timestamp,
            image: image.clone(),
        };
        let record_path = self.dir.join(format!("{stem}.json"));
        tokio::fs::write(&record_path, serde_json::to_string_pretty(&record)?).await?;

        info!("Evidence saved: {}", record_path.display());
        Ok(SavedEvidence {
            image,
            record: record_path,
        })
    }

    /// `<type>_<YYYYmmdd_HHMMSS>`, with `_N` appended when taken.
    fn unique_stem(&self, kind: ViolationType, timestamp: DateTime<Local>) -> String {
        let base = format!("{}_{}", kind, timestamp.format("%Y%m%d_%H%M%S"));
        let taken = |stem: &str| {
            self.dir.join(format!("{stem}.jpg")).exists() || self.dir.join(format!("{stem}.json")).exists()
        };

        if !taken(&base) {
            return base;
        }
        let mut n = 1;
        loop {
            let stem = format!("{base}_{n}");
            if !taken(&stem) {
                return stem;
            }
            n += 1;
        }
    }
}
