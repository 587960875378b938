//! Calibration stores.
//!
//! The record itself lives in `steptrack_common::calibration`. This module
//! decides where it is kept between runs: a bincode file with a versioned
//! envelope, or process memory when no path is configured.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use steptrack_common::calibration::CalibrationRecord;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Calibration storage errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalibrationError {
    /// File system failure
    #[error("Calibration I/O error: {0}")]
    Io(String),

    /// Serialization failure
    #[error("Failed to encode calibration: {0}")]
    Encode(String),

    /// Deserialization failure
    #[error("Failed to decode calibration: {0}")]
    Decode(String),

    /// Stored envelope has an unsupported format version
    #[error("Unsupported calibration version {0}")]
    Version(u32),
}

/// Where the calibration record is kept between runs.
pub trait CalibrationStore: Send + Sync {
    /// Read the stored record, `None` if nothing usable is stored.
    fn load(&self) -> Result<Option<CalibrationRecord>, CalibrationError>;

    /// Overwrite the stored record.
    fn save(&self, record: &CalibrationRecord) -> Result<(), CalibrationError>;

    /// Human-readable location for logs.
    fn location(&self) -> String;
}

// ─── File Store ─────────────────────────────────────────────────────

/// On-disk envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedCalibration {
    /// Format version (for migration)
    pub version: u32,
    pub record: CalibrationRecord,
    /// Predicted raw count per integer degree, derived from `record`.
    pub lookup: Option<BTreeMap<u16, i32>>,
    /// Unix epoch seconds of the save.
    pub saved_at: u64,
}

impl PersistedCalibration {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new(record: CalibrationRecord, counts_per_rev: u32) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            record,
            lookup: Some(record.lookup_table(counts_per_rev)),
            saved_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }

    pub fn check_version(&self) -> Result<(), CalibrationError> {
        if self.version == Self::CURRENT_VERSION {
            Ok(())
        } else {
            Err(CalibrationError::Version(self.version))
        }
    }
}

/// Bincode file store.
#[derive(Debug, Clone)]
pub struct FileCalibrationStore {
    path: PathBuf,
    counts_per_rev: u32,
}

impl FileCalibrationStore {
    pub fn new<P: AsRef<Path>>(path: P, counts_per_rev: u32) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            counts_per_rev,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the full envelope, lookup table included.
    pub fn load_envelope(&self) -> Result<Option<PersistedCalibration>, CalibrationError> {
        if !self.path.exists() {
            debug!("Calibration file {:?} does not exist", self.path);
            return Ok(None);
        }
        let file = File::open(&self.path)
            .map_err(|e| CalibrationError::Io(format!("Failed to open {:?}: {}", self.path, e)))?;
        let envelope: PersistedCalibration = bincode::deserialize_from(BufReader::new(file))
            .map_err(|e| CalibrationError::Decode(e.to_string()))?;
        Ok(Some(envelope))
    }
}

impl CalibrationStore for FileCalibrationStore {
    fn load(&self) -> Result<Option<CalibrationRecord>, CalibrationError> {
        let Some(envelope) = self.load_envelope()? else {
            return Ok(None);
        };
        if let Err(e) = envelope.check_version() {
            warn!(
                "{} in {:?} (current {}), ignoring stored record",
                e,
                self.path,
                PersistedCalibration::CURRENT_VERSION
            );
            return Ok(None);
        }
        info!(
            "Loaded calibration raw={} bearing={:.2} from {:?} (saved at {})",
            envelope.record.raw_sensor_value,
            envelope.record.bearing_at_that_raw,
            self.path,
            envelope.saved_at
        );
        Ok(Some(envelope.record))
    }

    fn save(&self, record: &CalibrationRecord) -> Result<(), CalibrationError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                CalibrationError::Io(format!("Failed to create directory: {}", e))
            })?;
        }
        let envelope = PersistedCalibration::new(*record, self.counts_per_rev);
        let file = File::create(&self.path).map_err(|e| {
            CalibrationError::Io(format!("Failed to create {:?}: {}", self.path, e))
        })?;
        bincode::serialize_into(BufWriter::new(file), &envelope)
            .map_err(|e| CalibrationError::Encode(e.to_string()))?;
        info!(
            "Saved calibration raw={} bearing={:.2} to {:?}",
            record.raw_sensor_value, record.bearing_at_that_raw, self.path
        );
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

// ─── Memory Store ───────────────────────────────────────────────────

/// In-process store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryCalibrationStore {
    inner: Mutex<MemorySlot>,
}

#[derive(Debug, Default)]
struct MemorySlot {
    record: Option<CalibrationRecord>,
    saves: usize,
}

impl MemoryCalibrationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `record`, as if left by a previous run.
    pub fn with_record(record: CalibrationRecord) -> Self {
        Self {
            inner: Mutex::new(MemorySlot {
                record: Some(record),
                saves: 0,
            }),
        }
    }

    /// Currently stored record.
    pub fn record(&self) -> Option<CalibrationRecord> {
        self.inner.lock().record
    }

    /// Number of `save` calls so far.
    pub fn save_count(&self) -> usize {
        self.inner.lock().saves
    }
}

impl CalibrationStore for MemoryCalibrationStore {
    fn load(&self) -> Result<Option<CalibrationRecord>, CalibrationError> {
        Ok(self.inner.lock().record)
    }

    fn save(&self, record: &CalibrationRecord) -> Result<(), CalibrationError> {
        let mut slot = self.inner.lock();
        slot.record = Some(*record);
        slot.saves += 1;
        debug!(
            "Calibration held in memory raw={} bearing={:.2}",
            record.raw_sensor_value, record.bearing_at_that_raw
        );
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
