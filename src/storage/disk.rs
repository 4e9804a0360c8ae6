//! Disk-usage admission control
//!
//! Ingestion consults a `DiskGauge` before staging a batch. Above the
//! configured watermark the write is refused with `DiskFull`, surfaced to
//! clients as `STATUS_DISK_FULL`. A watermark of 0 makes the engine
//! read-only. The gauge is engine-scoped and carries its own probe, so
//! tests can pin utilization without touching a filesystem.

use crate::storage::error::{StorageError, StorageResult};
use std::path::PathBuf;

/// Source of a utilization reading, in whole percent.
pub trait UsageProbe: Send + Sync {
    fn used_percent(&self) -> u8;
}

/// Probe reporting the data directory's size against a byte capacity.
pub struct DirUsageProbe {
    path: PathBuf,
    capacity_bytes: u64,
}

impl DirUsageProbe {
    pub fn new(path: impl Into<PathBuf>, capacity_bytes: u64) -> Self {
        Self {
            path: path.into(),
            capacity_bytes: capacity_bytes.max(1),
        }
    }

    fn dir_size(path: &std::path::Path) -> u64 {
        let Ok(entries) = std::fs::read_dir(path) else {
            return 0;
        };
        entries
            .flatten()
            .map(|entry| {
                let path = entry.path();
                if path.is_dir() {
                    Self::dir_size(&path)
                } else {
                    entry.metadata().map(|m| m.len()).unwrap_or(0)
                }
            })
            .sum()
    }
}

impl UsageProbe for DirUsageProbe {
    fn used_percent(&self) -> u8 {
        let used = Self::dir_size(&self.path);
        ((used.saturating_mul(100)) / self.capacity_bytes).min(100) as u8
    }
}

/// Probe pinned to a constant reading. Used by tests and dry runs.
pub struct FixedProbe(pub u8);

impl UsageProbe for FixedProbe {
    fn used_percent(&self) -> u8 {
        self.0
    }
}

/// Admission gauge: watermark plus probe.
pub struct DiskGauge {
    max_percent: u8,
    probe: Box<dyn UsageProbe>,
}

impl DiskGauge {
    pub fn new(max_percent: u8, probe: Box<dyn UsageProbe>) -> Self {
        Self {
            max_percent: max_percent.min(100),
            probe,
        }
    }

    /// Refuse writes above the watermark, or always when the watermark is 0.
    pub fn check(&self) -> StorageResult<()> {
        if self.max_percent < 1 {
            return Err(StorageError::DiskFull(
                "engine is read-only because max-disk-usage-percent is 0".to_string(),
            ));
        }
        let used = self.probe.used_percent();
        if used < self.max_percent {
            return Ok(());
        }
        tracing::warn!(
            max_percent = self.max_percent,
            disk_percent = used,
            "disk usage is too high, stop writing"
        );
        Err(StorageError::DiskFull(format!(
            "disk usage {}% exceeds watermark {}%",
            used, self.max_percent
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_below_watermark_admits() {
        let gauge = DiskGauge::new(95, Box::new(FixedProbe(50)));
        assert!(gauge.check().is_ok());
    }

    #[test]
    fn test_above_watermark_refuses() {
        let gauge = DiskGauge::new(50, Box::new(FixedProbe(80)));
        let err = gauge.check().unwrap_err();
        assert!(matches!(err, StorageError::DiskFull(_)));
        assert_eq!(err.status(), Some("STATUS_DISK_FULL"));
    }

    #[test]
    fn test_zero_watermark_is_read_only() {
        let gauge = DiskGauge::new(0, Box::new(FixedProbe(0)));
        assert!(matches!(
            gauge.check(),
            Err(StorageError::DiskFull(_))
        ));
    }

    #[test]
    fn test_watermark_clamped_to_100() {
        let gauge = DiskGauge::new(255, Box::new(FixedProbe(99)));
        assert!(gauge.check().is_ok());
        let gauge = DiskGauge::new(255, Box::new(FixedProbe(100)));
        assert!(gauge.check().is_err());
    }

    #[test]
    fn test_dir_probe_measures_nested_files() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        let mut f = std::fs::File::create(dir.path().join("sub").join("data")).unwrap();
        f.write_all(&[0u8; 600]).unwrap();
        f.sync_all().unwrap();

        let probe = DirUsageProbe::new(dir.path(), 1000);
        assert_eq!(probe.used_percent(), 60);

        // Capacity floor prevents div-by-zero and saturates at 100.
        let probe = DirUsageProbe::new(dir.path(), 0);
        assert_eq!(probe.used_percent(), 100);
    }
}
