//! Segment discovery and metadata management

use crate::error::{ShmError, ShmResult};
use crate::platform::{is_process_alive, unlink_segment};
use crate::segment::segment_path;
use mdm::shm::consts::META_SUFFIX;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::info;

/// Segment metadata information, stored next to each segment as JSON
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SegmentInfo {
    /// Segment name
    pub name: String,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Creator process ID
    pub creator_pid: u32,
    /// Creation timestamp
    pub created_at: SystemTime,
}

/// Path of the metadata file of segment `name` in `dir`
pub fn meta_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}{META_SUFFIX}"))
}

/// Segment discovery over one segment directory
pub struct SegmentDiscovery {
    dir: PathBuf,
}

impl SegmentDiscovery {
    /// Create discovery service for `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// List all segments that have both a metadata and a data file
    pub fn list_segments(&self) -> ShmResult<Vec<SegmentInfo>> {
        let mut segments = Vec::new();

        if !self.dir.exists() {
            return Ok(segments);
        }

        let entries = std::fs::read_dir(&self.dir).map_err(|e| ShmError::Io { source: e })?;

        for entry in entries.flatten() {
            let Ok(file_name) = entry.file_name().into_string() else {
                continue;
            };
            let Some(name) = file_name.strip_suffix(META_SUFFIX) else {
                continue;
            };
            if !segment_path(&self.dir, name).exists() {
                continue;
            }
            if let Ok(info) = self.read_metadata(name) {
                segments.push(info);
            }
        }

        segments.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(segments)
    }

    /// Find segment by name
    pub fn find_segment(&self, name: &str) -> ShmResult<Option<SegmentInfo>> {
        if !self.exists(name) {
            return Ok(None);
        }
        match self.read_metadata(name) {
            Ok(info) => Ok(Some(info)),
            Err(ShmError::Io { source }) if source.kind() == std::io::ErrorKind::NotFound => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// True if a data file for `name` exists
    pub fn exists(&self, name: &str) -> bool {
        segment_path(&self.dir, name).exists()
    }

    /// Remove segments whose creator process is dead
    pub fn cleanup_orphaned_segments(&self) -> ShmResult<usize> {
        let mut cleaned_count = 0;

        for segment in self.list_segments()? {
            if is_process_alive(segment.creator_pid) {
                continue;
            }
            info!(
                "Cleaning up orphaned segment {} (creator pid {} is gone)",
                segment.name, segment.creator_pid
            );
            unlink_segment(&segment_path(&self.dir, &segment.name))?;
            unlink_segment(&meta_path(&self.dir, &segment.name))?;
            cleaned_count += 1;
        }

        Ok(cleaned_count)
    }

    fn read_metadata(&self, name: &str) -> ShmResult<SegmentInfo> {
        let content = std::fs::read_to_string(meta_path(&self.dir, name))?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::ImageShape;
    use crate::writer::ImageWriter;

    #[test]
    fn test_list_segments_sorted_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let _b = ImageWriter::create(dir.path(), "dm1disp01", ImageShape::square(12)).unwrap();
        let _a = ImageWriter::create(dir.path(), "dm1disp00", ImageShape::square(12)).unwrap();
        let _c = ImageWriter::create(dir.path(), "dm1", ImageShape::square(12)).unwrap();

        let discovery = SegmentDiscovery::new(dir.path());
        let names: Vec<String> = discovery
            .list_segments()
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["dm1", "dm1disp00", "dm1disp01"]);
    }

    #[test]
    fn test_find_segment() {
        let dir = tempfile::tempdir().unwrap();
        let _w = ImageWriter::create(dir.path(), "dm2", ImageShape::square(12)).unwrap();

        let discovery = SegmentDiscovery::new(dir.path());
        let info = discovery.find_segment("dm2").unwrap().unwrap();
        assert_eq!(info.width, 12);
        assert_eq!(info.creator_pid, std::process::id());
        assert!(discovery.find_segment("dm3").unwrap().is_none());
    }

    #[test]
    fn test_missing_directory_lists_nothing() {
        let discovery = SegmentDiscovery::new("/nonexistent/mdm/shm");
        assert!(discovery.list_segments().unwrap().is_empty());
    }

    #[test]
    fn test_cleanup_removes_segments_of_dead_processes() {
        let dir = tempfile::tempdir().unwrap();
        let live = ImageWriter::create(dir.path(), "dm1", ImageShape::square(2)).unwrap();

        // Forge a segment left behind by a process that no longer exists.
        let stale = ImageWriter::create(dir.path(), "dm2", ImageShape::square(2)).unwrap();
        let mut info = SegmentDiscovery::new(dir.path())
            .find_segment("dm2")
            .unwrap()
            .unwrap();
        info.creator_pid = i32::MAX as u32;
        std::fs::write(
            meta_path(dir.path(), "dm2"),
            serde_json::to_string(&info).unwrap(),
        )
        .unwrap();
        std::mem::forget(stale);

        let discovery = SegmentDiscovery::new(dir.path());
        assert_eq!(discovery.cleanup_orphaned_segments().unwrap(), 1);
        assert!(!discovery.exists("dm2"));
        assert!(discovery.exists("dm1"));
        drop(live);
    }
}
