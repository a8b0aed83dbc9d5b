// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Annotation store abstraction.
//!
//! The alignment engine performs no I/O of its own. The surrounding
//! application hands it segmentation text and datasets through these traits,
//! so the same orchestrator runs against a cloud bucket, a local directory or
//! plain memory.
//!
//! # Storage Implementations
//!
//! - [`FileAnnotationStore`]: dataset JSON file plus a directory holding the
//!   segmentation text files
//! - [`MemoryAnnotationStore`]: in-memory dataset and segmentation texts
//!
//! # Examples
//!
//! ```rust
//! use specimen_align::{
//!     AnnotationStore, Dataset, ImageRecord, MemoryAnnotationStore, SegmentationSource,
//! };
//!
//! let store = MemoryAnnotationStore::new(Dataset::new(vec![
//!     ImageRecord::new("a.jpg", Some(100.0), Some(100.0)).with_segmentation_source_url("a.txt"),
//! ]));
//! store.insert_segmentation("a.txt", "1 0.1 0.1 0.2 0.2");
//!
//! assert_eq!(store.get_dataset().unwrap().len(), 1);
//! assert!(store.load_segmentation_text("a.txt").unwrap().is_some());
//! assert!(store.load_segmentation_text("b.txt").unwrap().is_none());
//! ```

use crate::Dataset;
use log::debug;
use std::{
    collections::HashMap,
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    sync::RwLock,
};
use url::Url;

/// Error type for annotation store operations.
#[derive(Debug)]
pub enum StorageError {
    /// Storage is not available (e.g., root directory missing).
    NotAvailable(String),
    /// Failed to read from storage.
    ReadError(String),
    /// Failed to write to storage.
    WriteError(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::NotAvailable(msg) => write!(f, "Annotation storage not available: {}", msg),
            StorageError::ReadError(msg) => write!(f, "Failed to read: {}", msg),
            StorageError::WriteError(msg) => write!(f, "Failed to write: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

/// Source of raw segmentation text.
///
/// Implementations must be thread-safe (`Send + Sync`).
pub trait SegmentationSource: Send + Sync {
    /// Fetch the raw polygon text stored at `source_url`.
    ///
    /// Returns `Ok(None)` when nothing is stored there.
    fn load_segmentation_text(&self, source_url: &str) -> Result<Option<String>, StorageError>;
}

/// Read/write access to the annotation dataset.
pub trait AnnotationStore: SegmentationSource {
    /// Load the full dataset.
    fn get_dataset(&self) -> Result<Dataset, StorageError>;

    /// Replace the stored dataset.
    fn save_dataset(&self, dataset: &Dataset) -> Result<(), StorageError>;
}

/// File-based annotation store.
///
/// The dataset lives in a single JSON file. Segmentation sources are resolved
/// below `segmentation_root`:
///
/// - `file:///abs/path.txt` reads that path directly
/// - `https://host/a/b.txt` reads `<root>/host/a/b.txt`, falling back to
///   `<root>/b.txt`
/// - anything that is not a URL is treated as a path relative to the root
#[derive(Debug, Clone)]
pub struct FileAnnotationStore {
    dataset_path: PathBuf,
    segmentation_root: PathBuf,
}

impl FileAnnotationStore {
    pub fn new(dataset_path: PathBuf, segmentation_root: PathBuf) -> Self {
        debug!(
            "FileAnnotationStore dataset={:?} segmentations={:?}",
            dataset_path, segmentation_root
        );
        Self {
            dataset_path,
            segmentation_root,
        }
    }

    pub fn dataset_path(&self) -> &Path {
        &self.dataset_path
    }

    pub fn segmentation_root(&self) -> &Path {
        &self.segmentation_root
    }

    /// Local paths to try, in order, for a segmentation source.
    pub fn candidate_paths(&self, source_url: &str) -> Vec<PathBuf> {
        match Url::parse(source_url) {
            Ok(url) if url.scheme() == "file" => url.to_file_path().into_iter().collect(),
            Ok(url) => {
                let segments: Vec<&str> = url
                    .path_segments()
                    .map(|s| s.filter(|p| !p.is_empty()).collect())
                    .unwrap_or_default();

                let mut nested = self.segmentation_root.clone();
                if let Some(host) = url.host_str() {
                    nested.push(host);
                }
                nested.extend(&segments);

                let mut paths = vec![nested];
                if let Some(name) = segments.last() {
                    paths.push(self.segmentation_root.join(name));
                }
                paths
            }
            Err(_) => vec![self.segmentation_root.join(source_url)],
        }
    }
}

impl SegmentationSource for FileAnnotationStore {
    fn load_segmentation_text(&self, source_url: &str) -> Result<Option<String>, StorageError> {
        for path in self.candidate_paths(source_url) {
            if !path.is_file() {
                continue;
            }

            let text = std::fs::read_to_string(&path).map_err(|e| {
                StorageError::ReadError(format!("Failed to read segmentation {:?}: {}", path, e))
            })?;
            debug!("Segmentation for {} loaded from {:?}", source_url, path);
            return Ok(Some(text));
        }

        if !self.segmentation_root.is_dir() {
            return Err(StorageError::NotAvailable(format!(
                "segmentation directory {:?} does not exist",
                self.segmentation_root
            )));
        }

        debug!("No segmentation file found for {}", source_url);
        Ok(None)
    }
}

impl AnnotationStore for FileAnnotationStore {
    fn get_dataset(&self) -> Result<Dataset, StorageError> {
        let file = File::open(&self.dataset_path).map_err(|e| {
            StorageError::ReadError(format!(
                "Failed to open dataset {:?}: {}",
                self.dataset_path, e
            ))
        })?;

        let reader = BufReader::with_capacity(64 * 1024, file);
        serde_json::from_reader(reader).map_err(|e| {
            StorageError::ReadError(format!(
                "Failed to parse dataset {:?}: {}",
                self.dataset_path, e
            ))
        })
    }

    fn save_dataset(&self, dataset: &Dataset) -> Result<(), StorageError> {
        let parent = match self.dataset_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        std::fs::create_dir_all(&parent).map_err(|e| {
            StorageError::WriteError(format!("Failed to create directory {:?}: {}", parent, e))
        })?;

        // Write next to the target and rename so a failed save never leaves a
        // truncated dataset behind.
        let tmp = tempfile::NamedTempFile::new_in(&parent).map_err(|e| {
            StorageError::WriteError(format!("Failed to create temp file in {:?}: {}", parent, e))
        })?;

        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer_pretty(&mut writer, dataset)
                .map_err(|e| StorageError::WriteError(format!("Failed to encode dataset: {}", e)))?;
            writer
                .flush()
                .map_err(|e| StorageError::WriteError(format!("Failed to flush dataset: {}", e)))?;
        }

        tmp.persist(&self.dataset_path).map_err(|e| {
            StorageError::WriteError(format!(
                "Failed to write dataset to {:?}: {}",
                self.dataset_path, e
            ))
        })?;

        debug!("Dataset saved to {:?}", self.dataset_path);
        Ok(())
    }
}

/// In-memory annotation store (no persistence).
///
/// Useful for tests and for applications that keep the dataset in memory and
/// persist it elsewhere.
#[derive(Debug, Default)]
pub struct MemoryAnnotationStore {
    dataset: RwLock<Dataset>,
    segmentations: RwLock<HashMap<String, String>>,
}

impl MemoryAnnotationStore {
    pub fn new(dataset: Dataset) -> Self {
        Self {
            dataset: RwLock::new(dataset),
            segmentations: RwLock::default(),
        }
    }

    /// Store `text` under `source_url`, replacing any previous text.
    pub fn insert_segmentation(&self, source_url: &str, text: &str) {
        let mut guard = match self.segmentations.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.insert(source_url.to_owned(), text.to_owned());
    }
}

impl SegmentationSource for MemoryAnnotationStore {
    fn load_segmentation_text(&self, source_url: &str) -> Result<Option<String>, StorageError> {
        let guard = self
            .segmentations
            .read()
            .map_err(|e| StorageError::ReadError(format!("Failed to acquire read lock: {}", e)))?;
        Ok(guard.get(source_url).cloned())
    }
}

impl AnnotationStore for MemoryAnnotationStore {
    fn get_dataset(&self) -> Result<Dataset, StorageError> {
        let guard = self
            .dataset
            .read()
            .map_err(|e| StorageError::ReadError(format!("Failed to acquire read lock: {}", e)))?;
        Ok(guard.clone())
    }

    fn save_dataset(&self, dataset: &Dataset) -> Result<(), StorageError> {
        let mut guard = self.dataset.write().map_err(|e| {
            StorageError::WriteError(format!("Failed to acquire write lock: {}", e))
        })?;
        *guard = dataset.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ImageRecord;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn sample_dataset() -> Dataset {
        Dataset::new(vec![
            ImageRecord::new("a.jpg", Some(640.0), Some(480.0)).with_segmentation_source_url("a.txt"),
        ])
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryAnnotationStore::new(Dataset::default());
        assert!(store.get_dataset().unwrap().is_empty());

        store.save_dataset(&sample_dataset()).unwrap();
        assert_eq!(store.get_dataset().unwrap(), sample_dataset());

        store.insert_segmentation("a.txt", "first");
        store.insert_segmentation("a.txt", "second");
        assert_eq!(
            store.load_segmentation_text("a.txt").unwrap(),
            Some("second".to_string())
        );
    }

    #[test]
    fn test_memory_store_thread_safety() {
        let store = Arc::new(MemoryAnnotationStore::new(Dataset::default()));
        let store_clone = Arc::clone(&store);

        let handle = std::thread::spawn(move || {
            store_clone.insert_segmentation("t.txt", "thread");
            store_clone.save_dataset(&sample_dataset()).unwrap();
        });

        handle.join().unwrap();
        assert_eq!(
            store.load_segmentation_text("t.txt").unwrap(),
            Some("thread".to_string())
        );
        assert_eq!(store.get_dataset().unwrap().len(), 1);
    }

    #[test]
    fn test_file_store_dataset_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let dataset_path = temp_dir.path().join("nested").join("dataset.json");
        let store = FileAnnotationStore::new(dataset_path.clone(), temp_dir.path().into());

        assert!(matches!(store.get_dataset(), Err(StorageError::ReadError(_))));

        store.save_dataset(&sample_dataset()).unwrap();
        assert!(dataset_path.exists());
        assert_eq!(store.get_dataset().unwrap(), sample_dataset());
    }

    #[test]
    fn test_file_store_reads_bare_array() {
        let temp_dir = TempDir::new().unwrap();
        let dataset_path = temp_dir.path().join("dataset.json");
        std::fs::write(
            &dataset_path,
            r#"[{"image_url": "a.jpg", "image_width": "640", "image_height": "480", "info": []}]"#,
        )
        .unwrap();

        let store = FileAnnotationStore::new(dataset_path, temp_dir.path().into());
        let dataset = store.get_dataset().unwrap();
        assert_eq!(dataset.images()[0].image_width(), Some(640.0));
    }

    fn sorted_keys(value: &serde_json::Value) -> Vec<String> {
        let mut keys: Vec<String> = value
            .as_object()
            .map(|o| o.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    #[test]
    fn test_file_store_alignment_keeps_tool_schema() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();
        let dataset_path = root.join("dataset.json");

        let stored = serde_json::json!([{
            "image_url": "https://storage.example.com/images/img_1.jpeg",
            "image_width": "100",
            "image_height": "100",
            "info": [{
                "bbox": "0,0,10,10",
                "embeddings": "",
                "index": 0,
                "label": ["0 Navicula"],
                "segmentation": "",
                "species": "Navicula",
                "yolo_bbox": "1 0.050000 0.050000 0.100000 0.100000"
            }],
            "segmentation_url": "https://storage.example.com/segmentation/img_1.txt",
            "segmentation_indices_array": []
        }]);
        std::fs::write(&dataset_path, stored.to_string()).unwrap();
        std::fs::write(root.join("img_1.txt"), "1 0.01 0.01 0.05 0.05\n").unwrap();

        let store = FileAnnotationStore::new(dataset_path.clone(), root);
        let summary = crate::Aligner::default().align_store(&store).unwrap();
        assert_eq!(summary.matched_segments, 1);

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&dataset_path).unwrap()).unwrap();
        let image = &saved["images"][0];
        assert_eq!(sorted_keys(image), sorted_keys(&stored[0]));
        assert_eq!(sorted_keys(&image["info"][0]), sorted_keys(&stored[0]["info"][0]));

        let bbox = &image["info"][0];
        assert_eq!(bbox["segmentation"], "1 0.01 0.01 0.05 0.05");
        assert_eq!(bbox["bbox"], stored[0]["info"][0]["bbox"]);
        assert_eq!(bbox["yolo_bbox"], stored[0]["info"][0]["yolo_bbox"]);
        assert_eq!(bbox["species"], "Navicula");
        assert_eq!(image["image_width"], "100");
        assert_eq!(image["segmentation_indices_array"][0]["matched_box_index"], 0);
    }

    #[test]
    fn test_file_store_rejects_invalid_json() {
        let temp_dir = TempDir::new().unwrap();
        let dataset_path = temp_dir.path().join("dataset.json");
        std::fs::write(&dataset_path, "{not json").unwrap();

        let store = FileAnnotationStore::new(dataset_path, temp_dir.path().into());
        let err = store.get_dataset().unwrap_err();
        assert!(err.to_string().contains("Failed to parse dataset"));
    }

    #[test]
    fn test_file_store_candidate_paths() {
        let root = PathBuf::from("/data/segs");
        let store = FileAnnotationStore::new("/data/dataset.json".into(), root.clone());

        assert_eq!(
            store.candidate_paths("https://storage.example.com/bucket/paper/img_1.txt"),
            vec![
                root.join("storage.example.com/bucket/paper/img_1.txt"),
                root.join("img_1.txt"),
            ]
        );
        assert_eq!(
            store.candidate_paths("paper/img_2.txt"),
            vec![root.join("paper/img_2.txt")]
        );
    }

    #[test]
    fn test_file_store_loads_segmentation() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();
        std::fs::write(root.join("img_1.txt"), "1 0.1 0.1 0.2 0.2\n").unwrap();

        let store = FileAnnotationStore::new(root.join("dataset.json"), root.clone());

        // Flat fallback for an http URL.
        let text = store
            .load_segmentation_text("https://storage.example.com/bucket/img_1.txt")
            .unwrap();
        assert_eq!(text.as_deref(), Some("1 0.1 0.1 0.2 0.2\n"));

        // file:// URL read directly.
        let file_url = Url::from_file_path(root.join("img_1.txt")).unwrap();
        assert!(store
            .load_segmentation_text(file_url.as_str())
            .unwrap()
            .is_some());

        assert!(store.load_segmentation_text("missing.txt").unwrap().is_none());
    }

    #[test]
    fn test_file_store_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("absent");
        let store = FileAnnotationStore::new(temp_dir.path().join("dataset.json"), root);

        assert!(matches!(
            store.load_segmentation_text("a.txt"),
            Err(StorageError::NotAvailable(_))
        ));
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::NotAvailable("test".to_string());
        assert!(err.to_string().contains("not available"));

        let err = StorageError::ReadError("read failed".to_string());
        assert!(err.to_string().contains("read failed"));

        let err = StorageError::WriteError("write failed".to_string());
        assert!(err.to_string().contains("write failed"));
    }
}
