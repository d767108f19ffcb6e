/// Exact nearest-neighbour index over item vectors
use ahash::AHashSet;
use chrono::{DateTime, Utc};
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Bumped whenever the on-disk layout changes
const FORMAT_VERSION: u32 = 1;

/// zstd level used for the index file
const COMPRESSION_LEVEL: i32 = 3;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Index not found: {0}")]
    IndexNotFound(PathBuf),

    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Duplicate item id in index input: {0}")]
    DuplicateId(i64),

    #[error("Corrupt index file: {0}")]
    Corrupt(String),

    #[error("Unsupported index format version {found}")]
    UnsupportedVersion { found: u32 },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Search result with item id and squared Euclidean distance
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// Catalog item id
    pub id: i64,
    /// Squared L2 distance to the query (0.0 is an exact match)
    pub distance: f32,
}

/// Flat L2 index holding an explicit id per vector
///
/// Ids are catalog ids, not row positions, so items can leave the catalog
/// without renumbering the rest. The index is immutable once built; a
/// rebuild produces a new value and a new file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndex {
    dimension: usize,
    built_at: DateTime<Utc>,
    ids: Vec<i64>,
    vectors: Array2<f32>,
}

#[derive(Serialize, Deserialize)]
struct IndexFile<T> {
    format_version: u32,
    index: T,
}

impl VectorIndex {
    /// Build an index from `(id, vector)` pairs
    ///
    /// Every vector must have `dimension` components and ids must be unique.
    pub fn build(dimension: usize, items: &[(i64, Vec<f32>)]) -> Result<Self, VectorIndexError> {
        if dimension == 0 {
            return Err(VectorIndexError::InvalidDimension {
                expected: 1,
                actual: 0,
            });
        }

        let mut seen = AHashSet::with_capacity(items.len());
        let mut ids = Vec::with_capacity(items.len());
        let mut flat = Vec::with_capacity(items.len() * dimension);

        for (id, vector) in items {
            if vector.len() != dimension {
                return Err(VectorIndexError::InvalidDimension {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            if !seen.insert(*id) {
                return Err(VectorIndexError::DuplicateId(*id));
            }
            ids.push(*id);
            flat.extend_from_slice(vector);
        }

        let vectors = Array2::from_shape_vec((ids.len(), dimension), flat)
            .map_err(|e| VectorIndexError::Corrupt(e.to_string()))?;

        Ok(Self {
            dimension,
            built_at: Utc::now(),
            ids,
            vectors,
        })
    }

    /// Search for the `top_n` nearest vectors
    ///
    /// # Returns
    /// At most `top_n` results ordered by ascending distance. Equal distances
    /// keep insertion order.
    pub fn search(&self, query: &[f32], top_n: usize) -> Result<Vec<SearchResult>, VectorIndexError> {
        if query.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        if top_n == 0 || self.ids.is_empty() {
            return Ok(Vec::new());
        }

        let query = ArrayView1::from(query);

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .outer_iter()
            .enumerate()
            .map(|(row, vector)| {
                let diff = &vector - &query;
                (row, diff.dot(&diff))
            })
            .collect();

        // stable sort, ties stay in insertion order
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.truncate(top_n);

        Ok(scored
            .into_iter()
            .map(|(row, distance)| SearchResult {
                id: self.ids[row],
                distance,
            })
            .collect())
    }

    /// Persist the index to `path`
    ///
    /// The file is written next to the target and renamed over it, so a
    /// reader sees either the previous index or the complete new one.
    pub fn save(&self, path: &Path) -> Result<(), VectorIndexError> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let tmp = tempfile::NamedTempFile::new_in(&dir)?;
        {
            let mut encoder = zstd::stream::write::Encoder::new(tmp.as_file(), COMPRESSION_LEVEL)?;
            serde_json::to_writer(
                &mut encoder,
                &IndexFile {
                    format_version: FORMAT_VERSION,
                    index: self,
                },
            )?;
            encoder.finish()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| VectorIndexError::IoError(e.error))?;

        tracing::debug!("Saved index with {} vectors to {:?}", self.len(), path);
        Ok(())
    }

    /// Load a previously saved index
    pub fn load(path: &Path) -> Result<Self, VectorIndexError> {
        if !path.exists() {
            return Err(VectorIndexError::IndexNotFound(path.to_path_buf()));
        }

        let file = File::open(path)?;
        let decoder = zstd::stream::read::Decoder::new(BufReader::new(file))?;
        let stored: IndexFile<VectorIndex> = serde_json::from_reader(decoder)?;

        if stored.format_version != FORMAT_VERSION {
            return Err(VectorIndexError::UnsupportedVersion {
                found: stored.format_version,
            });
        }

        let index = stored.index;
        index.validate()?;

        tracing::debug!("Loaded index with {} vectors from {:?}", index.len(), path);
        Ok(index)
    }

    fn validate(&self) -> Result<(), VectorIndexError> {
        if self.dimension == 0 || self.vectors.ncols() != self.dimension {
            return Err(VectorIndexError::Corrupt(format!(
                "matrix has {} columns, header says {}",
                self.vectors.ncols(),
                self.dimension
            )));
        }
        if self.vectors.nrows() != self.ids.len() {
            return Err(VectorIndexError::Corrupt(format!(
                "{} vectors but {} ids",
                self.vectors.nrows(),
                self.ids.len()
            )));
        }
        let unique: AHashSet<_> = self.ids.iter().collect();
        if unique.len() != self.ids.len() {
            return Err(VectorIndexError::Corrupt("duplicate ids".to_string()));
        }
        Ok(())
    }

    /// Get the number of vectors in the index
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Check if index is empty
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Get vector dimension
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// When this index was built
    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// Whether an item id is present
    pub fn contains(&self, id: i64) -> bool {
        self.ids.contains(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_index() -> VectorIndex {
        VectorIndex::build(
            2,
            &[
                (10, vec![0.0, 0.0]),
                (20, vec![3.0, 4.0]),
                (30, vec![1.0, 0.0]),
                (40, vec![0.0, 1.0]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_singleton_exact_match() {
        let v0 = vec![0.25, -1.5, 3.0];
        let index = VectorIndex::build(3, &[(42, v0.clone())]).unwrap();

        let results = index.search(&v0, 5).unwrap();
        assert_eq!(
            results,
            vec![SearchResult {
                id: 42,
                distance: 0.0
            }]
        );
    }

    #[test]
    fn test_search_orders_by_squared_distance() {
        let index = sample_index();
        let results = index.search(&[0.0, 0.0], 4).unwrap();

        let ids: Vec<i64> = results.iter().map(|r| r.id).collect();
        // 30 and 40 tie at 1.0 and keep insertion order
        assert_eq!(ids, vec![10, 30, 40, 20]);
        assert_eq!(results[3].distance, 25.0);

        for pair in results.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
    }

    #[test]
    fn test_top_n_truncates() {
        let index = sample_index();
        assert_eq!(index.search(&[3.0, 4.0], 1).unwrap()[0].id, 20);
        assert_eq!(index.search(&[3.0, 4.0], 100).unwrap().len(), 4);
        assert!(index.search(&[3.0, 4.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_dimension_validation() {
        let result = VectorIndex::build(2, &[(1, vec![1.0, 2.0, 3.0])]);
        assert!(matches!(
            result,
            Err(VectorIndexError::InvalidDimension {
                expected: 2,
                actual: 3
            })
        ));

        let index = sample_index();
        assert!(index.search(&[1.0], 3).is_err());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let result = VectorIndex::build(1, &[(7, vec![1.0]), (7, vec![2.0])]);
        assert!(matches!(result, Err(VectorIndexError::DuplicateId(7))));
    }

    #[test]
    fn test_empty_index() {
        let index = VectorIndex::build(4, &[]).unwrap();
        assert!(index.is_empty());
        assert!(index.search(&[0.0; 4], 10).unwrap().is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("vectors").join("items.index");

        let index = sample_index();
        index.save(&path).unwrap();

        let loaded = VectorIndex::load(&path).unwrap();
        assert_eq!(loaded.dimension(), 2);
        assert_eq!(loaded.len(), 4);
        assert_eq!(loaded.built_at(), index.built_at());
        assert_eq!(
            loaded.search(&[0.9, 0.1], 2).unwrap(),
            index.search(&[0.9, 0.1], 2).unwrap()
        );
    }

    #[test]
    fn test_save_replaces_previous_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("items.index");

        sample_index().save(&path).unwrap();
        VectorIndex::build(2, &[(99, vec![5.0, 5.0])])
            .unwrap()
            .save(&path)
            .unwrap();

        let loaded = VectorIndex::load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains(99));
        assert!(!loaded.contains(10));

        // no temp files left behind
        let entries = std::fs::read_dir(temp.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_load_missing_and_corrupt() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("items.index");

        assert!(matches!(
            VectorIndex::load(&path),
            Err(VectorIndexError::IndexNotFound(_))
        ));

        std::fs::write(&path, b"not an index").unwrap();
        assert!(VectorIndex::load(&path).is_err());
    }
}
