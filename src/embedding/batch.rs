/// Offline batch jobs: embed catalog items and rebuild the similarity index
use super::{canonical_text, EmbeddingProvider, VectorIndex};
use crate::error::Result;
use crate::models::Item;
use crate::storage::Database;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Result of an embedding run
#[derive(Debug, Default)]
pub struct BatchResult {
    pub processed: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

/// Generates vectors for catalog items
///
/// Items are embedded in chunks of `batch_size`. A chunk that fails is
/// counted and skipped; the rest of the catalog is still processed.
pub struct EmbeddingJob {
    provider: Arc<dyn EmbeddingProvider>,
    database: Arc<Database>,
    batch_size: usize,
}

impl EmbeddingJob {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, database: Arc<Database>, batch_size: usize) -> Self {
        Self {
            provider,
            database,
            batch_size: batch_size.max(1),
        }
    }

    /// Embed items lacking a vector, or every item when `regenerate` is set
    pub fn run(&self, regenerate: bool) -> Result<BatchResult> {
        let start = Instant::now();
        let items = self.database.items_for_embedding(regenerate)?;

        if items.is_empty() {
            info!("All items already have embedding vectors");
            return Ok(BatchResult::default());
        }

        info!(
            "Embedding {} items with {} (batch size {})",
            items.len(),
            self.provider.model_name(),
            self.batch_size
        );

        let mut result = BatchResult::default();

        for chunk in items.chunks(self.batch_size) {
            match self.process_chunk(chunk) {
                Ok(count) => {
                    result.processed += count;
                    debug!("Embedded chunk of {} items ({} so far)", count, result.processed);
                }
                Err(e) => {
                    warn!("Failed to embed chunk starting at item {}: {}", chunk[0].id, e);
                    result.failed += chunk.len();
                }
            }
        }

        result.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Embedding complete: {} processed, {} failed, {}ms",
            result.processed, result.failed, result.duration_ms
        );

        Ok(result)
    }

    fn process_chunk(&self, chunk: &[Item]) -> Result<usize> {
        let texts: Vec<String> = chunk.iter().map(canonical_text).collect();
        let vectors = self.provider.embed_batch(&texts)?;

        for (item, vector) in chunk.iter().zip(&vectors) {
            self.database
                .store_embedding(item.id, vector, self.provider.model_name())?;
        }

        Ok(vectors.len())
    }
}

/// Outcome of an index rebuild
#[derive(Debug)]
pub struct IndexBuildReport {
    pub indexed: usize,
    pub skipped: usize,
    pub dimension: usize,
    pub built_at: DateTime<Utc>,
    pub path: PathBuf,
}

/// Rebuilds the persisted similarity index from stored vectors
pub struct IndexBuilder {
    database: Arc<Database>,
    index_path: PathBuf,
    dimension: Option<usize>,
}

impl IndexBuilder {
    /// # Arguments
    /// * `dimension` - Expected vector dimension; when `None` the most common
    ///   stored dimension is used
    pub fn new(database: Arc<Database>, index_path: PathBuf, dimension: Option<usize>) -> Self {
        Self {
            database,
            index_path,
            dimension,
        }
    }

    /// Build a fresh index and atomically replace the file on disk
    ///
    /// Vectors whose dimension does not match are skipped with a warning.
    pub fn rebuild(&self) -> Result<IndexBuildReport> {
        let stored = self.database.stored_embeddings()?;

        let dimension = match self.dimension.or_else(|| dominant_dimension(&stored)) {
            Some(dimension) => dimension,
            None => {
                return Err(crate::error::CheerError::Config(
                    "No stored embeddings and no configured dimension; run the embedding job first"
                        .to_string(),
                ))
            }
        };

        let total = stored.len();
        let usable: Vec<(i64, Vec<f32>)> = stored
            .into_iter()
            .filter(|(id, vector)| {
                let ok = vector.len() == dimension;
                if !ok {
                    warn!(
                        "Skipping item {}: vector has {} dimensions, index uses {}",
                        id,
                        vector.len(),
                        dimension
                    );
                }
                ok
            })
            .collect();
        let skipped = total - usable.len();

        info!("Building index over {} vectors ({}D)", usable.len(), dimension);
        let index = VectorIndex::build(dimension, &usable)?;
        index.save(&self.index_path)?;

        info!(
            "Index saved to {:?} ({} vectors, {} skipped)",
            self.index_path,
            index.len(),
            skipped
        );

        Ok(IndexBuildReport {
            indexed: index.len(),
            skipped,
            dimension,
            built_at: index.built_at(),
            path: self.index_path.clone(),
        })
    }
}

/// Most frequent vector length; ties go to the larger dimension
fn dominant_dimension(vectors: &[(i64, Vec<f32>)]) -> Option<usize> {
    let mut counts: ahash::AHashMap<usize, usize> = ahash::AHashMap::new();
    for (_, vector) in vectors {
        *counts.entry(vector.len()).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by_key(|(dimension, count)| (*count, *dimension))
        .map(|(dimension, _)| dimension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingError;
    use crate::models::NewItem;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Embeds text length and a fixed marker; fails on demand
    struct CountingProvider {
        calls: AtomicUsize,
        fail_on_call: Option<usize>,
    }

    impl EmbeddingProvider for CountingProvider {
        fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, EmbeddingError> {
            Ok(vec![text.chars().count() as f32, 1.0])
        }

        fn embed_batch(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if Some(call) == self.fail_on_call {
                return Err(EmbeddingError::GenerationError("boom".to_string()));
            }
            texts.iter().map(|t| self.embed(t)).collect()
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "counting"
        }
    }

    fn setup(items: usize) -> (TempDir, Arc<Database>) {
        let temp = TempDir::new().unwrap();
        let db = Arc::new(Database::new(&temp.path().join("test.db")).unwrap());
        for i in 0..items {
            db.insert_item(&NewItem {
                title: format!("book {}", i),
                description: Some("x".repeat(i)),
                ..Default::default()
            })
            .unwrap();
        }
        (temp, db)
    }

    fn provider(fail_on_call: Option<usize>) -> Arc<CountingProvider> {
        Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            fail_on_call,
        })
    }

    #[test]
    fn test_embeds_missing_items_only() {
        let (_temp, db) = setup(5);
        let job = EmbeddingJob::new(provider(None), db.clone(), 2);

        let result = job.run(false).unwrap();
        assert_eq!(result.processed, 5);
        assert_eq!(result.failed, 0);

        // second run has nothing to do
        assert_eq!(job.run(false).unwrap().processed, 0);
        // regeneration touches everything again
        assert_eq!(job.run(true).unwrap().processed, 5);
    }

    #[test]
    fn test_failed_chunk_does_not_abort() {
        let (_temp, db) = setup(5);
        let job = EmbeddingJob::new(provider(Some(1)), db.clone(), 2);

        let result = job.run(false).unwrap();
        assert_eq!(result.processed, 3);
        assert_eq!(result.failed, 2);
        assert_eq!(db.items_for_embedding(false).unwrap().len(), 2);
    }

    #[test]
    fn test_empty_item_gets_vector() {
        let (_temp, db) = setup(1);
        EmbeddingJob::new(provider(None), db.clone(), 8)
            .run(false)
            .unwrap();

        // book 0 has an empty description, no categories and no keywords
        let stored = db.stored_embeddings().unwrap();
        assert_eq!(stored[0].1, vec![0.0, 1.0]);
    }

    #[test]
    fn test_rebuild_skips_off_dimension_vectors() {
        let (temp, db) = setup(3);
        EmbeddingJob::new(provider(None), db.clone(), 8)
            .run(false)
            .unwrap();
        db.store_embedding(3, &[1.0, 2.0, 3.0], "other").unwrap();

        let path = temp.path().join("vectors").join("items.index");
        let report = IndexBuilder::new(db.clone(), path.clone(), None)
            .rebuild()
            .unwrap();

        assert_eq!(report.dimension, 2);
        assert_eq!(report.indexed, 2);
        assert_eq!(report.skipped, 1);

        let index = VectorIndex::load(&path).unwrap();
        assert!(!index.contains(3));
    }

    #[test]
    fn test_rebuild_without_vectors() {
        let (temp, db) = setup(0);
        let path = temp.path().join("items.index");

        assert!(IndexBuilder::new(db.clone(), path.clone(), None)
            .rebuild()
            .is_err());

        let report = IndexBuilder::new(db, path.clone(), Some(4)).rebuild().unwrap();
        assert_eq!(report.indexed, 0);
        assert!(VectorIndex::load(&path).unwrap().is_empty());
    }

    #[test]
    fn test_dominant_dimension() {
        let vectors = vec![(1, vec![0.0; 3]), (2, vec![0.0; 2]), (3, vec![0.0; 3])];
        assert_eq!(dominant_dimension(&vectors), Some(3));
        assert_eq!(dominant_dimension(&[]), None);
    }
}
