//! Loads stored summaries into the `legal_cases` vector table

use crate::store::SummaryStore;
use imole_common::db::CaseStore;
use imole_common::embeddings::Embedder;
use imole_common::errors::Result;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadReport {
    pub inserted: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct Uploader {
    embedder: Arc<dyn Embedder>,
    cases: Arc<dyn CaseStore>,
}

impl Uploader {
    pub fn new(embedder: Arc<dyn Embedder>, cases: Arc<dyn CaseStore>) -> Self {
        Self { embedder, cases }
    }

    /// Embed and insert every summary whose filename is not yet stored
    #[instrument(skip_all, fields(entries = store.len()))]
    pub async fn upload(&self, store: &SummaryStore) -> Result<UploadReport> {
        let mut report = UploadReport::default();
        let mut known = self.cases.known_filenames().await?;

        for (key, entry) in store.entries() {
            if known.contains(&entry.filename) {
                report.skipped += 1;
                continue;
            }

            let inserted = async {
                let embedding = self.embedder.embed(&entry.summary).await?;
                self.cases
                    .insert_case(&entry.filename, &entry.summary, &embedding)
                    .await
            }
            .await;

            match inserted {
                Ok(()) => {
                    info!(%key, filename = %entry.filename, "Case uploaded");
                    known.insert(entry.filename.clone());
                    report.inserted += 1;
                }
                Err(e) => {
                    warn!(%key, filename = %entry.filename, error = %e, "Case upload failed");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SummaryEntry;
    use imole_common::db::InMemoryCaseStore;
    use imole_common::embeddings::MockEmbedder;

    fn entry(filename: &str) -> SummaryEntry {
        SummaryEntry {
            filename: filename.to_string(),
            original_length: 3,
            summary: format!("{} summary", filename),
        }
    }

    #[tokio::test]
    async fn test_upload_skips_known_filenames() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SummaryStore::open(dir.path().join("summariesup.json")).unwrap();
        store.append(entry("a.txt")).unwrap();
        store.append(entry("b.txt")).unwrap();

        let cases = Arc::new(InMemoryCaseStore::new(4));
        cases.insert_case("a.txt", "already there", &[1.0, 0.0, 0.0, 0.0]).await.unwrap();

        let uploader = Uploader::new(Arc::new(MockEmbedder::new(4)), cases.clone());
        let report = tokio_test::assert_ok!(uploader.upload(&store).await);

        assert_eq!(report, UploadReport { inserted: 1, skipped: 1, failed: 0 });
        assert_eq!(cases.count().await.unwrap(), 2);
        assert!(cases.known_filenames().await.unwrap().contains("b.txt"));
    }

    #[tokio::test]
    async fn test_second_upload_inserts_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SummaryStore::open(dir.path().join("summariesup.json")).unwrap();
        store.append(entry("a.txt")).unwrap();
        store.append(entry("b.txt")).unwrap();

        let cases = Arc::new(InMemoryCaseStore::new(4));
        let uploader = Uploader::new(Arc::new(MockEmbedder::new(4)), cases.clone());
        uploader.upload(&store).await.unwrap();
        let report = uploader.upload(&store).await.unwrap();

        assert_eq!(report, UploadReport { inserted: 0, skipped: 2, failed: 0 });
        assert_eq!(cases.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_counts_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SummaryStore::open(dir.path().join("summariesup.json")).unwrap();
        store.append(entry("a.txt")).unwrap();

        let cases = Arc::new(InMemoryCaseStore::new(1536));
        let uploader = Uploader::new(Arc::new(MockEmbedder::new(8)), cases.clone());
        let report = uploader.upload(&store).await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(cases.count().await.unwrap(), 0);
    }
}
