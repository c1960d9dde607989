//! Summarization batch job
//!
//! Walks a folder of case documents in filename order. Each file not yet in
//! the store is read, summarized and journaled; a failure is recorded and the
//! job moves on. Failures, including a summary that could not be journaled,
//! are written to the error log before the store is compacted.

use crate::errors::SummarizerError;
use crate::store::{SummaryEntry, SummaryStore};
use crate::summarize::Summarizer;
use imole_common::{files, metrics};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info, instrument};

/// Outcome counts of one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub summarized: usize,
    pub skipped: usize,
    pub failed: usize,
    /// `Error processing <filename>: <error>` per failure
    pub errors: Vec<String>,
}

pub struct BatchJob {
    summarizer: Summarizer,
}

impl BatchJob {
    pub fn new(summarizer: Summarizer) -> Self {
        Self { summarizer }
    }

    /// Full run: lock the store, process `documents`, compact, write the error log
    #[instrument(skip(self), fields(documents = %documents.display()))]
    pub async fn execute(
        &self,
        documents: &Path,
        store_path: &Path,
        error_log: &Path,
    ) -> Result<BatchReport, SummarizerError> {
        let mut store = SummaryStore::open(store_path)?;
        let report = self.run(documents, &mut store).await?;

        if !report.errors.is_empty() {
            files::write_atomic(error_log, report.errors.join("\n").as_bytes())?;
            info!(
                failed = report.failed,
                error_log = %error_log.display(),
                "Some files failed to process"
            );
        }

        store.compact()?;
        Ok(report)
    }

    /// Process every pending document into an already-open store
    pub async fn run(
        &self,
        documents: &Path,
        store: &mut SummaryStore,
    ) -> Result<BatchReport, SummarizerError> {
        let mut report = BatchReport::default();

        for path in list_documents(documents)? {
            let filename = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();

            if store.contains_filename(&filename) {
                report.skipped += 1;
                metrics::record_summarization("skipped");
                continue;
            }

            let index = store.next_index();
            info!(%filename, index, "Summarizing document");

            let outcome = match self.summarize_file(&path).await {
                Ok((original_length, summary)) => store
                    .append(SummaryEntry {
                        filename: filename.clone(),
                        original_length,
                        summary,
                    })
                    .map(|_| ()),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(()) => {
                    report.summarized += 1;
                    metrics::record_summarization("summarized");
                }
                Err(e) => {
                    let message = format!("Error processing {}: {}", filename, e);
                    error!(%filename, error = %e, "Document failed");
                    report.errors.push(message);
                    report.failed += 1;
                    metrics::record_summarization("failed");
                }
            }
        }

        info!(
            summarized = report.summarized,
            skipped = report.skipped,
            failed = report.failed,
            "Batch complete"
        );
        Ok(report)
    }

    async fn summarize_file(&self, path: &Path) -> Result<(usize, String), SummarizerError> {
        let text = tokio::fs::read_to_string(path).await?;
        let summary = self.summarizer.summarize(&text).await?;
        Ok((text.chars().count(), summary))
    }
}

/// Regular files in `dir`, sorted by filename
fn list_documents(dir: &Path) -> Result<Vec<PathBuf>, SummarizerError> {
    let to_err = |source| SummarizerError::Documents {
        path: dir.display().to_string(),
        source,
    };

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(to_err)? {
        let entry = entry.map_err(to_err)?;
        if entry.file_type().map_err(to_err)?.is_file() {
            paths.push(entry.path());
        }
    }

    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DocumentKey;
    use imole_common::errors::AppError;
    use imole_common::llm::MockChatModel;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct Paths {
        _dir: tempfile::TempDir,
        documents: PathBuf,
        store: PathBuf,
        error_log: PathBuf,
    }

    fn setup() -> Paths {
        let dir = tempfile::tempdir().unwrap();
        let documents = dir.path().join("docs");
        std::fs::create_dir(&documents).unwrap();
        Paths {
            store: dir.path().join("summariesup.json"),
            error_log: dir.path().join("error_log.txt"),
            documents,
            _dir: dir,
        }
    }

    fn echo_job() -> BatchJob {
        let model = MockChatModel::new(|req| {
            let prompt = req.last_user_message().unwrap_or_default();
            Ok(format!("summary: {}", prompt.rsplit('\n').next().unwrap_or_default()))
        });
        BatchJob::new(Summarizer::new(Arc::new(model), None))
    }

    #[tokio::test]
    async fn test_failure_is_logged_and_resumed() {
        let paths = setup();
        std::fs::write(paths.documents.join("a.txt"), "Case A judgment.").unwrap();
        std::fs::write(paths.documents.join("b.txt"), "Case B judgment.").unwrap();

        let fail_b = Arc::new(AtomicBool::new(true));
        let flag = fail_b.clone();
        let model = MockChatModel::new(move |req| {
            let prompt = req.last_user_message().unwrap_or_default();
            if prompt.contains("Case B") && flag.load(Ordering::SeqCst) {
                Err(AppError::language_model("mock", "overloaded"))
            } else {
                Ok("a summary".to_string())
            }
        });
        let job = BatchJob::new(Summarizer::new(Arc::new(model), None));

        let report = job
            .execute(&paths.documents, &paths.store, &paths.error_log)
            .await
            .unwrap();
        assert_eq!((report.summarized, report.failed), (1, 1));

        let log = std::fs::read_to_string(&paths.error_log).unwrap();
        assert_eq!(log.lines().count(), 1);
        assert!(log.starts_with("Error processing b.txt: "));

        fail_b.store(false, Ordering::SeqCst);
        let report = job
            .execute(&paths.documents, &paths.store, &paths.error_log)
            .await
            .unwrap();
        assert_eq!((report.summarized, report.skipped, report.failed), (1, 1, 0));

        let store = SummaryStore::open(&paths.store).unwrap();
        assert_eq!(store.get(DocumentKey(1)).unwrap().filename, "a.txt");
        assert_eq!(store.get(DocumentKey(2)).unwrap().filename, "b.txt");
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_journal_failure_is_logged() {
        let paths = setup();
        std::fs::write(paths.documents.join("a.txt"), "Case A judgment.").unwrap();

        // Block the journal once the store is open
        let journal = paths.store.with_file_name("summariesup.json.journal");
        let model = MockChatModel::new(move |_| {
            std::fs::create_dir_all(&journal)?;
            Ok("a summary".to_string())
        });
        let job = BatchJob::new(Summarizer::new(Arc::new(model), None));

        let result = job
            .execute(&paths.documents, &paths.store, &paths.error_log)
            .await;
        assert!(result.is_err());

        let log = std::fs::read_to_string(&paths.error_log).unwrap();
        assert!(log.starts_with("Error processing a.txt: "));
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_a_file_failure() {
        let paths = setup();
        std::fs::write(paths.documents.join("bad.txt"), [0xff, 0xfe, 0x00]).unwrap();
        std::fs::write(paths.documents.join("good.txt"), "Ruling.").unwrap();

        let report = echo_job()
            .execute(&paths.documents, &paths.store, &paths.error_log)
            .await
            .unwrap();

        assert_eq!((report.summarized, report.failed), (1, 1));
        assert!(report.errors[0].starts_with("Error processing bad.txt:"));
    }

    #[tokio::test]
    async fn test_original_length_counts_characters() {
        let paths = setup();
        std::fs::write(paths.documents.join("rupee.txt"), "₹5,00,000 awarded").unwrap();

        echo_job()
            .execute(&paths.documents, &paths.store, &paths.error_log)
            .await
            .unwrap();

        let store = SummaryStore::open(&paths.store).unwrap();
        let entry = store.get(DocumentKey(1)).unwrap();
        assert_eq!(entry.original_length, 17);
        assert_eq!(entry.summary, "summary: ₹5,00,000 awarded");
        assert!(!paths.error_log.exists());
    }

    #[tokio::test]
    async fn test_files_processed_in_name_order() {
        let paths = setup();
        for name in ["c.txt", "a.txt", "b.txt"] {
            std::fs::write(paths.documents.join(name), name).unwrap();
        }
        std::fs::create_dir(paths.documents.join("nested")).unwrap();

        echo_job()
            .execute(&paths.documents, &paths.store, &paths.error_log)
            .await
            .unwrap();

        let store = SummaryStore::open(&paths.store).unwrap();
        let names: Vec<_> = store.entries().map(|(_, e)| e.filename.clone()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "c.txt"]);
    }

    #[tokio::test]
    async fn test_locked_store_rejects_second_job() {
        let paths = setup();
        let _held = SummaryStore::open(&paths.store).unwrap();

        let err = echo_job()
            .execute(&paths.documents, &paths.store, &paths.error_log)
            .await
            .unwrap_err();
        assert!(err.is_store_locked());
    }

    #[tokio::test]
    async fn test_missing_documents_dir() {
        let paths = setup();
        let err = echo_job()
            .execute(&paths.documents.join("nope"), &paths.store, &paths.error_log)
            .await
            .unwrap_err();
        assert!(matches!(err, SummarizerError::Documents { .. }));
    }
}
