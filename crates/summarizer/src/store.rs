//! Local summary store
//!
//! Layout next to `summariesup.json`:
//! - `summariesup.json`: snapshot, `document_<n>` -> entry, ordered by `n`
//! - `summariesup.json.journal`: JSON lines appended per successful summary
//! - `summariesup.json.lock`: held exclusively while the store is open
//!
//! Opening replays the journal over the snapshot; [`SummaryStore::compact`]
//! folds it back in with an atomic rename.

use crate::errors::SummarizerError;
use fs4::FileExt;
use imole_common::errors::AppError;
use imole_common::files;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

const KEY_PREFIX: &str = "document_";

/// `document_<n>`; orders numerically
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentKey(pub u64);

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", KEY_PREFIX, self.0)
    }
}

impl FromStr for DocumentKey {
    type Err = SummarizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix(KEY_PREFIX)
            .and_then(|n| n.parse().ok())
            .map(DocumentKey)
            .ok_or_else(|| SummarizerError::InvalidKey(s.to_string()))
    }
}

impl Serialize for DocumentKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DocumentKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryEntry {
    pub filename: String,
    /// Source length in characters
    pub original_length: usize,
    pub summary: String,
}

#[derive(Serialize, Deserialize)]
struct JournalRecord {
    key: DocumentKey,
    #[serde(flatten)]
    entry: SummaryEntry,
}

/// Open handle on the summary store; the lock is held until drop
pub struct SummaryStore {
    path: PathBuf,
    journal_path: PathBuf,
    entries: BTreeMap<DocumentKey, SummaryEntry>,
    journal: Option<File>,
    _lock: File,
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

impl SummaryStore {
    /// Lock and load the store; a missing snapshot is an empty store
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SummarizerError> {
        let path = path.into();
        let journal_path = with_suffix(&path, ".journal");
        let lock_path = with_suffix(&path, ".lock");

        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)?;
        if let Err(e) = lock.try_lock_exclusive() {
            return Err(match e.kind() {
                ErrorKind::WouldBlock => AppError::StoreLocked {
                    path: lock_path.display().to_string(),
                }
                .into(),
                _ => e.into(),
            });
        }

        let mut entries: BTreeMap<DocumentKey, SummaryEntry> = if path.exists() {
            files::read_json(&path)?
        } else {
            BTreeMap::new()
        };

        let replayed = replay_journal(&journal_path, &mut entries)?;
        if replayed > 0 {
            info!(replayed, journal = %journal_path.display(), "Recovered journaled summaries");
        }

        debug!(entries = entries.len(), store = %path.display(), "Summary store opened");

        Ok(Self {
            path,
            journal_path,
            entries,
            journal: None,
            _lock: lock,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One past the highest index; 1 for an empty store
    pub fn next_index(&self) -> u64 {
        self.entries.keys().next_back().map_or(1, |key| key.0 + 1)
    }

    pub fn contains_filename(&self, filename: &str) -> bool {
        self.entries.values().any(|entry| entry.filename == filename)
    }

    pub fn get(&self, key: DocumentKey) -> Option<&SummaryEntry> {
        self.entries.get(&key)
    }

    pub fn entries(&self) -> impl Iterator<Item = (DocumentKey, &SummaryEntry)> {
        self.entries.iter().map(|(key, entry)| (*key, entry))
    }

    /// Record a summary under the next index; journaled before returning
    pub fn append(&mut self, entry: SummaryEntry) -> Result<DocumentKey, SummarizerError> {
        let key = DocumentKey(self.next_index());

        let mut journal = match self.journal.take() {
            Some(file) => file,
            None => OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.journal_path)?,
        };

        let record = JournalRecord { key, entry };
        let mut line = serde_json::to_vec(&record).map_err(AppError::from)?;
        line.push(b'\n');
        journal.write_all(&line)?;
        journal.sync_data()?;

        self.journal = Some(journal);
        self.entries.insert(key, record.entry);
        Ok(key)
    }

    /// Write the snapshot and drop the journal
    pub fn compact(&mut self) -> Result<(), SummarizerError> {
        files::write_json(&self.path, &self.entries)?;

        self.journal = None;
        if self.journal_path.exists() {
            std::fs::remove_file(&self.journal_path)?;
        }

        info!(entries = self.entries.len(), store = %self.path.display(), "Summary store saved");
        Ok(())
    }
}

/// Apply journal lines over `entries`
///
/// A torn final line is dropped and cut from the file, so the next append
/// starts on a fresh line.
fn replay_journal(
    path: &Path,
    entries: &mut BTreeMap<DocumentKey, SummaryEntry>,
) -> Result<usize, SummarizerError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut replayed = 0;
    let mut good_end = 0;
    let mut offset = 0;

    for (i, line) in bytes.split_inclusive(|b| *b == b'\n').enumerate() {
        offset += line.len();
        if line.iter().all(u8::is_ascii_whitespace) {
            good_end = offset;
            continue;
        }
        match serde_json::from_slice::<JournalRecord>(line) {
            Ok(record) => {
                entries.insert(record.key, record.entry);
                replayed += 1;
                good_end = offset;
            }
            Err(e) if offset == bytes.len() => {
                warn!(error = %e, journal = %path.display(), "Ignoring incomplete final journal line");
            }
            Err(source) => {
                return Err(SummarizerError::Journal {
                    path: path.display().to_string(),
                    line: i + 1,
                    source,
                })
            }
        }
    }

    if good_end < bytes.len() {
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(good_end as u64)?;
        file.sync_data()?;
    } else if bytes.last().is_some_and(|b| *b != b'\n') {
        // Complete record whose newline never made it to disk
        let mut file = OpenOptions::new().append(true).open(path)?;
        file.write_all(b"\n")?;
        file.sync_data()?;
    }

    Ok(replayed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(filename: &str) -> SummaryEntry {
        SummaryEntry {
            filename: filename.to_string(),
            original_length: 10,
            summary: format!("summary of {}", filename),
        }
    }

    #[test]
    fn test_key_format() {
        assert_eq!(DocumentKey(12).to_string(), "document_12");
        assert_eq!("document_3".parse::<DocumentKey>().unwrap(), DocumentKey(3));
        assert!("doc_3".parse::<DocumentKey>().is_err());
        assert!("document_x".parse::<DocumentKey>().is_err());
    }

    #[test]
    fn test_empty_store_starts_at_one() {
        let dir = tempfile::tempdir().unwrap();
        let store = SummaryStore::open(dir.path().join("summariesup.json")).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.next_index(), 1);
    }

    #[test]
    fn test_next_index_is_numeric_max_plus_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summariesup.json");
        std::fs::write(
            &path,
            r#"{
                "document_2": {"filename": "b.txt", "original_length": 1, "summary": "b"},
                "document_10": {"filename": "j.txt", "original_length": 1, "summary": "j"}
            }"#,
        )
        .unwrap();

        let mut store = SummaryStore::open(&path).unwrap();
        assert_eq!(store.next_index(), 11);

        store.compact().unwrap();
        let saved = std::fs::read_to_string(&path).unwrap();
        let first = saved.find("document_2").unwrap();
        let second = saved.find("document_10").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_invalid_key_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summariesup.json");
        std::fs::write(
            &path,
            r#"{"summary_1": {"filename": "a.txt", "original_length": 1, "summary": "a"}}"#,
        )
        .unwrap();

        assert!(SummaryStore::open(&path).is_err());
    }

    #[test]
    fn test_second_open_is_rejected_while_locked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summariesup.json");

        let held = SummaryStore::open(&path).unwrap();
        let err = SummaryStore::open(&path).err().unwrap();
        assert!(err.is_store_locked());

        drop(held);
        assert!(SummaryStore::open(&path).is_ok());
    }

    #[test]
    fn test_journal_survives_without_compaction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summariesup.json");

        {
            let mut store = SummaryStore::open(&path).unwrap();
            store.append(entry("a.txt")).unwrap();
            store.append(entry("b.txt")).unwrap();
        }
        assert!(!path.exists());

        let store = SummaryStore::open(&path).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(DocumentKey(2)).unwrap().filename, "b.txt");
        assert!(store.contains_filename("a.txt"));
    }

    #[test]
    fn test_torn_final_line_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summariesup.json");
        {
            let mut store = SummaryStore::open(&path).unwrap();
            store.append(entry("a.txt")).unwrap();
        }

        let journal = with_suffix(&path, ".journal");
        let mut file = OpenOptions::new().append(true).open(&journal).unwrap();
        file.write_all(br#"{"key":"document_2","filen"#).unwrap();
        drop(file);

        let store = SummaryStore::open(&path).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.next_index(), 2);
    }

    #[test]
    fn test_appends_after_torn_line_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summariesup.json");
        {
            let mut store = SummaryStore::open(&path).unwrap();
            store.append(entry("a.txt")).unwrap();
        }

        let journal = with_suffix(&path, ".journal");
        let mut file = OpenOptions::new().append(true).open(&journal).unwrap();
        file.write_all(br#"{"key":"document_2","filen"#).unwrap();
        drop(file);

        {
            let mut store = SummaryStore::open(&path).unwrap();
            assert_eq!(store.append(entry("b.txt")).unwrap(), DocumentKey(2));
            assert_eq!(store.append(entry("c.txt")).unwrap(), DocumentKey(3));
        }

        let store = SummaryStore::open(&path).unwrap();
        assert_eq!(store.len(), 3);
        for name in ["a.txt", "b.txt", "c.txt"] {
            assert!(store.contains_filename(name), "{} missing", name);
        }
        let text = std::fs::read_to_string(&journal).unwrap();
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_record_missing_newline_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summariesup.json");
        {
            let mut store = SummaryStore::open(&path).unwrap();
            store.append(entry("a.txt")).unwrap();
        }

        let journal = with_suffix(&path, ".journal");
        let text = std::fs::read_to_string(&journal).unwrap();
        std::fs::write(&journal, text.trim_end()).unwrap();

        {
            let mut store = SummaryStore::open(&path).unwrap();
            assert_eq!(store.len(), 1);
            store.append(entry("b.txt")).unwrap();
        }

        let store = SummaryStore::open(&path).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(DocumentKey(2)).unwrap().filename, "b.txt");
    }

    #[test]
    fn test_lock_open_failure_is_not_store_locked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summariesup.json");
        std::fs::create_dir(with_suffix(&path, ".lock")).unwrap();

        let err = SummaryStore::open(&path).err().unwrap();
        assert!(!err.is_store_locked());
        assert!(matches!(err, SummarizerError::Io(_)));
    }

    #[test]
    fn test_compact_folds_journal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summariesup.json");

        let mut store = SummaryStore::open(&path).unwrap();
        store.append(entry("a.txt")).unwrap();
        store.compact().unwrap();
        drop(store);

        assert!(!with_suffix(&path, ".journal").exists());
        let saved: BTreeMap<DocumentKey, SummaryEntry> = files::read_json(&path).unwrap();
        assert_eq!(saved.get(&DocumentKey(1)), Some(&entry("a.txt")));
    }
}
