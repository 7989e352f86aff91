//! Command history.
//!
//! Each submitted line is recorded with its final output. Stores prune the
//! oldest entries past `max_size`. `FileHistory` keeps the log as a JSON array
//! and rewrites it after every change.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ShellError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub command: String,
    pub output: Vec<String>,
    /// RFC 3339
    pub timestamp: String,
}

impl HistoryEntry {
    pub fn new(command: impl Into<String>, output: Vec<String>) -> Self {
        Self {
            command: command.into(),
            output,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Append-only log of submitted lines.
pub trait HistoryStore {
    fn push(&self, entry: HistoryEntry) -> Result<()>;

    /// Oldest first.
    fn entries(&self) -> Vec<HistoryEntry>;

    fn clear(&self) -> Result<()>;

    fn len(&self) -> usize {
        self.entries().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entry at `index`; negative indices count back from the end, so `-1`
    /// is the most recent.
    fn get(&self, index: isize) -> Option<HistoryEntry> {
        let mut entries = self.entries();
        let len = entries.len() as isize;
        let index = if index < 0 { len + index } else { index };
        if !(0..len).contains(&index) {
            return None;
        }
        Some(entries.swap_remove(index as usize))
    }
}

/// History kept in memory only.
#[derive(Debug)]
pub struct MemoryHistory {
    entries: RefCell<VecDeque<HistoryEntry>>,
    max_size: usize,
}

impl MemoryHistory {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: RefCell::new(VecDeque::new()),
            max_size,
        }
    }

    fn with_entries(entries: Vec<HistoryEntry>, max_size: usize) -> Self {
        let history = Self {
            entries: RefCell::new(entries.into()),
            max_size,
        };
        history.prune();
        history
    }

    fn prune(&self) {
        let mut entries = self.entries.borrow_mut();
        while entries.len() > self.max_size {
            entries.pop_front();
        }
    }
}

impl Default for MemoryHistory {
    fn default() -> Self {
        Self::new(100)
    }
}

impl HistoryStore for MemoryHistory {
    fn push(&self, entry: HistoryEntry) -> Result<()> {
        self.entries.borrow_mut().push_back(entry);
        self.prune();
        Ok(())
    }

    fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.borrow().iter().cloned().collect()
    }

    fn clear(&self) -> Result<()> {
        self.entries.borrow_mut().clear();
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.borrow().len()
    }
}

/// History persisted as a JSON array.
#[derive(Debug)]
pub struct FileHistory {
    path: PathBuf,
    memory: MemoryHistory,
}

impl FileHistory {
    /// Open `path`, loading existing entries. A missing file starts empty.
    pub fn open(path: impl AsRef<Path>, max_size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => Vec::new(),
            Ok(text) => serde_json::from_str(&text).map_err(|e| {
                ShellError::History(format!("{}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(ShellError::History(format!("{}: {}", path.display(), e))),
        };
        Ok(Self {
            path,
            memory: MemoryHistory::with_entries(entries, max_size),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.memory.entries())
            .map_err(|e| ShellError::History(e.to_string()))?;
        fs::write(&self.path, json)
            .map_err(|e| ShellError::History(format!("{}: {}", self.path.display(), e)))
    }
}

impl HistoryStore for FileHistory {
    fn push(&self, entry: HistoryEntry) -> Result<()> {
        self.memory.push(entry)?;
        self.save()
    }

    fn entries(&self) -> Vec<HistoryEntry> {
        self.memory.entries()
    }

    fn clear(&self) -> Result<()> {
        self.memory.clear()?;
        self.save()
    }

    fn len(&self) -> usize {
        self.memory.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(command: &str) -> HistoryEntry {
        HistoryEntry::new(command, vec![format!("{} output", command)])
    }

    #[test]
    fn test_prunes_oldest() {
        let history = MemoryHistory::new(2);
        for cmd in ["a", "b", "c"] {
            history.push(entry(cmd)).unwrap();
        }
        let commands: Vec<_> = history.entries().into_iter().map(|e| e.command).collect();
        assert_eq!(commands, vec!["b", "c"]);
    }

    #[test]
    fn test_negative_index() {
        let history = MemoryHistory::default();
        for cmd in ["a", "b", "c"] {
            history.push(entry(cmd)).unwrap();
        }
        assert_eq!(history.get(-1).unwrap().command, "c");
        assert_eq!(history.get(-3).unwrap().command, "a");
        assert_eq!(history.get(0).unwrap().command, "a");
        assert!(history.get(3).is_none());
        assert!(history.get(-4).is_none());
    }

    #[test]
    fn test_timestamp_is_rfc3339() {
        let e = entry("x");
        assert!(chrono::DateTime::parse_from_rfc3339(&e.timestamp).is_ok());
    }

    #[test]
    fn test_file_history_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        {
            let history = FileHistory::open(&path, 10).unwrap();
            assert!(history.is_empty());
            history.push(entry("echo hi")).unwrap();
            history.push(entry("len")).unwrap();
        }
        let reopened = FileHistory::open(&path, 1).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.get(-1).unwrap().command, "len");
    }

    #[test]
    fn test_file_history_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            FileHistory::open(&path, 10),
            Err(ShellError::History(_))
        ));
    }
}
