// ─── Instance Log Store ───
// Live per-instance log buffers plus an LRU over sealed (rotated) logs.
// The supervisor feeds live buffers; historical reads come from disk and
// are reclassified with the same rules.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::events::LogCategory;

/// Live buffers keep at most this many lines; the full stream is always on
/// disk in `latest.log`.
const LIVE_BUFFER_CAP: usize = 5_000;

/// How many sealed logs stay parsed in memory.
const SEALED_CACHE_CAP: usize = 4;

#[derive(Debug, Clone)]
pub struct TaggedLine {
    pub timestamp: DateTime<Utc>,
    pub kind: LogCategory,
    pub text: String,
}

/// Tag a raw game log line. Classification only affects the tag, every
/// line is retained.
pub fn classify_line(line: &str) -> LogCategory {
    if line.contains("/ERROR]:") {
        LogCategory::Error
    } else if line.contains("/WARN]:") {
        LogCategory::Warn
    } else {
        LogCategory::Info
    }
}

/// Bounded ordered line buffer for one running instance.
#[derive(Debug, Default)]
pub struct LogBuffer {
    lines: VecDeque<TaggedLine>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self {
            lines: VecDeque::new(),
        }
    }

    pub fn push(&mut self, line: TaggedLine) {
        if self.lines.len() == LIVE_BUFFER_CAP {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn snapshot(&self) -> Vec<TaggedLine> {
        self.lines.iter().cloned().collect()
    }
}

/// Shared log state: live buffers keyed by instance name, sealed logs in a
/// small LRU keyed by `(instance, log_id)`.
#[derive(Default)]
pub struct LogStore {
    live: Mutex<HashMap<String, Arc<Mutex<LogBuffer>>>>,
    sealed: Mutex<SealedCache>,
}

impl LogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh live buffer for a starting instance.
    pub async fn open_live(&self, instance_name: &str) -> Arc<Mutex<LogBuffer>> {
        let buffer = Arc::new(Mutex::new(LogBuffer::new()));
        self.live
            .lock()
            .await
            .insert(instance_name.to_string(), Arc::clone(&buffer));
        buffer
    }

    pub async fn live_snapshot(&self, instance_name: &str) -> Option<Vec<TaggedLine>> {
        let buffer = {
            let live = self.live.lock().await;
            live.get(instance_name).cloned()
        }?;
        let snapshot = buffer.lock().await.snapshot();
        Some(snapshot)
    }

    /// Called on process exit: the live buffer is dropped (its content now
    /// lives in the rotated file) and pre-seeded into the sealed cache.
    pub async fn seal(&self, instance_name: &str, log_id: &str) {
        let removed = self.live.lock().await.remove(instance_name);
        if let Some(buffer) = removed {
            let lines = buffer.lock().await.snapshot();
            self.sealed
                .lock()
                .await
                .insert(cache_key(instance_name, log_id), lines);
        }
    }

    /// Read a rotated log, serving from the LRU when possible.
    pub async fn read_sealed(
        &self,
        instance_name: &str,
        log_id: &str,
        path: &Path,
    ) -> LauncherResult<Vec<TaggedLine>> {
        let key = cache_key(instance_name, log_id);
        if let Some(lines) = self.sealed.lock().await.get(&key) {
            return Ok(lines);
        }

        let lines = read_log_file(path).await?;
        self.sealed.lock().await.insert(key, lines.clone());
        Ok(lines)
    }
}

fn cache_key(instance_name: &str, log_id: &str) -> String {
    format!("{}/{}", instance_name, log_id)
}

/// Parse a log file from disk, reclassifying every line.
pub async fn read_log_file(path: &Path) -> LauncherResult<Vec<TaggedLine>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(LauncherError::io(path.to_path_buf()))?;

    let timestamp = Utc::now();
    Ok(content
        .lines()
        .map(|line| TaggedLine {
            timestamp,
            kind: classify_line(line),
            text: line.to_string(),
        })
        .collect())
}

/// Tiny LRU: newest at the back of the order list. The cache holds a
/// handful of parsed files, so linear bookkeeping is fine.
#[derive(Default)]
struct SealedCache {
    entries: HashMap<String, Vec<TaggedLine>>,
    order: VecDeque<String>,
}

impl SealedCache {
    fn get(&mut self, key: &str) -> Option<Vec<TaggedLine>> {
        let lines = self.entries.get(key)?.clone();
        self.touch(key);
        Some(lines)
    }

    fn insert(&mut self, key: String, lines: Vec<TaggedLine>) {
        if self.entries.insert(key.clone(), lines).is_none() {
            self.order.push_back(key);
        } else {
            self.touch(&key);
        }
        while self.entries.len() > SEALED_CACHE_CAP {
            if let Some(evicted) = self.order.pop_front() {
                self.entries.remove(&evicted);
            }
        }
    }

    fn touch(&mut self, key: &str) {
        if let Some(position) = self.order.iter().position(|k| k == key) {
            self.order.remove(position);
            self.order.push_back(key.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_rules() {
        assert_eq!(
            classify_line("[12:00:00] [Render thread/ERROR]: boom"),
            LogCategory::Error
        );
        assert_eq!(
            classify_line("[12:00:00] [Worker/WARN]: careful"),
            LogCategory::Warn
        );
        assert_eq!(
            classify_line("[12:00:00] [Render thread/INFO]: Setting user: Steve"),
            LogCategory::Info
        );
        // Mentioning ERROR in message text is not an error tag.
        assert_eq!(
            classify_line("[12:00:00] [main/INFO]: no ERROR here"),
            LogCategory::Info
        );
    }

    #[test]
    fn live_buffer_is_bounded() {
        let mut buffer = LogBuffer::new();
        for index in 0..(LIVE_BUFFER_CAP + 10) {
            buffer.push(TaggedLine {
                timestamp: Utc::now(),
                kind: LogCategory::Info,
                text: format!("line {}", index),
            });
        }
        let snapshot = buffer.snapshot();
        assert_eq!(snapshot.len(), LIVE_BUFFER_CAP);
        assert_eq!(snapshot[0].text, "line 10");
    }

    #[test]
    fn sealed_cache_evicts_least_recently_used() {
        let mut cache = SealedCache::default();
        for index in 0..SEALED_CACHE_CAP {
            cache.insert(format!("key{}", index), Vec::new());
        }
        // Touch key0 so key1 becomes the eviction candidate.
        assert!(cache.get("key0").is_some());
        cache.insert("fresh".to_string(), Vec::new());

        assert!(cache.get("key0").is_some());
        assert!(cache.get("key1").is_none());
        assert!(cache.get("fresh").is_some());
    }

    #[tokio::test]
    async fn seal_moves_live_lines_to_cache() {
        let store = LogStore::new();
        let buffer = store.open_live("T").await;
        buffer.lock().await.push(TaggedLine {
            timestamp: Utc::now(),
            kind: LogCategory::Info,
            text: "hello".into(),
        });

        store.seal("T", "2026-03-01.log").await;
        assert!(store.live_snapshot("T").await.is_none());

        // Cached without touching the (nonexistent) file.
        let lines = store
            .read_sealed("T", "2026-03-01.log", Path::new("/nonexistent"))
            .await
            .unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "hello");
    }
}
