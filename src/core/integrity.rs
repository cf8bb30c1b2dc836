// ─── Integrity Verifier ───
// Streaming SHA-1 / SHA-256 digests and size accounting for downloads.

use std::path::Path;

use sha1::{Digest, Sha1};
use sha2::Sha256;

use crate::core::error::{LauncherError, LauncherResult};

/// Which digest a source publishes for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashKind {
    Sha1,
    Sha256,
}

/// Feeds downloaded chunks into a digest while they stream to disk,
/// so verification costs no extra read pass.
pub struct StreamingHasher {
    kind: HashKind,
    sha1: Sha1,
    sha256: Sha256,
    bytes_seen: u64,
}

impl StreamingHasher {
    pub fn new(kind: HashKind) -> Self {
        Self {
            kind,
            sha1: Sha1::new(),
            sha256: Sha256::new(),
            bytes_seen: 0,
        }
    }

    pub fn update(&mut self, chunk: &[u8]) {
        match self.kind {
            HashKind::Sha1 => self.sha1.update(chunk),
            HashKind::Sha256 => self.sha256.update(chunk),
        }
        self.bytes_seen += chunk.len() as u64;
    }

    pub fn bytes_seen(&self) -> u64 {
        self.bytes_seen
    }

    /// Hex digest of everything fed so far.
    pub fn finalize(self) -> String {
        match self.kind {
            HashKind::Sha1 => hex::encode(self.sha1.finalize()),
            HashKind::Sha256 => hex::encode(self.sha256.finalize()),
        }
    }
}

/// SHA-1 of a byte slice. Used where the whole document is already in memory.
pub fn sha1_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Re-hash a file on disk. Dispatched to the blocking pool since jars and
/// asset objects can be tens of megabytes.
pub async fn sha1_of_file(path: &Path) -> LauncherResult<String> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> LauncherResult<String> {
        use std::io::Read;

        let mut file = std::fs::File::open(&path).map_err(LauncherError::io(path.clone()))?;
        let mut hasher = Sha1::new();
        let mut buffer = [0u8; 64 * 1024];
        loop {
            let read = file
                .read(&mut buffer)
                .map_err(LauncherError::io(path.clone()))?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }
        Ok(hex::encode(hasher.finalize()))
    })
    .await
    .map_err(|join| LauncherError::Child(format!("hashing task panicked: {}", join)))?
}

/// `true` when `path` exists and re-hashes to `expected_sha1`.
pub async fn file_matches_sha1(path: &Path, expected_sha1: &str) -> bool {
    if !path.exists() {
        return false;
    }
    match sha1_of_file(path).await {
        Ok(actual) => actual.eq_ignore_ascii_case(expected_sha1),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha1_of_empty_input() {
        assert_eq!(sha1_hex(b""), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }

    #[test]
    fn streaming_matches_one_shot() {
        let mut hasher = StreamingHasher::new(HashKind::Sha1);
        hasher.update(b"hello ");
        hasher.update(b"world");
        assert_eq!(hasher.bytes_seen(), 11);
        assert_eq!(hasher.finalize(), sha1_hex(b"hello world"));
    }

    #[test]
    fn sha256_digest_is_selected_by_kind() {
        let mut hasher = StreamingHasher::new(HashKind::Sha256);
        hasher.update(b"");
        assert_eq!(
            hasher.finalize(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[tokio::test]
    async fn file_rehash_detects_corruption() {
        let tmp = tempdir::TempDir::new("integrity").unwrap();
        let path = tmp.path().join("object");
        tokio::fs::write(&path, b"payload").await.unwrap();

        let good = sha1_hex(b"payload");
        assert!(file_matches_sha1(&path, &good).await);

        // Flip one byte and the digest no longer matches.
        tokio::fs::write(&path, b"paYload").await.unwrap();
        assert!(!file_matches_sha1(&path, &good).await);
    }
}
