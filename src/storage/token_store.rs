use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::types::{TokenPair, TokenRecord, TokenStoreError};

/// Durable home of the single credential record.
///
/// `load` reports absence as [`TokenStoreError::NotFound`]; callers are
/// expected to match on it rather than treat it as a generic failure.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Result<TokenPair, TokenStoreError>;
    fn save(&self, pair: &TokenPair) -> Result<(), TokenStoreError>;
}

// ============================================================================
// File-backed store
// ============================================================================

/// Token cache persisted as a compact JSON file.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<TokenPair, TokenStoreError> {
        let content = match std::fs::read(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No token cache found");
                return Err(TokenStoreError::NotFound);
            }
            Err(e) => return Err(TokenStoreError::Io(e)),
        };

        match serde_json::from_slice::<TokenRecord>(&content) {
            Ok(record) => Ok(record.into()),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Token cache is corrupt, treating as absent"
                );
                Err(TokenStoreError::NotFound)
            }
        }
    }

    fn save(&self, pair: &TokenPair) -> Result<(), TokenStoreError> {
        let content = serde_json::to_vec(&TokenRecord::from(pair))?;
        if let Some(parent) = self.path.parent() {
            ensure_private_dir(parent)?;
        }
        atomic_write(&self.path, &content)?;
        tracing::debug!(path = %self.path.display(), expires_at = pair.expires_at, "Saved token cache");
        Ok(())
    }
}

fn ensure_private_dir(dir: &Path) -> std::io::Result<()> {
    if dir.as_os_str().is_empty() || dir.exists() {
        return Ok(());
    }
    std::fs::create_dir_all(dir)?;

    // SEC-007: user-only access to the directory holding credentials
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)) {
            tracing::warn!(path = %dir.display(), error = %e, "Failed to set token directory permissions to 0700");
        }
    }
    Ok(())
}

/// Write `content` to `dst` using write-to-temp-then-rename.
///
/// Readers of `dst` observe either the previous record or the new one,
/// never a partially written file.
fn atomic_write(dst: &Path, content: &[u8]) -> std::io::Result<()> {
    // SEC-009: unpredictable temp name; create_new refuses pre-existing paths
    let temp_path = dst.with_extension(format!("tmp.{:016x}", rand::random::<u64>()));

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut temp_file = options.open(&temp_path)?;

    let written = temp_file
        .write_all(content)
        .and_then(|()| temp_file.sync_all());
    drop(temp_file);
    if let Err(e) = written {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e);
    }

    // On Windows, rename fails if destination exists
    #[cfg(windows)]
    if dst.exists() {
        if let Err(e) = std::fs::remove_file(dst) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(e);
        }
    }

    std::fs::rename(&temp_path, dst).inspect_err(|_| {
        let _ = std::fs::remove_file(&temp_path);
    })
}

// ============================================================================
// In-memory store
// ============================================================================

/// Process-local store, for tests and for running without a cache file.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    record: Mutex<Option<TokenPair>>,
    saves: std::sync::atomic::AtomicUsize,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pair(pair: TokenPair) -> Self {
        Self {
            record: Mutex::new(Some(pair)),
            saves: Default::default(),
        }
    }

    /// Number of successful `save` calls so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<TokenPair, TokenStoreError> {
        let guard = self.record.lock().unwrap_or_else(|e| e.into_inner());
        guard.clone().ok_or(TokenStoreError::NotFound)
    }

    fn save(&self, pair: &TokenPair) -> Result<(), TokenStoreError> {
        let mut guard = self.record.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(pair.clone());
        self.saves.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
}
