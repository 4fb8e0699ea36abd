use std::{
    fmt, fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use rand::{rngs::OsRng, RngCore};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, instrument};

pub const KEY_LEN: usize = 32;

/// Key material used for encryption at rest.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    /// Identifier for logging (never log key bytes).
    pub id: String,
    /// 256-bit symmetric key.
    pub bytes: [u8; KEY_LEN],
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("id", &self.id)
            .field("bytes", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("key file error: {0}")]
    Io(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("generation error: {0}")]
    Generation(String),
}

/// Provides access to the encryption key (key file in production; memory in tests).
#[async_trait]
pub trait KeyProvider: Send + Sync {
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError>;
}

/// Key file provider. The first caller to find no file creates it; every
/// later caller, in this process or another, reads the same key back.
#[derive(Debug, Clone)]
pub struct FileKeyProvider {
    path: PathBuf,
}

impl FileKeyProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn key_id(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "key-file".to_string())
    }
}

#[async_trait]
impl KeyProvider for FileKeyProvider {
    #[instrument(skip_all, fields(path = %self.path.display()))]
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError> {
        // Key file I/O is small and synchronous; wrap in async for trait compatibility.
        let id = self.key_id();
        if let Some(existing) = read_key_file(&self.path, &id)? {
            debug!("loaded existing key");
            return Ok(existing);
        }

        let material = generate_key(id.clone());
        if write_key_exclusive(&self.path, &material)? {
            info!("created new key file");
            return Ok(material);
        }

        debug!("key file appeared concurrently; using the winner's key");
        read_key_file(&self.path, &id)?
            .ok_or_else(|| KeyError::Io("key file disappeared after creation".to_string()))
    }
}

/// In-memory key provider for tests and ephemeral sessions.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKeyProvider {
    inner: Arc<Mutex<Option<KeyMaterial>>>,
}

#[async_trait]
impl KeyProvider for InMemoryKeyProvider {
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|err| KeyError::Generation(format!("lock poisoned: {err}")))?;

        if let Some(existing) = guard.clone() {
            return Ok(existing);
        }

        let material = generate_key("memory".to_string());
        *guard = Some(material.clone());
        Ok(material)
    }
}

fn generate_key(id: String) -> KeyMaterial {
    let mut bytes = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut bytes);
    KeyMaterial { id, bytes }
}

fn encode_key(material: &KeyMaterial) -> String {
    general_purpose::STANDARD.encode(material.bytes)
}

fn decode_key(secret: &str, id: &str) -> Result<KeyMaterial, KeyError> {
    let bytes = general_purpose::STANDARD
        .decode(secret.trim())
        .map_err(|e| KeyError::Decode(e.to_string()))?;

    if bytes.len() != KEY_LEN {
        return Err(KeyError::Decode(format!(
            "expected {KEY_LEN} bytes, got {}",
            bytes.len()
        )));
    }

    let mut out = [0u8; KEY_LEN];
    out.copy_from_slice(&bytes);
    Ok(KeyMaterial {
        id: id.to_string(),
        bytes: out,
    })
}

fn read_key_file(path: &Path, id: &str) -> Result<Option<KeyMaterial>, KeyError> {
    match fs::read_to_string(path) {
        Ok(secret) => decode_key(&secret, id).map(Some),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(KeyError::Io(err.to_string())),
    }
}

/// Writes the key beside `path` and links it into place without clobbering.
/// Returns `false` when another writer got there first.
fn write_key_exclusive(path: &Path, material: &KeyMaterial) -> Result<bool, KeyError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(io_err)?;

    // NamedTempFile is created 0600 on unix, and the mode survives the link.
    let mut tmp = NamedTempFile::new_in(parent).map_err(io_err)?;
    writeln!(tmp, "{}", encode_key(material)).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;

    match tmp.persist_noclobber(path) {
        Ok(_) => Ok(true),
        Err(err) if err.error.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(err) => Err(io_err(err.error)),
    }
}

fn io_err<E: ToString>(err: E) -> KeyError {
    KeyError::Io(err.to_string())
}
