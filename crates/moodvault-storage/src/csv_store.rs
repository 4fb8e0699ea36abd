use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use chrono::Utc;
use moodvault_core::{
    emotion::EmotionLabel,
    store::{
        validate_text, CorpusView, DecryptedRecord, RecordStore, RecordStoreError, RowText,
        StoredRecord,
    },
};
use tempfile::NamedTempFile;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::{
    cipher::Cipher,
    key_provider::{KeyError, KeyProvider},
};

const HEADER: &str = "label,ciphertext";

/// Append-only corpus of `(label, ciphertext)` rows in a CSV file.
///
/// Every append rewrites the whole file through a temp file in the same
/// directory followed by a rename, so readers only ever see the old or the
/// new corpus. Appends hold the write lock across read-modify-rewrite; loads
/// share the read lock.
pub struct EncryptedCsvStore {
    path: PathBuf,
    cipher: Cipher,
    lock: RwLock<()>,
    #[cfg(test)]
    inject_crash: std::sync::atomic::AtomicBool,
}

/// What was found at the corpus path.
#[derive(Debug, PartialEq, Eq)]
enum CorpusState {
    Absent,
    Present(Vec<StoredRecord>),
    Unparsable(String),
}

impl EncryptedCsvStore {
    pub fn new(path: impl Into<PathBuf>, cipher: Cipher) -> Self {
        Self {
            path: path.into(),
            cipher,
            lock: RwLock::new(()),
            #[cfg(test)]
            inject_crash: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Resolve the key from `provider` (creating it on first run) and open
    /// the store at `path`.
    pub async fn open<P: KeyProvider + ?Sized>(
        path: impl Into<PathBuf>,
        provider: &P,
    ) -> Result<Self, KeyError> {
        let cipher = Cipher::from_provider(provider).await?;
        Ok(Self::new(path, cipher))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(test)]
    fn crash_before_rename(&self) -> bool {
        self.inject_crash.load(std::sync::atomic::Ordering::SeqCst)
    }

    #[cfg(not(test))]
    fn crash_before_rename(&self) -> bool {
        false
    }

    fn display_path(&self) -> String {
        self.path.to_string_lossy().to_string()
    }
}

#[async_trait]
impl RecordStore for EncryptedCsvStore {
    #[instrument(skip_all, fields(path = %self.path.display(), %label))]
    async fn append(
        &self,
        plaintext: &str,
        label: EmotionLabel,
    ) -> Result<StoredRecord, RecordStoreError> {
        validate_text(plaintext)?;
        let ciphertext =
            self.cipher
                .encrypt(plaintext)
                .map_err(|e| RecordStoreError::Encryption {
                    reason: e.to_string(),
                })?;

        let _guard = self.lock.write().await;
        let (mut rows, damaged) = match read_corpus(&self.path)? {
            CorpusState::Absent => {
                debug!("no corpus yet; starting empty");
                (Vec::new(), None)
            }
            CorpusState::Present(rows) => (rows, None),
            CorpusState::Unparsable(reason) => (Vec::new(), Some(reason)),
        };

        let record = StoredRecord { label, ciphertext };
        rows.push(record.clone());
        let staged = stage_corpus(&self.path, &render_corpus(&rows))?;

        // The damaged file stays in place until the rename below replaces it.
        if let Some(reason) = damaged {
            let copied_to = quarantine(&self.path)?;
            warn!(%reason, copied_to = %copied_to.display(), "corpus unreadable; kept a copy and starting empty");
        }

        commit_corpus(staged, &self.path, self.crash_before_rename())?;
        info!(rows = rows.len(), "record appended");
        Ok(record)
    }

    #[instrument(skip_all, fields(path = %self.path.display()))]
    async fn load_all(&self) -> Result<CorpusView, RecordStoreError> {
        let _guard = self.lock.read().await;
        let rows = match read_corpus(&self.path)? {
            CorpusState::Absent => {
                return Err(RecordStoreError::NotFound {
                    path: self.display_path(),
                })
            }
            CorpusState::Unparsable(reason) => {
                return Err(RecordStoreError::Corrupt {
                    path: self.display_path(),
                    reason,
                })
            }
            CorpusState::Present(rows) => rows,
        };

        let decrypted = rows
            .into_iter()
            .enumerate()
            .map(|(index, row)| {
                let plaintext = match self.cipher.decrypt(&row.ciphertext) {
                    Ok(text) => RowText::Clear(text),
                    Err(err) => {
                        debug!(row = index, error = %err, "row failed to decrypt");
                        RowText::Failed {
                            reason: err.to_string(),
                        }
                    }
                };
                DecryptedRecord {
                    plaintext,
                    label: row.label,
                    ciphertext: row.ciphertext,
                }
            })
            .collect();

        let view = CorpusView::from_rows(decrypted);
        let failed = view.failed_rows();
        if failed > 0 {
            warn!(failed, key_id = self.cipher.key_id(), "some rows could not be decrypted");
        }
        debug!(rows = view.rows.len(), "corpus loaded");
        Ok(view)
    }
}

fn read_corpus(path: &Path) -> Result<CorpusState, RecordStoreError> {
    let contents = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(CorpusState::Absent),
        Err(err) => return Err(storage_err(err)),
    };

    let parsed = String::from_utf8(contents)
        .map_err(|e| format!("not UTF-8: {e}"))
        .and_then(|text| parse_corpus(&text));
    Ok(match parsed {
        Ok(rows) => CorpusState::Present(rows),
        Err(reason) => CorpusState::Unparsable(reason),
    })
}

/// Parse the header and rows. A zero-length or blank file is an empty corpus.
fn parse_corpus(contents: &str) -> Result<Vec<StoredRecord>, String> {
    let mut lines = contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty());

    match lines.next() {
        None => return Ok(Vec::new()),
        Some((_, header)) if header.trim() == HEADER => {}
        Some((_, header)) => return Err(format!("unexpected header {header:?}")),
    }

    lines
        .map(|(index, line)| {
            let line_no = index + 1;
            let fields: Vec<&str> = line.split(',').collect();
            let [label, ciphertext] = fields.as_slice() else {
                return Err(format!(
                    "line {line_no}: expected 2 fields, found {}",
                    fields.len()
                ));
            };
            let label = label
                .parse::<EmotionLabel>()
                .map_err(|e| format!("line {line_no}: {e}"))?;
            Ok(StoredRecord {
                label,
                ciphertext: ciphertext.trim().to_string(),
            })
        })
        .collect()
}

fn render_corpus(rows: &[StoredRecord]) -> String {
    let mut out = String::with_capacity(HEADER.len() + 1 + rows.len() * 64);
    out.push_str(HEADER);
    out.push('\n');
    for row in rows {
        out.push_str(row.label.as_str());
        out.push(',');
        out.push_str(&row.ciphertext);
        out.push('\n');
    }
    out
}

/// Write the full corpus to a synced temp file beside `path`.
fn stage_corpus(path: &Path, body: &str) -> Result<NamedTempFile, RecordStoreError> {
    let parent = parent_dir(path);
    fs::create_dir_all(parent).map_err(storage_err)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(storage_err)?;
    tmp.write_all(body.as_bytes()).map_err(storage_err)?;
    tmp.flush().map_err(storage_err)?;
    tmp.as_file().sync_all().map_err(storage_err)?;
    Ok(tmp)
}

/// Atomically replace `path` with the staged corpus.
fn commit_corpus(
    staged: NamedTempFile,
    path: &Path,
    crash_before_rename: bool,
) -> Result<(), RecordStoreError> {
    if crash_before_rename {
        // Dropping `staged` removes it, as a crash's leftover would be ignored.
        return Err(RecordStoreError::Persistence {
            reason: "simulated crash before rename".to_string(),
        });
    }

    staged.persist(path).map_err(|e| storage_err(e.error))?;
    Ok(())
}

/// Copy an unreadable corpus aside so its bytes survive the next rewrite.
fn quarantine(path: &Path) -> Result<PathBuf, RecordStoreError> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "corpus".to_string());
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
    let target = parent_dir(path).join(format!("{file_name}.corrupt-{stamp}"));
    fs::copy(path, &target).map_err(storage_err)?;
    Ok(target)
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn storage_err<E: ToString>(err: E) -> RecordStoreError {
    RecordStoreError::Persistence {
        reason: err.to_string(),
    }
}
