use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;

use crate::emotion::{EmotionLabel, EmotionTally};

/// Text shown in place of a row that could not be decrypted.
pub const DECRYPTION_FAILED: &str = "<decryption failed>";

/// Errors produced by record store implementations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordStoreError {
    /// Empty or whitespace-only text was submitted.
    #[error("text must not be empty")]
    Validation,
    /// The corpus has never been written.
    #[error("no corpus found at {path}")]
    NotFound { path: String },
    /// The corpus exists but does not parse.
    #[error("corpus at {path} is unreadable: {reason}")]
    Corrupt { path: String, reason: String },
    /// Writing or replacing the corpus failed; nothing was committed.
    #[error("persistence failure: {reason}")]
    Persistence { reason: String },
    #[error("encryption failure: {reason}")]
    Encryption { reason: String },
}

/// One row as it sits on disk: the label and the encrypted text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub label: EmotionLabel,
    pub ciphertext: String,
}

/// Outcome of decrypting one stored row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowText {
    Clear(String),
    Failed { reason: String },
}

impl RowText {
    /// Plaintext, or the failure sentinel.
    pub fn display(&self) -> &str {
        match self {
            RowText::Clear(text) => text,
            RowText::Failed { .. } => DECRYPTION_FAILED,
        }
    }

    pub fn as_clear(&self) -> Option<&str> {
        match self {
            RowText::Clear(text) => Some(text),
            RowText::Failed { .. } => None,
        }
    }

    pub fn is_clear(&self) -> bool {
        matches!(self, RowText::Clear(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedRecord {
    pub plaintext: RowText,
    pub label: EmotionLabel,
    pub ciphertext: String,
}

/// Full decrypted view of a corpus plus its label distribution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorpusView {
    pub rows: Vec<DecryptedRecord>,
    pub tally: EmotionTally,
}

impl CorpusView {
    /// Builds the view, counting labels whether or not a row decrypted.
    pub fn from_rows(rows: Vec<DecryptedRecord>) -> Self {
        let tally = EmotionTally::from_labels(rows.iter().map(|row| row.label));
        Self { rows, tally }
    }

    pub fn failed_rows(&self) -> usize {
        self.rows.iter().filter(|row| !row.plaintext.is_clear()).count()
    }
}

/// Reject text that carries nothing worth storing.
pub fn validate_text(text: &str) -> Result<(), RecordStoreError> {
    if text.trim().is_empty() {
        return Err(RecordStoreError::Validation);
    }
    Ok(())
}

/// Contract for an append-only, encrypted-at-rest collection of labelled texts.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Encrypt `plaintext` and append it with `label` after all existing rows.
    async fn append(
        &self,
        plaintext: &str,
        label: EmotionLabel,
    ) -> Result<StoredRecord, RecordStoreError>;

    /// Decrypt every row in insertion order and tally labels.
    async fn load_all(&self) -> Result<CorpusView, RecordStoreError>;
}

/// In-memory record store that simulates encryption for tests and smoke runs.
/// This is not cryptographically secure; the file-backed store uses AES-GCM.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRecordStore {
    inner: Arc<Mutex<Option<Vec<(EmotionLabel, Vec<u8>)>>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn append(
        &self,
        plaintext: &str,
        label: EmotionLabel,
    ) -> Result<StoredRecord, RecordStoreError> {
        validate_text(plaintext)?;
        let mut guard = self
            .inner
            .lock()
            .map_err(|err| RecordStoreError::Persistence {
                reason: format!("lock poisoned: {err}"),
            })?;

        let masked = mask(plaintext.as_bytes());
        let ciphertext = to_hex(&masked);
        guard.get_or_insert_with(Vec::new).push((label, masked));
        Ok(StoredRecord { label, ciphertext })
    }

    async fn load_all(&self) -> Result<CorpusView, RecordStoreError> {
        let guard = self
            .inner
            .lock()
            .map_err(|err| RecordStoreError::Persistence {
                reason: format!("lock poisoned: {err}"),
            })?;

        let rows = guard.as_ref().ok_or_else(|| RecordStoreError::NotFound {
            path: "memory".to_string(),
        })?;

        let rows = rows
            .iter()
            .map(|(label, masked)| DecryptedRecord {
                plaintext: match String::from_utf8(mask(masked)) {
                    Ok(text) => RowText::Clear(text),
                    Err(err) => RowText::Failed {
                        reason: err.to_string(),
                    },
                },
                label: *label,
                ciphertext: to_hex(masked),
            })
            .collect();
        Ok(CorpusView::from_rows(rows))
    }
}

const MASK_BYTE: u8 = 0xA5;

fn mask(input: &[u8]) -> Vec<u8> {
    input.iter().map(|b| b ^ MASK_BYTE).collect()
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_rejects_blank_text() {
        assert_eq!(validate_text(""), Err(RecordStoreError::Validation));
        assert_eq!(validate_text(" \n\t"), Err(RecordStoreError::Validation));
        assert_eq!(validate_text(" hi "), Ok(()));
    }

    #[test]
    fn failed_rows_show_sentinel_but_still_count() {
        let view = CorpusView::from_rows(vec![
            DecryptedRecord {
                plaintext: RowText::Clear("fine".into()),
                label: EmotionLabel::Joy,
                ciphertext: "a".into(),
            },
            DecryptedRecord {
                plaintext: RowText::Failed {
                    reason: "bad tag".into(),
                },
                label: EmotionLabel::Joy,
                ciphertext: "b".into(),
            },
        ]);

        assert_eq!(view.rows[1].plaintext.display(), DECRYPTION_FAILED);
        assert_eq!(view.rows[1].plaintext.as_clear(), None);
        assert_eq!(view.failed_rows(), 1);
        assert_eq!(view.tally.get(EmotionLabel::Joy), 2);
    }

    #[tokio::test]
    async fn memory_store_round_trips_without_keeping_plaintext() {
        let store = InMemoryRecordStore::new();
        let stored = store
            .append("top-secret feeling", EmotionLabel::Fear)
            .await
            .expect("append should succeed");
        assert!(!stored.ciphertext.contains("top-secret"));

        let view = store.load_all().await.expect("load should succeed");
        assert_eq!(view.rows.len(), 1);
        assert_eq!(view.rows[0].plaintext.as_clear(), Some("top-secret feeling"));
        assert_eq!(view.rows[0].ciphertext, stored.ciphertext);

        let inner = store.inner.lock().expect("lock");
        let rows = inner.as_ref().expect("rows");
        assert_ne!(rows[0].1, b"top-secret feeling".to_vec());
    }

    #[tokio::test]
    async fn memory_store_distinguishes_never_written() {
        let store = InMemoryRecordStore::new();
        let err = store.load_all().await.expect_err("nothing written yet");
        assert!(matches!(err, RecordStoreError::NotFound { .. }));

        let err = store
            .append("   ", EmotionLabel::Joy)
            .await
            .expect_err("blank text");
        assert_eq!(err, RecordStoreError::Validation);
        assert!(store.load_all().await.is_err(), "failed append must not create corpus");
    }
}
