use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument};

use crate::{
    classify::{Classifier, ClassifyError},
    emotion::EmotionLabel,
    store::{validate_text, CorpusView, RecordStore, RecordStoreError},
};

/// Errors surfaced to whoever drives a [`Journal`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("please enter some text")]
    Validation,
    #[error(transparent)]
    ClassificationUnavailable(#[from] ClassifyError),
    #[error(transparent)]
    Store(RecordStoreError),
}

impl From<RecordStoreError> for SubmitError {
    fn from(err: RecordStoreError) -> Self {
        match err {
            RecordStoreError::Validation => SubmitError::Validation,
            other => SubmitError::Store(other),
        }
    }
}

/// Result of a successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub label: EmotionLabel,
    pub ciphertext: String,
}

/// Command surface for front ends: classify-then-store, and the decrypted report.
pub struct Journal<S: RecordStore> {
    store: Arc<S>,
    classifier: Arc<dyn Classifier>,
}

impl<S: RecordStore> Journal<S> {
    pub fn new(store: S, classifier: Arc<dyn Classifier>) -> Self {
        Self {
            store: Arc::new(store),
            classifier,
        }
    }

    /// Trim `text`, reject it when blank, label it, then store it encrypted.
    /// The classifier is never consulted for blank input.
    #[instrument(skip_all, fields(classifier = self.classifier.name()))]
    pub async fn submit(&self, text: &str) -> Result<Submission, SubmitError> {
        let text = text.trim();
        validate_text(text)?;

        let label = self.classifier.classify(text).await?;
        let stored = self.store.append(text, label).await?;
        info!(%label, "submission stored");
        Ok(Submission {
            label: stored.label,
            ciphertext: stored.ciphertext,
        })
    }

    #[instrument(skip_all)]
    pub async fn report(&self) -> Result<CorpusView, RecordStoreError> {
        self.store.load_all().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::{classify::FixedLabelClassifier, store::InMemoryRecordStore};

    struct CountingClassifier {
        calls: AtomicUsize,
        answer: Result<EmotionLabel, ClassifyError>,
    }

    #[async_trait]
    impl Classifier for CountingClassifier {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn classify(&self, _text: &str) -> Result<EmotionLabel, ClassifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.clone()
        }
    }

    #[tokio::test]
    async fn submit_then_report_returns_text_and_tally() {
        let journal = Journal::new(
            InMemoryRecordStore::new(),
            Arc::new(FixedLabelClassifier(EmotionLabel::Joy)),
        );

        let submission = journal
            .submit("  I am so happy today \n")
            .await
            .expect("submit should succeed");
        assert_eq!(submission.label, EmotionLabel::Joy);

        let view = journal.report().await.expect("report should succeed");
        assert_eq!(view.rows.len(), 1);
        assert_eq!(view.rows[0].plaintext.as_clear(), Some("I am so happy today"));
        assert_eq!(view.rows[0].ciphertext, submission.ciphertext);
        assert_eq!(view.tally.get(EmotionLabel::Joy), 1);
        assert_eq!(view.tally.len(), 1);
    }

    #[tokio::test]
    async fn blank_input_is_rejected_before_classifying() {
        let classifier = Arc::new(CountingClassifier {
            calls: AtomicUsize::new(0),
            answer: Ok(EmotionLabel::Joy),
        });
        let journal = Journal::new(InMemoryRecordStore::new(), classifier.clone());

        let err = journal.submit(" \t ").await.expect_err("blank text");
        assert_eq!(err, SubmitError::Validation);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);

        let err = journal.report().await.expect_err("nothing stored");
        assert!(matches!(err, RecordStoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn classifier_failure_propagates_and_stores_nothing() {
        let classifier = Arc::new(CountingClassifier {
            calls: AtomicUsize::new(0),
            answer: Err(ClassifyError::Unavailable {
                reason: "model offline".into(),
            }),
        });
        let journal = Journal::new(InMemoryRecordStore::new(), classifier.clone());

        let err = journal.submit("hello").await.expect_err("classifier down");
        assert!(matches!(err, SubmitError::ClassificationUnavailable(_)));
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
        assert!(journal.report().await.is_err());
    }
}
