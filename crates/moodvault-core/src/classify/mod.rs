use async_trait::async_trait;
use thiserror::Error;

use crate::emotion::EmotionLabel;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClassifyError {
    /// The model-serving backend could not produce a label.
    #[error("classifier unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Contract for any emotion classifier (remote model, stub).
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Short name used for logging and UI.
    fn name(&self) -> &'static str;

    /// Assign exactly one label to `text`.
    async fn classify(&self, text: &str) -> Result<EmotionLabel, ClassifyError>;
}

/// Classifier that always answers with the same label. Used when the caller
/// already knows the label, and in tests and offline smoke checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedLabelClassifier(pub EmotionLabel);

#[async_trait]
impl Classifier for FixedLabelClassifier {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn classify(&self, _text: &str) -> Result<EmotionLabel, ClassifyError> {
        Ok(self.0)
    }
}
