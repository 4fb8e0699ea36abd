use anyhow::{Context, Result};
use async_trait::async_trait;
use moodvault_core::{
    classify::{Classifier, ClassifyError},
    emotion::EmotionLabel,
};
use reqwest::header::USER_AGENT;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument};

/// Model the endpoint is expected to serve.
pub const DEFAULT_MODEL: &str = "j-hartmann/emotion-english-distilroberta-base";

/// Configuration for a text-classification endpoint.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct HttpClassifierSettings {
    pub endpoint: String,
    pub api_token: Option<String>,
}

impl HttpClassifierSettings {
    /// Settings for the hosted inference API serving [`DEFAULT_MODEL`].
    pub fn hosted(api_token: Option<String>) -> Self {
        Self {
            endpoint: format!("https://api-inference.huggingface.co/models/{DEFAULT_MODEL}"),
            api_token,
        }
    }
}

/// Classifier backed by an inference-API style endpoint: `POST {"inputs": text}`
/// answered with label/score pairs.
pub struct HttpClassifier {
    client: reqwest::Client,
    settings: HttpClassifierSettings,
}

impl HttpClassifier {
    pub fn new(settings: HttpClassifierSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings,
        }
    }

    async fn request(&self, text: &str) -> Result<EmotionLabel> {
        let mut req = self
            .client
            .post(&self.settings.endpoint)
            .header(USER_AGENT, "moodvault")
            .json(&json!({ "inputs": text }));
        if let Some(token) = &self.settings.api_token {
            req = req.bearer_auth(token);
        }

        let resp: ScoresResponse = req
            .send()
            .await
            .context("sending classification request")?
            .error_for_status()
            .context("classifier returned an error status")?
            .json()
            .await
            .context("decoding classifier response")?;
        top_label(resp)
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    fn name(&self) -> &'static str {
        "http"
    }

    #[instrument(skip_all, fields(classifier = "http", endpoint = %self.settings.endpoint))]
    async fn classify(&self, text: &str) -> Result<EmotionLabel, ClassifyError> {
        let label = self
            .request(text)
            .await
            .map_err(|err| ClassifyError::Unavailable {
                reason: format!("{err:#}"),
            })?;
        debug!(%label, "classified");
        Ok(label)
    }
}

#[derive(Debug, Deserialize)]
struct LabelScore {
    label: String,
    score: f64,
}

/// Single-input responses come back either flat or wrapped in a batch.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScoresResponse {
    Batched(Vec<Vec<LabelScore>>),
    Flat(Vec<LabelScore>),
}

fn top_label(resp: ScoresResponse) -> Result<EmotionLabel> {
    let scores = match resp {
        ScoresResponse::Batched(batches) => batches
            .into_iter()
            .next()
            .context("classifier returned an empty batch")?,
        ScoresResponse::Flat(scores) => scores,
    };

    scores
        .into_iter()
        .filter_map(|s| s.label.parse::<EmotionLabel>().ok().map(|l| (l, s.score)))
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(label, _)| label)
        .context("classifier returned no known emotion label")
}
