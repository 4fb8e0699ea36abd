mod cli;
mod config;
mod report;
mod storage;

use std::sync::Arc;

use crate::cli::ConfigCommand;
use clap::Parser;
use color_eyre::Result;
use moodvault_classifier::http::{HttpClassifier, HttpClassifierSettings};
use moodvault_core::{
    classify::{Classifier, FixedLabelClassifier},
    emotion::EmotionLabel,
    journal::{Journal, Submission, SubmitError},
    store::{RecordStore, RecordStoreError},
};
use moodvault_storage::{cipher::Cipher, key_provider::KeyProvider};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load()?;
    match cli.command.unwrap_or(cli::Command::Report) {
        cli::Command::Submit { text, label } => run_submit(text, label, &config).await?,
        cli::Command::Report => run_report(&config).await?,
        cli::Command::Health => run_health_check(&config).await?,
        cli::Command::Version => print_version(),
        cli::Command::Config(ConfigCommand::Init) => init_config(&config)?,
    }

    Ok(())
}

fn init_tracing() {
    // Respect user-provided filters, default to info to avoid noisy stdout.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("moodvault {}", env!("CARGO_PKG_VERSION"));
}

fn init_config(config: &config::Config) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}

async fn run_submit(
    words: Vec<String>,
    label: Option<EmotionLabel>,
    config: &config::Config,
) -> Result<()> {
    let classifier = build_classifier(label, config)?;
    let store = storage::store_from_config(config).await?;
    let submission = submit_with(store, classifier, &words.join(" ")).await?;
    println!("Detected emotion: {}", submission.label);
    println!("Encrypted text:\n{}", submission.ciphertext);
    Ok(())
}

async fn submit_with<S: RecordStore>(
    store: S,
    classifier: Arc<dyn Classifier>,
    text: &str,
) -> Result<Submission> {
    let journal = Journal::new(store, classifier);
    journal.submit(text).await.map_err(|err| match err {
        SubmitError::Validation => color_eyre::eyre::eyre!("Input missing: please enter some text."),
        other => color_eyre::eyre::eyre!(other.to_string()),
    })
}

async fn run_report(config: &config::Config) -> Result<()> {
    let store = storage::store_from_config(config).await?;
    print!("{}", report_with(store).await?);
    Ok(())
}

async fn report_with<S: RecordStore>(store: S) -> Result<String> {
    match store.load_all().await {
        Ok(view) => Ok(report::render(&view)),
        Err(RecordStoreError::NotFound { path }) => Err(color_eyre::eyre::eyre!(
            "No corpus found at {path} yet. Add an entry with `moodvault submit <text>`."
        )),
        Err(err) => Err(color_eyre::eyre::eyre!(err.to_string())),
    }
}

/// Resolves the key (creating it if needed) and runs an in-memory
/// encrypt/decrypt probe. The corpus is not touched.
async fn run_health_check(config: &config::Config) -> Result<()> {
    let keys = storage::key_provider_from_config(config)?;
    let key_id = probe_key(&keys).await?;
    println!("Key: ok ({key_id})");
    println!(
        "Classifier: {}",
        resolve_classifier_settings(config)
            .map(|s| s.endpoint)
            .unwrap_or_else(|| "not configured (use --label)".to_string())
    );
    Ok(())
}

async fn probe_key<P: KeyProvider>(keys: &P) -> Result<String> {
    let cipher = Cipher::from_provider(keys)
        .await
        .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))?;
    let token = cipher
        .encrypt("ok")
        .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))?;
    let round_trip = cipher
        .decrypt(&token)
        .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))?;
    if round_trip != "ok" {
        color_eyre::eyre::bail!("cipher round-trip failed");
    }
    Ok(cipher.key_id().to_string())
}

fn build_classifier(
    label: Option<EmotionLabel>,
    config: &config::Config,
) -> Result<Arc<dyn Classifier>> {
    if let Some(label) = label {
        return Ok(Arc::new(FixedLabelClassifier(label)));
    }
    match resolve_classifier_settings(config) {
        Some(settings) => {
            info!(endpoint = %settings.endpoint, "using remote classifier");
            Ok(Arc::new(HttpClassifier::new(settings)))
        }
        None => color_eyre::eyre::bail!(
            "no classifier configured; set [classifier] endpoint or api_token, MOODVAULT_CLASSIFIER_ENDPOINT, HF_TOKEN, or pass --label"
        ),
    }
}

fn resolve_classifier_settings(config: &config::Config) -> Option<HttpClassifierSettings> {
    let endpoint = config
        .classifier
        .as_ref()
        .and_then(|c| c.endpoint.clone())
        .or_else(|| std::env::var("MOODVAULT_CLASSIFIER_ENDPOINT").ok());

    let api_token = config
        .classifier
        .as_ref()
        .and_then(|c| c.api_token.clone())
        .or_else(|| std::env::var("MOODVAULT_CLASSIFIER_TOKEN").ok())
        .or_else(|| std::env::var("HF_TOKEN").ok());

    match (endpoint, api_token) {
        (Some(endpoint), api_token) => Some(HttpClassifierSettings {
            endpoint,
            api_token,
        }),
        // A token alone selects the hosted model.
        (None, Some(token)) => Some(HttpClassifierSettings::hosted(Some(token))),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage;
    use moodvault_storage::key_provider::InMemoryKeyProvider;

    #[tokio::test]
    async fn probe_with_memory_key_succeeds() {
        let key_id = probe_key(&InMemoryKeyProvider::default())
            .await
            .expect("probe should succeed");
        assert_eq!(key_id, "memory");
    }

    #[tokio::test]
    async fn submit_then_report_through_file_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let classifier: Arc<dyn Classifier> = Arc::new(FixedLabelClassifier(EmotionLabel::Joy));

        let submission = submit_with(
            storage::test_store(dir.path()).await,
            classifier,
            "I am so happy today",
        )
        .await
        .expect("submit should succeed");
        assert_eq!(submission.label, EmotionLabel::Joy);

        let text = report_with(storage::test_store(dir.path()).await)
            .await
            .expect("report should succeed");
        assert!(text.contains("I am so happy today"));
        assert!(text.contains("Emotion distribution"));
    }

    #[tokio::test]
    async fn report_before_submit_explains_missing_corpus() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = report_with(storage::test_store(dir.path()).await)
            .await
            .expect_err("no corpus yet");
        assert!(err.to_string().contains("No corpus found"));
    }

    #[tokio::test]
    async fn blank_submit_is_reported_as_missing_input() {
        let dir = tempfile::tempdir().expect("tempdir");
        let classifier: Arc<dyn Classifier> = Arc::new(FixedLabelClassifier(EmotionLabel::Joy));
        let err = submit_with(storage::test_store(dir.path()).await, classifier, "   ")
            .await
            .expect_err("blank input");
        assert!(err.to_string().contains("Input missing"));
        assert!(!dir.path().join("results.csv").exists());
    }

    #[test]
    fn label_override_skips_remote_classifier() {
        let classifier = build_classifier(Some(EmotionLabel::Fear), &config::Config::default())
            .expect("fixed classifier");
        assert_eq!(classifier.name(), "fixed");
    }

    #[test]
    fn token_without_endpoint_selects_hosted_model() {
        let config = config::Config {
            classifier: Some(config::ClassifierConfig {
                endpoint: None,
                api_token: Some("hf_tok".into()),
            }),
            ..config::Config::default()
        };
        let settings = resolve_classifier_settings(&config).expect("settings");
        assert!(settings
            .endpoint
            .ends_with(moodvault_classifier::http::DEFAULT_MODEL));
        assert_eq!(settings.api_token.as_deref(), Some("hf_tok"));
    }

    #[test]
    fn configured_endpoint_selects_http_classifier() {
        let config = config::Config {
            classifier: Some(config::ClassifierConfig {
                endpoint: Some("http://localhost:9000/classify".into()),
                api_token: Some("tok".into()),
            }),
            ..config::Config::default()
        };
        let settings = resolve_classifier_settings(&config).expect("settings");
        assert_eq!(settings.endpoint, "http://localhost:9000/classify");
        assert_eq!(settings.api_token.as_deref(), Some("tok"));
        let classifier = build_classifier(None, &config).expect("http classifier");
        assert_eq!(classifier.name(), "http");
    }
}
