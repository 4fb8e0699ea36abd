use clap::{Parser, Subcommand};
use moodvault_core::emotion::EmotionLabel;

/// CLI surface definition.
#[derive(Parser, Debug)]
#[command(
    name = "moodvault",
    about = "Label short texts by emotion and keep them encrypted at rest",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Optional subcommand; defaults to printing the report when absent.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Classify a text, encrypt it and append it to the corpus.
    Submit {
        /// Text to analyze; multiple words are joined with spaces.
        #[arg(required = true)]
        text: Vec<String>,
        /// Skip the classifier and store the text under this label.
        #[arg(long)]
        label: Option<EmotionLabel>,
    },
    /// Decrypt every stored text and show the emotion distribution.
    Report,
    /// Check that the key can be loaded and used for an encrypt/decrypt round trip.
    Health,
    /// Print version and exit.
    Version,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}
