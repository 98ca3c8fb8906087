//! Speech synthesis through an external text-to-speech command.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use uuid::Uuid;

use super::traits::{SpeechSynthesizer, SynthesisError};
use super::types::SpeechArtifact;

/// Placeholder replaced by the utterance text in [`SynthConfig::args`].
pub const TEXT_PLACEHOLDER: &str = "{text}";
/// Placeholder replaced by the artifact path in [`SynthConfig::args`].
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

/// Configuration for [`CommandSynthesizer`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    /// Executable to run.
    pub program: String,
    /// Argument template; `{text}` and `{output}` are substituted per job.
    pub args: Vec<String>,
    /// Directory that receives `tts_<uuid>.wav` artifacts.
    pub artifact_dir: PathBuf,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            program: "tts".to_string(),
            args: vec![
                "--text".to_string(),
                TEXT_PLACEHOLDER.to_string(),
                "--model_name".to_string(),
                "tts_models/en/ljspeech/tacotron2-DDC".to_string(),
                "--out_path".to_string(),
                OUTPUT_PLACEHOLDER.to_string(),
            ],
            artifact_dir: std::env::temp_dir().join("guildtune"),
        }
    }
}

/// Runs a configurable TTS command that writes a WAV file.
pub struct CommandSynthesizer {
    config: SynthConfig,
}

impl CommandSynthesizer {
    pub fn new(config: SynthConfig) -> Self {
        Self { config }
    }

    fn artifact_path(&self) -> PathBuf {
        self.config
            .artifact_dir
            .join(format!("tts_{}.wav", Uuid::new_v4()))
    }

    fn render_args(&self, text: &str, output: &str) -> Vec<String> {
        self.config
            .args
            .iter()
            .map(|arg| {
                arg.replace(TEXT_PLACEHOLDER, text)
                    .replace(OUTPUT_PLACEHOLDER, output)
            })
            .collect()
    }
}

#[async_trait]
impl SpeechSynthesizer for CommandSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<SpeechArtifact, SynthesisError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SynthesisError::EmptyText);
        }

        tokio::fs::create_dir_all(&self.config.artifact_dir).await?;
        let path = self.artifact_path();
        let args = self.render_args(text, &path.to_string_lossy());

        let output = Command::new(&self.config.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SynthesisError::Process(format!("{}: {}", self.config.program, e)))?;

        let artifact = SpeechArtifact::new(&path);
        if !output.status.success() {
            artifact.discard();
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SynthesisError::Process(format!(
                "{} exited with {}: {}",
                self.config.program,
                output.status,
                stderr.trim()
            )));
        }
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(SynthesisError::Process(format!(
                "{} wrote no artifact",
                self.config.program
            )));
        }

        log::debug!("[Synth] Wrote {}", path.display());
        Ok(artifact)
    }
}
