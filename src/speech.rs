//! Speech output boundary.
//!
//! Rendering is fire-and-forget from the dispatcher's point of view:
//! `say` resolves when the utterance has been handed to (and finished
//! by) the synthesizer, and any failure is logged rather than
//! propagated; a broken speaker must never abort a turn. A quiet
//! configuration skips synthesis entirely without affecting dispatch.

use crate::config::VoiceConfig;
use async_trait::async_trait;
use tracing::{debug, warn};

/// Renders reply text as speech.
#[async_trait]
pub trait SpeechOutput: Send + Sync {
    /// Speak the given text. Empty text is a no-op.
    async fn say(&self, text: &str);
}

/// Speech output via an external synthesizer binary (`say` on macOS,
/// or any compatible command), with configured voice, rate, and pitch.
pub struct SayCommand {
    program: std::path::PathBuf,
    voice: VoiceConfig,
}

impl SayCommand {
    /// Locate the synthesizer binary and build the output.
    ///
    /// # Errors
    ///
    /// Returns an error if the binary cannot be found on PATH.
    pub fn new(program: &str, voice: VoiceConfig) -> crate::error::Result<Self> {
        let program = which::which(program).map_err(|e| {
            crate::error::SessionError::Speech(format!("synthesizer '{program}' not found: {e}"))
        })?;
        Ok(Self { program, voice })
    }
}

#[async_trait]
impl SpeechOutput for SayCommand {
    async fn say(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        if self.voice.quiet {
            debug!("quiet mode, skipping speech: {text}");
            return;
        }

        let mut cmd = tokio::process::Command::new(&self.program);
        if !self.voice.voice.eq_ignore_ascii_case("none") {
            cmd.arg("-v").arg(&self.voice.voice);
        }
        cmd.arg("-r").arg(self.voice.rate.to_string());
        cmd.arg("--")
            .arg(format!("[[pbas {}]] {text}", self.voice.pitch));

        match cmd.status().await {
            Ok(status) if !status.success() => {
                warn!("synthesizer exited with {status}");
            }
            Err(e) => warn!("synthesizer failed to run: {e}"),
            Ok(_) => {}
        }
    }
}

/// Speech output that discards everything. Used under quiet
/// configurations and in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSpeech;

#[async_trait]
impl SpeechOutput for NullSpeech {
    async fn say(&self, _text: &str) {}
}
