//! Configuration types for the voice session controller.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for a voice session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Audio capture settings.
    pub audio: AudioConfig,
    /// Wake word matching settings.
    pub wake: WakeConfig,
    /// Session mode policy (idle sleep, visual interval, startup flags).
    pub session: SessionPolicy,
    /// Dictation settings.
    pub dictation: DictationConfig,
    /// Speech recognizer settings.
    pub recognizer: RecognizerConfig,
    /// Reasoning engine settings.
    pub engine: EngineConfig,
    /// Speech output settings.
    pub voice: VoiceConfig,
}

/// Audio capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Target sample rate in Hz for recognition.
    pub sample_rate: u32,
    /// Input device name (None = system default).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_device: Option<String>,
    /// RMS energy threshold for speech detection.
    ///
    /// Audio chunks with RMS above this value are classified as speech.
    /// Typical values for f32 samples in \[-1, 1\]:
    ///   - 0.005: very sensitive (picks up quiet speech and some noise)
    ///   - 0.01:  normal sensitivity (default, good for most environments)
    ///   - 0.02:  reduced sensitivity (noisy environments)
    pub energy_threshold: f32,
    /// Silence duration in ms that ends an utterance.
    pub pause_threshold_ms: u32,
    /// Absolute cap on a single utterance, in seconds.
    pub phrase_time_limit_s: u32,
    /// How long to wait for speech to begin before yielding an empty
    /// cycle, in seconds.
    pub listen_timeout_s: u32,
    /// Minimum utterance duration in ms; shorter segments skip
    /// recognition entirely.
    pub min_utterance_ms: u32,
    /// Capacity of the capture → recognition hand-off queue.
    pub queue_capacity: usize,
    /// What capture does when the hand-off queue is full.
    pub queue_policy: QueuePolicy,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            input_device: None,
            energy_threshold: 0.01,
            pause_threshold_ms: 3_000,
            phrase_time_limit_s: 30,
            listen_timeout_s: 5,
            min_utterance_ms: 500,
            queue_capacity: 8,
            queue_policy: QueuePolicy::Block,
        }
    }
}

/// Policy applied by capture when the segment queue is full.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueuePolicy {
    /// Wait until the recognizer drains a slot. Lossless; capture of
    /// the *next* utterance is delayed, never abandoned.
    #[default]
    Block,
    /// Discard the oldest queued segment to make room for the new one.
    #[serde(alias = "drop-oldest")]
    DropOldest,
}

/// Wake word matching configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WakeConfig {
    /// The assistant's name, used as the wake word.
    pub name: String,
    /// Additional wake phrases (always matched alongside the name).
    pub synonyms: Vec<String>,
    /// Per-token edit distance tolerance for fuzzy matching.
    ///
    /// 1 absorbs single-character misrecognitions ("irks" for "iris")
    /// while rejecting unrelated words.
    pub edit_distance: usize,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            name: "iris".to_owned(),
            synonyms: vec!["wake up".to_owned()],
            edit_distance: 1,
        }
    }
}

/// Session mode policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionPolicy {
    /// Number of consecutive empty recognition cycles before the
    /// session goes Inactive. 0 disables auto-sleep.
    pub idle_cycle_threshold: u32,
    /// Number of empty recognition cycles between periodic visual
    /// captures while Visual mode is on.
    pub visual_interval_cycles: u32,
    /// Start the session asleep.
    pub start_inactive: bool,
    /// Start the session muted.
    pub start_muted: bool,
    /// Start in passive listening mode.
    pub start_passive: bool,
    /// Start in dictation mode.
    pub start_dictation: bool,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            idle_cycle_threshold: 20,
            visual_interval_cycles: 6,
            start_inactive: false,
            start_muted: false,
            start_passive: false,
            start_dictation: false,
        }
    }
}

/// Dictation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DictationConfig {
    /// How many of the most recent dictation lines are sent as context
    /// when the user addresses the assistant mid-dictation.
    pub context_window: usize,
    /// Directory for dictation logs (None = platform data dir).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

impl Default for DictationConfig {
    fn default() -> Self {
        Self {
            context_window: 100,
            log_dir: None,
        }
    }
}

/// Speech recognizer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    /// Name of the transcriber CLI binary, resolved via PATH.
    pub program: String,
    /// Extra arguments passed before the WAV path.
    pub extra_args: Vec<String>,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            program: "whisper-cli".to_owned(),
            extra_args: Vec::new(),
        }
    }
}

/// Reasoning engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Name of the engine CLI binary, resolved via PATH.
    pub program: String,
    /// Extra system prompt text appended to the built-in identity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_system_prompt: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: "claude".to_owned(),
            extra_system_prompt: None,
        }
    }
}

/// Speech output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Synthesizer voice name. "none" disables voice selection.
    pub voice: String,
    /// Speaking rate in words per minute.
    pub rate: u32,
    /// Pitch adjustment passed to the synthesizer.
    pub pitch: u32,
    /// Suppress all spoken output. Dispatch logic is unaffected.
    pub quiet: bool,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            voice: "Moira (Enhanced)".to_owned(),
            rate: 180,
            pitch: 50,
            quiet: false,
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            crate::error::SessionError::Config(format!(
                "cannot read config {}: {e}",
                path.display()
            ))
        })?;
        toml::from_str(&text)
            .map_err(|e| crate::error::SessionError::Config(format!("invalid config: {e}")))
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        let text = toml::to_string_pretty(self)
            .map_err(|e| crate::error::SessionError::Config(format!("serialize config: {e}")))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Returns the default config file path (`<config_dir>/iris/config.toml`).
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("iris")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = SessionConfig::default();
        assert_eq!(config.audio.sample_rate, 16_000);
        assert_eq!(config.audio.queue_policy, QueuePolicy::Block);
        assert_eq!(config.wake.name, "iris");
        assert_eq!(config.wake.edit_distance, 1);
        assert_eq!(config.dictation.context_window, 100);
        assert!(!config.voice.quiet);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: SessionConfig = toml::from_str(
            r#"
            [wake]
            name = "nova"

            [audio]
            queue_policy = "dropoldest"
            "#,
        )
        .unwrap();
        assert_eq!(config.wake.name, "nova");
        assert_eq!(config.audio.queue_policy, QueuePolicy::DropOldest);
        // Untouched sections keep their defaults.
        assert_eq!(config.session.idle_cycle_threshold, 20);
        assert_eq!(config.engine.program, "claude");
    }

    #[test]
    fn config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = SessionConfig::default();
        config.wake.name = "echo".to_owned();
        config.session.idle_cycle_threshold = 5;
        config.save_to_file(&path).unwrap();

        let loaded = SessionConfig::from_file(&path).unwrap();
        assert_eq!(loaded.wake.name, "echo");
        assert_eq!(loaded.session.idle_cycle_threshold, 5);
    }
}
