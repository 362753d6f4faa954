//! Speech recognition stage: audio segments in, transcripts out.
//!
//! The recognizer runs on the blocking recognition thread, so the trait is
//! synchronous. [`CommandRecognizer`] shells out to an external transcriber
//! binary with a temporary WAV file; anything that speaks text on stdout for
//! a WAV path argument works.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use crate::config::RecognizerConfig;
use crate::error::{Result, SessionError};
use crate::pipeline::messages::AudioSegment;

/// Converts a captured audio segment into raw transcript text.
///
/// Implementations return the transcriber's output verbatim; hallucination
/// filtering and normalization happen downstream.
pub trait SpeechRecognizer: Send {
    fn recognize(&mut self, segment: &AudioSegment) -> Result<String>;
}

static SCRATCH_SEQ: AtomicU64 = AtomicU64::new(0);

/// Recognizer backed by an external transcriber CLI.
///
/// Each segment is written to a scratch WAV under the system temp directory,
/// then `program [extra_args..] <path>` is run and its stdout taken as the
/// transcript. The scratch file is removed afterwards.
pub struct CommandRecognizer {
    program: PathBuf,
    extra_args: Vec<String>,
}

impl CommandRecognizer {
    pub fn new(config: &RecognizerConfig) -> Result<Self> {
        let program = which::which(&config.program).map_err(|e| {
            SessionError::Recognition(format!(
                "transcriber '{}' not found on PATH: {e}",
                config.program
            ))
        })?;
        debug!(program = %program.display(), "transcriber resolved");
        Ok(Self {
            program,
            extra_args: config.extra_args.clone(),
        })
    }

    fn scratch_path() -> PathBuf {
        let seq = SCRATCH_SEQ.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("iris-segment-{}-{seq}.wav", std::process::id()))
    }
}

impl SpeechRecognizer for CommandRecognizer {
    fn recognize(&mut self, segment: &AudioSegment) -> Result<String> {
        let path = Self::scratch_path();
        write_wav(&path, segment)?;
        let result = run_transcriber(&self.program, &self.extra_args, &path);
        if let Err(e) = std::fs::remove_file(&path) {
            warn!(path = %path.display(), error = %e, "failed to remove scratch WAV");
        }
        result
    }
}

fn run_transcriber(program: &Path, extra_args: &[String], wav: &Path) -> Result<String> {
    let output = Command::new(program)
        .args(extra_args)
        .arg(wav)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| SessionError::Recognition(format!("failed to spawn transcriber: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SessionError::Recognition(format!(
            "transcriber exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
}

/// Writes the segment as 16-bit PCM mono.
fn write_wav(path: &Path, segment: &AudioSegment) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: segment.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| SessionError::Recognition(format!("failed to create WAV: {e}")))?;
    for &sample in &segment.samples {
        let clamped = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer
            .write_sample(clamped)
            .map_err(|e| SessionError::Recognition(format!("failed to write WAV: {e}")))?;
    }
    writer
        .finalize()
        .map_err(|e| SessionError::Recognition(format!("failed to finalize WAV: {e}")))?;
    Ok(())
}
