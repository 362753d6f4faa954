//! Message types passed between pipeline stages.

use std::time::Instant;

/// A complete captured utterance, ready for recognition.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSegment {
    /// Mono f32 samples at the configured sample rate.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// When the utterance started.
    pub started_at: Instant,
}

impl AudioSegment {
    /// Duration of the segment in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> u32 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.samples.len() as u64 * 1000 / u64::from(self.sample_rate)) as u32
    }
}

/// The normalized result of one recognition cycle.
///
/// Empty text means the cycle produced nothing usable: silence, a
/// listen timeout, a recognition failure, or a filtered hallucination.
#[derive(Debug, Clone)]
pub struct Transcript {
    /// Normalized transcript text, possibly empty.
    pub text: String,
    /// When the underlying audio was captured.
    pub captured_at: Instant,
    /// When recognition completed.
    pub recognized_at: Instant,
}

impl Transcript {
    /// An empty transcript stamped now, representing a cycle that
    /// produced no usable speech.
    #[must_use]
    pub fn empty() -> Self {
        let now = Instant::now();
        Self {
            text: String::new(),
            captured_at: now,
            recognized_at: now,
        }
    }

    /// Whether this cycle carried no usable speech.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Text injected by a transport collaborator, bypassing audio capture.
#[derive(Debug, Clone)]
pub struct TextInjection {
    /// The injected utterance text.
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_duration() {
        let seg = AudioSegment {
            samples: vec![0.0; 8_000],
            sample_rate: 16_000,
            started_at: Instant::now(),
        };
        assert_eq!(seg.duration_ms(), 500);
    }

    #[test]
    fn segment_duration_zero_rate() {
        let seg = AudioSegment {
            samples: vec![0.0; 100],
            sample_rate: 0,
            started_at: Instant::now(),
        };
        assert_eq!(seg.duration_ms(), 0);
    }

    #[test]
    fn empty_transcript() {
        assert!(Transcript::empty().is_empty());
    }
}
