//! Session orchestrator that wires the capture, recognition, and turn
//! stages together.
//!
//! Capture and recognition run on their own blocking threads joined by
//! the bounded segment queue; the turn loop is a single async task that
//! owns all session state. Shutdown is cooperative through one
//! cancellation token.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::actions::ActionRegistry;
use crate::audio::AudioSource;
use crate::config::SessionConfig;
use crate::dictation::{DictationLog, MemoryDictationLog};
use crate::dispatch::{TurnDispatcher, TurnOutcome};
use crate::engine::{build_system_prompt, ReasoningEngine};
use crate::error::{Result, SessionError};
use crate::filter::filter;
use crate::pipeline::messages::{TextInjection, Transcript};
use crate::pipeline::queue::segment_queue;
use crate::recognizer::SpeechRecognizer;
use crate::runtime::RuntimeEvents;
use crate::session::SessionState;
use crate::speech::{NullSpeech, SpeechOutput};
use crate::wakeword::WakeMatcher;

const TRANSCRIPT_CHANNEL_SIZE: usize = 4;
const RECV_POLL: Duration = Duration::from_millis(100);

/// Owns the session pipeline from microphone to spoken reply.
pub struct SessionCoordinator {
    config: SessionConfig,
    cancel: CancellationToken,
    events: RuntimeEvents,
    engine: Option<Box<dyn ReasoningEngine>>,
    speech: Option<Arc<dyn SpeechOutput>>,
    source: Option<Box<dyn AudioSource>>,
    recognizer: Option<Box<dyn SpeechRecognizer>>,
    registry: Option<ActionRegistry>,
    dictation_log: Option<Box<dyn DictationLog>>,
    text_injection_rx: Option<mpsc::UnboundedReceiver<TextInjection>>,
}

impl SessionCoordinator {
    /// Create a coordinator with the given configuration. Collaborators
    /// are attached with the `with_*` builders before [`run`].
    ///
    /// [`run`]: SessionCoordinator::run
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
            events: RuntimeEvents::default(),
            engine: None,
            speech: None,
            source: None,
            recognizer: None,
            registry: None,
            dictation_log: None,
            text_injection_rx: None,
        }
    }

    /// Attach the reasoning engine. Required.
    #[must_use]
    pub fn with_engine(mut self, engine: Box<dyn ReasoningEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Attach the speech output. Defaults to [`NullSpeech`].
    #[must_use]
    pub fn with_speech(mut self, speech: Arc<dyn SpeechOutput>) -> Self {
        self.speech = Some(speech);
        self
    }

    /// Attach the audio source. Required.
    #[must_use]
    pub fn with_source(mut self, source: Box<dyn AudioSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Attach the speech recognizer. Required.
    #[must_use]
    pub fn with_recognizer(mut self, recognizer: Box<dyn SpeechRecognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    /// Attach the action registry. Defaults to an empty catalog.
    #[must_use]
    pub fn with_registry(mut self, registry: ActionRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Attach durable dictation storage. Defaults to in-memory.
    #[must_use]
    pub fn with_dictation_log(mut self, log: Box<dyn DictationLog>) -> Self {
        self.dictation_log = Some(log);
        self
    }

    /// Attach a text injection channel. Injected lines bypass capture
    /// and recognition and enter dispatch as finished transcripts.
    #[must_use]
    pub fn with_text_injection(mut self, rx: mpsc::UnboundedReceiver<TextInjection>) -> Self {
        self.text_injection_rx = Some(rx);
        self
    }

    /// Runtime event bus for observers. Subscribe before [`run`].
    ///
    /// [`run`]: SessionCoordinator::run
    #[must_use]
    pub fn events(&self) -> RuntimeEvents {
        self.events.clone()
    }

    /// Token observed by every stage. Cancelling it stops the session.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request shutdown.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Run the session until cancelled or a terminal action requests
    /// shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error when a required collaborator is missing or the
    /// engine cannot be reached at startup.
    pub async fn run(mut self) -> Result<()> {
        let engine = self
            .engine
            .take()
            .ok_or_else(|| SessionError::Config("no reasoning engine attached".into()))?;
        let mut source = self
            .source
            .take()
            .ok_or_else(|| SessionError::Config("no audio source attached".into()))?;
        let recognizer = self
            .recognizer
            .take()
            .ok_or_else(|| SessionError::Config("no recognizer attached".into()))?;
        let speech = self
            .speech
            .take()
            .unwrap_or_else(|| Arc::new(NullSpeech) as Arc<dyn SpeechOutput>);
        let registry = Arc::new(self.registry.take().unwrap_or_default());
        let dictation_log = self
            .dictation_log
            .take()
            .unwrap_or_else(|| Box::new(MemoryDictationLog::new()));

        let wake = WakeMatcher::new(&self.config.wake);
        let mut state = SessionState::new(&self.config.session);
        let mut dispatcher = TurnDispatcher::new(
            engine,
            Arc::clone(&registry),
            wake,
            speech,
            dictation_log,
            self.config.dictation.context_window,
            self.events.clone(),
        );

        let system_prompt = build_system_prompt(
            &self.config.wake.name,
            &registry.prompt_catalog(),
            self.config.engine.extra_system_prompt.as_deref(),
        );
        dispatcher.start(&system_prompt).await?;
        info!("session started");

        let (segment_tx, segment_rx) = segment_queue(
            self.config.audio.queue_capacity,
            self.config.audio.queue_policy,
        );
        let capture_cancel = self.cancel.clone();
        let capture_handle = tokio::task::spawn_blocking(move || {
            if let Err(e) = source.run(segment_tx, capture_cancel) {
                warn!(error = %e, "capture stage failed");
            }
        });

        let (transcript_tx, mut transcript_rx) =
            mpsc::channel::<Transcript>(TRANSCRIPT_CHANNEL_SIZE);
        let recognition_handle = tokio::task::spawn_blocking(move || {
            run_recognition_stage(recognizer, segment_rx, transcript_tx);
        });

        let mut injection_rx = self.text_injection_rx.take();
        let mut shutdown_requested = false;
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                transcript = transcript_rx.recv() => {
                    let Some(transcript) = transcript else { break };
                    if self.turn(&mut dispatcher, &transcript, &mut state).await {
                        shutdown_requested = true;
                        break;
                    }
                }
                injected = recv_injection(&mut injection_rx) => {
                    match injected {
                        Some(injection) => {
                            let now = Instant::now();
                            let transcript = Transcript {
                                text: injection.text,
                                captured_at: now,
                                recognized_at: now,
                            };
                            if self.turn(&mut dispatcher, &transcript, &mut state).await {
                                shutdown_requested = true;
                                break;
                            }
                        }
                        // Channel closed: stop polling it.
                        None => injection_rx = None,
                    }
                }
            }
        }

        self.cancel.cancel();
        // Drain segments already in flight: capture stops on the token
        // and drops its sender, recognition empties the queue and
        // closes the transcript channel, and the remaining transcripts
        // are dispatched here. A shutdown action skips the dispatch.
        while let Some(transcript) = transcript_rx.recv().await {
            if shutdown_requested {
                continue;
            }
            if self.turn(&mut dispatcher, &transcript, &mut state).await {
                shutdown_requested = true;
            }
        }

        if let Err(e) = capture_handle.await {
            warn!(error = %e, "capture stage panicked");
        }
        if let Err(e) = recognition_handle.await {
            warn!(error = %e, "recognition stage panicked");
        }
        info!("session stopped");
        Ok(())
    }

    /// Dispatch one cycle; true means shutdown was requested.
    async fn turn(
        &self,
        dispatcher: &mut TurnDispatcher,
        transcript: &Transcript,
        state: &mut SessionState,
    ) -> bool {
        matches!(
            dispatcher.on_cycle(transcript, state).await,
            TurnOutcome::Shutdown
        )
    }
}

/// Await the injection channel, or never when none is attached.
async fn recv_injection(
    rx: &mut Option<mpsc::UnboundedReceiver<TextInjection>>,
) -> Option<TextInjection> {
    match rx.as_mut() {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Blocking recognition stage: segments in, normalized transcripts out.
///
/// Recognition failures degrade to empty transcripts so the turn loop
/// still sees the cycle, and hallucination filtering happens here so
/// dispatch only ever sees normalized text. The stage runs until the
/// segment queue disconnects, so segments queued at shutdown are still
/// recognized; capture drops its sender once the token is cancelled.
fn run_recognition_stage(
    mut recognizer: Box<dyn SpeechRecognizer>,
    segment_rx: crossbeam_channel::Receiver<crate::pipeline::messages::AudioSegment>,
    transcript_tx: mpsc::Sender<Transcript>,
) {
    loop {
        let segment = match segment_rx.recv_timeout(RECV_POLL) {
            Ok(segment) => segment,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        };

        let transcript = if segment.samples.is_empty() {
            // Listen timeout marker from the capture stage.
            Transcript::empty()
        } else {
            match recognizer.recognize(&segment) {
                Ok(raw) => {
                    let text = filter(&raw);
                    Transcript {
                        text,
                        captured_at: segment.started_at,
                        recognized_at: Instant::now(),
                    }
                }
                Err(e) => {
                    warn!(error = %e, "recognition failed, cycle degrades to empty");
                    Transcript::empty()
                }
            }
        };

        if transcript_tx.blocking_send(transcript).is_err() {
            break;
        }
    }
}
