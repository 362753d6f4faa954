//! Countdown timers announced through the speech output.

use super::{Action, ActionContext, ActionError, ParamKind, ParamSpec};
use crate::speech::SpeechOutput;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Starts a countdown timer that announces its label when done.
///
/// The timer runs on a spawned task so it never blocks the turn
/// sequence; the announcement goes through the same speech output as
/// replies and therefore respects the quiet configuration.
pub struct SetTimerAction {
    speech: Arc<dyn SpeechOutput>,
}

impl SetTimerAction {
    /// Build over the session's speech output.
    #[must_use]
    pub fn new(speech: Arc<dyn SpeechOutput>) -> Self {
        Self { speech }
    }
}

#[async_trait]
impl Action for SetTimerAction {
    fn name(&self) -> &'static str {
        "set_timer"
    }

    fn description(&self) -> &'static str {
        "Set a countdown timer that announces when done"
    }

    fn params(&self) -> &'static [ParamSpec] {
        &[
            ParamSpec {
                name: "seconds",
                kind: ParamKind::Number,
                description: "Number of seconds for the timer",
                required: true,
            },
            ParamSpec {
                name: "label",
                kind: ParamKind::String,
                description: "What the timer is for",
                required: false,
            },
        ]
    }

    async fn execute(
        &self,
        args: &Map<String, Value>,
        _ctx: &ActionContext,
    ) -> Result<Value, ActionError> {
        let seconds = args["seconds"].as_f64().unwrap_or_default();
        if !(0.0..=86_400.0).contains(&seconds) {
            return Err(ActionError::invalid_args(
                "seconds must be between 0 and 86400",
            ));
        }
        let label = args
            .get("label")
            .and_then(Value::as_str)
            .unwrap_or("timer")
            .to_owned();

        let speech = Arc::clone(&self.speech);
        let announce = label.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
            info!("timer done: {announce}");
            speech.say(&format!("Timer done: {announce}")).await;
        });

        Ok(json!({ "status": "started", "seconds": seconds, "label": label }))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::session::ModeFlags;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingSpeech {
        said: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl SpeechOutput for RecordingSpeech {
        async fn say(&self, text: &str) {
            self.said.lock().unwrap().push(text.to_owned());
        }
    }

    fn ctx() -> ActionContext {
        ActionContext {
            flags: ModeFlags::default(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timer_announces_after_delay() {
        let said = Arc::new(Mutex::new(Vec::new()));
        let action = SetTimerAction::new(Arc::new(RecordingSpeech {
            said: Arc::clone(&said),
        }));

        let args = json!({"seconds": 30.0, "label": "tea"})
            .as_object()
            .cloned()
            .unwrap();
        let value = action.execute(&args, &ctx()).await.unwrap();
        assert_eq!(value["status"], "started");
        assert!(said.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_secs(31)).await;
        tokio::task::yield_now().await;
        assert_eq!(said.lock().unwrap().as_slice(), ["Timer done: tea"]);
    }

    #[tokio::test]
    async fn rejects_absurd_durations() {
        let action = SetTimerAction::new(Arc::new(crate::speech::NullSpeech));
        let args = json!({"seconds": -5.0}).as_object().cloned().unwrap();
        assert!(action.execute(&args, &ctx()).await.is_err());
    }
}
