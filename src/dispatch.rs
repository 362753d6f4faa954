//! Turn dispatcher: routes each recognition cycle through the session
//! mode machine and, when appropriate, runs a conversational turn
//! against the reasoning engine.
//!
//! Replies may embed structured action blocks. The dispatcher extracts
//! them, executes the requests in order through the registry, and folds
//! the collected results into one follow-up prompt; only the follow-up
//! reply is rendered as speech. Terminal actions raise control signals
//! that the dispatcher turns into session transitions.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::actions::{
    ActionContext, ActionOutcome, ActionRegistry, ActionRequest, ActionResult, ControlSignal,
};
use crate::dictation::{DictationLog, TimedLine};
use crate::engine::ReasoningEngine;
use crate::error::Result;
use crate::pipeline::messages::Transcript;
use crate::runtime::{RuntimeEvent, RuntimeEvents};
use crate::session::{ModeChange, SessionEvent, SessionMode, SessionState};
use crate::speech::SpeechOutput;
use crate::wakeword::WakeMatcher;

const ENGINE_APOLOGY: &str = "Sorry, I'm having trouble reaching my reasoning engine right now.";

/// What the dispatcher did with one recognition cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Nothing usable: asleep without a wake word.
    Discarded,
    /// Empty cycle handled (idle counting, deferred visual capture).
    EmptyCycle,
    /// Line buffered for passive listening.
    Buffered,
    /// Line appended to the dictation log.
    Logged,
    /// A mode transition was applied.
    Command(ModeChange),
    /// A conversational turn completed.
    Spoken,
    /// The engine was unreachable; the turn was abandoned.
    EngineFailed,
    /// A terminal action requested process shutdown.
    Shutdown,
}

/// Owns one conversational participant's turn sequence.
///
/// All session state mutation happens here, on the single async turn
/// loop, so turns never interleave.
pub struct TurnDispatcher {
    engine: Box<dyn ReasoningEngine>,
    registry: Arc<ActionRegistry>,
    wake: WakeMatcher,
    speech: Arc<dyn SpeechOutput>,
    dictation_log: Box<dyn DictationLog>,
    dictation_window: usize,
    events: RuntimeEvents,
}

impl TurnDispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        engine: Box<dyn ReasoningEngine>,
        registry: Arc<ActionRegistry>,
        wake: WakeMatcher,
        speech: Arc<dyn SpeechOutput>,
        dictation_log: Box<dyn DictationLog>,
        dictation_window: usize,
        events: RuntimeEvents,
    ) -> Self {
        Self {
            engine,
            registry,
            wake,
            speech,
            dictation_log,
            dictation_window,
            events,
        }
    }

    /// Open the conversation and speak the engine's greeting.
    ///
    /// # Errors
    ///
    /// Propagates the engine error so startup can abort: a session that
    /// cannot reach its engine at all is not worth running.
    pub async fn start(&mut self, system_prompt: &str) -> Result<()> {
        let greeting = self.engine.init(system_prompt).await?;
        let (spoken, _) = split_reply(&greeting);
        if !spoken.is_empty() {
            self.events.emit(RuntimeEvent::Reply {
                text: spoken.clone(),
            });
            self.speech.say(&spoken).await;
        }
        Ok(())
    }

    /// Handle one recognition cycle.
    pub async fn on_cycle(
        &mut self,
        transcript: &Transcript,
        state: &mut SessionState,
    ) -> TurnOutcome {
        let text = transcript.text.trim();
        if text.is_empty() {
            return self.empty_cycle(state).await;
        }

        // Asleep: the wake word is the only way in.
        if state.mode() == SessionMode::Inactive {
            let Some(m) = self.wake.find(text) else {
                debug!(%text, "asleep, discarding");
                return TurnOutcome::Discarded;
            };
            if let Some(change) = state.apply(SessionEvent::Wake) {
                self.events.emit(RuntimeEvent::ModeChanged(change));
            }
            state.note_activity();
            let query = self.wake.extract_query(text, m);
            info!(%query, "woken by wake word");
            self.events.emit(RuntimeEvent::Heard {
                text: text.to_owned(),
            });
            return self.run_turn(&query, state).await;
        }

        // Muted: suppress the transcript but keep the idle and visual
        // bookkeeping of an empty cycle.
        if state.flags().muted {
            debug!("muted, transcript suppressed");
            return self.empty_cycle(state).await;
        }

        state.note_activity();
        self.events.emit(RuntimeEvent::Heard {
            text: text.to_owned(),
        });

        if state.flags().passive {
            // Exit phrases still work without addressing.
            if let Some(outcome) = self.try_mode_command(text, state).await {
                return outcome;
            }
            if self.wake.is_wake(text) {
                let lines = state.flush_passive();
                let prompt = passive_prompt(&lines, text);
                return self.run_turn(&prompt, state).await;
            }
            state.buffer_passive(text);
            debug!(buffered = state.passive_len(), "passive line buffered");
            return TurnOutcome::Buffered;
        }

        if state.flags().dictation {
            if let Some(outcome) = self.try_mode_command(text, state).await {
                return outcome;
            }
            if let Err(e) = self.dictation_log.append(TimedLine::now(text)) {
                warn!(error = %e, "failed to append dictation line");
            }
            if let Some(m) = self.wake.find(text) {
                let query = self.wake.extract_query(text, m);
                let tail = self.dictation_log.tail(self.dictation_window);
                let prompt = dictation_prompt(&tail, &query);
                return self.run_turn(&prompt, state).await;
            }
            return TurnOutcome::Logged;
        }

        if let Some(outcome) = self.try_mode_command(text, state).await {
            return outcome;
        }

        // Normal turn. A leading address is stripped; everything else
        // goes to the engine verbatim.
        let prompt = match self.wake.find(text) {
            Some(m) => self.wake.extract_query(text, m),
            None => text.to_owned(),
        };
        self.run_turn(&prompt, state).await
    }

    /// Recognize a reserved mode phrase, plain or addressed.
    fn command_event(&self, text: &str) -> Option<SessionEvent> {
        command_event(text).or_else(|| {
            self.wake
                .find(text)
                .and_then(|m| command_event(&self.wake.extract_query(text, m)))
        })
    }

    /// Apply a reserved mode phrase. `None` when the text is not a
    /// command or the command is a no-op in the current state; no-ops
    /// fall through so an addressed wake phrase still reaches the
    /// mode's normal handling instead of being dropped.
    async fn try_mode_command(
        &mut self,
        text: &str,
        state: &mut SessionState,
    ) -> Option<TurnOutcome> {
        let event = self.command_event(text)?;
        let Some(change) = state.apply(event) else {
            debug!(?event, "mode command was a no-op");
            return None;
        };
        info!(?change, "mode command");
        self.events.emit(RuntimeEvent::ModeChanged(change));
        self.speech.say(announcement(change)).await;
        Some(TurnOutcome::Command(change))
    }

    async fn empty_cycle(&mut self, state: &mut SessionState) -> TurnOutcome {
        if let Some(change) = state.note_empty_cycle() {
            info!("idle threshold reached, going to sleep");
            self.events.emit(RuntimeEvent::ModeChanged(change));
            self.speech.say(announcement(change)).await;
            return TurnOutcome::Command(change);
        }
        if state.visual_capture_due() {
            return self.visual_cycle(state).await;
        }
        TurnOutcome::EmptyCycle
    }

    /// Periodic visual capture, run only on empty cycles so it can
    /// never race an in-flight turn.
    async fn visual_cycle(&mut self, state: &mut SessionState) -> TurnOutcome {
        let request = ActionRequest {
            name: "capture_image".to_owned(),
            args: Map::new(),
        };
        let ctx = ActionContext {
            flags: state.flags(),
        };
        let (result, _) = self.registry.invoke(&request, &ctx).await;
        let success = matches!(result.outcome, ActionOutcome::Success(_));
        self.events.emit(RuntimeEvent::ActionRan {
            name: result.name.clone(),
            success,
        });
        let path = match &result.outcome {
            ActionOutcome::Success(value) => value.get("path").and_then(Value::as_str),
            ActionOutcome::Failure { message, .. } => {
                warn!(%message, "visual capture failed");
                None
            }
        };
        let Some(path) = path else {
            return TurnOutcome::EmptyCycle;
        };
        let prompt = format!(
            "Read the image at {path} and briefly describe what you see. \
             Be brief and conversational."
        );
        self.run_turn(&prompt, state).await
    }

    async fn run_turn(&mut self, prompt: &str, state: &mut SessionState) -> TurnOutcome {
        let reply = match self.engine.send(prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "engine unreachable, abandoning turn");
                self.speech.say(ENGINE_APOLOGY).await;
                return TurnOutcome::EngineFailed;
            }
        };
        let (prose, requests) = split_reply(&reply);

        if requests.is_empty() {
            if !prose.is_empty() {
                self.events.emit(RuntimeEvent::Reply {
                    text: prose.clone(),
                });
                self.speech.say(&prose).await;
            }
            return TurnOutcome::Spoken;
        }

        let ctx = ActionContext {
            flags: state.flags(),
        };
        let mut results = Vec::with_capacity(requests.len());
        let mut signal: Option<ControlSignal> = None;
        for request in &requests {
            let (result, raised) = self.registry.invoke(request, &ctx).await;
            let success = matches!(result.outcome, ActionOutcome::Success(_));
            debug!(name = %result.name, success, "action ran");
            self.events.emit(RuntimeEvent::ActionRan {
                name: result.name.clone(),
                success,
            });
            if let Some(raised) = raised {
                // Shutdown outranks sleep when one turn raises both.
                signal = match signal {
                    Some(ControlSignal::Shutdown) => Some(ControlSignal::Shutdown),
                    _ => Some(raised),
                };
            }
            results.push(result);
        }

        // One follow-up carries every result; blocks embedded in the
        // follow-up reply are stripped but never executed.
        match self.engine.send(&followup_prompt(&results)).await {
            Ok(second) => {
                let (spoken, _) = split_reply(&second);
                if !spoken.is_empty() {
                    self.events.emit(RuntimeEvent::Reply {
                        text: spoken.clone(),
                    });
                    self.speech.say(&spoken).await;
                }
            }
            Err(e) => {
                warn!(error = %e, "engine unreachable for follow-up");
                self.speech.say(ENGINE_APOLOGY).await;
            }
        }

        match signal {
            Some(ControlSignal::Sleep) => {
                if let Some(change) = state.apply(SessionEvent::Sleep) {
                    self.events.emit(RuntimeEvent::ModeChanged(change));
                }
                TurnOutcome::Command(ModeChange::WentInactive)
            }
            Some(ControlSignal::Shutdown) => {
                self.events.emit(RuntimeEvent::ShutdownRequested);
                TurnOutcome::Shutdown
            }
            None => TurnOutcome::Spoken,
        }
    }
}

/// Reserved phrases mapped to transition events. Matching is exact
/// after normalization so ordinary speech never trips a command.
fn command_event(text: &str) -> Option<SessionEvent> {
    let normalized = normalize_phrase(text);
    let event = match normalized.as_str() {
        "go to sleep" | "good night" => SessionEvent::Sleep,
        "wake up" => SessionEvent::Wake,
        "mute" | "mute yourself" => SessionEvent::Mute,
        "unmute" | "unmute yourself" => SessionEvent::Unmute,
        "start passive listening" | "start passive mode" => SessionEvent::StartPassive,
        "stop passive listening" | "stop passive mode" => SessionEvent::StopPassive,
        "start dictation" => SessionEvent::StartDictation,
        "stop dictation" => SessionEvent::StopDictation,
        "start visual mode" => SessionEvent::StartVisual,
        "stop visual mode" => SessionEvent::StopVisual,
        _ => return None,
    };
    Some(event)
}

fn normalize_phrase(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .map(|token| token.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|token| !token.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn announcement(change: ModeChange) -> &'static str {
    match change {
        ModeChange::WentInactive => "Going to sleep.",
        ModeChange::WentActive => "I'm awake.",
        ModeChange::Muted => "Muted.",
        ModeChange::Unmuted => "Unmuted.",
        ModeChange::PassiveStarted => "Passive listening on.",
        ModeChange::PassiveStopped => "Passive listening off.",
        ModeChange::DictationStarted => "Dictation started.",
        ModeChange::DictationStopped => "Dictation stopped.",
        ModeChange::VisualStarted => "Visual mode on.",
        ModeChange::VisualStopped => "Visual mode off.",
    }
}

fn passive_prompt(lines: &[TimedLine], addressed: &str) -> String {
    let mut prompt = String::from("While listening passively I overheard:\n");
    for line in lines {
        prompt.push_str(&format!("[{}] {}\n", line.at.format("%H:%M:%S"), line.text));
    }
    prompt.push_str(&format!(
        "[now] {addressed}\n\
         Respond to the last line, using the overheard lines as context."
    ));
    prompt
}

fn dictation_prompt(tail: &[TimedLine], query: &str) -> String {
    let mut prompt = String::from("We are in dictation mode. Recent dictation:\n");
    for line in tail {
        prompt.push_str(&format!("[{}] {}\n", line.at.format("%H:%M:%S"), line.text));
    }
    prompt.push_str(&format!(
        "The user asked: \"{query}\". Answer briefly; do not repeat the dictation."
    ));
    prompt
}

fn followup_prompt(results: &[ActionResult]) -> String {
    // A lone image capture becomes a describe request instead of a
    // result summary.
    if let [result] = results {
        if let ActionOutcome::Success(value) = &result.outcome {
            if let Some(path) = value.get("path").and_then(Value::as_str) {
                if path.ends_with(".png") || path.ends_with(".jpg") {
                    return format!(
                        "Read the image at {path} and describe what you see. \
                         Be brief and conversational."
                    );
                }
            }
        }
    }

    let mut lines = vec![String::from("I ran the requested actions:")];
    for result in results {
        match &result.outcome {
            ActionOutcome::Success(value) => {
                lines.push(format!("- {} returned: {value}", result.name));
            }
            ActionOutcome::Failure { kind, message } => {
                lines.push(format!(
                    "- {} failed ({}): {message}",
                    result.name,
                    kind.label()
                ));
            }
        }
    }
    lines.push(String::from(
        "Summarize the results for the user in one or two sentences.",
    ));
    lines.join("\n")
}

/// Split an engine reply into spoken prose and embedded action requests.
///
/// Balanced top-level brace runs are candidate blocks. A candidate that
/// parses as a JSON object is removed from the prose; it yields a
/// request only when it carries a string `action` (or `function`) name
/// and, if present, an object `args`. Anything malformed is dropped
/// without executing. Duplicate requests within one reply run once.
pub fn split_reply(reply: &str) -> (String, Vec<ActionRequest>) {
    let mut prose = String::new();
    let mut requests: Vec<ActionRequest> = Vec::new();
    let mut seen: Vec<(String, String)> = Vec::new();

    let bytes = reply.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'{' {
            let start = i;
            while i < bytes.len() && bytes[i] != b'{' {
                i += 1;
            }
            prose.push_str(&reply[start..i]);
            continue;
        }
        match balanced_block(reply, i) {
            Some(end) => {
                let candidate = &reply[i..end];
                match serde_json::from_str::<Value>(candidate) {
                    Ok(Value::Object(map)) => {
                        // Valid JSON objects are never spoken.
                        if let Some(request) = request_from(&map) {
                            let key = (
                                request.name.clone(),
                                serde_json::to_string(&request.args).unwrap_or_default(),
                            );
                            if seen.contains(&key) {
                                debug!(name = %request.name, "duplicate action block skipped");
                            } else {
                                seen.push(key);
                                requests.push(request);
                            }
                        } else {
                            debug!("malformed action block dropped");
                        }
                    }
                    _ => prose.push_str(candidate),
                }
                i = end;
            }
            None => {
                // Unbalanced brace run, keep as prose.
                prose.push_str(&reply[i..]);
                break;
            }
        }
    }

    let prose = prose.split_whitespace().collect::<Vec<_>>().join(" ");
    (prose, requests)
}

/// Byte offset one past the matching close brace, honoring strings.
fn balanced_block(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

fn request_from(map: &Map<String, Value>) -> Option<ActionRequest> {
    let name = map
        .get("action")
        .or_else(|| map.get("function"))
        .and_then(Value::as_str)?;
    let args = match map.get("args") {
        None => Map::new(),
        Some(Value::Object(args)) => args.clone(),
        Some(_) => return None,
    };
    Some(ActionRequest {
        name: name.to_owned(),
        args,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use serde_json::json;

    #[test]
    fn plain_prose_has_no_requests() {
        let (prose, requests) = split_reply("It's a lovely day.");
        assert_eq!(prose, "It's a lovely day.");
        assert!(requests.is_empty());
    }

    #[test]
    fn block_is_extracted_and_stripped() {
        let (prose, requests) =
            split_reply(r#"Let me check. {"action": "get_time", "args": {}} One moment."#);
        assert_eq!(prose, "Let me check. One moment.");
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].name, "get_time");
        assert!(requests[0].args.is_empty());
    }

    #[test]
    fn function_key_is_accepted() {
        let (_, requests) = split_reply(r#"{"function": "get_time"}"#);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].name, "get_time");
    }

    #[test]
    fn nested_args_survive() {
        let (_, requests) =
            split_reply(r#"{"action": "save_note", "args": {"text": "buy {milk}"}}"#);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].args["text"], json!("buy {milk}"));
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_the_scanner() {
        let (prose, requests) =
            split_reply(r#"Sure. {"action": "save_note", "args": {"text": "a \"quoted\" }"}}"#);
        assert_eq!(prose, "Sure.");
        assert_eq!(requests.len(), 1);
    }

    #[test]
    fn multiple_blocks_preserve_order() {
        let reply = r#"{"action": "get_time"} and {"action": "get_notes"}"#;
        let (prose, requests) = split_reply(reply);
        assert_eq!(prose, "and");
        assert_eq!(requests[0].name, "get_time");
        assert_eq!(requests[1].name, "get_notes");
    }

    #[test]
    fn duplicate_blocks_run_once() {
        let reply = r#"{"action": "get_time"} {"action": "get_time"}"#;
        let (_, requests) = split_reply(reply);
        assert_eq!(requests.len(), 1);
    }

    #[test]
    fn same_name_different_args_are_distinct() {
        let reply = r#"{"action": "calculate", "args": {"expression": "1+1"}}
                       {"action": "calculate", "args": {"expression": "2+2"}}"#;
        let (_, requests) = split_reply(reply);
        assert_eq!(requests.len(), 2);
    }

    #[test]
    fn malformed_json_stays_in_prose() {
        let (prose, requests) = split_reply(r#"Broken {"action": "get_time" block here"#);
        assert!(requests.is_empty());
        assert!(prose.starts_with("Broken {"));
    }

    #[test]
    fn json_without_an_action_name_is_dropped_silently() {
        let (prose, requests) = split_reply(r#"Data: {"temperature": 21} done."#);
        assert!(requests.is_empty());
        assert_eq!(prose, "Data: done.");
    }

    #[test]
    fn non_object_args_fail_closed() {
        let (prose, requests) = split_reply(r#"{"action": "get_time", "args": [1, 2]}"#);
        assert!(requests.is_empty());
        assert_eq!(prose, "");
    }

    #[test]
    fn command_phrases_normalize_punctuation_and_case() {
        assert_eq!(command_event("Go to sleep!"), Some(SessionEvent::Sleep));
        assert_eq!(command_event("MUTE"), Some(SessionEvent::Mute));
        assert_eq!(
            command_event("start passive listening."),
            Some(SessionEvent::StartPassive)
        );
        assert_eq!(command_event("please go to sleep"), None);
        assert_eq!(command_event("I need sleep"), None);
    }

    #[test]
    fn followup_prompt_lists_every_result() {
        let results = vec![
            ActionResult {
                name: "get_time".into(),
                args: Map::new(),
                outcome: ActionOutcome::Success(json!({"time": "3:00 PM"})),
            },
            ActionResult {
                name: "explode".into(),
                args: Map::new(),
                outcome: ActionOutcome::Failure {
                    kind: crate::actions::ActionErrorKind::ActionFailed,
                    message: "boom".into(),
                },
            },
        ];
        let prompt = followup_prompt(&results);
        assert!(prompt.contains("get_time returned"));
        assert!(prompt.contains("explode failed (action_failed): boom"));
    }

    #[test]
    fn lone_image_capture_becomes_a_describe_prompt() {
        let results = vec![ActionResult {
            name: "capture_image".into(),
            args: Map::new(),
            outcome: ActionOutcome::Success(json!({"status": "captured", "path": "/tmp/x.png"})),
        }];
        let prompt = followup_prompt(&results);
        assert!(prompt.contains("Read the image at /tmp/x.png"));
    }
}
