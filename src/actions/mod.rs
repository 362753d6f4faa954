//! Action registry: named, schema-described operations the reasoning
//! engine may request via structured blocks in its replies.
//!
//! The catalog is registered once at process start and immutable
//! afterwards. Execution failures are captured as structured
//! [`ActionResult`]s and folded back into the conversation; they
//! never crash the turn.

pub mod calc;
pub mod notes;
pub mod system;
pub mod time;
pub mod timer;
pub mod vision;
pub mod web;

use crate::session::ModeFlags;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Declared type of an action parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// JSON string.
    String,
    /// JSON number.
    Number,
}

impl ParamKind {
    fn label(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
        }
    }
}

/// One declared parameter of an action.
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    /// Parameter name as it appears in the args mapping.
    pub name: &'static str,
    /// Expected JSON type.
    pub kind: ParamKind,
    /// Human-readable description for the engine catalog.
    pub description: &'static str,
    /// Whether the parameter must be present.
    pub required: bool,
}

/// Failure classification for a single action request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionErrorKind {
    /// No action registered under the requested name.
    UnknownAction,
    /// The args mapping did not satisfy the declared parameters.
    InvalidArgs,
    /// The action ran and failed.
    ActionFailed,
}

impl ActionErrorKind {
    /// Stable label used when embedding results in a follow-up prompt.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::UnknownAction => "unknown_action",
            Self::InvalidArgs => "invalid_args",
            Self::ActionFailed => "action_failed",
        }
    }
}

/// Error returned by an action implementation.
#[derive(Debug, Clone)]
pub struct ActionError {
    /// Failure classification.
    pub kind: ActionErrorKind,
    /// Captured message, surfaced to the engine.
    pub message: String,
}

impl ActionError {
    /// An execution failure.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            kind: ActionErrorKind::ActionFailed,
            message: message.into(),
        }
    }

    /// An argument validation failure.
    #[must_use]
    pub fn invalid_args(message: impl Into<String>) -> Self {
        Self {
            kind: ActionErrorKind::InvalidArgs,
            message: message.into(),
        }
    }
}

/// A structured action request parsed from an engine reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRequest {
    /// Registered action name.
    pub name: String,
    /// Argument mapping.
    pub args: Map<String, Value>,
}

/// Outcome of one executed (or rejected) request.
#[derive(Debug, Clone)]
pub enum ActionOutcome {
    /// The action ran and produced a value.
    Success(Value),
    /// The request failed; the kind and message are surfaced to the
    /// engine in the follow-up prompt.
    Failure {
        /// Failure classification.
        kind: ActionErrorKind,
        /// Captured message.
        message: String,
    },
}

/// The collected result for one request in a turn.
#[derive(Debug, Clone)]
pub struct ActionResult {
    /// Requested action name.
    pub name: String,
    /// Arguments as requested.
    pub args: Map<String, Value>,
    /// Success value or captured failure.
    pub outcome: ActionOutcome,
}

/// Terminal signals: requests that are handled as session events
/// rather than ordinary results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// Transition the session to Inactive.
    Sleep,
    /// Terminate the process after any farewell is spoken.
    Shutdown,
}

/// Read-only session context passed to action implementations.
///
/// Actions may read the flags to decide behavior (a capture action
/// checks `visual`) but mutate session mode only through the
/// documented transition events, which they reach via their
/// [`ControlSignal`].
#[derive(Debug, Clone, Copy)]
pub struct ActionContext {
    /// Current session flag set.
    pub flags: ModeFlags,
}

/// A named, effectful operation invocable by the reasoning engine.
///
/// Implementations own their state (a notes store, a camera handle,
/// an HTTP client); none of it lives in the session state. Execution
/// is async so network-backed actions can await their lookups on the
/// turn loop.
#[async_trait]
pub trait Action: Send + Sync {
    /// Registered name.
    fn name(&self) -> &'static str;

    /// Human-readable description for the engine catalog.
    fn description(&self) -> &'static str;

    /// Declared parameters. Empty for parameterless actions.
    fn params(&self) -> &'static [ParamSpec] {
        &[]
    }

    /// Execute with validated args.
    ///
    /// # Errors
    ///
    /// Returns an [`ActionError`] captured into the turn's results.
    async fn execute(
        &self,
        args: &Map<String, Value>,
        ctx: &ActionContext,
    ) -> Result<Value, ActionError>;

    /// Terminal signal raised when this action succeeds.
    fn signal(&self) -> Option<ControlSignal> {
        None
    }
}

/// Immutable catalog of registered actions.
#[derive(Default)]
pub struct ActionRegistry {
    /// Registration order, preserved for the prompt catalog.
    actions: Vec<Arc<dyn Action>>,
    by_name: HashMap<&'static str, usize>,
}

impl ActionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action. Later registrations under the same name
    /// replace earlier ones.
    pub fn register(&mut self, action: Arc<dyn Action>) {
        let name = action.name();
        if let Some(&idx) = self.by_name.get(name) {
            warn!("action {name} registered twice, replacing");
            self.actions[idx] = action;
        } else {
            self.by_name.insert(name, self.actions.len());
            self.actions.push(action);
        }
    }

    /// Number of registered actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Execute one request. Never panics and never propagates an
    /// error: every failure mode is captured in the returned
    /// [`ActionResult`]. The control signal is raised only when a
    /// terminal action actually succeeded.
    pub async fn invoke(
        &self,
        request: &ActionRequest,
        ctx: &ActionContext,
    ) -> (ActionResult, Option<ControlSignal>) {
        let Some(&idx) = self.by_name.get(request.name.as_str()) else {
            return (
                ActionResult {
                    name: request.name.clone(),
                    args: request.args.clone(),
                    outcome: ActionOutcome::Failure {
                        kind: ActionErrorKind::UnknownAction,
                        message: format!("unknown action: {}", request.name),
                    },
                },
                None,
            );
        };
        let action = &self.actions[idx];

        if let Err(e) = validate_args(action.params(), &request.args) {
            return (
                ActionResult {
                    name: request.name.clone(),
                    args: request.args.clone(),
                    outcome: ActionOutcome::Failure {
                        kind: e.kind,
                        message: e.message,
                    },
                },
                None,
            );
        }

        match action.execute(&request.args, ctx).await {
            Ok(value) => (
                ActionResult {
                    name: request.name.clone(),
                    args: request.args.clone(),
                    outcome: ActionOutcome::Success(value),
                },
                action.signal(),
            ),
            Err(e) => (
                ActionResult {
                    name: request.name.clone(),
                    args: request.args.clone(),
                    outcome: ActionOutcome::Failure {
                        kind: e.kind,
                        message: e.message,
                    },
                },
                None,
            ),
        }
    }

    /// Catalog description for the engine's system prompt: one line
    /// per action with its parameters and types.
    #[must_use]
    pub fn prompt_catalog(&self) -> String {
        let mut lines = Vec::with_capacity(self.actions.len());
        for action in &self.actions {
            let params = action
                .params()
                .iter()
                .map(|p| format!("{} ({}): {}", p.name, p.kind.label(), p.description))
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!(
                "- {}({}): {}",
                action.name(),
                params,
                action.description()
            ));
        }
        lines.join("\n")
    }
}

/// Check the args mapping against the declared parameters.
fn validate_args(params: &[ParamSpec], args: &Map<String, Value>) -> Result<(), ActionError> {
    for param in params {
        match args.get(param.name) {
            Some(value) => {
                if !param.kind.accepts(value) {
                    return Err(ActionError::invalid_args(format!(
                        "parameter '{}' must be a {}",
                        param.name,
                        param.kind.label()
                    )));
                }
            }
            None if param.required => {
                return Err(ActionError::invalid_args(format!(
                    "missing required parameter '{}'",
                    param.name
                )));
            }
            None => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use serde_json::json;

    struct EchoAction;

    #[async_trait]
    impl Action for EchoAction {
        fn name(&self) -> &'static str {
            "echo"
        }
        fn description(&self) -> &'static str {
            "Echo the given text back"
        }
        fn params(&self) -> &'static [ParamSpec] {
            &[ParamSpec {
                name: "text",
                kind: ParamKind::String,
                description: "Text to echo",
                required: true,
            }]
        }
        async fn execute(
            &self,
            args: &Map<String, Value>,
            _ctx: &ActionContext,
        ) -> Result<Value, ActionError> {
            Ok(json!({ "echoed": args["text"] }))
        }
    }

    struct FailingAction;

    #[async_trait]
    impl Action for FailingAction {
        fn name(&self) -> &'static str {
            "explode"
        }
        fn description(&self) -> &'static str {
            "Always fails"
        }
        async fn execute(
            &self,
            _args: &Map<String, Value>,
            _ctx: &ActionContext,
        ) -> Result<Value, ActionError> {
            Err(ActionError::failed("boom"))
        }
        fn signal(&self) -> Option<ControlSignal> {
            Some(ControlSignal::Shutdown)
        }
    }

    fn ctx() -> ActionContext {
        ActionContext {
            flags: ModeFlags::default(),
        }
    }

    fn registry() -> ActionRegistry {
        let mut r = ActionRegistry::new();
        r.register(Arc::new(EchoAction));
        r.register(Arc::new(FailingAction));
        r
    }

    fn request(name: &str, args: Value) -> ActionRequest {
        ActionRequest {
            name: name.to_owned(),
            args: args.as_object().cloned().unwrap_or_default(),
        }
    }

    #[tokio::test]
    async fn invoke_success() {
        let (result, signal) = registry()
            .invoke(&request("echo", json!({"text": "hi"})), &ctx())
            .await;
        assert!(signal.is_none());
        match result.outcome {
            ActionOutcome::Success(v) => assert_eq!(v["echoed"], "hi"),
            ActionOutcome::Failure { .. } => panic!("expected success"),
        }
    }

    #[tokio::test]
    async fn unknown_action_is_captured() {
        let (result, signal) = registry().invoke(&request("nope", json!({})), &ctx()).await;
        assert!(signal.is_none());
        match result.outcome {
            ActionOutcome::Failure { kind, .. } => {
                assert_eq!(kind, ActionErrorKind::UnknownAction);
            }
            ActionOutcome::Success(_) => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn missing_required_param_is_invalid_args() {
        let (result, _) = registry().invoke(&request("echo", json!({})), &ctx()).await;
        match result.outcome {
            ActionOutcome::Failure { kind, message } => {
                assert_eq!(kind, ActionErrorKind::InvalidArgs);
                assert!(message.contains("text"));
            }
            ActionOutcome::Success(_) => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn wrong_param_type_is_invalid_args() {
        let (result, _) = registry()
            .invoke(&request("echo", json!({"text": 42})), &ctx())
            .await;
        match result.outcome {
            ActionOutcome::Failure { kind, .. } => {
                assert_eq!(kind, ActionErrorKind::InvalidArgs);
            }
            ActionOutcome::Success(_) => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn execution_failure_is_captured_and_signal_withheld() {
        let (result, signal) = registry()
            .invoke(&request("explode", json!({})), &ctx())
            .await;
        // A failed terminal action must not raise its signal.
        assert!(signal.is_none());
        match result.outcome {
            ActionOutcome::Failure { kind, message } => {
                assert_eq!(kind, ActionErrorKind::ActionFailed);
                assert_eq!(message, "boom");
            }
            ActionOutcome::Success(_) => panic!("expected failure"),
        }
    }

    #[test]
    fn prompt_catalog_lists_all_actions() {
        let catalog = registry().prompt_catalog();
        assert!(catalog.contains("- echo(text (string): Text to echo): Echo the given text back"));
        assert!(catalog.contains("- explode(): Always fails"));
    }

    #[test]
    fn reregistration_replaces() {
        let mut r = registry();
        let before = r.len();
        r.register(Arc::new(EchoAction));
        assert_eq!(r.len(), before);
    }
}
