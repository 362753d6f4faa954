//! Reasoning engine boundary.
//!
//! The engine owns the conversation transcript; this side only appends
//! prompt text and reads back free-form reply text. One engine
//! instance exists per conversational participant, so turns for the
//! same participant are naturally serialized by `&mut self`.

use crate::error::{Result, SessionError};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};

/// A conversation with the remote reasoning engine.
#[async_trait]
pub trait ReasoningEngine: Send {
    /// Start the conversation with a system prompt and return the
    /// engine's greeting.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Engine`] when the boundary is
    /// unreachable.
    async fn init(&mut self, system_prompt: &str) -> Result<String>;

    /// Append a prompt to the conversation and return the reply.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Engine`] when the boundary is
    /// unreachable.
    async fn send(&mut self, prompt: &str) -> Result<String>;
}

/// Reasoning engine backed by an external CLI that holds conversation
/// state itself: the first call passes the prompt fresh, subsequent
/// calls use the CLI's continuation flag.
pub struct CliEngine {
    program: PathBuf,
    started: bool,
}

impl CliEngine {
    /// Locate the engine CLI on PATH.
    ///
    /// # Errors
    ///
    /// Returns an error if the binary cannot be found.
    pub fn new(program: &str) -> Result<Self> {
        let program = which::which(program)
            .map_err(|e| SessionError::Engine(format!("engine CLI '{program}' not found: {e}")))?;
        info!("reasoning engine CLI: {}", program.display());
        Ok(Self {
            program,
            started: false,
        })
    }

    async fn run(&self, continue_conversation: bool, prompt: &str) -> Result<String> {
        let start = Instant::now();
        let mut cmd = tokio::process::Command::new(&self.program);
        if continue_conversation {
            cmd.arg("-c");
        }
        cmd.arg("-p").arg(prompt);
        cmd.stdin(std::process::Stdio::null());

        let output = cmd
            .output()
            .await
            .map_err(|e| SessionError::Engine(format!("engine failed to run: {e}")))?;
        debug!("engine round trip took {:?}", start.elapsed());

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SessionError::Engine(format!(
                "engine exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
    }
}

#[async_trait]
impl ReasoningEngine for CliEngine {
    async fn init(&mut self, system_prompt: &str) -> Result<String> {
        info!("starting new engine conversation");
        let prompt = format!("{system_prompt}\n\nIntroduce yourself briefly.");
        let reply = self.run(false, &prompt).await?;
        self.started = true;
        Ok(reply)
    }

    async fn send(&mut self, prompt: &str) -> Result<String> {
        self.run(self.started, prompt).await
    }
}

/// Build the system prompt: identity, spoken-reply constraints, the
/// structured action protocol, and the registered action catalog.
#[must_use]
pub fn build_system_prompt(name: &str, catalog: &str, extra: Option<&str>) -> String {
    let mut prompt = format!(
        "Your name is {name}. You are a personal assistant with eyes, ears, and a voice. \
         The user speaks to you and your responses will be read aloud. \
         Respond in 1-2 sentences maximum. Be brief and conversational. \
         Never use lists, markdown, or formatting. \
         You can request local actions by including a JSON object in your response \
         with the format: {{\"action\": \"name\", \"args\": {{...}}}}. \
         The JSON is executed locally and not read aloud. \
         After an action runs you will receive its result and should speak it conversationally. \
         Available actions:\n{catalog}"
    );
    if let Some(extra) = extra {
        prompt.push('\n');
        prompt.push_str(extra);
    }
    prompt
}
