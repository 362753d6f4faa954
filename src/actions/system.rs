//! Session-control actions and host information.
//!
//! Sleep and shutdown are signals rather than ordinary results: the
//! dispatcher turns a successful invocation into a session event
//! (sleep) or a shutdown of the whole process, instead of speaking the
//! returned value.

use super::{Action, ActionContext, ActionError, ControlSignal};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

/// Puts the session to sleep until the wake word is heard.
pub struct SleepAction;

#[async_trait]
impl Action for SleepAction {
    fn name(&self) -> &'static str {
        "go_to_sleep"
    }

    fn description(&self) -> &'static str {
        "Put the assistant to sleep. Use when the user says good night or asks you to stop listening."
    }

    async fn execute(
        &self,
        _args: &Map<String, Value>,
        _ctx: &ActionContext,
    ) -> Result<Value, ActionError> {
        Ok(json!({ "status": "sleeping" }))
    }

    fn signal(&self) -> Option<ControlSignal> {
        Some(ControlSignal::Sleep)
    }
}

/// Shuts the session controller down.
pub struct ShutdownAction;

#[async_trait]
impl Action for ShutdownAction {
    fn name(&self) -> &'static str {
        "shutdown"
    }

    fn description(&self) -> &'static str {
        "Shut down the voice interface. Use when the user says goodbye or asks to shut down."
    }

    async fn execute(
        &self,
        _args: &Map<String, Value>,
        _ctx: &ActionContext,
    ) -> Result<Value, ActionError> {
        Ok(json!({ "status": "shutting_down" }))
    }

    fn signal(&self) -> Option<ControlSignal> {
        Some(ControlSignal::Shutdown)
    }
}

/// Reports basic host facts: hostname, outbound address, OS, and
/// processor count.
pub struct SystemInfoAction;

#[async_trait]
impl Action for SystemInfoAction {
    fn name(&self) -> &'static str {
        "get_system_info"
    }

    fn description(&self) -> &'static str {
        "Get system information like hostname, IP address, and OS"
    }

    async fn execute(
        &self,
        _args: &Map<String, Value>,
        _ctx: &ActionContext,
    ) -> Result<Value, ActionError> {
        Ok(json!({
            "hostname": hostname(),
            "ip_address": local_ip().unwrap_or_else(|| "unknown".to_owned()),
            "os": format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
            "cpus": std::thread::available_parallelism().map(usize::from).unwrap_or(1),
        }))
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|s| s.trim().to_owned())
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_owned())
}

/// The address the host would use for outbound traffic. Connecting a
/// UDP socket picks the route without sending anything.
fn local_ip() -> Option<String> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    Some(socket.local_addr().ok()?.ip().to_string())
}
