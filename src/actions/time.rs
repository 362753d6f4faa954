//! Current time and date.

use super::{Action, ActionContext, ActionError};
use async_trait::async_trait;
use chrono::Local;
use serde_json::{json, Map, Value};

/// Reports the current local time and date.
pub struct TimeAction;

#[async_trait]
impl Action for TimeAction {
    fn name(&self) -> &'static str {
        "get_time"
    }

    fn description(&self) -> &'static str {
        "Get the current time and date"
    }

    async fn execute(
        &self,
        _args: &Map<String, Value>,
        _ctx: &ActionContext,
    ) -> Result<Value, ActionError> {
        let now = Local::now();
        Ok(json!({
            "time": now.format("%I:%M %p").to_string(),
            "date": now.format("%A, %B %d, %Y").to_string(),
        }))
    }
}
