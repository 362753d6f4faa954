//! Camera capture behind an external frame-grabber boundary.

use super::{Action, ActionContext, ActionError};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::path::PathBuf;

/// Acquires one frame from a camera and persists it, returning the
/// stored image path. The device itself is an external collaborator.
pub trait FrameGrabber: Send + Sync {
    /// Capture and persist one frame.
    ///
    /// # Errors
    ///
    /// Returns a message describing why the capture failed.
    fn grab(&self) -> Result<PathBuf, String>;
}

/// Frame grabber used when no camera is wired up: every capture fails
/// with a clear message that the engine can relay to the user.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCamera;

impl FrameGrabber for NoCamera {
    fn grab(&self) -> Result<PathBuf, String> {
        Err("no camera attached".to_owned())
    }
}

/// Captures a photo from the webcam.
///
/// Reads the Visual flag so the engine's follow-up knows whether this
/// capture is part of periodic visual narration or a one-off request.
pub struct CaptureImageAction {
    grabber: std::sync::Arc<dyn FrameGrabber>,
}

impl CaptureImageAction {
    /// Build over a frame grabber.
    #[must_use]
    pub fn new(grabber: std::sync::Arc<dyn FrameGrabber>) -> Self {
        Self { grabber }
    }
}

#[async_trait]
impl Action for CaptureImageAction {
    fn name(&self) -> &'static str {
        "capture_image"
    }

    fn description(&self) -> &'static str {
        "Capture a photo from the webcam"
    }

    async fn execute(
        &self,
        _args: &Map<String, Value>,
        ctx: &ActionContext,
    ) -> Result<Value, ActionError> {
        let path = self.grabber.grab().map_err(ActionError::failed)?;
        Ok(json!({
            "status": "captured",
            "path": path.display().to_string(),
            "visual_mode": ctx.flags.visual,
        }))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::session::ModeFlags;
    use std::sync::Arc;

    struct FakeCamera;

    impl FrameGrabber for FakeCamera {
        fn grab(&self) -> Result<PathBuf, String> {
            Ok(PathBuf::from("/tmp/captures/frame.png"))
        }
    }

    #[tokio::test]
    async fn capture_reports_path_and_visual_flag() {
        let action = CaptureImageAction::new(Arc::new(FakeCamera));
        let ctx = ActionContext {
            flags: ModeFlags {
                visual: true,
                ..ModeFlags::default()
            },
        };
        let value = action.execute(&Map::new(), &ctx).await.unwrap();
        assert_eq!(value["status"], "captured");
        assert!(value["path"].as_str().unwrap().ends_with(".png"));
        assert_eq!(value["visual_mode"], true);
    }

    #[tokio::test]
    async fn no_camera_fails_cleanly() {
        let action = CaptureImageAction::new(Arc::new(NoCamera));
        let ctx = ActionContext {
            flags: ModeFlags::default(),
        };
        let err = action.execute(&Map::new(), &ctx).await.unwrap_err();
        assert!(err.message.contains("no camera"));
    }
}
