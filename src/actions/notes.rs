//! Notes and reminders, stored one file per note.

use super::{Action, ActionContext, ActionError, ParamKind, ParamSpec};
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::Arc;

const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// File-per-note store shared by the save and retrieve actions.
///
/// The store is the actions' own concern; nothing about it lives in
/// session state.
pub struct NotesStore {
    dir: PathBuf,
}

impl NotesStore {
    /// Create a store rooted at `dir`. The directory is created lazily
    /// on first save.
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Default notes directory (`<data_dir>/iris/notes`).
    #[must_use]
    pub fn default_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("iris")
            .join("notes")
    }

    fn save(&self, text: &str) -> Result<(), String> {
        std::fs::create_dir_all(&self.dir).map_err(|e| format!("cannot create notes dir: {e}"))?;
        let stamp = Local::now().format(STAMP_FORMAT);
        let mut path = self.dir.join(format!("{stamp}.txt"));
        // Same-second saves get a disambiguating suffix.
        let mut n = 1;
        while path.exists() {
            path = self.dir.join(format!("{stamp}_{n}.txt"));
            n += 1;
        }
        std::fs::write(&path, text).map_err(|e| format!("cannot write note: {e}"))
    }

    fn list(&self) -> Result<Vec<(DateTime<Local>, String)>, String> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut entries: Vec<PathBuf> = std::fs::read_dir(&self.dir)
            .map_err(|e| format!("cannot read notes dir: {e}"))?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("txt"))
            .collect();
        entries.sort();

        let mut notes = Vec::with_capacity(entries.len());
        for path in entries {
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            // Strip any collision suffix before parsing the timestamp.
            let stamp = stem.get(..15).unwrap_or(stem);
            let Ok(naive) = NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT) else {
                continue;
            };
            let Some(created) = Local.from_local_datetime(&naive).single() else {
                continue;
            };
            let text =
                std::fs::read_to_string(&path).map_err(|e| format!("cannot read note: {e}"))?;
            notes.push((created, text));
        }
        Ok(notes)
    }
}

/// Human-friendly elapsed-time phrase for note listings.
fn ago(created: DateTime<Local>, now: DateTime<Local>) -> String {
    let delta = now.signed_duration_since(created);
    let days = delta.num_days();
    let hours = delta.num_hours();
    let minutes = delta.num_minutes();
    if days > 0 {
        format!("{days} day{} ago", if days == 1 { "" } else { "s" })
    } else if hours > 0 {
        format!("{hours} hour{} ago", if hours == 1 { "" } else { "s" })
    } else if minutes > 0 {
        format!("{minutes} minute{} ago", if minutes == 1 { "" } else { "s" })
    } else {
        "just now".to_owned()
    }
}

/// Saves a note or reminder.
pub struct SaveNoteAction {
    store: Arc<NotesStore>,
}

impl SaveNoteAction {
    /// Build over a shared store.
    #[must_use]
    pub fn new(store: Arc<NotesStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Action for SaveNoteAction {
    fn name(&self) -> &'static str {
        "save_note"
    }

    fn description(&self) -> &'static str {
        "Save a note or reminder to retrieve later"
    }

    fn params(&self) -> &'static [ParamSpec] {
        &[ParamSpec {
            name: "text",
            kind: ParamKind::String,
            description: "The note or reminder text",
            required: true,
        }]
    }

    async fn execute(
        &self,
        args: &Map<String, Value>,
        _ctx: &ActionContext,
    ) -> Result<Value, ActionError> {
        let text = args["text"].as_str().unwrap_or_default();
        self.store.save(text).map_err(ActionError::failed)?;
        Ok(json!({ "status": "saved", "note": text }))
    }
}

/// Retrieves all saved notes with relative timestamps.
pub struct GetNotesAction {
    store: Arc<NotesStore>,
}

impl GetNotesAction {
    /// Build over a shared store.
    #[must_use]
    pub fn new(store: Arc<NotesStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Action for GetNotesAction {
    fn name(&self) -> &'static str {
        "get_notes"
    }

    fn description(&self) -> &'static str {
        "Retrieve all saved notes and reminders"
    }

    async fn execute(
        &self,
        _args: &Map<String, Value>,
        _ctx: &ActionContext,
    ) -> Result<Value, ActionError> {
        let now = Local::now();
        let notes: Vec<Value> = self
            .store
            .list()
            .map_err(ActionError::failed)?
            .into_iter()
            .map(|(created, text)| {
                json!({
                    "timestamp": created.format(STAMP_FORMAT).to_string(),
                    "ago": ago(created, now),
                    "text": text,
                })
            })
            .collect();
        Ok(json!({ "notes": notes }))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::session::ModeFlags;
    use chrono::Duration;

    fn ctx() -> ActionContext {
        ActionContext {
            flags: ModeFlags::default(),
        }
    }

    #[tokio::test]
    async fn save_then_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(NotesStore::new(dir.path().to_path_buf()));
        let save = SaveNoteAction::new(Arc::clone(&store));
        let get = GetNotesAction::new(store);

        let args = json!({"text": "buy oat milk"}).as_object().cloned().unwrap();
        save.execute(&args, &ctx()).await.unwrap();

        let value = get.execute(&Map::new(), &ctx()).await.unwrap();
        let notes = value["notes"].as_array().unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0]["text"], "buy oat milk");
        assert_eq!(notes[0]["ago"], "just now");
    }

    #[tokio::test]
    async fn get_notes_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let get = GetNotesAction::new(Arc::new(NotesStore::new(dir.path().join("missing"))));
        let value = get.execute(&Map::new(), &ctx()).await.unwrap();
        assert!(value["notes"].as_array().unwrap().is_empty());
    }

    #[test]
    fn ago_formatting() {
        let now = Local::now();
        assert_eq!(ago(now, now), "just now");
        assert_eq!(ago(now - Duration::minutes(5), now), "5 minutes ago");
        assert_eq!(ago(now - Duration::hours(1), now), "1 hour ago");
        assert_eq!(ago(now - Duration::days(3), now), "3 days ago");
    }
}
