use time::OffsetDateTime;

use crate::api::notes::{Note, NotesApi};

/// Save status for the one open note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveState {
    /// Buffer equals the last persisted snapshot.
    Idle,
    /// Buffer has diverged from the snapshot.
    Dirty,
    /// A save is in flight.
    Saving,
}

#[derive(Debug, Clone)]
pub enum AutosaveEvent {
    Saved {
        note_id: i64,
        timestamp: OffsetDateTime,
    },
    Failed {
        note_id: i64,
        message: String,
    },
}

#[derive(Debug)]
struct EditSession {
    note_id: i64,
    title: String,
    buffer: String,
    snapshot: String,
    state: SaveState,
    last_saved_at: Option<OffsetDateTime>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum FlushKind {
    Periodic,
    Manual,
}

/// Dirty-tracking state machine for the single open note.
///
/// One buffer is active at a time; opening a different note replaces it
/// wholesale, discarding unsaved edits without any server write. Save
/// failures are absorbed silently and retried on the next periodic tick.
#[derive(Debug, Default)]
pub struct AutosaveController {
    session: Option<EditSession>,
}

impl AutosaveController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts editing `note`, replacing any previous buffer.
    pub fn open(&mut self, note: &Note) {
        self.session = Some(EditSession {
            note_id: note.id,
            title: note.title.clone(),
            buffer: note.content.clone(),
            snapshot: note.content.clone(),
            state: SaveState::Idle,
            last_saved_at: None,
        });
    }

    pub fn close(&mut self) {
        self.session = None;
    }

    pub fn note_id(&self) -> Option<i64> {
        self.session.as_ref().map(|s| s.note_id)
    }

    pub fn state(&self) -> Option<SaveState> {
        self.session.as_ref().map(|s| s.state)
    }

    pub fn is_dirty(&self) -> bool {
        matches!(self.state(), Some(SaveState::Dirty))
    }

    pub fn last_saved_at(&self) -> Option<OffsetDateTime> {
        self.session.as_ref().and_then(|s| s.last_saved_at)
    }

    /// Replaces the buffer contents. Dirtiness is divergence from the
    /// snapshot, so editing back to the saved content returns to Idle.
    pub fn edit(&mut self, contents: &str) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.buffer == contents {
            return;
        }
        session.buffer.clear();
        session.buffer.push_str(contents);
        session.state = if session.buffer == session.snapshot {
            SaveState::Idle
        } else {
            SaveState::Dirty
        };
    }

    /// Periodic tick. Fires on a fixed cadence regardless of state; only a
    /// Dirty buffer triggers a save.
    pub async fn tick(&mut self, notes: &NotesApi) -> Option<AutosaveEvent> {
        self.flush(notes, FlushKind::Periodic).await
    }

    /// Explicit user-initiated save, independent of the timer.
    pub async fn save_now(&mut self, notes: &NotesApi) -> Option<AutosaveEvent> {
        self.flush(notes, FlushKind::Manual).await
    }

    async fn flush(&mut self, notes: &NotesApi, kind: FlushKind) -> Option<AutosaveEvent> {
        let session = self.session.as_mut()?;
        if session.state != SaveState::Dirty {
            return None;
        }

        session.state = SaveState::Saving;
        let note_id = session.note_id;
        let title = session.title.clone();
        let contents = session.buffer.clone();

        match notes.update(note_id, &title, &contents).await {
            Ok(saved) => {
                session.snapshot = contents;
                session.state = if session.buffer == session.snapshot {
                    SaveState::Idle
                } else {
                    SaveState::Dirty
                };
                session.last_saved_at = Some(saved.updated_at);
                Some(AutosaveEvent::Saved {
                    note_id,
                    timestamp: saved.updated_at,
                })
            }
            Err(err) => {
                // Swallowed: the next periodic tick retries. Manual saves get
                // the event back so the caller can surface it.
                session.state = SaveState::Dirty;
                if kind == FlushKind::Periodic {
                    tracing::warn!(note_id, %err, "autosave failed, retrying on next tick");
                }
                Some(AutosaveEvent::Failed {
                    note_id,
                    message: err.to_string(),
                })
            }
        }
    }
}
