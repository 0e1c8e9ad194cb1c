use std::path::{Path, PathBuf};

use crate::error::{DayflowError, DayflowResult};
use crate::event::CalendarEvent;
use crate::placement::NotePlacer;
use crate::render;
use crate::store::NoteStore;

/// Pointer file name used when none is configured.
pub const DEFAULT_POINTER_FILE: &str = "Current Meeting.md";

/// Owns the pointer file that always reflects the active meeting.
#[derive(Debug, Clone)]
pub struct CurrentMeetingTracker {
    pointer_path: PathBuf,
    placer: NotePlacer,
}

impl CurrentMeetingTracker {
    pub fn new(pointer_path: impl Into<PathBuf>, placer: NotePlacer) -> Self {
        CurrentMeetingTracker {
            pointer_path: pointer_path.into(),
            placer,
        }
    }

    pub fn pointer_path(&self) -> &Path {
        &self.pointer_path
    }

    /// Replace the pointer contents with `current`, or the placeholder when `None`.
    pub fn update<S: NoteStore>(&self, current: Option<&CalendarEvent>, store: &S) -> DayflowResult<()> {
        let note_path = current.map(|event| self.placer.place(event));
        let active = current.zip(note_path.as_ref());
        let content = render::pointer_note(active, self.placer.timezone());

        store
            .write_pointer_atomic(&self.pointer_path, &content)
            .map_err(|source| DayflowError::PointerWriteFailed {
                path: self.pointer_path.clone(),
                source,
            })
    }

    pub fn read<S: NoteStore>(&self, store: &S) -> DayflowResult<Option<String>> {
        Ok(store.read_pointer(&self.pointer_path)?)
    }
}
