use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::time::MissedTickBehavior;

use crate::api::notes::{Note, NotesApi};

pub mod autosave;

pub use autosave::{AutosaveController, AutosaveEvent, SaveState};

const DEFAULT_EDITOR: &str = "vi";

pub struct EditorLaunch {
    pub note: Note,
    pub drafts_dir: PathBuf,
    pub interval: Duration,
    pub autosave_enabled: bool,
    /// Editor command override; falls back to `$VISUAL`/`$EDITOR`, then `vi`.
    pub editor: Option<String>,
}

/// Materializes the note to a draft file, hands it to the user's editor and
/// autosaves dirty content on a fixed cadence while the editor runs. A final
/// manual save happens on exit; the draft file is removed once persisted.
pub async fn edit_note(notes: &NotesApi, options: EditorLaunch) -> Result<()> {
    fs::create_dir_all(&options.drafts_dir)
        .with_context(|| format!("creating drafts dir {}", options.drafts_dir.display()))?;
    let draft_path = options
        .drafts_dir
        .join(format!("note-{}.html", options.note.id));
    fs::write(&draft_path, &options.note.content)
        .with_context(|| format!("writing draft {}", draft_path.display()))?;

    let mut controller = AutosaveController::new();
    controller.open(&options.note);

    let editor = options.editor.clone().unwrap_or_else(|| {
        env::var("VISUAL")
            .or_else(|_| env::var("EDITOR"))
            .unwrap_or_else(|_| DEFAULT_EDITOR.to_string())
    });
    let mut child = tokio::process::Command::new(&editor)
        .arg(&draft_path)
        .spawn()
        .with_context(|| format!("launching editor {editor}"))?;

    let mut ticker = tokio::time::interval(options.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; nothing can be dirty yet.
    ticker.tick().await;

    let note_id = options.note.id;
    let mut interrupted = false;
    loop {
        tokio::select! {
            status = child.wait() => {
                let status = status.context("waiting for editor")?;
                if !status.success() {
                    tracing::warn!(note_id, %status, "editor exited with failure status");
                }
                break;
            }
            _ = ticker.tick() => {
                if !options.autosave_enabled {
                    continue;
                }
                sync_buffer(&mut controller, &draft_path);
                if let Some(AutosaveEvent::Saved { .. }) = controller.tick(notes).await {
                    tracing::info!(note_id, "autosaved");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(note_id, "interrupted, saving and exiting");
                interrupted = true;
                break;
            }
        }
    }
    if interrupted {
        let _ = child.start_kill();
        let _ = child.wait().await;
    }

    sync_buffer(&mut controller, &draft_path);
    if let Some(AutosaveEvent::Failed { message, .. }) = controller.save_now(notes).await {
        bail!("saving note {note_id} on exit: {message}");
    }
    let _ = fs::remove_file(&draft_path);
    Ok(())
}

fn sync_buffer(controller: &mut AutosaveController, path: &Path) {
    match fs::read_to_string(path) {
        Ok(contents) => controller.edit(&contents),
        Err(err) => tracing::warn!(%err, "could not read draft file"),
    }
}
