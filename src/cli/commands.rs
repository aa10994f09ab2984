use std::io::{self, Write as _};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

use crate::api::notes::NotesApi;
use crate::auth::scheduler::RefreshTask;
use crate::auth::{RegisterFields, SessionManager};
use crate::config::{AppConfig, ConfigPaths};
use crate::editor::{self, EditorLaunch};

const DEFAULT_TITLE: &str = "Untitled Note";
const EMPTY_CONTENT: &str = "<p></p>";

const TIMESTAMP_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]");

#[derive(Args, Debug, Clone)]
pub struct RegisterArgs {
    /// Username for the new account
    pub username: String,
    /// Optional email address
    #[arg(long)]
    pub email: Option<String>,
    /// Password (prompted twice if omitted)
    #[arg(long)]
    pub password: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct LoginArgs {
    /// Username to sign in as
    pub username: String,
    /// Password (prompted if omitted)
    #[arg(long)]
    pub password: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// Limit the number of notes printed
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

#[derive(Args, Debug, Clone)]
pub struct ShowArgs {
    /// Note identifier
    pub note_id: i64,
}

#[derive(Args, Debug, Clone)]
pub struct NewArgs {
    /// Title for the note
    #[arg(default_value = DEFAULT_TITLE)]
    pub title: String,
    /// Initial content markup; defaults to an empty paragraph
    #[arg(long, default_value = EMPTY_CONTENT)]
    pub content: String,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    /// Note identifier
    pub note_id: i64,
    /// Editor command override (otherwise $VISUAL/$EDITOR, then vi)
    #[arg(long)]
    pub editor: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct RenameArgs {
    /// Note identifier
    pub note_id: i64,
    /// New title
    pub title: String,
}

#[derive(Args, Debug, Clone)]
pub struct RmArgs {
    /// Note identifier
    pub note_id: i64,
}

pub async fn register(auth: &Arc<SessionManager>, args: RegisterArgs) -> Result<()> {
    let password = match args.password {
        Some(password) => password,
        None => prompt("Password")?,
    };
    let password2 = prompt("Confirm password")?;
    let fields = RegisterFields {
        username: args.username.clone(),
        email: args.email,
        password,
        password2,
    };
    let created = auth.register(&fields).await?;
    if !created {
        bail!("registration was rejected by the server");
    }
    println!(
        "Account created. Sign in with `mindspace login {}`.",
        args.username
    );
    Ok(())
}

pub async fn login(auth: &Arc<SessionManager>, args: LoginArgs) -> Result<()> {
    let password = match args.password {
        Some(password) => password,
        None => prompt("Password")?,
    };
    let session = auth.login(&args.username, &password).await?;
    println!(
        "Logged in as {}.",
        session.username().unwrap_or(&args.username)
    );
    Ok(())
}

pub fn logout(auth: &Arc<SessionManager>) -> Result<()> {
    auth.logout();
    println!("Logged out.");
    Ok(())
}

pub fn whoami(auth: &Arc<SessionManager>) -> Result<()> {
    let Some(session) = auth.session() else {
        println!("Not logged in.");
        return Ok(());
    };
    println!("user id:  {}", session.user_id());
    if let Some(username) = session.username() {
        println!("username: {username}");
    }
    if let Some(email) = session.email() {
        println!("email:    {email}");
    }
    println!("token expires: {}", format_timestamp(session.expires_at()));
    Ok(())
}

pub async fn list_notes(
    auth: &Arc<SessionManager>,
    notes: &NotesApi,
    args: ListArgs,
) -> Result<()> {
    ensure_session(auth)?;
    let listing = notes.list().await.context("listing notes")?;
    if listing.is_empty() {
        println!("No notes yet. Create one with `mindspace new`.");
        return Ok(());
    }
    for note in listing.iter().take(args.limit) {
        println!(
            "#{:<6} {}  (updated {})",
            note.id,
            note.title,
            format_timestamp(note.updated_at)
        );
    }
    Ok(())
}

pub async fn show_note(auth: &Arc<SessionManager>, notes: &NotesApi, args: ShowArgs) -> Result<()> {
    ensure_session(auth)?;
    let note = notes.get(args.note_id).await.context("fetching note")?;
    println!("#{}  {}", note.id, note.title);
    println!(
        "created {}  updated {}",
        format_timestamp(note.created_at),
        format_timestamp(note.updated_at)
    );
    println!();
    println!("{}", note.content);
    Ok(())
}

pub async fn new_note(auth: &Arc<SessionManager>, notes: &NotesApi, args: NewArgs) -> Result<()> {
    ensure_session(auth)?;
    let title = args.title.trim();
    if title.is_empty() {
        bail!("note title cannot be empty");
    }
    let note = notes
        .create(title, &args.content)
        .await
        .context("creating note")?;
    println!("Created note #{} \"{}\"", note.id, note.title);
    Ok(())
}

pub async fn edit_note(
    config: &AppConfig,
    paths: &ConfigPaths,
    auth: Arc<SessionManager>,
    notes: &NotesApi,
    args: EditArgs,
) -> Result<()> {
    ensure_session(&auth)?;
    let note = notes.get(args.note_id).await.context("fetching note")?;

    // The silent-refresh loop lives only as long as the editing session.
    let refresh = RefreshTask::spawn(auth.clone(), config.session.refresh_interval());
    let result = editor::edit_note(
        notes,
        EditorLaunch {
            note,
            drafts_dir: paths.drafts_dir.clone(),
            interval: config.auto_save.interval(),
            autosave_enabled: config.auto_save.enabled,
            editor: args.editor,
        },
    )
    .await;
    refresh.shutdown().await;
    result?;
    println!("Saved note #{}.", args.note_id);
    Ok(())
}

pub async fn rename_note(
    auth: &Arc<SessionManager>,
    notes: &NotesApi,
    args: RenameArgs,
) -> Result<()> {
    ensure_session(auth)?;
    let title = args.title.trim();
    if title.is_empty() {
        bail!("note title cannot be empty");
    }
    let note = notes
        .rename(args.note_id, title)
        .await
        .context("renaming note")?;
    println!("Renamed note #{} to \"{}\"", note.id, note.title);
    Ok(())
}

pub async fn delete_note(
    auth: &Arc<SessionManager>,
    notes: &NotesApi,
    args: RmArgs,
) -> Result<()> {
    ensure_session(auth)?;
    notes.delete(args.note_id).await.context("deleting note")?;
    println!("Deleted note #{}.", args.note_id);
    Ok(())
}

fn ensure_session(auth: &Arc<SessionManager>) -> Result<()> {
    if auth.session().is_none() {
        bail!("not logged in; run `mindspace login <username>` first");
    }
    Ok(())
}

fn format_timestamp(ts: OffsetDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT)
        .unwrap_or_else(|_| ts.to_string())
}

fn prompt(label: &str) -> Result<String> {
    print!("{label}: ");
    io::stdout().flush().context("flushing prompt")?;
    let mut buf = String::new();
    io::stdin().read_line(&mut buf).context("reading input")?;
    Ok(buf.trim_end().to_owned())
}
