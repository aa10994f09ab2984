use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::api::notes::NotesApi;
use crate::api::{ApiClient, HttpTransport, Transport};
use crate::auth::{SessionManager, TokenStore};
use crate::config::ConfigLoader;

pub mod commands;

use self::commands::{
    EditArgs, ListArgs, LoginArgs, NewArgs, RegisterArgs, RenameArgs, RmArgs, ShowArgs,
};

#[derive(Parser, Debug)]
#[command(
    name = "mindspace",
    version,
    about = "Command-line client for the Mindspace notes API"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override the config file location (takes precedence over MINDSPACE_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the state directory (takes precedence over MINDSPACE_STATE)
    #[arg(long)]
    pub state_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create an account on the backend
    Register(RegisterArgs),
    /// Sign in and persist the token pair
    Login(LoginArgs),
    /// Drop the stored session
    Logout,
    /// Show the identity decoded from the current access token
    Whoami,
    /// List notes, most recently updated first
    List(ListArgs),
    /// Print a single note
    Show(ShowArgs),
    /// Create a note
    New(NewArgs),
    /// Open a note in your editor with periodic autosave
    Edit(EditArgs),
    /// Rename a note, keeping its content
    Rename(RenameArgs),
    /// Delete a note
    Rm(RmArgs),
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var("MINDSPACE_CONFIG", path);
    }
    if let Some(path) = &cli.state_dir {
        env::set_var("MINDSPACE_STATE", path);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    let paths = loader.paths().clone();
    init_tracing(&cli.log_level)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;
    let config = loader.load_or_init()?;

    let transport: Arc<dyn Transport> =
        Arc::new(HttpTransport::new(&config.api).context("building http transport")?);
    let store = TokenStore::new(paths.token_file.clone());
    let auth = Arc::new(SessionManager::new(transport.clone(), store));
    let notes = NotesApi::new(ApiClient::new(transport, auth.clone()));

    match cli.command {
        Commands::Register(args) => commands::register(&auth, args).await,
        Commands::Login(args) => commands::login(&auth, args).await,
        Commands::Logout => commands::logout(&auth),
        Commands::Whoami => commands::whoami(&auth),
        Commands::List(args) => commands::list_notes(&auth, &notes, args).await,
        Commands::Show(args) => commands::show_note(&auth, &notes, args).await,
        Commands::New(args) => commands::new_note(&auth, &notes, args).await,
        Commands::Edit(args) => commands::edit_note(&config, &paths, auth, &notes, args).await,
        Commands::Rename(args) => commands::rename_note(&auth, &notes, args).await,
        Commands::Rm(args) => commands::delete_note(&auth, &notes, args).await,
    }
}

fn init_tracing(level: &str) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));
        fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
        Ok(())
    })
    .map(|_| ())
}
