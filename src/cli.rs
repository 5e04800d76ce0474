use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "passkeeper",
    author,
    version,
    about = "A zero-knowledge password manager: records are sealed on this machine, the server only ever stores blobs."
)]
pub struct Cli {
    #[arg(long, global = true, help = "Emit machine-readable JSON output.")]
    pub json: bool,

    #[arg(long, global = true, help = "Suppress progress messages.")]
    pub quiet: bool,

    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Use an alternate config file."
    )]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(about = "Create an account and initialize the local vault.")]
    Register(RegisterArgs),

    #[command(about = "Log in and unlock the vault.")]
    Login(LoginArgs),

    #[command(about = "Clear the session and forget the in-memory key.")]
    Logout,

    #[command(about = "Show session and vault status.")]
    Status,

    #[command(about = "Add a record to the vault.")]
    Add(AddArgs),

    #[command(about = "Decrypt and print one record.")]
    Get(GetArgs),

    #[command(about = "List vault records.")]
    List,

    #[command(about = "Edit a record's metadata or login credentials.")]
    Edit(EditArgs),

    #[command(about = "Delete a record (kept as a tombstone for sync).")]
    Delete(DeleteArgs),

    #[command(about = "Reconcile the local vault with the server once.")]
    Sync,

    #[command(about = "Keep syncing on an interval until interrupted.")]
    Watch,

    #[command(about = "Run the storage server.")]
    Serve(ServeArgs),
}

#[derive(Debug, Args)]
pub struct RegisterArgs {
    #[arg(long, help = "Account login (at most 20 characters).")]
    pub login: String,

    #[arg(long, help = "Display name. Defaults to the login.")]
    pub name: Option<String>,

    #[arg(long, help = "Master-password hint stored server-side, in the clear.")]
    pub hint: Option<String>,
}

#[derive(Debug, Args)]
pub struct LoginArgs {
    #[arg(long)]
    pub login: String,
}

#[derive(Debug, Args)]
pub struct AddArgs {
    #[command(subcommand)]
    pub kind: AddKind,
}

#[derive(Debug, Subcommand)]
pub enum AddKind {
    #[command(about = "A username/password pair. The password is prompted.")]
    Login {
        #[arg(long)]
        name: String,
        #[arg(long)]
        folder: Option<String>,
        #[arg(long)]
        username: String,
        #[arg(long = "url", value_name = "URL", help = "May be given multiple times.")]
        urls: Vec<String>,
        #[arg(long)]
        notes: Option<String>,
    },

    #[command(about = "Free-form secret text, prompted without echo.")]
    Text {
        #[arg(long)]
        name: String,
        #[arg(long)]
        folder: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },

    #[command(about = "A bank card. Number and CVV are prompted.")]
    Card {
        #[arg(long)]
        name: String,
        #[arg(long)]
        folder: Option<String>,
        #[arg(long)]
        holder: String,
        #[arg(long, value_name = "MM/YY")]
        expires: String,
        #[arg(long)]
        notes: Option<String>,
    },

    #[command(about = "A file, stored inside the encrypted payload.")]
    File {
        #[arg(long)]
        name: String,
        #[arg(long)]
        folder: Option<String>,
        #[arg(long, value_name = "PATH")]
        path: PathBuf,
        #[arg(long)]
        notes: Option<String>,
    },
}

#[derive(Debug, Args)]
pub struct GetArgs {
    #[arg(value_name = "ID", help = "Record id as shown by `list`.")]
    pub id: String,
}

#[derive(Debug, Args)]
pub struct EditArgs {
    #[arg(value_name = "ID")]
    pub id: String,

    #[arg(long)]
    pub name: Option<String>,

    #[arg(long)]
    pub folder: Option<String>,
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub clear_folder: bool,

    #[arg(long)]
    pub notes: Option<String>,
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub clear_notes: bool,

    #[arg(long, help = "New username (login records only).")]
    pub username: Option<String>,

    #[arg(
        long,
        action = clap::ArgAction::SetTrue,
        help = "Prompt for a new password (login records only)."
    )]
    pub password: bool,

    #[arg(long = "url", value_name = "URL", help = "Replace the URL list.")]
    pub urls: Vec<String>,
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub clear_urls: bool,
}

#[derive(Debug, Args)]
pub struct DeleteArgs {
    #[arg(value_name = "ID")]
    pub id: String,
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    #[arg(long, value_name = "ADDR", help = "Override the configured bind address.")]
    pub bind: Option<String>,
}
