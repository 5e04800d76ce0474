mod auth;
mod data;
mod serve;
mod sync;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use crate::app::AppContext;
use crate::auth::{AuthService, Session};
use crate::keychain::KdfParams;
use crate::remote::http::HttpServerAdapter;
use crate::store::LocalStore;
use crate::{cli, exit_codes, prompt};

pub fn dispatch(command: cli::Commands, ctx: &AppContext) -> ExitCode {
    match command {
        cli::Commands::Register(args) => auth::register(args, ctx),
        cli::Commands::Login(args) => auth::login(args, ctx),
        cli::Commands::Logout => auth::logout(ctx),
        cli::Commands::Status => auth::status(ctx),
        cli::Commands::Add(args) => data::add(args, ctx),
        cli::Commands::Get(args) => data::get(args, ctx),
        cli::Commands::List => data::list(ctx),
        cli::Commands::Edit(args) => data::edit(args, ctx),
        cli::Commands::Delete(args) => data::delete(args, ctx),
        cli::Commands::Sync => sync::run_once(ctx),
        cli::Commands::Watch => sync::watch(ctx),
        cli::Commands::Serve(args) => serve::run(args, ctx),
    }
}

/// Everything a client command needs: storage, transport, and paths.
pub(crate) struct ClientEnv {
    pub store: Arc<LocalStore>,
    pub remote: Arc<HttpServerAdapter>,
    pub session_path: PathBuf,
    pub kdf_params: KdfParams,
    pub kdf_floor: KdfParams,
}

impl ClientEnv {
    pub fn auth_service(&self) -> AuthService<'_> {
        AuthService::new(
            self.remote.as_ref(),
            &self.store,
            &self.session_path,
            self.kdf_params,
            self.kdf_floor,
        )
    }
}

/// Open storage and transport; failures are printed here so commands only
/// deal with the happy path.
pub(crate) fn client_env(ctx: &AppContext) -> Result<ClientEnv, ExitCode> {
    let db_path = ctx.config.db_path().map_err(|error| {
        eprintln!("Error: {error}");
        exit_codes::exit_code_for_config_error(&error)
    })?;
    let session_path = ctx.config.session_path().map_err(|error| {
        eprintln!("Error: {error}");
        exit_codes::exit_code_for_config_error(&error)
    })?;

    let store = LocalStore::open(&db_path).map_err(|error| {
        eprintln!("Error: {error}");
        exit_codes::exit_code_for_store_error(&error)
    })?;

    let remote = HttpServerAdapter::new(&ctx.config.server_url(), ctx.config.timeout()).map_err(
        |error| {
            eprintln!("Error: {error}");
            ExitCode::from(exit_codes::EXIT_IO)
        },
    )?;

    Ok(ClientEnv {
        store: Arc::new(store),
        remote: Arc::new(remote),
        session_path,
        kdf_params: ctx.config.kdf_params(),
        kdf_floor: ctx.config.kdf_floor(),
    })
}

/// Restore the persisted session and rederive the DEK from a prompted
/// master password. Every vault command funnels through here.
pub(crate) fn unlocked_session(env: &ClientEnv) -> Result<Session, ExitCode> {
    let service = env.auth_service();

    let persisted = match service.restore() {
        Ok(Some(persisted)) => persisted,
        Ok(None) => {
            eprintln!("No active session. Run `passkeeper login --login <LOGIN>` first.");
            return Err(ExitCode::from(exit_codes::EXIT_USAGE));
        }
        Err(error) => {
            eprintln!("Error: {error}");
            return Err(exit_codes::exit_code_for_auth_error(&error));
        }
    };

    let master_password = prompt::master_password().map_err(|error| {
        eprintln!("Error: {error}");
        exit_codes::exit_code_for_prompt_error(&error)
    })?;

    service
        .unlock(&persisted, &master_password)
        .map_err(|error| {
            eprintln!("Error: {error}");
            exit_codes::exit_code_for_auth_error(&error)
        })
}
