use crate::{auth, config, prompt, server, store, sync, vault};
use std::process::ExitCode;

pub const EXIT_USAGE: u8 = 64;
pub const EXIT_IO: u8 = 2;
pub const EXIT_SOFTWARE: u8 = 1;

pub fn exit_code_for_config_error(error: &config::ConfigError) -> ExitCode {
    use config::ConfigError::*;

    match error {
        ConfigDirUnavailable | DataDirUnavailable | Io(_) => ExitCode::from(EXIT_IO),
        MissingTokenSecret => ExitCode::from(EXIT_USAGE),
        Parse(_) | Serialize(_) | UnsupportedSchemaVersion(_) => ExitCode::from(EXIT_SOFTWARE),
    }
}

pub fn exit_code_for_auth_error(error: &auth::AuthError) -> ExitCode {
    use auth::AuthError::*;

    match error {
        InvalidCredentials | LoginTaken | InvalidLogin | AccountUnavailable => {
            ExitCode::from(EXIT_USAGE)
        }
        Remote(_) | Session(_) => ExitCode::from(EXIT_IO),
        Crypto(_) | Store(_) => ExitCode::from(EXIT_SOFTWARE),
    }
}

pub fn exit_code_for_vault_error(error: &vault::VaultError) -> ExitCode {
    use vault::VaultError::*;

    match error {
        NotFound | Conflict => ExitCode::from(EXIT_USAGE),
        Remote(_) => ExitCode::from(EXIT_IO),
        Codec(_) | Store(_) => ExitCode::from(EXIT_SOFTWARE),
    }
}

pub fn exit_code_for_sync_error(error: &sync::SyncError) -> ExitCode {
    use sync::SyncError::*;

    match error {
        Remote(_) => ExitCode::from(EXIT_IO),
        Store(_) | Codec(_) => ExitCode::from(EXIT_SOFTWARE),
    }
}

pub fn exit_code_for_store_error(error: &store::StoreError) -> ExitCode {
    use store::StoreError::*;

    match error {
        Backend(_) => ExitCode::from(EXIT_IO),
        NotFound => ExitCode::from(EXIT_USAGE),
        Corrupt(_) => ExitCode::from(EXIT_SOFTWARE),
    }
}

pub fn exit_code_for_prompt_error(error: &prompt::PromptError) -> ExitCode {
    use prompt::PromptError::*;

    match error {
        Io(_) => ExitCode::from(EXIT_IO),
        Empty | Mismatch => ExitCode::from(EXIT_USAGE),
    }
}

pub fn exit_code_for_serve_error(error: &server::http::ServeError) -> ExitCode {
    use server::http::ServeError::*;

    match error {
        Io(_) => ExitCode::from(EXIT_IO),
        Storage(_) => ExitCode::from(EXIT_SOFTWARE),
    }
}
