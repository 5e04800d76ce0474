use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use serde_json::json;
use std::process::ExitCode;

use crate::app::AppContext;
use crate::cli;
use crate::commands::{client_env, unlocked_session};
use crate::exit_codes;
use crate::output::{self, record as record_output};
use crate::payload::{DecipheredPayload, ItemData, Metadata};
use crate::prompt;
use crate::vault::VaultService;

pub fn add(args: cli::AddArgs, ctx: &AppContext) -> ExitCode {
    let env = match client_env(ctx) {
        Ok(env) => env,
        Err(code) => return code,
    };
    let session = match unlocked_session(&env) {
        Ok(session) => session,
        Err(code) => return code,
    };

    let plain = match build_payload(args.kind) {
        Ok(plain) => plain,
        Err(code) => return code,
    };

    let vault = VaultService::new(&env.store, env.remote.as_ref());
    match vault.create(&session, &plain) {
        Ok(outcome) => {
            if !outcome.uploaded {
                output::print_notice(
                    "server unreachable; record saved locally and queued for sync",
                    &ctx.output_mode,
                );
            }
            output::print_value(
                &outcome.client_side_id,
                json!({ "uploaded": outcome.uploaded }),
                &ctx.output_mode,
            );
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("Error: {error}");
            exit_codes::exit_code_for_vault_error(&error)
        }
    }
}

pub fn get(args: cli::GetArgs, ctx: &AppContext) -> ExitCode {
    let env = match client_env(ctx) {
        Ok(env) => env,
        Err(code) => return code,
    };
    let session = match unlocked_session(&env) {
        Ok(session) => session,
        Err(code) => return code,
    };

    let vault = VaultService::new(&env.store, env.remote.as_ref());
    match vault.read(&session, &args.id) {
        Ok(plain) => {
            record_output::print_item(&args.id, &plain, &ctx.output_mode);
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("Error: {error}");
            exit_codes::exit_code_for_vault_error(&error)
        }
    }
}

pub fn list(ctx: &AppContext) -> ExitCode {
    let env = match client_env(ctx) {
        Ok(env) => env,
        Err(code) => return code,
    };
    let session = match unlocked_session(&env) {
        Ok(session) => session,
        Err(code) => return code,
    };

    let vault = VaultService::new(&env.store, env.remote.as_ref());
    match vault.list(&session) {
        Ok(summaries) => {
            record_output::print_summaries(&summaries, &ctx.output_mode);
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("Error: {error}");
            exit_codes::exit_code_for_vault_error(&error)
        }
    }
}

pub fn edit(args: cli::EditArgs, ctx: &AppContext) -> ExitCode {
    let env = match client_env(ctx) {
        Ok(env) => env,
        Err(code) => return code,
    };
    let session = match unlocked_session(&env) {
        Ok(session) => session,
        Err(code) => return code,
    };

    let vault = VaultService::new(&env.store, env.remote.as_ref());
    let mut plain = match vault.read(&session, &args.id) {
        Ok(plain) => plain,
        Err(error) => {
            eprintln!("Error: {error}");
            return exit_codes::exit_code_for_vault_error(&error);
        }
    };

    if let Some(name) = args.name {
        plain.metadata.name = name;
    }
    if args.clear_folder {
        plain.metadata.folder = None;
    } else if let Some(folder) = args.folder {
        plain.metadata.folder = Some(folder);
    }
    if args.clear_notes {
        plain.notes = None;
    } else if let Some(notes) = args.notes {
        plain.notes = Some(notes);
    }

    let touches_login = args.username.is_some() || args.password || !args.urls.is_empty() || args.clear_urls;
    if touches_login {
        let ItemData::LoginPassword {
            username,
            password,
            urls,
        } = &mut plain.data
        else {
            eprintln!("Error: --username/--password/--url only apply to login records");
            return ExitCode::from(exit_codes::EXIT_USAGE);
        };

        if let Some(new_username) = args.username {
            *username = new_username;
        }
        if args.password {
            match prompt::secret_field("New password") {
                Ok(new_password) => *password = new_password,
                Err(error) => {
                    eprintln!("Error: {error}");
                    return exit_codes::exit_code_for_prompt_error(&error);
                }
            }
        }
        if args.clear_urls {
            urls.clear();
        } else if !args.urls.is_empty() {
            *urls = args.urls;
        }
    }

    match vault.update(&session, &args.id, &plain) {
        Ok(()) => {
            output::print_value("updated", json!({ "id": args.id }), &ctx.output_mode);
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("Error: {error}");
            exit_codes::exit_code_for_vault_error(&error)
        }
    }
}

pub fn delete(args: cli::DeleteArgs, ctx: &AppContext) -> ExitCode {
    let env = match client_env(ctx) {
        Ok(env) => env,
        Err(code) => return code,
    };
    let session = match unlocked_session(&env) {
        Ok(session) => session,
        Err(code) => return code,
    };

    let vault = VaultService::new(&env.store, env.remote.as_ref());
    match vault.delete(&session, &args.id) {
        Ok(()) => {
            output::print_value("deleted", json!({ "id": args.id }), &ctx.output_mode);
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("Error: {error}");
            exit_codes::exit_code_for_vault_error(&error)
        }
    }
}

fn build_payload(kind: cli::AddKind) -> Result<DecipheredPayload, ExitCode> {
    match kind {
        cli::AddKind::Login {
            name,
            folder,
            username,
            urls,
            notes,
        } => {
            let password = prompt_secret("Password")?;
            Ok(DecipheredPayload {
                metadata: Metadata { name, folder },
                data: ItemData::LoginPassword {
                    username,
                    password,
                    urls,
                },
                notes,
                additional_fields: None,
            })
        }
        cli::AddKind::Text {
            name,
            folder,
            notes,
        } => {
            let text = prompt_secret("Text")?;
            Ok(DecipheredPayload {
                metadata: Metadata { name, folder },
                data: ItemData::Text { text },
                notes,
                additional_fields: None,
            })
        }
        cli::AddKind::Card {
            name,
            folder,
            holder,
            expires,
            notes,
        } => {
            let number = prompt_secret("Card number")?;
            let cvv = match prompt::optional_secret_field("CVV") {
                Ok(cvv) => cvv,
                Err(error) => {
                    eprintln!("Error: {error}");
                    return Err(exit_codes::exit_code_for_prompt_error(&error));
                }
            };
            Ok(DecipheredPayload {
                metadata: Metadata { name, folder },
                data: ItemData::BankCard {
                    number,
                    holder,
                    expires,
                    cvv,
                },
                notes,
                additional_fields: None,
            })
        }
        cli::AddKind::File {
            name,
            folder,
            path,
            notes,
        } => {
            let bytes = std::fs::read(&path).map_err(|error| {
                eprintln!("Error: failed to read {}: {error}", path.display());
                ExitCode::from(exit_codes::EXIT_IO)
            })?;
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "attachment".to_string());
            Ok(DecipheredPayload {
                metadata: Metadata { name, folder },
                data: ItemData::Binary {
                    filename,
                    bytes: B64.encode(bytes),
                },
                notes,
                additional_fields: None,
            })
        }
    }
}

fn prompt_secret(label: &str) -> Result<String, ExitCode> {
    prompt::secret_field(label).map_err(|error| {
        eprintln!("Error: {error}");
        exit_codes::exit_code_for_prompt_error(&error)
    })
}
