use serde_json::json;
use std::process::ExitCode;

use crate::app::AppContext;
use crate::cli;
use crate::commands::client_env;
use crate::exit_codes;
use crate::output;
use crate::prompt;
use crate::store::session;

pub fn register(args: cli::RegisterArgs, ctx: &AppContext) -> ExitCode {
    let env = match client_env(ctx) {
        Ok(env) => env,
        Err(code) => return code,
    };

    let master_password = match prompt::new_master_password() {
        Ok(password) => password,
        Err(error) => {
            eprintln!("Error: {error}");
            return exit_codes::exit_code_for_prompt_error(&error);
        }
    };

    let name = args.name.unwrap_or_else(|| args.login.clone());
    let service = env.auth_service();
    match service.register(&args.login, &name, &master_password, args.hint) {
        Ok(session) => {
            output::print_value(
                "registered",
                json!({ "user_id": session.user_id, "login": args.login }),
                &ctx.output_mode,
            );
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("Error: {error}");
            exit_codes::exit_code_for_auth_error(&error)
        }
    }
}

pub fn login(args: cli::LoginArgs, ctx: &AppContext) -> ExitCode {
    let env = match client_env(ctx) {
        Ok(env) => env,
        Err(code) => return code,
    };

    let master_password = match prompt::master_password() {
        Ok(password) => password,
        Err(error) => {
            eprintln!("Error: {error}");
            return exit_codes::exit_code_for_prompt_error(&error);
        }
    };

    let service = env.auth_service();
    match service.login(&args.login, &master_password) {
        Ok(session) => {
            output::print_value(
                "logged in",
                json!({ "user_id": session.user_id, "login": args.login }),
                &ctx.output_mode,
            );
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("Error: {error}");
            exit_codes::exit_code_for_auth_error(&error)
        }
    }
}

pub fn logout(ctx: &AppContext) -> ExitCode {
    let env = match client_env(ctx) {
        Ok(env) => env,
        Err(code) => return code,
    };

    let service = env.auth_service();
    match service.clear_session() {
        Ok(()) => {
            output::print_value("logged out", json!({}), &ctx.output_mode);
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("Error: {error}");
            exit_codes::exit_code_for_auth_error(&error)
        }
    }
}

pub fn status(ctx: &AppContext) -> ExitCode {
    let env = match client_env(ctx) {
        Ok(env) => env,
        Err(code) => return code,
    };

    let persisted = match session::load(&env.session_path) {
        Ok(persisted) => persisted,
        Err(error) => {
            eprintln!("Error: {error}");
            return ExitCode::from(exit_codes::EXIT_IO);
        }
    };

    let Some(persisted) = persisted else {
        output::print_value("no active session", json!({ "session": false }), &ctx.output_mode);
        return ExitCode::SUCCESS;
    };

    let login = env
        .store
        .get_user(persisted.user_id)
        .map(|user| user.login)
        .unwrap_or_else(|_| "<unknown>".to_string());

    let records = match env.store.get_all_states(persisted.user_id) {
        Ok(states) => states,
        Err(error) => {
            eprintln!("Error: {error}");
            return exit_codes::exit_code_for_store_error(&error);
        }
    };
    let live = records.iter().filter(|state| !state.deleted).count();
    let tombstones = records.len() - live;

    output::print_value(
        &format!("logged in as {login} (user {})", persisted.user_id),
        json!({
            "session": true,
            "user_id": persisted.user_id,
            "login": login,
            "records": live,
            "tombstones": tombstones,
        }),
        &ctx.output_mode,
    );
    ExitCode::SUCCESS
}
