use serde_json::json;
use std::process::ExitCode;
use std::sync::Arc;

use crate::app::AppContext;
use crate::commands::{client_env, unlocked_session};
use crate::exit_codes;
use crate::output;
use crate::sync::{CancelFlag, SyncEngine, SyncOutcome, SyncWorker};

pub fn run_once(ctx: &AppContext) -> ExitCode {
    let env = match client_env(ctx) {
        Ok(env) => env,
        Err(code) => return code,
    };
    let session = match unlocked_session(&env) {
        Ok(session) => session,
        Err(code) => return code,
    };

    let engine = SyncEngine::new(&env.store, env.remote.as_ref());
    match engine.full_sync(&session, &CancelFlag::default()) {
        Ok(outcome) => {
            output::print_value(&describe(&outcome), outcome_json(&outcome), &ctx.output_mode);
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("Error: {error}");
            exit_codes::exit_code_for_sync_error(&error)
        }
    }
}

/// Run the background worker until ctrl-c.
pub fn watch(ctx: &AppContext) -> ExitCode {
    let env = match client_env(ctx) {
        Ok(env) => env,
        Err(code) => return code,
    };
    let session = match unlocked_session(&env) {
        Ok(session) => session,
        Err(code) => return code,
    };

    let interval = ctx.config.sync_interval();
    output::print_notice(
        &format!("syncing every {}s; ctrl-c to stop", interval.as_secs()),
        &ctx.output_mode,
    );

    let remote: Arc<dyn crate::remote::ServerAdapter> = env.remote.clone();
    let worker = SyncWorker::spawn(Arc::clone(&env.store), remote, Arc::new(session), interval);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("Error: {error}");
            worker.shutdown();
            return ExitCode::from(exit_codes::EXIT_SOFTWARE);
        }
    };
    runtime.block_on(async {
        let _ = tokio::signal::ctrl_c().await;
    });

    worker.shutdown();
    output::print_value("stopped", json!({}), &ctx.output_mode);
    ExitCode::SUCCESS
}

fn describe(outcome: &SyncOutcome) -> String {
    if outcome.cancelled {
        return "sync cancelled".to_string();
    }
    format!(
        "synced: {} up, {} down, {} updates, {} deletes, {} unchanged",
        outcome.uploaded,
        outcome.downloaded,
        outcome.pushed_updates,
        outcome.pushed_deletes,
        outcome.unchanged
    )
}

fn outcome_json(outcome: &SyncOutcome) -> serde_json::Value {
    json!({
        "uploaded": outcome.uploaded,
        "downloaded": outcome.downloaded,
        "pushed_updates": outcome.pushed_updates,
        "pushed_deletes": outcome.pushed_deletes,
        "tombstoned_locally": outcome.tombstoned_locally,
        "purged_locally": outcome.purged_locally,
        "conflicts_downgraded": outcome.conflicts_downgraded,
        "unchanged": outcome.unchanged,
        "cancelled": outcome.cancelled,
    })
}
