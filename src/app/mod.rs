use crate::{cli, commands, config, exit_codes, logging, output};
use clap::error::ErrorKind as ClapErrorKind;
use clap::{CommandFactory, Parser};
use std::process::ExitCode;

pub struct AppContext {
    pub output_mode: output::OutputMode,
    pub config: config::Config,
}

pub fn run() -> ExitCode {
    // clap already handles tty detection and NO_COLOR; the only thing it
    // gets wrong for us is the exit code, which must be 64 for usage errors.
    let cli = match cli::Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(exit_codes::EXIT_USAGE),
            };
        }
    };

    logging::init();

    let output_mode = output::OutputMode {
        json: cli.json,
        quiet: cli.quiet,
    };

    let config = match config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("Error: {error}");
            return exit_codes::exit_code_for_config_error(&error);
        }
    };

    // A bare invocation asked for nothing; show help but exit as usage.
    let Some(command) = cli.command else {
        let _ = cli::Cli::command().print_help();
        println!();
        return ExitCode::from(exit_codes::EXIT_USAGE);
    };

    let ctx = AppContext {
        output_mode,
        config,
    };

    commands::dispatch(command, &ctx)
}
