use std::process::ExitCode;

use crate::app::AppContext;
use crate::cli;
use crate::exit_codes;
use crate::server::http;

pub fn run(args: cli::ServeArgs, ctx: &AppContext) -> ExitCode {
    let options = match ctx.config.serve_options(args.bind.as_deref()) {
        Ok(options) => options,
        Err(error) => {
            eprintln!("Error: {error}");
            return exit_codes::exit_code_for_config_error(&error);
        }
    };

    match http::run(&options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("Error: {error}");
            exit_codes::exit_code_for_serve_error(&error)
        }
    }
}
