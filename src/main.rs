use std::process::ExitCode;

fn main() -> ExitCode {
    passkeeper::app::run()
}
