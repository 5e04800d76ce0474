use serde_json::json;

pub mod record;

pub struct OutputMode {
    pub json: bool,
    pub quiet: bool,
}

/// Print a single result value, wrapped in a JSON envelope when requested.
pub fn print_value(value: &str, meta: serde_json::Value, mode: &OutputMode) {
    if mode.json {
        let payload = json!({
            "value": value,
            "meta": meta,
        });
        println!("{payload}");
    } else {
        println!("{value}");
    }
}

/// Progress chatter; suppressed by `--quiet` and in JSON mode.
pub fn print_notice(message: &str, mode: &OutputMode) {
    if mode.quiet || mode.json {
        return;
    }
    eprintln!("{message}");
}
