//! Progress output: one line per pipeline event.

use anvil::{Event, EventBus};

/// Event bus printing human-readable progress, or JSON lines with `json`.
pub(crate) fn event_bus(json: bool) -> EventBus {
    if json {
        EventBus::new()
            .subscribe_all(|event| match serde_json::to_string(event) {
                Ok(line) => println!("{line}"),
                // arch-lint: allow(no-error-swallowing) reason="one unencodable event must not abort the deploy it describes"
                Err(e) => tracing::warn!(error = %e, kind = %event.kind(), "failed to encode event"),
            })
            .on_error(|message| {
                println!(
                    "{}",
                    serde_json::json!({ "event": "error", "message": message })
                );
            })
    } else {
        EventBus::new()
            .subscribe_all(|event| println!("{}", message(event)))
            .on_error(|message| eprintln!("ERROR: {message}"))
    }
}

pub(crate) fn message(event: &Event) -> String {
    match event {
        Event::DiffStart { total_files } => {
            format!("Workspace contains {}", amt(*total_files, "file"))
        }
        Event::UploadsStart { count } => format!("Uploading {}...", amt(*count, "new file")),
        Event::UploadsEnd { .. } => "Upload complete".to_owned(),
        Event::BuildOutputLine { line } => line.clone(),
        Event::ReleaseStart { app_name } => format!("Releasing to {app_name}..."),
        Event::ReleaseEnd { version, web_url } => format!("Push complete, {version} | {web_url}"),
    }
}

/// `n` followed by `noun`, pluralized when `n != 1`.
pub(crate) fn amt(n: usize, noun: &str) -> String {
    if n == 1 {
        format!("{n} {noun}")
    } else {
        format!("{n} {noun}s")
    }
}
