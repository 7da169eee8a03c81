// UI layer: console prompts and progress output. Kept apart from the
// mirror logic so the latter can run in tests without a terminal.

use anyhow::Result;
use dialoguer::Input;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const BAR_TEMPLATE: &str = "{msg} [{bar:30}] {bytes}/{total_bytes} ({percent}%)";
const SPINNER_TEMPLATE: &str = "{spinner} {msg}";

/// Ask for the course link. Leading/trailing whitespace is dropped.
pub fn prompt_link() -> Result<String> {
    let link: String = Input::new()
        .with_prompt("Enter the Google Classroom link")
        .interact_text()?;
    Ok(link.trim().to_string())
}

/// Status line for the user. Goes to stdout, unlike `tracing` output.
pub fn info(msg: &str) {
    println!("{}", msg);
}

/// Progress bar for one download; a spinner when the size is unknown.
pub fn download_bar(name: &str, len: Option<u64>) -> ProgressBar {
    let bar = match len {
        Some(len) => {
            let bar = ProgressBar::new(len);
            bar.set_style(
                ProgressStyle::with_template(BAR_TEMPLATE)
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=> "),
            );
            bar
        }
        None => spinner_bar(),
    };
    bar.set_message(format!("Downloading {}", name));
    bar
}

/// Spinner shown while a listing call is in flight.
pub fn spinner(msg: &str) -> ProgressBar {
    let bar = spinner_bar();
    bar.set_message(msg.to_string());
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn spinner_bar() -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template(SPINNER_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar
}
