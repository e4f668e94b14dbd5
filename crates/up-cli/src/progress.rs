use std::{
    sync::{Arc, LazyLock},
    time::Duration,
};

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use nu_ansi_term::Color::{Green, Red};

use crate::utils::{progress_enabled, Colored};

static MULTI: LazyLock<Arc<MultiProgress>> = LazyLock::new(|| Arc::new(MultiProgress::new()));

/// Pause progress display, run the closure, then resume.
pub fn suspend<F: FnOnce()>(f: F) {
    MULTI.suspend(f);
}

/// Stop and clear all progress bars.
pub fn stop() {
    MULTI.clear().ok();
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

pub fn create_spinner_job(message: &str) -> ProgressBar {
    let pb = if progress_enabled() {
        MULTI.add(ProgressBar::new_spinner())
    } else {
        MULTI.add(ProgressBar::hidden())
    };
    pb.set_style(spinner_style());
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Runs `op` behind a spinner and clears it with a status mark.
pub fn with_spinner<T, E, F>(message: &str, op: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
{
    let pb = create_spinner_job(message);
    let result = op();
    let mark = match result {
        Ok(_) => Colored(Green, "✓").to_string(),
        Err(_) => Colored(Red, "✗").to_string(),
    };
    pb.set_style(
        ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.finish_with_message(format!("{mark} {message}"));
    MULTI.remove(&pb);
    result
}
