//! Terminal implementations of the output ports.

use tracing::info;

use atelier_core::{ConsoleSink, StatusSink};

/// Prints server console output to stdout.
pub struct StdoutConsole;

impl ConsoleSink for StdoutConsole {
    fn append_line(&self, line: &str) {
        println!("{line}");
    }
}

/// Reports connection status through the log.
pub struct LogStatus;

impl StatusSink for LogStatus {
    fn set_text(&self, text: &str) {
        info!(status = text, "Connection status");
    }

    fn set_tooltip(&self, tooltip: &str) {
        tracing::debug!(tooltip, "Connection status detail");
    }
}
