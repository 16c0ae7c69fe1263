//! Telegram HTML helpers for the status messages.

use std::path::Path;

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Accumulates the lines of the pre-upload status message.
///
/// The message is sent once, right before the first upload, so the chat gets
/// a single summary of how the target was classified.
#[derive(Clone, Debug, Default)]
pub struct StatusMessage {
    lines: Vec<String>,
}

impl StatusMessage {
    pub fn backing_up(target: &Path) -> Self {
        let path = escape_html(&target.display().to_string());
        Self {
            lines: vec![format!("Backing up <b>{path}</b>")],
        }
    }

    /// Append a plain-text line (escaped).
    pub fn line(&mut self, text: &str) -> &mut Self {
        self.lines.push(escape_html(text));
        self
    }

    pub fn html(&self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }
}

pub fn attempt_failed(file_name: &str, attempt: u32, max_attempts: u32) -> String {
    format!(
        "Error sending <b>{}</b>. Attempt {attempt} of {max_attempts} failed",
        escape_html(file_name)
    )
}

pub fn part_caption(index: usize, total: usize) -> String {
    format!("part {index}/{total}")
}
