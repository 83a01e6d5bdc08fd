//! Append-only log of what was sent and what came back.

use chrono::Local;

/// Presentation category of a transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Sent,
    Success,
    Error,
}

impl Category {
    /// Prefix shown before the line body.
    pub fn label(self) -> &'static str {
        match self {
            Category::Sent => "Command: ",
            Category::Success => "TCP Response: ",
            Category::Error => "TCP Error: ",
        }
    }
}

/// One rendered transcript line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// Local wall-clock time, `HH:MM:SS`.
    pub timestamp: String,
    pub category: Category,
    pub text: String,
}

impl Line {
    /// Plain-text form, e.g. `[12:01:02] TCP Response: 1.000`.
    pub fn plain(&self) -> String {
        format!("[{}] {}{}", self.timestamp, self.category.label(), self.text)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Transcript {
    lines: Vec<Line>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a transmitted command. Trailing whitespace, including the
    /// appended newline, is not shown.
    pub fn on_sent(&mut self, payload: &str) {
        self.push(Category::Sent, payload.trim());
    }

    /// Record a response. An empty response is still recorded.
    pub fn on_success(&mut self, response: &str) {
        self.push(Category::Success, response.trim_end_matches(['\r', '\n']));
    }

    pub fn on_failure(&mut self, reason: &str) {
        self.push(Category::Error, reason);
    }

    /// Drop every line.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    /// Screen rows the transcript occupies once multi-line text is split.
    pub fn row_count(&self) -> usize {
        self.lines.iter().map(|line| line.text.split('\n').count()).sum()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    fn push(&mut self, category: Category, text: &str) {
        self.lines.push(Line {
            timestamp: Local::now().format("%H:%M:%S").to_string(),
            category,
            text: text.to_string(),
        });
    }
}
