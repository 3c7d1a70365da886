//! Console output formatting with ANSI color support.
//!
//! Provides styled terminal output with automatic TTY detection
//! and respect for the NO_COLOR environment variable.

use crate::sources::{EpisodeRef, NovelRecord};
use std::io::{self, IsTerminal};

/// ANSI style codes for terminal formatting.
#[derive(Debug, Clone, Copy)]
pub enum Style {
    Bold,
    Dim,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    Gray,
}

impl Style {
    /// Returns the ANSI escape code for this style.
    fn code(self) -> &'static str {
        match self {
            Style::Bold => "1",
            Style::Dim => "2",
            Style::Red => "31",
            Style::Green => "32",
            Style::Yellow => "33",
            Style::Blue => "34",
            Style::Magenta => "35",
            Style::Cyan => "36",
            Style::Gray => "90",
        }
    }
}

const RESET: &str = "\x1b[0m";

/// Console output handler with color support detection.
#[derive(Debug)]
pub struct Console {
    colors_enabled: bool,
    quiet: bool,
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Console {
    /// Creates a new Console instance, detecting color support.
    ///
    /// Colors are disabled if:
    /// - The `NO_COLOR` environment variable is set
    /// - stdout is not a terminal (TTY)
    pub fn new() -> Self {
        let colors_enabled = std::env::var("NO_COLOR").is_err() && io::stdout().is_terminal();

        Self {
            colors_enabled,
            quiet: false,
        }
    }

    /// Creates a Console with colors explicitly enabled or disabled.
    pub fn with_colors(enabled: bool) -> Self {
        Self {
            colors_enabled: enabled,
            quiet: false,
        }
    }

    /// Suppresses status messages so stdout carries only data.
    /// Errors still go to stderr.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Applies ANSI styles to text if colors are enabled.
    pub fn style(&self, text: &str, styles: &[Style]) -> String {
        if !self.colors_enabled || styles.is_empty() {
            return text.to_string();
        }

        let codes: Vec<&str> = styles.iter().map(|s| s.code()).collect();
        format!("\x1b[{}m{}{}", codes.join(";"), text, RESET)
    }

    /// Creates a colored label like `[INFO]`.
    pub fn label(&self, label: &str, color: Style) -> String {
        let styled = self.style(label, &[color, Style::Bold]);
        format!("[{}]", styled)
    }

    /// Prints an info message with blue `[INFO]` label.
    pub fn info(&self, message: &str) {
        if !self.quiet {
            println!("{} {}", self.label("INFO", Style::Blue), message);
        }
    }

    /// Prints a success message with green `[OK]` label.
    pub fn success(&self, message: &str) {
        if !self.quiet {
            println!("{} {}", self.label("OK", Style::Green), message);
        }
    }

    /// Prints a warning message with yellow `[WARN]` label.
    pub fn warning(&self, message: &str) {
        eprintln!("{} {}", self.label("WARN", Style::Yellow), message);
    }

    /// Prints an error message with red `[ERROR]` label.
    pub fn error(&self, message: &str) {
        eprintln!("{} {}", self.label("ERROR", Style::Red), message);
    }

    /// Prints a step message with cyan `[STEP]` label.
    pub fn step(&self, message: &str) {
        if !self.quiet {
            println!("{} {}", self.label("STEP", Style::Cyan), message);
        }
    }

    /// Prints a section header in magenta bold.
    pub fn section(&self, message: &str) {
        if !self.quiet {
            println!();
            println!("{}", self.style(message, &[Style::Magenta, Style::Bold]));
        }
    }

    /// Returns text styled as muted (dim gray).
    pub fn muted(&self, text: &str) -> String {
        self.style(text, &[Style::Gray, Style::Dim])
    }

    /// Formats a count with styling.
    pub fn count(&self, n: usize) -> String {
        self.style(&n.to_string(), &[Style::Green, Style::Bold])
    }

    /// Formats one decomposed episode as a numbered line.
    pub fn episode_line(&self, position: usize, episode: &EpisodeRef) -> String {
        let number = self.style(&format!("{:>4}.", position), &[Style::Cyan]);
        match &episode.title {
            Some(title) => format!("{} {} {}", number, title, self.muted(&episode.url)),
            None => format!("{} {}", number, episode.url),
        }
    }

    /// Prints the metadata header and body of an extracted episode.
    pub fn record(&self, record: &NovelRecord) {
        let field = |name: &str, value: &str| {
            println!("{} {}", self.style(&format!("{:<8}", name), &[Style::Bold]), value);
        };

        field("Series", &record.series_title);
        field("Author", &record.author);
        field("Title", &record.title);
        if !record.index_prefix.is_empty() {
            field("Index", &record.index_prefix);
        }
        if let Some(tags) = &record.tags {
            field("Tags", &tags.join(", "));
        }
        field("URL", &self.muted(&record.url));
        println!();
        println!("{}", record.content);
    }
}
