//! Styling helpers for terminal output.
//!
//! The [`RunStyle`] trait applies ANSI styling via the `colored` crate.
//! Implementations for `&str` and `String` are provided so string literals
//! can be styled directly.

use colored::{ColoredString, Colorize};

/// Convenience trait for applying color and style to run progress output.
pub trait RunStyle {
    fn quest_style(&self) -> ColoredString;
    fn cursor_style(&self) -> ColoredString;
    fn task_style(&self) -> ColoredString;
    fn skipped_style(&self) -> ColoredString;
    fn interrupted_style(&self) -> ColoredString;
    fn done_style(&self) -> ColoredString;
    fn error_style(&self) -> ColoredString;
    fn section_style(&self) -> ColoredString;
}

impl RunStyle for &str {
    fn quest_style(&self) -> ColoredString {
        self.truecolor(223, 77, 10).underline()
    }
    fn cursor_style(&self) -> ColoredString {
        self.truecolor(75, 180, 255)
    }
    fn task_style(&self) -> ColoredString {
        self.truecolor(220, 180, 40)
    }
    fn skipped_style(&self) -> ColoredString {
        self.italic().dimmed()
    }
    fn interrupted_style(&self) -> ColoredString {
        self.italic().truecolor(220, 40, 220)
    }
    fn done_style(&self) -> ColoredString {
        self.bold().truecolor(110, 220, 110)
    }
    fn error_style(&self) -> ColoredString {
        self.bold().truecolor(230, 30, 30)
    }
    fn section_style(&self) -> ColoredString {
        let bracketed = format!("[{self}]");
        bracketed.truecolor(75, 80, 75)
    }
}

impl RunStyle for String {
    fn quest_style(&self) -> ColoredString {
        self.as_str().quest_style()
    }
    fn cursor_style(&self) -> ColoredString {
        self.as_str().cursor_style()
    }
    fn task_style(&self) -> ColoredString {
        self.as_str().task_style()
    }
    fn skipped_style(&self) -> ColoredString {
        self.as_str().skipped_style()
    }
    fn interrupted_style(&self) -> ColoredString {
        self.as_str().interrupted_style()
    }
    fn done_style(&self) -> ColoredString {
        self.as_str().done_style()
    }
    fn error_style(&self) -> ColoredString {
        self.as_str().error_style()
    }
    fn section_style(&self) -> ColoredString {
        self.as_str().section_style()
    }
}
