//! Terminal output for the FoodAtlas CLI
//!
//! Every line is rendered to a `String` first, so the plain (`--no-color`)
//! rendering can be asserted in tests.

use owo_colors::OwoColorize;

/// Kind of a status line. Picks the marker and color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Info,
    Warn,
    Error,
    Created,
    Skipped,
}

impl Status {
    fn plain_tag(self) -> &'static str {
        match self {
            Status::Ok => "[OK]",
            Status::Info => "[INFO]",
            Status::Warn => "[WARN]",
            Status::Error => "[ERROR]",
            Status::Created => "[CREATED]",
            Status::Skipped => "[SKIPPED]",
        }
    }
}

/// CLI printer, colored unless `--no-color` was given.
pub struct Output {
    pub colored: bool,
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

impl Output {
    pub fn new() -> Self {
        Self { colored: true }
    }

    pub fn no_color() -> Self {
        Self { colored: false }
    }

    /// Render one status line.
    pub fn render(&self, status: Status, message: &str) -> String {
        if !self.colored {
            return format!("  {} {}", status.plain_tag(), message);
        }
        match status {
            Status::Ok | Status::Created => {
                format!("  {} {}", "✓".green().bold(), message.green())
            }
            Status::Info => format!("  {} {}", "•".blue(), message),
            Status::Warn => format!("  {} {}", "!".yellow().bold(), message.yellow()),
            Status::Error => format!("  {} {}", "✗".red().bold(), message.red()),
            Status::Skipped => format!("  {} {}", "○".yellow(), message.dimmed()),
        }
    }

    /// Render a `key: value` line, with the key padded to `width`.
    pub fn render_kv(&self, key: &str, value: &str, width: usize) -> String {
        let key = format!("{:<width$}", format!("{}:", key), width = width + 1);
        if self.colored {
            format!("    {} {}", key.dimmed(), value.bright_white())
        } else {
            format!("    {} {}", key, value)
        }
    }

    pub fn banner(&self) {
        let version = format!("v{}", env!("CARGO_PKG_VERSION"));
        if self.colored {
            println!(
                "\n   {} {}\n   {}\n",
                "FoodAtlas".bright_green().bold(),
                version.dimmed(),
                "restaurant analytics and data chat".dimmed()
            );
        } else {
            println!("\n   FoodAtlas {}\n   restaurant analytics and data chat\n", version);
        }
    }

    pub fn success(&self, message: &str) {
        println!("{}", self.render(Status::Ok, message));
    }

    pub fn info(&self, message: &str) {
        println!("{}", self.render(Status::Info, message));
    }

    pub fn warning(&self, message: &str) {
        println!("{}", self.render(Status::Warn, message));
    }

    /// Errors go to stderr.
    pub fn error(&self, message: &str) {
        eprintln!("{}", self.render(Status::Error, message));
    }

    pub fn created(&self, file_type: &str, path: &str) {
        println!(
            "{}",
            self.render(Status::Created, &format!("{} {}", file_type, path))
        );
    }

    pub fn created_dir(&self, path: &str) {
        self.created("directory", path);
    }

    pub fn skipped(&self, path: &str, reason: &str) {
        println!(
            "{}",
            self.render(Status::Skipped, &format!("{} ({})", path, reason))
        );
    }

    pub fn header(&self, title: &str) {
        if self.colored {
            println!("\n  {}", title.bright_white().bold().underline());
        } else {
            println!("\n  === {} ===", title);
        }
    }

    pub fn subheader(&self, title: &str) {
        if self.colored {
            println!("\n  {}", title.cyan().bold());
        } else {
            println!("\n  --- {} ---", title);
        }
    }

    pub fn kv(&self, key: &str, value: &str) {
        println!("{}", self.render_kv(key, value, 22));
    }

    pub fn hint(&self, message: &str) {
        if self.colored {
            println!("\n  {}", format!("hint: {}", message).dimmed().italic());
        } else {
            println!("\n  [HINT] {}", message);
        }
    }

    pub fn command(&self, cmd: &str) {
        if self.colored {
            println!("     {}", format!("$ {}", cmd).bright_cyan());
        } else {
            println!("     $ {}", cmd);
        }
    }

    pub fn complete(&self, message: &str) {
        if self.colored {
            println!("\n  {}", message.bright_green().bold());
        } else {
            println!("\n  [DONE] {}", message);
        }
    }

    pub fn newline(&self) {
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_rendering() {
        let output = Output::no_color();
        assert_eq!(output.render(Status::Ok, "loaded"), "  [OK] loaded");
        assert_eq!(
            output.render(Status::Skipped, "data (already exists)"),
            "  [SKIPPED] data (already exists)"
        );
        assert_eq!(output.render_kv("port", "3000", 6), "    port:   3000");
    }

    #[test]
    fn test_colored_rendering_keeps_message() {
        let output = Output::new();
        let line = output.render(Status::Error, "bad config");
        assert!(line.contains("bad config"));
        assert!(line.contains('\u{1b}'));
    }
}
