//! Terminal output for the deepbench CLI
//!
//! Every line is rendered to a `String` first so the plain (no-color) form
//! can be asserted in tests; the printing methods are thin wrappers.

use owo_colors::OwoColorize;

/// Severity of a one-line status message.
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
    fn symbol(self) -> &'static str {
        match self {
            Status::Ok | Status::Created => "✓",
            Status::Info => "•",
            Status::Warn => "⚠",
            Status::Error => "✗",
            Status::Skipped => "○",
        }
    }

    fn tag(self) -> &'static str {
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

/// Output style configuration
pub struct Output {
    /// Whether to use colored output
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

    /// Render one status line without printing it.
    pub fn status_line(&self, status: Status, message: &str) -> String {
        if !self.colored {
            return format!("  {} {}", status.tag(), message);
        }
        let symbol = status.symbol();
        match status {
            Status::Ok | Status::Created => {
                format!("  {} {}", symbol.green().bold(), message.green())
            }
            Status::Info => format!("  {} {}", symbol.blue(), message),
            Status::Warn => format!("  {} {}", symbol.yellow().bold(), message.yellow()),
            Status::Error => format!("  {} {}", symbol.red().bold(), message.red()),
            Status::Skipped => format!("  {} {}", symbol.yellow(), message.dimmed()),
        }
    }

    pub fn banner(&self) {
        let version = format!("v{}", env!("CARGO_PKG_VERSION"));
        if self.colored {
            println!(
                "\n   {} {}\n   {}\n",
                "deepbench".bright_cyan().bold(),
                version.dimmed(),
                "deep research, side by side".dimmed()
            );
        } else {
            println!("\n   deepbench {}\n", version);
        }
    }

    pub fn success(&self, message: &str) {
        println!("{}", self.status_line(Status::Ok, message));
    }

    pub fn info(&self, message: &str) {
        println!("{}", self.status_line(Status::Info, message));
    }

    pub fn warning(&self, message: &str) {
        println!("{}", self.status_line(Status::Warn, message));
    }

    pub fn error(&self, message: &str) {
        eprintln!("{}", self.status_line(Status::Error, message));
    }

    /// A file written by `init`
    pub fn created(&self, kind: &str, path: &str) {
        println!(
            "{}",
            self.status_line(Status::Created, &format!("{} {}", kind, path))
        );
    }

    pub fn skipped(&self, path: &str, reason: &str) {
        println!(
            "{}",
            self.status_line(Status::Skipped, &format!("{} ({})", path, reason))
        );
    }

    pub fn header(&self, title: &str) {
        if self.colored {
            println!("\n  {}", title.bright_white().bold().underline());
        } else {
            println!("\n  === {} ===", title);
        }
    }

    pub fn kv(&self, key: &str, value: &str) {
        if self.colored {
            println!("    {}: {}", key.dimmed(), value.bright_white());
        } else {
            println!("    {}: {}", key, value);
        }
    }

    pub fn hint(&self, message: &str) {
        if self.colored {
            println!("\n  {}", message.dimmed().italic());
        } else {
            println!("\n  [TIP] {}", message);
        }
    }

    pub fn command(&self, cmd: &str) {
        if self.colored {
            println!("     {}", format!("$ {}", cmd).bright_cyan());
        } else {
            println!("     $ {}", cmd);
        }
    }

    /// Print rows under `columns`, each column as wide as its longest cell.
    pub fn table<R: AsRef<[String]>>(&self, columns: &[&str], rows: &[R]) {
        let lines = render_table(columns, rows);
        let Some((header, body)) = lines.split_first() else {
            return;
        };
        let rule = "─".repeat(header.chars().count());
        if self.colored {
            println!("    {}", header.bright_white().bold());
            println!("    {}", rule.dimmed());
        } else {
            println!("    {}", header);
            println!("    {}", "-".repeat(rule.chars().count()));
        }
        for line in body {
            println!("    {}", line);
        }
    }
}

/// Lay out a header plus rows with two spaces between columns. Missing
/// cells render empty; extra cells are dropped.
pub fn render_table<R: AsRef<[String]>>(columns: &[&str], rows: &[R]) -> Vec<String> {
    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row.as_ref()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    std::iter::once(layout_row(&widths, columns))
        .chain(rows.iter().map(|row| {
            let cells: Vec<&str> = row.as_ref().iter().map(String::as_str).collect();
            layout_row(&widths, &cells)
        }))
        .collect()
}

fn layout_row(widths: &[usize], cells: &[&str]) -> String {
    widths
        .iter()
        .enumerate()
        .map(|(i, &width)| format!("{:<width$}", cells.get(i).copied().unwrap_or("")))
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_string()
}
