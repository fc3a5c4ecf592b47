//! Terminal look of `cli-vault`: clap help colours, status lines, the duel
//! contenders and the rankings/history tables.

use clap::builder::styling::{AnsiColor, Color as AnsiTone, Style};
use clap::builder::Styles;
use crossterm::style::{Color, Stylize};
use std::fmt::Write;
use unicode_width::UnicodeWidthStr;

const fn rgb(r: u8, g: u8, b: u8) -> Color {
    Color::Rgb { r, g, b }
}

const ACCENT: Color = rgb(0, 255, 255);
const HIGHLIGHT: Color = rgb(255, 0, 255);
const SOFT: Color = rgb(180, 100, 255);
const GOOD: Color = rgb(0, 255, 136);
const CAUTION: Color = rgb(255, 165, 0);
const BAD: Color = rgb(255, 85, 85);
const MUTED: Color = rgb(128, 128, 128);
const TEXT: Color = rgb(255, 255, 255);

fn ansi(color: AnsiColor) -> Style {
    Style::new().fg_color(Some(AnsiTone::Ansi(color)))
}

pub fn get_styles() -> Styles {
    Styles::styled()
        .usage(ansi(AnsiColor::Cyan).bold().underline())
        .header(ansi(AnsiColor::Cyan).bold().underline())
        .literal(ansi(AnsiColor::Green).bold())
        .valid(ansi(AnsiColor::Green).bold())
        .invalid(ansi(AnsiColor::Red).bold())
        .error(ansi(AnsiColor::Red).bold())
        .placeholder(ansi(AnsiColor::BrightBlack))
}

fn status(mark: &str, color: Color, message: &str) {
    println!(" {} {}", mark.with(color).bold(), message.with(color));
}

pub fn print_success(message: &str) {
    status("✓", GOOD, message);
}

pub fn print_error(message: &str) {
    status("✗", BAD, message);
}

pub fn print_warning(message: &str) {
    status("⚠", CAUTION, message);
}

pub fn print_key_value(key: &str, value: &str) {
    println!(
        "  {} {} {}",
        "•".with(SOFT),
        format!("{key}:").with(MUTED),
        value.with(TEXT)
    );
}

/// One side of a duel, `label` is what the user types to pick it.
pub fn print_contender(label: &str, title: &str, subtitle: &str) {
    println!(
        "  {} {}  {}",
        format!("[{label}]").with(HIGHLIGHT).bold(),
        title.with(ACCENT).bold(),
        subtitle.with(MUTED)
    );
}

/// Boxed table sized to the widest cell of each column. Cells past the
/// header count are dropped.
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: &[&str]) -> Self {
        Table {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn add_row(&mut self, mut row: Vec<String>) {
        row.truncate(self.headers.len());
        self.rows.push(row);
    }

    fn widths(&self) -> Vec<usize> {
        self.headers
            .iter()
            .enumerate()
            .map(|(i, header)| {
                self.rows
                    .iter()
                    .filter_map(|row| row.get(i))
                    .map(|cell| cell.width())
                    .fold(header.width(), usize::max)
            })
            .collect()
    }

    fn rule(out: &mut String, widths: &[usize], [left, mid, right]: [&str; 3]) {
        let segments: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
        let _ = writeln!(out, "{}", format!("{left}{}{right}", segments.join(mid)).with(ACCENT));
    }

    fn line(out: &mut String, widths: &[usize], cells: &[String], header: bool) {
        let bar = "│".with(ACCENT);
        let _ = write!(out, "{bar}");
        for (i, width) in widths.iter().enumerate() {
            let cell = cells.get(i).map(String::as_str).unwrap_or("");
            let pad = " ".repeat(width.saturating_sub(cell.width()));
            if header {
                let _ = write!(out, " {}{pad} {bar}", cell.with(ACCENT).bold());
            } else {
                let _ = write!(out, " {}{pad} {bar}", cell.with(TEXT));
            }
        }
        out.push('\n');
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        if self.headers.is_empty() {
            return out;
        }
        let widths = self.widths();
        Self::rule(&mut out, &widths, ["╭", "┬", "╮"]);
        Self::line(&mut out, &widths, &self.headers, true);
        Self::rule(&mut out, &widths, ["├", "┼", "┤"]);
        for row in &self.rows {
            Self::line(&mut out, &widths, row, false);
        }
        Self::rule(&mut out, &widths, ["╰", "┴", "╯"]);
        out
    }

    pub fn print(&self) {
        print!("{}", self.render());
    }
}

fn chevrons() -> String {
    format!(
        "{}{}{}",
        "❯".with(ACCENT).bold(),
        "❯".with(SOFT).bold(),
        "❯".with(HIGHLIGHT).bold()
    )
}

pub fn get_prompt() -> String {
    format!("{} ", chevrons())
}

pub fn print_command_echo(command: &str) {
    println!("{}  {}", chevrons(), command.with(GOOD).bold());
}

pub fn print_welcome(db_dir: &str) {
    println!(
        "  {} {}",
        "◆".with(HIGHLIGHT),
        "VAULT RANKER CLI".with(ACCENT).bold()
    );
    print_key_value("Databases", db_dir);
    print_key_value("Version", env!("CARGO_PKG_VERSION"));
    println!(
        "  {}",
        "Type 'help' for available commands, 'duel <user>' to start ranking".with(MUTED)
    );
    println!();
}

pub fn print_goodbye() {
    println!();
    println!("  {}", "Rankings saved, bye!".with(SOFT).bold());
    println!();
}
