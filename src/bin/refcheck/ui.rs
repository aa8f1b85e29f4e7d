use std::fmt::Display;
use std::io::IsTerminal;
use std::time::{Duration, Instant};

use clap::ValueEnum;
use indicatif::{ProgressBar, ProgressStyle};
use nu_ansi_term::{Color, Style};

/// When text output is coloured.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ColorMode {
    /// Only when stdout is a terminal.
    Auto,
    Always,
    Never,
}

fn finding_style() -> Style {
    Color::LightRed.normal()
}

fn repair_style() -> Style {
    Color::LightGreen.normal()
}

fn heading_style() -> Style {
    Color::Purple.bold()
}

/// Terminal presentation for the text output format.
///
/// Findings and repairs go to stdout even when quiet; summaries and status
/// lines are dropped when quiet, and status lines go to stderr.
pub struct Ui {
    color: bool,
    quiet: bool,
}

impl Ui {
    pub fn new(mode: ColorMode, quiet: bool) -> Self {
        let color = match mode {
            ColorMode::Always => true,
            ColorMode::Never => false,
            ColorMode::Auto => std::io::stdout().is_terminal(),
        };
        Self { color, quiet }
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    fn styled(&self, style: Style, text: impl Display) -> String {
        if self.color {
            style.paint(text.to_string()).to_string()
        } else {
            text.to_string()
        }
    }

    /// A diagnostic or dangling-entry line.
    pub fn finding(&self, line: &str) {
        println!("{}", self.styled(finding_style(), line));
    }

    /// A repair line.
    pub fn repair(&self, line: &str) {
        println!("{}", self.styled(repair_style(), line));
    }

    /// Titled `key: value` block with right-aligned keys. Empty blocks are
    /// not printed.
    pub fn section<'a, I, V>(&self, title: &str, rows: I)
    where
        I: IntoIterator<Item = (&'a str, V)>,
        V: Display,
    {
        if self.quiet {
            return;
        }
        let rows: Vec<(&str, String)> = rows
            .into_iter()
            .map(|(key, value)| (key, value.to_string()))
            .collect();
        let Some(width) = rows.iter().map(|(key, _)| key.len()).max() else {
            return;
        };
        println!();
        println!("{}", self.styled(heading_style(), title));
        for (key, value) in rows {
            let key = self.styled(Color::LightBlue.normal(), format!("{key:>width$}:"));
            println!("  {key} {value}");
        }
    }

    pub fn success(&self, message: &str) {
        self.status(Color::Green, "ok", message);
    }

    pub fn warn(&self, message: &str) {
        self.status(Color::Yellow, "warning", message);
    }

    fn status(&self, color: Color, tag: &str, message: &str) {
        if !self.quiet {
            eprintln!("{}: {message}", self.styled(color.bold(), tag));
        }
    }

    /// Starts a spinner labelled `label`; none is shown when quiet.
    pub fn task(&self, label: impl Into<String>) -> TaskGuard<'_> {
        let spinner = (!self.quiet).then(|| {
            let spinner = ProgressBar::new_spinner().with_message(label.into());
            if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
                spinner.set_style(style);
            }
            spinner.enable_steady_tick(Duration::from_millis(120));
            spinner
        });
        TaskGuard {
            ui: self,
            start: Instant::now(),
            spinner,
        }
    }
}

/// Spinner shown while a scan or sweep runs. Cleared on drop.
pub struct TaskGuard<'a> {
    ui: &'a Ui,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl<'a> TaskGuard<'a> {
    pub fn ui(&self) -> &'a Ui {
        self.ui
    }

    /// Runs `f` with the spinner hidden so printed lines stay intact.
    pub fn suspend<F: FnOnce() -> R, R>(&self, f: F) -> R {
        match &self.spinner {
            Some(spinner) => spinner.suspend(f),
            None => f(),
        }
    }

    /// Clears the spinner and returns how long the task ran.
    pub fn finish(self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for TaskGuard<'_> {
    fn drop(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs >= 1.0 {
        format!("{secs:.2}s")
    } else {
        format!("{:.0}ms", secs * 1_000.0)
    }
}
