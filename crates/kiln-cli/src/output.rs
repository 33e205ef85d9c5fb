//! Terminal rendering of resolved types, instances and registrations.
//!
//! Every command writes through [`StyledOutput`] so color handling lives in
//! one place. `NO_COLOR` always wins over `--color`.

use std::io::Write;

use clap::ValueEnum;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Column where summary attribute values start
const ATTRIBUTE_WIDTH: usize = 13;

/// Value of the global `--color` flag
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Color when stdout is a terminal
    #[default]
    Auto,
    Always,
    Never,
}

impl ColorMode {
    /// Terminal color choice, honoring `NO_COLOR`
    pub fn choice(self) -> ColorChoice {
        self.choice_with(std::env::var_os("NO_COLOR").is_some())
    }

    fn choice_with(self, no_color: bool) -> ColorChoice {
        if no_color {
            return ColorChoice::Never;
        }
        match self {
            ColorMode::Auto => ColorChoice::Auto,
            ColorMode::Always => ColorChoice::Always,
            ColorMode::Never => ColorChoice::Never,
        }
    }
}

/// Command output on stdout
pub struct StyledOutput {
    stdout: StandardStream,
}

impl StyledOutput {
    pub fn new(mode: ColorMode) -> Self {
        Self {
            stdout: StandardStream::stdout(mode.choice()),
        }
    }

    fn write_styled(&mut self, text: &str, color: Option<Color>, bold: bool) {
        let mut spec = ColorSpec::new();
        spec.set_fg(color).set_bold(bold);
        let _ = self.stdout.set_color(&spec);
        let _ = write!(self.stdout, "{}", text);
        let _ = self.stdout.reset();
    }

    pub fn success(&mut self, text: &str) {
        self.write_styled(text, Some(Color::Green), true);
    }

    pub fn warning(&mut self, text: &str) {
        self.write_styled(text, Some(Color::Yellow), true);
    }

    pub fn heading(&mut self, text: &str) {
        self.write_styled(text, None, true);
    }

    pub fn plain(&mut self, text: &str) {
        let _ = write!(self.stdout, "{}", text);
    }

    pub fn newline(&mut self) {
        let _ = writeln!(self.stdout);
    }

    /// One `Label: value` line of a type or config summary
    pub fn attribute(&mut self, label: &str, value: &str) {
        let label = format!("  {}:", label);
        self.write_styled(
            &format!("{:<width$}", label, width = ATTRIBUTE_WIDTH),
            Some(Color::Cyan),
            false,
        );
        self.plain(value);
        self.newline();
    }

    /// Property row: name padded to `width`, then type, cardinality and label
    pub fn property(&mut self, name: &str, width: usize, value_type: &str, cardinality: &str, label: &str) {
        self.write_styled(&format!("    {:<width$}", name, width = width), Some(Color::Cyan), false);
        self.plain(&format!("{}  {}  \"{}\"", value_type, cardinality, label));
        self.newline();
    }

    /// Registration row: instance id padded to `width`, ranking, declared type
    pub fn registration(&mut self, id: &str, width: usize, ranking: f64, type_id: &str) {
        self.plain(&format!("{:<width$}", id, width = width));
        self.write_styled(&format!("{:>8}", ranking), Some(Color::Cyan), false);
        self.plain(&format!("  {}", type_id));
        self.newline();
    }
}
