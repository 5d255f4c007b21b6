//! Terminal output for the CLI: colored symbols, aligned check lines, JSON mode.
//!
//! Everything human-readable goes to stderr so `--json` output on stdout stays
//! pipeable.

use std::io::IsTerminal;

const QUIET_ENV: &str = "SPOT_HARVEST_QUIET";
const VERBOSE_ENV: &str = "SPOT_HARVEST_VERBOSE";
const JSON_ENV: &str = "SPOT_HARVEST_JSON";

/// Color is on for a terminal stderr unless `NO_COLOR` or `SPOT_HARVEST_NO_COLOR` is set.
pub fn color_enabled() -> bool {
    let disabled = ["NO_COLOR", "SPOT_HARVEST_NO_COLOR"]
        .iter()
        .any(|var| std::env::var_os(var).is_some());
    !disabled && std::io::stderr().is_terminal()
}

#[derive(Debug, Clone, Copy)]
enum Tone {
    Green,
    Red,
    Yellow,
    Blue,
    Cyan,
    Dim,
    Bold,
}

impl Tone {
    fn code(self) -> &'static str {
        match self {
            Tone::Green => "32",
            Tone::Red => "31",
            Tone::Yellow => "33",
            Tone::Blue => "34",
            Tone::Cyan => "36",
            Tone::Dim => "2",
            Tone::Bold => "1",
        }
    }
}

/// Styling switch carried by every printing helper.
pub struct Styled {
    use_color: bool,
}

impl Default for Styled {
    fn default() -> Self {
        Self::new()
    }
}

impl Styled {
    pub fn new() -> Self {
        Self {
            use_color: color_enabled(),
        }
    }

    fn paint(&self, tone: Tone, s: &str) -> String {
        if self.use_color {
            format!("\x1b[{}m{s}\x1b[0m", tone.code())
        } else {
            s.to_string()
        }
    }

    fn symbol(&self, tone: Tone, glyph: &'static str, plain: &'static str) -> String {
        if self.use_color {
            self.paint(tone, glyph)
        } else {
            plain.to_string()
        }
    }

    pub fn ok_sym(&self) -> String {
        self.symbol(Tone::Green, "\u{2713}", "OK")
    }

    pub fn fail_sym(&self) -> String {
        self.symbol(Tone::Red, "\u{2717}", "!!")
    }

    pub fn warn_sym(&self) -> String {
        self.symbol(Tone::Yellow, "\u{26a0}", "??")
    }

    /// Neutral marker for informational lines.
    pub fn info_sym(&self) -> String {
        self.symbol(Tone::Blue, "\u{25cb}", "--")
    }

    pub fn green(&self, s: &str) -> String {
        self.paint(Tone::Green, s)
    }

    pub fn red(&self, s: &str) -> String {
        self.paint(Tone::Red, s)
    }

    pub fn yellow(&self, s: &str) -> String {
        self.paint(Tone::Yellow, s)
    }

    pub fn cyan(&self, s: &str) -> String {
        self.paint(Tone::Cyan, s)
    }

    pub fn dim(&self, s: &str) -> String {
        self.paint(Tone::Dim, s)
    }

    pub fn bold(&self, s: &str) -> String {
        self.paint(Tone::Bold, s)
    }
}

pub fn print_header(s: &Styled) {
    eprintln!(
        "  {} {}",
        s.bold("spot-harvest"),
        s.dim(&format!("v{}", env!("CARGO_PKG_VERSION")))
    );
    eprintln!();
}

pub fn print_section(s: &Styled, title: &str) {
    eprintln!("  {}", s.bold(title));
}

/// `symbol label value`, labels padded so values line up.
pub fn print_check(symbol: &str, label: &str, value: &str) {
    eprintln!("    {symbol} {label:<16} {value}");
}

/// Indented under the value column of `print_check`.
pub fn print_detail(msg: &str) {
    eprintln!("{:24}{msg}", "");
}

pub fn print_status(s: &Styled, status: &str, msg: &str) {
    eprintln!();
    eprintln!("  {}: {status} ({msg})", s.bold("Status"));
}

/// `42s`, `2m 5s`, `3h 14m`.
pub fn format_duration(secs: u64) -> String {
    match secs {
        0..=59 => format!("{secs}s"),
        60..=3599 => format!("{}m {}s", secs / 60, secs % 60),
        _ => format!("{}h {}m", secs / 3600, (secs % 3600) / 60),
    }
}

fn flag(var: &str) -> bool {
    std::env::var_os(var).is_some()
}

pub fn is_quiet() -> bool {
    flag(QUIET_ENV)
}

pub fn is_verbose() -> bool {
    flag(VERBOSE_ENV)
}

pub fn is_json() -> bool {
    flag(JSON_ENV)
}

/// Pretty JSON on stdout.
pub fn print_json<T: serde::Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => tracing::warn!(error = %e, "could not serialise output"),
    }
}
