//! Terminal color decisions for CLI output.
//!
//! `NO_COLOR` always wins, then `--color`, then `DBLAB_COLOR`, then whether the
//! stream is a terminal. Tables and JSON on stdout are never painted by the
//! stderr helpers below.

use clap::ValueEnum;
use once_cell::sync::OnceCell;

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, ValueEnum)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "always" | "on" | "true" | "yes" | "1" => Some(Self::Always),
            "never" | "off" | "false" | "no" | "0" => Some(Self::Never),
            _ => None,
        }
    }

    fn applies_to(self, is_tty: bool) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => is_tty,
        }
    }
}

const RESET: &str = "\x1b[0m";
const INFO: &str = "\x1b[36;1m";
const WARN: &str = "\x1b[33m";
const ERROR: &str = "\x1b[31;1m";

static CLI_MODE: OnceCell<ColorMode> = OnceCell::new();

/// Record the `--color` flag; first call wins.
pub fn set_color_mode(mode: ColorMode) {
    let _ = CLI_MODE.set(mode);
}

fn resolve(no_color: bool, cli: Option<ColorMode>, env: Option<&str>, is_tty: bool) -> bool {
    if no_color {
        return false;
    }
    cli.or_else(|| env.and_then(ColorMode::parse))
        .unwrap_or(ColorMode::Auto)
        .applies_to(is_tty)
}

fn enabled_for(is_tty: bool) -> bool {
    let env = std::env::var("DBLAB_COLOR").ok();
    resolve(
        std::env::var_os("NO_COLOR").is_some(),
        CLI_MODE.get().copied(),
        env.as_deref(),
        is_tty,
    )
}

pub fn color_enabled_stdout() -> bool {
    enabled_for(atty::is(atty::Stream::Stdout))
}

pub fn color_enabled_stderr() -> bool {
    enabled_for(atty::is(atty::Stream::Stderr))
}

/// Wrap `s` in `code` and a reset when `enabled`.
pub fn paint(enabled: bool, code: &str, s: &str) -> String {
    if enabled {
        format!("{code}{s}{RESET}")
    } else {
        s.to_string()
    }
}

pub fn log_info_stderr(use_color: bool, msg: &str) {
    eprintln!("{}", paint(use_color, INFO, msg));
}

pub fn log_warn_stderr(use_color: bool, msg: &str) {
    eprintln!("{}", paint(use_color, WARN, msg));
}

pub fn log_error_stderr(use_color: bool, msg: &str) {
    eprintln!("{}", paint(use_color, ERROR, msg));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing_accepts_aliases() {
        assert_eq!(ColorMode::parse("Always"), Some(ColorMode::Always));
        assert_eq!(ColorMode::parse(" off "), Some(ColorMode::Never));
        assert_eq!(ColorMode::parse("1"), Some(ColorMode::Always));
        assert_eq!(ColorMode::parse("auto"), Some(ColorMode::Auto));
        assert_eq!(ColorMode::parse("rainbow"), None);
    }

    #[test]
    fn test_no_color_beats_everything() {
        assert!(!resolve(true, Some(ColorMode::Always), Some("always"), true));
    }

    #[test]
    fn test_flag_beats_env_and_env_beats_tty() {
        assert!(resolve(false, Some(ColorMode::Always), Some("never"), false));
        assert!(!resolve(false, None, Some("never"), true));
        assert!(resolve(false, None, Some("always"), false));
        // unparseable env falls back to the terminal check
        assert!(resolve(false, None, Some("rainbow"), true));
        assert!(!resolve(false, None, None, false));
    }

    #[test]
    fn test_paint_only_when_enabled() {
        assert_eq!(paint(false, ERROR, "x"), "x");
        assert_eq!(paint(true, ERROR, "x"), "\x1b[31;1mx\x1b[0m");
    }
}
