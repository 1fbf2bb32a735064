use std::io::{Read, Write};

const WARNING: &str = "\x1b[33;1m";
const HINT: &str = "\x1b[90m";

/// One `warning:` line on stderr.
pub fn warn_print(msg: &str) {
    let use_err = crate::color_enabled_stderr();
    eprintln!("{}", crate::paint(use_err, WARNING, &format!("warning: {msg}")));
}

fn prompts_disabled_by_env(no_prompt: Option<&str>, ci: Option<&str>) -> bool {
    matches!(no_prompt, Some("1")) || matches!(ci, Some("1" | "true"))
}

/// Whether a confirmation may block on stdin.
pub fn prompts_enabled() -> bool {
    let no_prompt = std::env::var("DBLAB_NO_PROMPT").ok();
    let ci = std::env::var("CI").ok();
    atty::is(atty::Stream::Stdin)
        && atty::is(atty::Stream::Stderr)
        && !prompts_disabled_by_env(no_prompt.as_deref(), ci.as_deref())
}

fn is_yes(key: u8) -> bool {
    matches!(key, b'y' | b'Y')
}

/// Show `lines` as warnings and ask for a single `y` keypress.
///
/// Non-interactive sessions skip the prompt and get `default`.
pub fn warn_confirm(lines: &[&str], default: bool) -> bool {
    for line in lines {
        warn_print(line);
    }
    if !prompts_enabled() {
        return default;
    }

    let use_err = crate::color_enabled_stderr();
    eprint!("{}", crate::paint(use_err, HINT, "Confirm with 'y', any other key aborts: "));
    let _ = std::io::stderr().flush();

    let key = read_key();
    eprintln!();
    key.is_some_and(is_yes)
}

#[cfg(unix)]
fn read_key() -> Option<u8> {
    use nix::sys::termios::{self, LocalFlags, SetArg, SpecialCharacterIndices};

    let stdin = std::io::stdin();
    let saved = termios::tcgetattr(&stdin).ok();
    if let Some(orig) = &saved {
        let mut raw = orig.clone();
        raw.local_flags.remove(LocalFlags::ICANON | LocalFlags::ECHO);
        raw.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
        raw.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
        let _ = termios::tcsetattr(&stdin, SetArg::TCSANOW, &raw);
    }

    let mut buf = [0u8; 1];
    let got = stdin.lock().read(&mut buf).ok().filter(|n| *n == 1).map(|_| buf[0]);

    if let Some(orig) = &saved {
        let _ = termios::tcsetattr(&stdin, SetArg::TCSANOW, orig);
    }
    got
}

#[cfg(not(unix))]
fn read_key() -> Option<u8> {
    let mut line = String::new();
    std::io::stdin().read_line(&mut line).ok()?;
    line.trim().bytes().next()
}
