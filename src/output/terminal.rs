//! ANSI color helpers for the console report
//!
//! Everything here emits escape codes unconditionally. The output buffer strips
//! them when the destination is not a color-capable terminal.

use once_cell::sync::Lazy;
use regex::Regex;

pub mod colors {
    pub const GREY: u8 = 102;      // #7D7D7D - secondary text, separators
    pub const AQUA: u8 = 109;      // #7A9EB5 - numbers, step headers
    pub const ORANGE: u8 = 208;    // #F2913D - warnings, PUT/PATCH
    pub const RED: u8 = 167;       // #E34F45 - failures, DELETE
    pub const PINK: u8 = 176;      // #DE85DE - keys
    pub const GREEN: u8 = 71;      // #63C27A - success, GET
    pub const YELLOW: u8 = 185;    // #CCCC3D - test ids, URLs, POST
}

pub const RESET: &str = "\x1b[0m";

static ANSI_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1b\[[0-9;]*m").unwrap()
});

/// Generate foreground color escape code
#[inline]
pub fn fg(color: u8) -> String {
    format!("\x1b[38;5;{}m", color)
}

/// Generate bold foreground color escape code
#[inline]
pub fn bold_fg(color: u8) -> String {
    format!("\x1b[1;38;5;{}m", color)
}

#[inline]
pub fn colorize(text: &str, color: u8) -> String {
    format!("{}{}{}", fg(color), text, RESET)
}

#[inline]
pub fn bold(text: &str, color: u8) -> String {
    format!("{}{}{}", bold_fg(color), text, RESET)
}

#[inline]
pub fn success(text: &str) -> String {
    bold(text, colors::GREEN)
}

#[inline]
pub fn error(text: &str) -> String {
    bold(text, colors::RED)
}

#[inline]
pub fn warning(text: &str) -> String {
    bold(text, colors::ORANGE)
}

#[inline]
pub fn info(text: &str) -> String {
    colorize(text, colors::AQUA)
}

#[inline]
pub fn key(text: &str) -> String {
    colorize(text, colors::PINK)
}

#[inline]
pub fn muted(text: &str) -> String {
    colorize(text, colors::GREY)
}

/// Green `true` / red `false`
pub fn verdict(passed: bool) -> String {
    if passed {
        success("true")
    } else {
        error("false")
    }
}

/// Remove every SGR escape sequence from `text`
pub fn strip_ansi(text: &str) -> String {
    ANSI_RE.replace_all(text, "").into_owned()
}

/// HTTP-specific colors
pub mod http {
    use super::*;

    /// Status code colored by class
    pub fn status(code: u16) -> String {
        let color = match code / 100 {
            1 => colors::AQUA,
            2 => colors::GREEN,
            3 => colors::YELLOW,
            4 => colors::ORANGE,
            5 => colors::RED,
            _ => colors::GREY,
        };
        bold(&code.to_string(), color)
    }

    /// Method name colored by verb
    pub fn method(method: &str) -> String {
        let upper = method.to_uppercase();
        let color = match upper.as_str() {
            "GET" | "HEAD" | "OPTIONS" => colors::GREEN,
            "POST" => colors::YELLOW,
            "PUT" | "PATCH" => colors::ORANGE,
            "DELETE" => colors::RED,
            _ => colors::GREY,
        };
        bold(&upper, color)
    }
}
