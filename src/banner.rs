//! Operator-facing banners, independent of `tracing` so they are visible
//! even without `RUST_LOG` configured.

use std::fmt;

const RESET: &str = "\x1b[0m";
const RULE: &str =
    "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

/// Banner severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Ok,
    Error,
}

impl Level {
    const fn color(self) -> &'static str {
        match self {
            Level::Info => "\x1b[34m",  // blue
            Level::Ok => "\x1b[32m",    // green
            Level::Error => "\x1b[31m", // red
        }
    }

    const fn tag(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Ok => "OK",
            Level::Error => "ERROR",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Print a colored, ruled banner to stderr.
pub fn banner(level: Level, message: &str) {
    let color = level.color();
    eprintln!("{color}{RULE}{RESET}");
    eprintln!("{color}  {}: {}{RESET}", level.tag(), message);
    eprintln!("{color}{RULE}{RESET}");
}
