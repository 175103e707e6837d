//! Minimal ANSI color helpers for the playground's section headers and result coloring
//!
//! Deliberately not a crate dependency: this playground only ever needs a handful of named
//! escapes, gated behind a single `NO_COLOR`/non-tty check, so hand-rolling it keeps the bin's
//! dependency footprint matched to what it actually does (the library itself never touches ANSI
//! escapes — that's presentation, out of its scope per `cli.rs`'s `HelpRenderer` seam).

pub const RESET: &str = "\x1b[0m";
pub const ITALIC: &str = "\x1b[3m";
pub const MAGENTA_B: &str = "\x1b[1;35m";
pub const BLUE: &str = "\x1b[34m";
pub const GREEN: &str = "\x1b[32m";
pub const RED: &str = "\x1b[31m";
pub const YELLOW: &str = "\x1b[33m";

/// Whether colored output should be attempted: respects `NO_COLOR` and requires a real terminal on
/// stdout.
pub fn color_supported() -> bool {
    use std::io::IsTerminal;
    std::env::var_os("NO_COLOR").is_none() && std::io::stdout().is_terminal()
}
