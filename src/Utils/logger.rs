//! Console logging setup shared by tests and binary consumers of the library.

use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

pub use log::LevelFilter;

/// Initializes a terminal logger at the given level. Safe to call more than once; only
/// the first initialization wins.
pub fn init_console_logging(level: LevelFilter) {
    let _ = TermLogger::init(level, Config::default(), TerminalMode::Mixed, ColorChoice::Auto);
}
