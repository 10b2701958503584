/*!
Library root for the school records portal server.

The interesting pieces live in the submodules:

  * `auth`: credential checking and session key issuance
  * `store`: data database interaction
  * `inter`: interoperation with clients (request guards and handlers)
*/
use time::{format_description::FormatItem, macros::format_description};

pub mod auth;
pub mod config;
pub mod inter;
pub mod store;
pub mod user;

/// Wire format for all dates: `2024-06-01`.
pub const DATE_FMT: &[FormatItem] = format_description!("[year]-[month]-[day]");

/// The current date, UTC.
pub fn now() -> time::Date {
    time::OffsetDateTime::now_utc().date()
}

fn log_level_from_env() -> simplelog::LevelFilter {
    use simplelog::LevelFilter;

    let mut level_string = match std::env::var("LOG_LEVEL") {
        Err(_) => { return LevelFilter::Warn; },
        Ok(s) => s,
    };

    level_string.make_ascii_lowercase();
    match level_string.as_str() {
        "max" => LevelFilter::max(),
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Warn,
    }
}

/// Initializes terminal logging.
pub fn init_logging() -> Result<(), String> {
    use simplelog::{ColorChoice, TermLogger, TerminalMode};

    let log_cfg = simplelog::ConfigBuilder::new()
        .add_filter_allow_str("gmps")
        .build();
    TermLogger::init(
        log_level_from_env(),
        log_cfg,
        TerminalMode::Stdout,
        ColorChoice::Auto
    ).map_err(|e| format!("Error initializing logging: {}", &e))
}

#[cfg(test)]
mod tests {
    use super::*;

    pub fn ensure_logging() {
        match init_logging() {
            Ok(_) => { log::info!("Test logging started."); },
            Err(_) => { log::info!("Test logging already started."); },
        }
    }
}
