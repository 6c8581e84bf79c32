use clap::{
    builder::{
        styling::{AnsiColor, Effects, Styles},
        ValueParser,
    },
    Arg, ArgAction, ColorChoice, Command,
};

use crate::keygate::settings::DEFAULT_LOGOUT_URL_PATTERN;

pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            // Successfully parsed as a number
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new("keygate")
        .about("Authentication gateway")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("KEYGATE_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("base-url")
                .long("base-url")
                .help("Public application URL, example: https://erp.example.com/app")
                .env("KEYGATE_BASE_URL"),
        )
        .arg(
            Arg::new("callback-url")
                .long("callback-url")
                .help("Login callback URL (default: <base path>/callback)")
                .env("KEYGATE_CALLBACK_URL"),
        )
        .arg(
            Arg::new("logout-url")
                .long("logout-url")
                .help("Where to go after logout (default: <base path>)")
                .env("KEYGATE_LOGOUT_URL"),
        )
        .arg(
            Arg::new("logout-url-pattern")
                .long("logout-url-pattern")
                .help("Regex a requested post-logout url must fully match")
                .default_value(DEFAULT_LOGOUT_URL_PATTERN)
                .env("KEYGATE_LOGOUT_URL_PATTERN"),
        )
        .arg(
            Arg::new("logout-local")
                .long("logout-local")
                .help("Destroy the local session on logout")
                .default_value("true")
                .env("KEYGATE_LOGOUT_LOCAL")
                .value_parser(clap::value_parser!(bool)),
        )
        .arg(
            Arg::new("logout-central")
                .long("logout-central")
                .help("Also log out from the central provider")
                .default_value("false")
                .env("KEYGATE_LOGOUT_CENTRAL")
                .value_parser(clap::value_parser!(bool)),
        )
        .arg(
            Arg::new("session-ttl")
                .long("session-ttl")
                .help("Session lifetime in seconds")
                .default_value("43200")
                .env("KEYGATE_SESSION_TTL")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("public-health")
                .long("public-health")
                .help("Serve /health without authentication")
                .default_value("true")
                .env("KEYGATE_PUBLIC_HEALTH")
                .value_parser(clap::value_parser!(bool)),
        )
        .arg(
            Arg::new("bearer-token")
                .long("bearer-token")
                .help("Accepted bearer token as <subject>:<token>, may be repeated")
                .env("KEYGATE_BEARER_TOKENS")
                .value_delimiter(',')
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("KEYGATE_LOG_LEVEL")
                .global(true)
                .action(ArgAction::Count)
                .value_parser(validator_log_level()),
        )
}
