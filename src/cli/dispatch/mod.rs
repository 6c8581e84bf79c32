use crate::{
    cli::actions::{server::Args, Action},
    keygate::session::DEFAULT_SESSION_TTL_SECONDS,
};
use anyhow::{anyhow, Result};
use secrecy::SecretString;

/// # Errors
/// Returns an error if a bearer token is not in `<subject>:<token>` form.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);

    let bearer_tokens = matches
        .get_many::<String>("bearer-token")
        .map(|values| {
            values
                .map(|value| parse_bearer_token(value))
                .collect::<Result<Vec<_>>>()
        })
        .unwrap_or_else(|| Ok(Vec::new()))?;

    Ok(Action::Server(Args {
        port,
        base_url: matches.get_one::<String>("base-url").cloned(),
        callback_url: matches.get_one::<String>("callback-url").cloned(),
        logout_url: matches.get_one::<String>("logout-url").cloned(),
        logout_url_pattern: matches.get_one::<String>("logout-url-pattern").cloned(),
        logout_local: matches.get_one::<bool>("logout-local").copied().unwrap_or(true),
        logout_central: matches
            .get_one::<bool>("logout-central")
            .copied()
            .unwrap_or(false),
        session_ttl: matches
            .get_one::<u64>("session-ttl")
            .copied()
            .unwrap_or(DEFAULT_SESSION_TTL_SECONDS),
        public_health: matches.get_one::<bool>("public-health").copied().unwrap_or(true),
        bearer_tokens,
    }))
}

fn parse_bearer_token(value: &str) -> Result<(String, SecretString)> {
    let (subject, token) = value
        .split_once(':')
        .map(|(subject, token)| (subject.trim(), token.trim()))
        .filter(|(subject, token)| !subject.is_empty() && !token.is_empty())
        .ok_or_else(|| anyhow!("invalid bearer token, expected <subject>:<token>"))?;
    Ok((subject.to_string(), SecretString::from(token.to_string())))
}
