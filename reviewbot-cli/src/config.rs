use anyhow::{Context, Result};
use std::env;

use reviewbot_core::history::DEFAULT_HISTORY_LIMIT;

pub const DEFAULT_REFERENCE_PROJECT: &str = "openSUSE:Factory";
pub const DEFAULT_SECONDARY_REVIEWER: &str = "factory-source";
pub const DEFAULT_SECONDARY_RELEASE_PROJECT: &str = "openSUSE:CPE:SLE-12";

#[derive(Clone)]
pub struct Config {
    /// Base URL of the build service API. Required unless `--apiurl` is given.
    pub apiurl: Option<String>,
    /// User the bot reviews as, also used for authentication.
    pub user: Option<String>,
    pub password: Option<String>,
    pub reference_project: String,
    pub history_limit: usize,
    /// Set to an empty value to never add a secondary reviewer.
    pub secondary_reviewer: Option<String>,
    pub secondary_release_project: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let apiurl = non_empty(env::var("OBS_APIURL").ok());
        let user = non_empty(env::var("OBS_USER").ok());
        let password = env::var("OBS_PASSWORD").ok();

        let reference_project = non_empty(env::var("REVIEWBOT_REFERENCE_PROJECT").ok())
            .unwrap_or_else(|| DEFAULT_REFERENCE_PROJECT.to_string());

        let history_limit = parse_history_limit(env::var("REVIEWBOT_HISTORY_LIMIT").ok())
            .context("REVIEWBOT_HISTORY_LIMIT must be a positive number")?;

        let secondary_reviewer = env_or_default(
            "REVIEWBOT_SECONDARY_REVIEWER",
            DEFAULT_SECONDARY_REVIEWER,
        );
        let secondary_release_project = env_or_default(
            "REVIEWBOT_SECONDARY_RELEASE_PROJECT",
            DEFAULT_SECONDARY_RELEASE_PROJECT,
        );

        Ok(Config {
            apiurl,
            user,
            password,
            reference_project,
            history_limit,
            secondary_reviewer,
            secondary_release_project,
        })
    }
}

/// Unset falls back to `default`; an empty value disables the setting.
fn env_or_default(name: &str, default: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => non_empty(Some(value)),
        Err(_) => Some(default.to_string()),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Parse the history window size, defaulting when unset.
pub fn parse_history_limit(value: Option<String>) -> Result<usize> {
    let Some(value) = non_empty(value) else {
        return Ok(DEFAULT_HISTORY_LIMIT);
    };
    let limit = value
        .trim()
        .parse::<usize>()
        .with_context(|| format!("'{}' is not a number", value))?;
    if limit == 0 {
        anyhow::bail!("history limit must be at least 1");
    }
    Ok(limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_history_limit_default() {
        assert_eq!(parse_history_limit(None).unwrap(), DEFAULT_HISTORY_LIMIT);
        assert_eq!(
            parse_history_limit(Some("  ".to_string())).unwrap(),
            DEFAULT_HISTORY_LIMIT
        );
    }

    #[test]
    fn test_parse_history_limit_valid() {
        assert_eq!(parse_history_limit(Some("10".to_string())).unwrap(), 10);
        assert_eq!(parse_history_limit(Some(" 3 ".to_string())).unwrap(), 3);
    }

    #[test]
    fn test_parse_history_limit_rejects_garbage() {
        assert!(parse_history_limit(Some("five".to_string())).is_err());
        assert!(parse_history_limit(Some("-1".to_string())).is_err());
        assert!(parse_history_limit(Some("0".to_string())).is_err());
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty(None), None);
        assert_eq!(non_empty(Some("".to_string())), None);
        assert_eq!(
            non_empty(Some("factory-auto".to_string())),
            Some("factory-auto".to_string())
        );
    }
}
