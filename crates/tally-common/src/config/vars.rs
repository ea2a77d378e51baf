//! Environment variable interpolation for config files.
//!
//! Supported forms:
//! - `$VAR` or `${VAR}` - required, error if unset
//! - `${VAR:-default}` - default when unset or empty
//! - `${VAR-default}` - default only when unset
//! - `$$` - literal `$`
//!
//! Endpoint credentials are usually supplied this way, e.g.
//! `auth_token: "${TALLY_TOKEN:-}"`.

use regex::{Captures, Regex};
use std::env;
use std::sync::LazyLock;

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        (?P<escape>\$\$)
        |
        \$\{ (?P<braced>[A-Za-z_][A-Za-z0-9_]*) (?: (?P<op>:?-) (?P<default>[^}]*) )? \}
        |
        \$(?P<bare>[A-Za-z_][A-Za-z0-9_]*)
        ",
    )
    .expect("Invalid regex pattern")
});

/// Result of environment variable interpolation.
#[derive(Debug)]
pub struct InterpolationResult {
    /// The interpolated text.
    pub text: String,
    /// Every problem found, so all missing variables are reported at once.
    pub errors: Vec<String>,
}

impl InterpolationResult {
    /// Returns true if there were no errors.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Interpolate environment variables in the given text.
pub fn interpolate(input: &str) -> InterpolationResult {
    interpolate_with(input, |name| env::var(name).ok())
}

fn interpolate_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> InterpolationResult {
    let mut errors = Vec::new();

    let text = ENV_VAR_PATTERN
        .replace_all(input, |caps: &Captures| {
            let whole = &caps[0];
            if caps.name("escape").is_some() {
                return "$".to_string();
            }

            let Some(name) = caps.name("braced").or_else(|| caps.name("bare")) else {
                return whole.to_string();
            };
            let name = name.as_str();
            let op = caps.name("op").map(|m| m.as_str());
            let default = caps.name("default").map(|m| m.as_str());

            match (lookup(name), default) {
                (Some(value), _) if value.contains(['\n', '\r']) => {
                    errors.push(format!(
                        "environment variable '{name}' contains newlines, which is not allowed"
                    ));
                    whole.to_string()
                }
                (Some(value), Some(default)) if value.is_empty() && op == Some(":-") => {
                    default.to_string()
                }
                (Some(value), _) => value,
                (None, Some(default)) => default.to_string(),
                (None, None) => {
                    errors.push(format!("environment variable '{name}' is not set"));
                    whole.to_string()
                }
            }
        })
        .into_owned();

    InterpolationResult { text, errors }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn run(input: &str, vars: &[(&str, &str)]) -> InterpolationResult {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        interpolate_with(input, |name| vars.get(name).cloned())
    }

    #[test]
    fn test_bare_and_braced() {
        let result = run(
            "url: $TALLY_HOST/${TALLY_PATH}",
            &[("TALLY_HOST", "https://api"), ("TALLY_PATH", "results")],
        );
        assert!(result.is_ok());
        assert_eq!(result.text, "url: https://api/results");
    }

    #[test]
    fn test_missing_variable_reported() {
        let result = run("token: $TALLY_TOKEN and ${TALLY_OTHER}", &[]);
        assert_eq!(result.errors.len(), 2);
        assert!(result.errors[0].contains("TALLY_TOKEN"));
        assert!(result.errors[1].contains("TALLY_OTHER"));
    }

    #[test]
    fn test_colon_default_applies_to_empty() {
        let result = run("token: \"${TALLY_TOKEN:-anon}\"", &[("TALLY_TOKEN", "")]);
        assert_eq!(result.text, "token: \"anon\"");
    }

    #[test]
    fn test_dash_default_keeps_empty() {
        let result = run("token: \"${TALLY_TOKEN-anon}\"", &[("TALLY_TOKEN", "")]);
        assert_eq!(result.text, "token: \"\"");
    }

    #[test]
    fn test_empty_default_when_unset() {
        let result = run("token: \"${TALLY_TOKEN:-}\"", &[]);
        assert!(result.is_ok());
        assert_eq!(result.text, "token: \"\"");
    }

    #[test]
    fn test_newline_rejected() {
        let result = run("token: $TALLY_TOKEN", &[("TALLY_TOKEN", "a\nb")]);
        assert!(!result.is_ok());
        assert!(result.errors[0].contains("newlines"));
    }

    #[test]
    fn test_escape_sequence() {
        let result = run("note: $$5 per seat", &[]);
        assert!(result.is_ok());
        assert_eq!(result.text, "note: $5 per seat");
    }
}
