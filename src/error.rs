use serde::Serialize;
use thiserror::Error;

/// ConfigError describes a flag table that cannot be served, or a lookup against a flag the
/// table does not define.
///
/// Errors raised while loading a table are fatal: a [crate::FlagTable] only exists once every
/// definition in it has been validated.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ConfigError {
    /// The caller asked for a flag name that is not part of the table.
    #[error("flag {flag:?} is not defined")]
    FlagNotFound { flag: String },

    /// A rule has neither a role condition nor a percentage condition.
    #[error("rule {rule_index} of flag {flag:?} must specify userRoles, percentageOfUsers or both")]
    MalformedRule { flag: String, rule_index: usize },

    /// A rule's role condition is present but lists no roles.
    #[error("rule {rule_index} of flag {flag:?} has an empty userRoles list")]
    EmptyRoleSet { flag: String, rule_index: usize },

    /// A rule's percentage is not a number within `[0, 1]`.
    #[error("rule {rule_index} of flag {flag:?} has percentageOfUsers {value}, expected a value in [0, 1]")]
    InvalidPercentage {
        flag: String,
        rule_index: usize,
        value: f64,
    },

    /// The flag table could not be decoded at all.
    #[error("could not parse flag table: {0}")]
    Parse(String),
}

impl ConfigError {
    pub fn flag_not_found(flag: impl Into<String>) -> Self {
        ConfigError::FlagNotFound { flag: flag.into() }
    }
}

/// ImportValidationError is a single problem found while validating externally supplied flag
/// definitions. See [crate::validate_flag_definitions].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ImportValidationError {
    /// Dotted path to the offending value, e.g. `beta.rules[1].percentageOfUsers`.
    pub path: String,
    pub message: String,
}

impl ImportValidationError {
    pub(crate) fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_flag_and_rule() {
        let error = ConfigError::InvalidPercentage {
            flag: "beta".into(),
            rule_index: 2,
            value: 1.5,
        };
        assert_eq!(
            error.to_string(),
            "rule 2 of flag \"beta\" has percentageOfUsers 1.5, expected a value in [0, 1]"
        );
        assert_eq!(
            ConfigError::flag_not_found("missing").to_string(),
            "flag \"missing\" is not defined"
        );
    }
}
