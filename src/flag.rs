use std::collections::BTreeMap;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::rule::{Rule, RuleSpec};

/// FlagDefinitionSpec is the wire shape of a flag definition: either a literal boolean or an
/// array of [RuleSpec]s.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagDefinitionSpec {
    Static(bool),
    Rules(Vec<RuleSpec>),
}

/// FlagDefinition describes how a single flag is decided.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(into = "FlagDefinitionSpec")]
pub enum FlagDefinition {
    /// The flag has the same value for everybody.
    Static(bool),
    /// The flag is on for a user if any of the rules matches. An empty list is off for everybody.
    Rules(Vec<Rule>),
}

impl FlagDefinition {
    pub fn from_spec(flag: &str, spec: FlagDefinitionSpec) -> Result<Self, ConfigError> {
        match spec {
            FlagDefinitionSpec::Static(value) => Ok(FlagDefinition::Static(value)),
            FlagDefinitionSpec::Rules(specs) => {
                let rules = specs
                    .into_iter()
                    .enumerate()
                    .map(|(rule_index, spec)| Rule::from_spec(spec, flag, rule_index))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(FlagDefinition::Rules(rules))
            }
        }
    }

    pub fn validate(&self, flag: &str) -> Result<(), ConfigError> {
        match self {
            FlagDefinition::Static(_) => Ok(()),
            FlagDefinition::Rules(rules) => {
                if rules.is_empty() {
                    warn!("flag {} has an empty rule list and is off for every user", flag);
                }
                rules
                    .iter()
                    .enumerate()
                    .try_for_each(|(rule_index, rule)| rule.validate(flag, rule_index))
            }
        }
    }

    pub fn is_static(&self) -> bool {
        matches!(self, FlagDefinition::Static(_))
    }
}

impl From<bool> for FlagDefinition {
    fn from(value: bool) -> Self {
        FlagDefinition::Static(value)
    }
}

impl From<Vec<Rule>> for FlagDefinition {
    fn from(rules: Vec<Rule>) -> Self {
        FlagDefinition::Rules(rules)
    }
}

impl From<FlagDefinition> for FlagDefinitionSpec {
    fn from(definition: FlagDefinition) -> Self {
        match definition {
            FlagDefinition::Static(value) => FlagDefinitionSpec::Static(value),
            FlagDefinition::Rules(rules) => {
                FlagDefinitionSpec::Rules(rules.into_iter().map(RuleSpec::from).collect())
            }
        }
    }
}

/// Overrides force flags to a fixed value, bypassing their definitions entirely.
///
/// Where the values come from (environment variables, a debug panel, a test harness) is up to the
/// host; this type only holds the result.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Overrides {
    values: BTreeMap<String, bool>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds overrides from textual values such as `"true"`, `"0"` or `"off"`.
    ///
    /// Values that do not parse as a boolean are skipped with a warning.
    pub fn parse_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let mut overrides = Self::new();
        for (name, raw) in pairs {
            let name = name.into();
            match parse_bool(raw.as_ref()) {
                Some(value) => {
                    overrides.set(name, value);
                }
                None => warn!(
                    "ignoring override for flag {}: {:?} is not a boolean",
                    name,
                    raw.as_ref()
                ),
            }
        }
        overrides
    }

    pub fn set(&mut self, flag: impl Into<String>, value: bool) -> &mut Self {
        self.values.insert(flag.into(), value);
        self
    }

    pub fn get(&self, flag: &str) -> Option<bool> {
        self.values.get(flag).copied()
    }

    pub fn remove(&mut self, flag: &str) -> Option<bool> {
        self.values.remove(flag)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.values.iter().map(|(name, value)| (name.as_str(), *value))
    }
}

impl<K: Into<String>> FromIterator<(K, bool)> for Overrides {
    fn from_iter<T: IntoIterator<Item = (K, bool)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "on" | "yes" => Some(true),
        "false" | "0" | "off" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::Role;
    use spectral::prelude::*;
    use test_case::test_case;

    #[test]
    fn parses_static_and_rule_definitions() {
        let spec: FlagDefinitionSpec = serde_json::from_str("true").unwrap();
        assert_that!(FlagDefinition::from_spec("a", spec))
            .is_ok_containing(FlagDefinition::Static(true));

        let spec: FlagDefinitionSpec = serde_json::from_str(
            r#"[{"percentageOfUsers":0.25,"userRoles":["user"]},{"userRoles":["admin","tester"]}]"#,
        )
        .unwrap();
        assert_that!(FlagDefinition::from_spec("c", spec)).is_ok_containing(
            FlagDefinition::Rules(vec![
                Rule::roles_and_percentage([Role::User], 0.25),
                Rule::roles([Role::Admin, Role::Tester]),
            ]),
        );
    }

    #[test]
    fn malformed_rule_reports_its_position() {
        let spec: FlagDefinitionSpec =
            serde_json::from_str(r#"[{"userRoles":["admin"]},{}]"#).unwrap();
        assert_that!(FlagDefinition::from_spec("c", spec)).is_err_containing(
            ConfigError::MalformedRule {
                flag: "c".into(),
                rule_index: 1,
            },
        );
    }

    #[test]
    fn definition_round_trips_through_its_spec() {
        let definition = FlagDefinition::Rules(vec![Rule::percentage(0.5)]);
        let json = serde_json::to_string(&definition).unwrap();
        assert_eq!(json, r#"[{"percentageOfUsers":0.5}]"#);
        let spec: FlagDefinitionSpec = serde_json::from_str(&json).unwrap();
        assert_that!(FlagDefinition::from_spec("f", spec)).is_ok_containing(definition);
    }

    #[test_case("true", Some(true))]
    #[test_case(" ON ", Some(true))]
    #[test_case("1", Some(true))]
    #[test_case("False", Some(false))]
    #[test_case("0", Some(false))]
    #[test_case("maybe", None)]
    fn parses_override_values(raw: &str, expected: Option<bool>) {
        assert_eq!(parse_bool(raw), expected);
    }

    #[test]
    fn unparsable_overrides_are_skipped() {
        let overrides = Overrides::parse_pairs(vec![("a", "true"), ("b", "nope"), ("c", "off")]);
        assert_that!(overrides.len()).is_equal_to(2);
        assert_that!(overrides.get("a")).contains_value(true);
        assert_that!(overrides.get("b")).is_none();
        assert_that!(overrides.get("c")).contains_value(false);
    }
}
