use std::collections::BTreeMap;

use log::debug;
use serde::Serialize;

use crate::error::ConfigError;
use crate::flag::{FlagDefinition, FlagDefinitionSpec};

/// Store is an interface for the read-only table of flag definitions the resolver consults.
///
/// Ordinarily the only implementation is [FlagTable], which validates every definition before it
/// can be constructed. Other implementations must uphold the same guarantee.
pub trait Store {
    /// Retrieve the definition of the flag named `flag_name`.
    fn flag(&self, flag_name: &str) -> Option<&FlagDefinition>;

    /// Names of every flag in the store, in a stable order.
    fn flag_names(&self) -> Vec<&str>;
}

/// FlagTable is the validated, immutable mapping from flag name to definition.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FlagTable {
    flags: BTreeMap<String, FlagDefinition>,
}

impl FlagTable {
    /// Builds a table from definitions constructed in code, validating each of them.
    pub fn new<I, K>(definitions: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, FlagDefinition)>,
        K: Into<String>,
    {
        let flags = definitions
            .into_iter()
            .map(|(name, definition)| (name.into(), definition))
            .collect::<BTreeMap<String, FlagDefinition>>();
        for (name, definition) in &flags {
            definition.validate(name)?;
        }
        debug!("loaded flag table with {} flags", flags.len());
        Ok(Self { flags })
    }

    /// Parses and validates a JSON object mapping flag names to definitions.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let specs: BTreeMap<String, FlagDefinitionSpec> =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_specs(specs)
    }

    pub fn from_specs<I>(specs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, FlagDefinitionSpec)>,
    {
        let definitions = specs
            .into_iter()
            .map(|(name, spec)| FlagDefinition::from_spec(&name, spec).map(|d| (name, d)))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(definitions)
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FlagDefinition)> {
        self.flags
            .iter()
            .map(|(name, definition)| (name.as_str(), definition))
    }
}

impl Store for FlagTable {
    fn flag(&self, flag_name: &str) -> Option<&FlagDefinition> {
        self.flags.get(flag_name)
    }

    fn flag_names(&self) -> Vec<&str> {
        self.flags.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::Rule;
    use crate::user::Role;
    use spectral::prelude::*;

    const SCENARIO: &str = r#"{
        "A": true,
        "B": false,
        "C": [
            {"percentageOfUsers": 0.25, "userRoles": ["user"]},
            {"userRoles": ["admin", "tester"]}
        ]
    }"#;

    #[test]
    fn loads_flag_table_from_json() {
        let table = FlagTable::from_json(SCENARIO).unwrap();
        assert_that!(table.len()).is_equal_to(3);
        assert_that!(table.flag_names()).is_equal_to(vec!["A", "B", "C"]);
        assert_that!(table.flag("A")).contains_value(&FlagDefinition::Static(true));
        assert_that!(table.flag("missing")).is_none();
    }

    #[test]
    fn rejects_malformed_rule_at_load() {
        let result = FlagTable::from_json(r#"{"A": [{"userRoles": ["admin"]}, {}]}"#);
        assert_that!(result).is_err_containing(ConfigError::MalformedRule {
            flag: "A".into(),
            rule_index: 1,
        });
    }

    #[test]
    fn rejects_unparsable_tables() {
        for json in &[
            r#"{"A": "yes"}"#,
            r#"["A"]"#,
            r#"{"A": [{"userRoles": ["root"]}]}"#,
            r#"{"A": [{"userRoles": ["admin"], "weight": 3}]}"#,
        ] {
            let result = FlagTable::from_json(json);
            spectral::asserting(&format!("{} should not parse", json))
                .that(&matches!(result, Err(ConfigError::Parse(_))))
                .is_true();
        }
    }

    #[test]
    fn validates_definitions_built_in_code() {
        let result =
            FlagTable::new(vec![("beta", FlagDefinition::from(vec![Rule::percentage(2.0)]))]);
        assert_that!(result).is_err_containing(ConfigError::InvalidPercentage {
            flag: "beta".into(),
            rule_index: 0,
            value: 2.0,
        });

        let table = FlagTable::new(vec![
            ("beta", FlagDefinition::from(vec![Rule::roles([Role::Tester])])),
            ("gamma", FlagDefinition::from(false)),
        ])
        .unwrap();
        assert_that!(table.flag_names()).is_equal_to(vec!["beta", "gamma"]);
    }

    #[test]
    fn table_serializes_as_a_json_object() {
        let table = FlagTable::from_json(SCENARIO).unwrap();
        let value = serde_json::to_value(&table).unwrap();
        let expected: serde_json::Value = serde_json::from_str(SCENARIO).unwrap();
        assert_json_diff::assert_json_eq!(value, expected);
    }
}
