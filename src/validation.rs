use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ImportValidationError;
use crate::store::Store;
use crate::user::Role;

const USER_ROLES: &str = "userRoles";
const PERCENTAGE_OF_USERS: &str = "percentageOfUsers";

/// Result of validating externally supplied flag definitions. Every problem found is listed;
/// validation never stops at the first one.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ImportValidationError>,
}

impl ValidationReport {
    fn from_errors(errors: Vec<ImportValidationError>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Validates a JSON document of flag definitions without loading it.
pub fn validate_flag_definitions_json(json: &str) -> ValidationReport {
    match serde_json::from_str::<Value>(json) {
        Ok(value) => validate_flag_definitions(&value),
        Err(e) => ValidationReport::from_errors(vec![ImportValidationError::new(
            "",
            format!("invalid JSON: {}", e),
        )]),
    }
}

/// Validates flag definitions shaped like a flag table: an object mapping each flag name to a
/// boolean or an array of rule objects.
pub fn validate_flag_definitions(value: &Value) -> ValidationReport {
    let mut errors = Vec::new();
    match value.as_object() {
        Some(flags) => {
            for (name, definition) in flags {
                validate_definition(name, definition, &mut errors);
            }
        }
        None => errors.push(ImportValidationError::new(
            "",
            "expected an object mapping flag names to definitions",
        )),
    }
    ValidationReport::from_errors(errors)
}

/// Like [validate_flag_definitions], additionally reporting flag names that `store` does not
/// define.
pub fn validate_against_store(value: &Value, store: &dyn Store) -> ValidationReport {
    let mut report = validate_flag_definitions(value);
    if let Some(flags) = value.as_object() {
        let known = store.flag_names();
        for name in flags.keys() {
            if !known.contains(&name.as_str()) {
                report
                    .errors
                    .push(ImportValidationError::new(name.as_str(), "unknown flag"));
            }
        }
    }
    report.valid = report.errors.is_empty();
    report
}

fn validate_definition(name: &str, definition: &Value, errors: &mut Vec<ImportValidationError>) {
    match definition {
        Value::Bool(_) => {}
        Value::Array(rules) => {
            for (index, rule) in rules.iter().enumerate() {
                let path = format!("{}[{}]", name, index);
                match rule.as_object() {
                    Some(rule) => validate_rule(&path, rule, errors),
                    None => errors.push(ImportValidationError::new(path, "expected a rule object")),
                }
            }
        }
        other => errors.push(ImportValidationError::new(
            name,
            format!(
                "expected a boolean or an array of rules, found {}",
                type_name(other)
            ),
        )),
    }
}

fn validate_rule(path: &str, rule: &Map<String, Value>, errors: &mut Vec<ImportValidationError>) {
    for key in rule.keys() {
        if key != USER_ROLES && key != PERCENTAGE_OF_USERS {
            errors.push(ImportValidationError::new(
                format!("{}.{}", path, key),
                "unknown rule field",
            ));
        }
    }

    let roles = rule.get(USER_ROLES);
    let percentage = rule.get(PERCENTAGE_OF_USERS);
    if roles.is_none() && percentage.is_none() {
        errors.push(ImportValidationError::new(
            path,
            format!("rule must specify {}, {} or both", USER_ROLES, PERCENTAGE_OF_USERS),
        ));
    }

    if let Some(roles) = roles {
        let path = format!("{}.{}", path, USER_ROLES);
        match roles.as_array() {
            Some(roles) if roles.is_empty() => {
                errors.push(ImportValidationError::new(path, "must list at least one role"))
            }
            Some(roles) => {
                for (index, role) in roles.iter().enumerate() {
                    let valid = role.as_str().map_or(false, |r| r.parse::<Role>().is_ok());
                    if !valid {
                        errors.push(ImportValidationError::new(
                            format!("{}[{}]", path, index),
                            format!("expected one of {}, found {}", known_roles(), role),
                        ));
                    }
                }
            }
            None => errors.push(ImportValidationError::new(
                path,
                format!("expected an array of roles, found {}", type_name(roles)),
            )),
        }
    }

    if let Some(percentage) = percentage {
        let path = format!("{}.{}", path, PERCENTAGE_OF_USERS);
        match percentage.as_f64() {
            Some(p) if (0.0..=1.0).contains(&p) => {}
            Some(p) => errors.push(ImportValidationError::new(
                path,
                format!("must be between 0 and 1, found {}", p),
            )),
            None => errors.push(ImportValidationError::new(
                path,
                format!("expected a number, found {}", type_name(percentage)),
            )),
        }
    }
}

fn known_roles() -> String {
    Role::ALL
        .iter()
        .map(Role::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FlagTable;
    use crate::test_common::TestStore;
    use serde_json::json;
    use spectral::prelude::*;

    fn paths(report: &ValidationReport) -> Vec<&str> {
        report.errors.iter().map(|e| e.path.as_str()).collect()
    }

    #[test]
    fn well_formed_definitions_are_valid() {
        let report = validate_flag_definitions(&json!({
            "A": true,
            "C": [
                {"percentageOfUsers": 0.25, "userRoles": ["user"]},
                {"userRoles": ["admin", "tester"]}
            ],
            "empty": []
        }));
        assert_that!(report.valid).is_true();
        assert_that!(report.errors).is_empty();
    }

    #[test]
    fn collects_every_problem() {
        let report = validate_flag_definitions(&json!({
            "str": "yes",
            "rules": [
                {},
                "not a rule",
                {"userRoles": ["admin", "root"], "percentageOfUsers": 1.5},
                {"userRoles": "admin", "weight": 3},
                {"userRoles": [], "percentageOfUsers": "half"}
            ]
        }));

        assert_that!(report.valid).is_false();
        assert_that!(paths(&report)).is_equal_to(vec![
            "rules[0]",
            "rules[1]",
            "rules[2].userRoles[1]",
            "rules[2].percentageOfUsers",
            "rules[3].weight",
            "rules[3].userRoles",
            "rules[4].userRoles",
            "rules[4].percentageOfUsers",
            "str",
        ]);
    }

    #[test]
    fn non_object_roots_are_rejected() {
        let report = validate_flag_definitions(&json!([true, false]));
        assert_that!(report.valid).is_false();
        assert_that!(paths(&report)).is_equal_to(vec![""]);
    }

    #[test]
    fn invalid_json_is_reported_not_raised() {
        let report = validate_flag_definitions_json("{not json");
        assert_that!(report.valid).is_false();
        assert_that!(report.errors).has_length(1);
    }

    #[test]
    fn unknown_flags_are_reported_against_a_store() {
        let report = validate_against_store(&json!({"A": false, "Z": true}), &TestStore::new());
        assert_that!(report.valid).is_false();
        assert_that!(report.errors).is_equal_to(vec![ImportValidationError::new(
            "Z",
            "unknown flag",
        )]);
    }

    #[test]
    fn valid_definitions_load_into_a_table() {
        let json =
            r#"{"beta": [{"userRoles": ["tester"], "percentageOfUsers": 0.5}], "off": false}"#;
        assert_that!(validate_flag_definitions_json(json).valid).is_true();
        assert_that!(FlagTable::from_json(json)).is_ok();
    }

    #[test]
    fn rejected_definitions_do_not_load_into_a_table() {
        let json = r#"{"beta": [{"userRoles": ["tester"], "weight": 3}]}"#;
        let report = validate_flag_definitions_json(json);
        assert_that!(report.valid).is_false();
        assert_that!(paths(&report)).is_equal_to(vec!["beta[0].weight"]);
        assert_that!(FlagTable::from_json(json)).is_err();
    }
}
