use std::collections::BTreeSet;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::hash::bucket;
use crate::user::{Role, User};

/// RuleSpec is the wire shape of a rule: `{"userRoles": [...], "percentageOfUsers": 0.25}` with
/// either key optional.
///
/// A rule with neither key is representable here but is rejected when it is turned into a [Rule].
/// Any other key is a parse error.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RuleSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_roles: Option<Vec<Role>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage_of_users: Option<f64>,
}

/// Rule is one branch of a flag definition. A rule matches a user when every condition it carries
/// holds.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(into = "RuleSpec")]
pub enum Rule {
    /// Matches users holding one of the listed roles.
    Roles(BTreeSet<Role>),
    /// Matches users whose bucket for the flag falls below the given fraction.
    Percentage(f64),
    /// Matches users holding one of the listed roles whose bucket also falls below the fraction.
    RolesAndPercentage {
        roles: BTreeSet<Role>,
        percentage: f64,
    },
}

impl Rule {
    pub fn roles<I: IntoIterator<Item = Role>>(roles: I) -> Self {
        Rule::Roles(roles.into_iter().collect())
    }

    pub fn percentage(percentage: f64) -> Self {
        Rule::Percentage(percentage)
    }

    pub fn roles_and_percentage<I: IntoIterator<Item = Role>>(roles: I, percentage: f64) -> Self {
        Rule::RolesAndPercentage {
            roles: roles.into_iter().collect(),
            percentage,
        }
    }

    /// Converts a wire-level rule into a [Rule], reporting problems against `flag` and
    /// `rule_index`.
    pub fn from_spec(spec: RuleSpec, flag: &str, rule_index: usize) -> Result<Self, ConfigError> {
        let rule = match (spec.user_roles, spec.percentage_of_users) {
            (None, None) => {
                return Err(ConfigError::MalformedRule {
                    flag: flag.to_string(),
                    rule_index,
                })
            }
            (Some(roles), None) => Rule::roles(roles),
            (None, Some(percentage)) => Rule::percentage(percentage),
            (Some(roles), Some(percentage)) => Rule::roles_and_percentage(roles, percentage),
        };
        rule.validate(flag, rule_index)?;
        Ok(rule)
    }

    /// Checks the invariants the type alone cannot express: role sets are non-empty and
    /// percentages lie within `[0, 1]`.
    pub fn validate(&self, flag: &str, rule_index: usize) -> Result<(), ConfigError> {
        if let Some(roles) = self.role_condition() {
            if roles.is_empty() {
                return Err(ConfigError::EmptyRoleSet {
                    flag: flag.to_string(),
                    rule_index,
                });
            }
        }
        if let Some(percentage) = self.percentage_condition() {
            if !(0.0..=1.0).contains(&percentage) {
                return Err(ConfigError::InvalidPercentage {
                    flag: flag.to_string(),
                    rule_index,
                    value: percentage,
                });
            }
            if percentage == 0.0 {
                debug!(
                    "rule {} of flag {} has a 0% rollout and will never match on its percentage",
                    rule_index, flag
                );
            }
        }
        Ok(())
    }

    pub fn role_condition(&self) -> Option<&BTreeSet<Role>> {
        match self {
            Rule::Roles(roles) | Rule::RolesAndPercentage { roles, .. } => Some(roles),
            Rule::Percentage(_) => None,
        }
    }

    pub fn percentage_condition(&self) -> Option<f64> {
        match self {
            Rule::Percentage(percentage) | Rule::RolesAndPercentage { percentage, .. } => {
                Some(*percentage)
            }
            Rule::Roles(_) => None,
        }
    }

    /// Returns true if `user` satisfies every condition of this rule for the flag `flag_name`.
    pub fn matches(&self, flag_name: &str, user: &User) -> bool {
        match self {
            Rule::Roles(roles) => roles.contains(&user.role),
            Rule::Percentage(percentage) => in_rollout(flag_name, user, *percentage),
            Rule::RolesAndPercentage { roles, percentage } => {
                roles.contains(&user.role) && in_rollout(flag_name, user, *percentage)
            }
        }
    }
}

fn in_rollout(flag_name: &str, user: &User, percentage: f64) -> bool {
    bucket(flag_name, &user.id) < percentage
}

impl From<Rule> for RuleSpec {
    fn from(rule: Rule) -> Self {
        RuleSpec {
            user_roles: rule
                .role_condition()
                .map(|roles| roles.iter().copied().collect()),
            percentage_of_users: rule.percentage_condition(),
        }
    }
}
