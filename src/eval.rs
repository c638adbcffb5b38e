use std::collections::BTreeMap;

use log::trace;
use maplit::btreemap;
use serde::Serialize;

use crate::audit::AuditLog;
use crate::error::ConfigError;
use crate::flag::{FlagDefinition, Overrides};
use crate::store::Store;
use crate::telemetry::Telemetry;
use crate::user::User;

/// Operation name under which [Resolver] records its lookups in an attached [Telemetry].
pub const RESOLVE_OPERATION: &str = "resolve_flag";

/// A Detail is returned from [evaluate], combining the result of a flag evaluation with an
/// explanation of how it was calculated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Detail {
    /// Whether the flag is on for the user.
    pub value: bool,
    /// The main factor that influenced the value.
    pub reason: Reason,
}

/// Reason describes the reason that a flag evaluation produced a particular value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "kind")]
pub enum Reason {
    /// Override indicates that an override forced the value; the definition was not consulted.
    Override,
    /// Static indicates that the flag is defined as a literal boolean.
    Static,
    /// RuleMatch indicates that the user matched one of the flag's rules.
    #[serde(rename_all = "camelCase")]
    RuleMatch {
        /// Zero-based index of the first rule that matched.
        rule_index: usize,
    },
    /// NoRuleMatch indicates that the flag has rules but none of them matched the user.
    NoRuleMatch,
}

/// Evaluate a flag definition for `user`.
///
/// If `overrides` holds a value for `flag_name` it is returned without looking at the definition.
/// Otherwise a static definition yields its literal value and a rule list yields true when any of
/// its rules matches. This function has no side effects, so repeated calls with the same inputs
/// always produce the same detail.
pub fn evaluate(
    flag_name: &str,
    definition: &FlagDefinition,
    user: &User,
    overrides: Option<&Overrides>,
) -> Detail {
    if let Some(value) = overrides.and_then(|o| o.get(flag_name)) {
        return Detail {
            value,
            reason: Reason::Override,
        };
    }

    match definition {
        FlagDefinition::Static(value) => Detail {
            value: *value,
            reason: Reason::Static,
        },
        FlagDefinition::Rules(rules) => {
            // rules are OR'ed together: the first one to match decides
            match rules.iter().position(|rule| rule.matches(flag_name, user)) {
                Some(rule_index) => Detail {
                    value: true,
                    reason: Reason::RuleMatch { rule_index },
                },
                None => Detail {
                    value: false,
                    reason: Reason::NoRuleMatch,
                },
            }
        }
    }
}

/// Resolve a flag definition for `user` to a plain boolean. See [evaluate].
pub fn resolve(flag_name: &str, definition: &FlagDefinition, user: &User) -> bool {
    evaluate(flag_name, definition, user, None).value
}

/// Resolver looks flags up in a [Store] and evaluates them, optionally applying [Overrides] and
/// reporting each lookup to a [Telemetry] collector and an [AuditLog].
///
/// The resolver borrows everything it uses, so it is cheap to build per request and any number of
/// resolvers can share one store and one set of collectors.
#[derive(Clone, Copy)]
pub struct Resolver<'a> {
    store: &'a dyn Store,
    overrides: Option<&'a Overrides>,
    telemetry: Option<&'a Telemetry>,
    audit: Option<&'a AuditLog>,
}

impl<'a> Resolver<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self {
            store,
            overrides: None,
            telemetry: None,
            audit: None,
        }
    }

    pub fn with_overrides(mut self, overrides: &'a Overrides) -> Self {
        self.overrides = Some(overrides);
        self
    }

    pub fn with_telemetry(mut self, telemetry: &'a Telemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn with_audit(mut self, audit: &'a AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn store(&self) -> &'a dyn Store {
        self.store
    }

    /// Evaluate the flag named `flag_name` for `user`.
    ///
    /// Asking for a flag the store does not define is an error rather than a silent `false`.
    pub fn evaluate(&self, flag_name: &str, user: &User) -> Result<Detail, ConfigError> {
        let lookup = || self.evaluate_unrecorded(flag_name, user);

        // metadata is only built for collectors that will keep it
        let result = match self.telemetry {
            Some(telemetry) if telemetry.is_enabled() => telemetry.measure(
                RESOLVE_OPERATION,
                Some(btreemap! {"flag".to_string() => flag_name.into()}),
                lookup,
            ),
            _ => lookup(),
        };

        let audit = self.audit.filter(|audit| audit.is_enabled());
        if let (Some(audit), Ok(detail)) = (audit, &result) {
            let reason = serde_json::to_value(detail.reason).unwrap_or_default();
            audit.log_check(
                flag_name,
                user,
                detail.value,
                Some(btreemap! {"reason".to_string() => reason}),
            );
        }

        result
    }

    /// Returns whether the flag named `flag_name` is on for `user`.
    pub fn is_enabled(&self, flag_name: &str, user: &User) -> Result<bool, ConfigError> {
        self.evaluate(flag_name, user).map(|detail| detail.value)
    }

    /// Resolves every flag in the store for `user`.
    ///
    /// Bulk resolution is not reported to the attached collectors.
    pub fn resolve_all(&self, user: &User) -> BTreeMap<String, bool> {
        self.store
            .flag_names()
            .into_iter()
            .filter_map(|name| {
                self.store.flag(name).map(|definition| {
                    let detail = evaluate(name, definition, user, self.overrides);
                    (name.to_string(), detail.value)
                })
            })
            .collect()
    }

    fn evaluate_unrecorded(&self, flag_name: &str, user: &User) -> Result<Detail, ConfigError> {
        let definition = self
            .store
            .flag(flag_name)
            .ok_or_else(|| ConfigError::flag_not_found(flag_name))?;
        let detail = evaluate(flag_name, definition, user, self.overrides);
        trace!(
            "resolved {} for user {}: {:?}",
            flag_name,
            user.id,
            detail
        );
        Ok(detail)
    }
}
