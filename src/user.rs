use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Role is the closed set of roles a [User] may hold and a [crate::Rule] may gate on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Administrators of the application.
    Admin,
    /// Internal testers and QA.
    Tester,
    /// Everybody else.
    User,
}

impl Role {
    /// All known roles, in declaration order.
    pub const ALL: [Role; 3] = [Role::Admin, Role::Tester, Role::User];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Tester => "tester",
            Role::User => "user",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .iter()
            .find(|role| role.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown role {:?}", s))
    }
}

/// User is the subject a flag is resolved for.
///
/// Users are supplied by the caller on every resolution; nothing in this crate authenticates them
/// or holds on to them beyond the call, except for the copies recorded in audit entries and
/// snapshots.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub role: Role,
}

impl User {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self::new(id, Role::Admin)
    }

    pub fn tester(id: impl Into<String>) -> Self {
        Self::new(id, Role::Tester)
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self::new(id, Role::User)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectral::prelude::*;
    use test_case::test_case;

    #[test_case("admin", Role::Admin)]
    #[test_case("tester", Role::Tester)]
    #[test_case("user", Role::User)]
    fn parses_known_roles(input: &str, expected: Role) {
        assert_that!(input.parse::<Role>()).is_ok_containing(expected);
        assert_eq!(expected.to_string(), input);
    }

    #[test_case("Admin")]
    #[test_case("")]
    #[test_case("root")]
    fn rejects_unknown_roles(input: &str) {
        assert_that!(input.parse::<Role>()).is_err();
    }

    #[test]
    fn user_serializes_with_lowercase_role() {
        let json = serde_json::to_value(User::tester("u1")).unwrap();
        assert_eq!(json, serde_json::json!({"id": "u1", "role": "tester"}));

        let user: User = serde_json::from_str(r#"{"id":"u2","role":"admin"}"#).unwrap();
        assert_that!(user).is_equal_to(User::admin("u2"));
    }
}
