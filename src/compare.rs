use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::eval::Resolver;
use crate::user::User;

/// The resolved state of one flag for two users.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagComparison {
    pub flag: String,
    pub state_a: bool,
    pub state_b: bool,
    pub differs: bool,
}

/// Comparison of every known flag between two users.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    pub user_a: User,
    pub user_b: User,
    pub flags: Vec<FlagComparison>,
}

impl Comparison {
    /// Flags that resolve differently for the two users.
    pub fn differing(&self) -> Vec<&str> {
        self.names_where(|c| c.differs)
    }

    /// Flags that are on for user A only.
    pub fn only_a(&self) -> Vec<&str> {
        self.names_where(|c| c.state_a && !c.state_b)
    }

    /// Flags that are on for user B only.
    pub fn only_b(&self) -> Vec<&str> {
        self.names_where(|c| !c.state_a && c.state_b)
    }

    /// Flags that are on for both users.
    pub fn shared(&self) -> Vec<&str> {
        self.names_where(|c| c.state_a && c.state_b)
    }

    /// Percentage of flags that resolve the same way for both users. Comparing over an empty
    /// flag set is 100% similar.
    pub fn similarity(&self) -> f64 {
        if self.flags.is_empty() {
            return 100.0;
        }
        let same = self.flags.iter().filter(|c| !c.differs).count();
        same as f64 / self.flags.len() as f64 * 100.0
    }

    fn names_where<P: Fn(&FlagComparison) -> bool>(&self, predicate: P) -> Vec<&str> {
        self.flags
            .iter()
            .filter(|c| predicate(c))
            .map(|c| c.flag.as_str())
            .collect()
    }
}

/// Resolves every flag known to `resolver` for both users and pairs up the results.
pub fn compare_users(resolver: &Resolver<'_>, user_a: &User, user_b: &User) -> Comparison {
    let states_a = resolver.resolve_all(user_a);
    let states_b = resolver.resolve_all(user_b);

    let flags = states_a
        .into_iter()
        .map(|(flag, state_a)| {
            let state_b = states_b.get(&flag).copied().unwrap_or(false);
            FlagComparison {
                differs: state_a != state_b,
                flag,
                state_a,
                state_b,
            }
        })
        .collect();

    Comparison {
        user_a: user_a.clone(),
        user_b: user_b.clone(),
        flags,
    }
}

/// A point-in-time record of every flag's resolved state for one user.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Snapshot {
    pub user: User,
    pub flags: BTreeMap<String, bool>,
    pub timestamp: DateTime<Utc>,
}

impl Snapshot {
    /// Captures the current state of every flag known to `resolver` for `user`.
    pub fn capture(resolver: &Resolver<'_>, user: &User) -> Self {
        Self {
            user: user.clone(),
            flags: resolver.resolve_all(user),
            timestamp: Utc::now(),
        }
    }
}

/// A flag whose value differs between two snapshots.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FlagChange {
    pub flag: String,
    pub before: bool,
    pub after: bool,
}

/// Classification of every flag appearing in either of two snapshots.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotDiff {
    /// Present only in the later snapshot, with their value there.
    pub added: BTreeMap<String, bool>,
    /// Present only in the earlier snapshot, with their value there.
    pub removed: BTreeMap<String, bool>,
    pub changed: Vec<FlagChange>,
    pub unchanged: Vec<String>,
    /// Time from the first snapshot to the second, negative if the second is older.
    pub elapsed_ms: i64,
}

impl SnapshotDiff {
    pub fn has_changes(&self) -> bool {
        !(self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty())
    }
}

/// Compares two snapshots. Every flag in the union of both flag sets lands in exactly one of
/// `added`, `removed`, `changed` or `unchanged`.
pub fn diff_snapshots(before: &Snapshot, after: &Snapshot) -> SnapshotDiff {
    let names: BTreeSet<&String> = before.flags.keys().chain(after.flags.keys()).collect();

    let mut diff = SnapshotDiff {
        elapsed_ms: (after.timestamp - before.timestamp).num_milliseconds(),
        ..SnapshotDiff::default()
    };
    for name in names {
        match (before.flags.get(name), after.flags.get(name)) {
            (None, Some(&value)) => {
                diff.added.insert(name.clone(), value);
            }
            (Some(&value), None) => {
                diff.removed.insert(name.clone(), value);
            }
            (Some(&old), Some(&new)) if old != new => diff.changed.push(FlagChange {
                flag: name.clone(),
                before: old,
                after: new,
            }),
            (Some(_), Some(_)) => diff.unchanged.push(name.clone()),
            (None, None) => {}
        }
    }
    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FlagTable, Store};
    use crate::test_common::TestStore;
    use chrono::Duration;
    use maplit::btreemap;
    use spectral::prelude::*;

    fn snapshot(flags: BTreeMap<String, bool>, timestamp: DateTime<Utc>) -> Snapshot {
        Snapshot {
            user: User::user("u1"),
            flags,
            timestamp,
        }
    }

    #[test]
    fn compares_every_known_flag() {
        let store = TestStore::new();
        let resolver = Resolver::new(&store);
        // u1 is outside the 25% rollout of C as a plain user but matches as an admin
        let comparison = compare_users(&resolver, &User::admin("u1"), &User::user("u1"));

        assert_that!(comparison.flags.len()).is_equal_to(store.flag_names().len());
        assert!(comparison.differing().contains(&"C"));
        assert!(comparison.only_a().contains(&"C"));
        assert_that!(comparison.only_b()).is_empty();
        assert!(comparison.shared().contains(&"A"));
        assert!(!comparison.shared().contains(&"B"));
    }

    #[test]
    fn identical_users_are_fully_similar() {
        let store = TestStore::new();
        let resolver = Resolver::new(&store);
        let user = User::tester("t1");
        let comparison = compare_users(&resolver, &user, &user);
        assert_that!(comparison.similarity()).is_equal_to(100.0);
        assert_that!(comparison.differing()).is_empty();
    }

    #[test]
    fn fully_different_users_are_not_similar() {
        let table = FlagTable::from_json(
            r#"{"adminOnly": [{"userRoles": ["admin"]}], "userOnly": [{"userRoles": ["user"]}]}"#,
        )
        .unwrap();
        let resolver = Resolver::new(&table);
        let comparison = compare_users(&resolver, &User::admin("a"), &User::user("u"));

        assert_that!(comparison.similarity()).is_equal_to(0.0);
        assert_that!(comparison.only_a()).is_equal_to(vec!["adminOnly"]);
        assert_that!(comparison.only_b()).is_equal_to(vec!["userOnly"]);
        assert_that!(comparison.shared()).is_empty();
    }

    #[test]
    fn similarity_is_a_percentage_of_matching_flags() {
        let table = FlagTable::from_json(
            r#"{"a": true, "b": false, "c": [{"userRoles": ["admin"]}], "d": [{"userRoles": ["tester"]}]}"#,
        )
        .unwrap();
        let resolver = Resolver::new(&table);
        let comparison = compare_users(&resolver, &User::admin("x"), &User::tester("y"));
        assert_that!(comparison.similarity()).is_equal_to(50.0);
    }

    #[test]
    fn captured_snapshot_matches_resolution() {
        let store = TestStore::new();
        let resolver = Resolver::new(&store);
        let user = User::user("u2");
        let snapshot = Snapshot::capture(&resolver, &user);
        assert_that!(snapshot.flags).is_equal_to(resolver.resolve_all(&user));
        assert_that!(snapshot.user).is_equal_to(user);
    }

    #[test]
    fn diffing_a_snapshot_with_itself_changes_nothing() {
        let store = TestStore::new();
        let resolver = Resolver::new(&store);
        let snapshot = Snapshot::capture(&resolver, &User::admin("u1"));

        let diff = diff_snapshots(&snapshot, &snapshot);
        assert!(diff.added.is_empty());
        assert!(diff.removed.is_empty());
        assert_that!(diff.changed).is_empty();
        assert_that!(diff.unchanged.len()).is_equal_to(store.flag_names().len());
        assert_that!(diff.elapsed_ms).is_equal_to(0);
        assert_that!(diff.has_changes()).is_false();
    }

    #[test]
    fn diff_classifies_each_flag_once() {
        let t0 = Utc::now();
        let before = snapshot(
            btreemap! {
                "kept".to_string() => true,
                "flipped".to_string() => false,
                "dropped".to_string() => true,
            },
            t0,
        );
        let after = snapshot(
            btreemap! {
                "kept".to_string() => true,
                "flipped".to_string() => true,
                "new".to_string() => false,
            },
            t0 + Duration::milliseconds(1500),
        );

        let diff = diff_snapshots(&before, &after);
        assert_that!(diff.added).is_equal_to(btreemap! {"new".to_string() => false});
        assert_that!(diff.removed).is_equal_to(btreemap! {"dropped".to_string() => true});
        assert_that!(diff.changed).is_equal_to(vec![FlagChange {
            flag: "flipped".into(),
            before: false,
            after: true,
        }]);
        assert_that!(diff.unchanged).is_equal_to(vec!["kept".to_string()]);
        assert_that!(diff.elapsed_ms).is_equal_to(1500);
        assert_that!(diff.has_changes()).is_true();
    }
}
