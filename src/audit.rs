use std::collections::{BTreeMap, HashSet};
use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use itertools::Itertools;
use log::{debug, trace};
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::AuditConfig;
use crate::ring::BoundedBuffer;
use crate::user::User;
use crate::util::Metadata;

/// AuditAction is the kind of event an [AuditEntry] records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    /// A flag's value was observed for a user.
    Check,
    /// A flag was switched on.
    Enable,
    /// A flag was switched off.
    Disable,
    /// A flag's value changed.
    Toggle,
}

impl Display for AuditAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuditAction::Check => "check",
            AuditAction::Enable => "enable",
            AuditAction::Disable => "disable",
            AuditAction::Toggle => "toggle",
        };
        f.write_str(name)
    }
}

/// An immutable record of a flag decision or state change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: String,
    pub flag: String,
    pub user: User,
    pub action: AuditAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<bool>,
    pub new_value: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// IdGenerator hands out audit entry ids that are unique for the lifetime of the process.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// SequentialIdGenerator combines the current time, a per-generator counter and a random suffix,
/// e.g. `audit_1700000000000_42_9f3c01ab`.
#[derive(Debug, Default)]
pub struct SequentialIdGenerator {
    counter: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> String {
        let sequence = self.counter.fetch_add(1, Ordering::Relaxed);
        let suffix: u32 = rand::thread_rng().gen();
        format!(
            "audit_{}_{}_{:08x}",
            Utc::now().timestamp_millis(),
            sequence,
            suffix
        )
    }
}

/// AuditQuery selects audit entries. Every criterion that is set must hold; an empty query
/// matches everything.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AuditQuery {
    pub flag: Option<String>,
    pub user_id: Option<String>,
    pub action: Option<AuditAction>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl AuditQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flag(mut self, flag: impl Into<String>) -> Self {
        self.flag = Some(flag.into());
        self
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn action(mut self, action: AuditAction) -> Self {
        self.action = Some(action);
        self
    }

    /// Restricts the query to entries within `[start, end]`.
    pub fn between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.flag.as_ref().map_or(true, |flag| &entry.flag == flag)
            && self
                .user_id
                .as_ref()
                .map_or(true, |user_id| &entry.user.id == user_id)
            && self.action.map_or(true, |action| entry.action == action)
            && self.start.map_or(true, |start| entry.timestamp >= start)
            && self.end.map_or(true, |end| entry.timestamp <= end)
    }
}

/// Aggregate counts over a set of audit entries.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditStats {
    pub total: usize,
    pub by_action: BTreeMap<AuditAction, usize>,
    pub by_flag: BTreeMap<String, usize>,
    pub unique_users: usize,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

impl AuditStats {
    pub fn from_entries(entries: &[AuditEntry]) -> Self {
        let (oldest, newest) = match entries.iter().map(|e| e.timestamp).minmax().into_option() {
            Some((oldest, newest)) => (Some(oldest), Some(newest)),
            None => (None, None),
        };
        Self {
            total: entries.len(),
            by_action: entries.iter().map(|e| e.action).counts().into_iter().collect(),
            by_flag: entries
                .iter()
                .map(|e| e.flag.clone())
                .counts()
                .into_iter()
                .collect(),
            unique_users: entries
                .iter()
                .map(|e| e.user.id.as_str())
                .collect::<HashSet<_>>()
                .len(),
            oldest,
            newest,
        }
    }
}

/// AuditSource is the query capability shared by every holder of audit entries.
pub trait AuditSource {
    /// All retained entries, oldest first.
    fn entries(&self) -> Vec<AuditEntry>;

    fn query(&self, query: &AuditQuery) -> Vec<AuditEntry> {
        self.entries()
            .into_iter()
            .filter(|entry| query.matches(entry))
            .collect()
    }

    fn entries_for_flag(&self, flag: &str) -> Vec<AuditEntry> {
        self.query(&AuditQuery::new().flag(flag))
    }

    fn entries_for_user(&self, user_id: &str) -> Vec<AuditEntry> {
        self.query(&AuditQuery::new().user_id(user_id))
    }

    fn entries_with_action(&self, action: AuditAction) -> Vec<AuditEntry> {
        self.query(&AuditQuery::new().action(action))
    }

    fn entries_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<AuditEntry> {
        self.query(&AuditQuery::new().between(start, end))
    }

    /// The newest `n` entries, oldest first.
    fn recent(&self, n: usize) -> Vec<AuditEntry> {
        let entries = self.entries();
        let skip = entries.len().saturating_sub(n);
        entries.into_iter().skip(skip).collect()
    }

    fn stats(&self) -> AuditStats {
        AuditStats::from_entries(&self.entries())
    }
}

impl AuditSource for [AuditEntry] {
    fn entries(&self) -> Vec<AuditEntry> {
        self.to_vec()
    }
}

/// AuditLog is an append-only, bounded record of flag checks and state changes.
///
/// Like [crate::Telemetry], an audit log is an ordinary value passed by reference to whoever
/// records into it. Entry ids come from the injected [IdGenerator].
pub struct AuditLog {
    enabled: AtomicBool,
    entries: Mutex<BoundedBuffer<AuditEntry>>,
    ids: Box<dyn IdGenerator>,
}

impl AuditLog {
    pub fn new(config: AuditConfig) -> Self {
        Self::with_id_generator(config, Box::new(SequentialIdGenerator::new()))
    }

    pub fn with_id_generator(config: AuditConfig, ids: Box<dyn IdGenerator>) -> Self {
        Self {
            enabled: AtomicBool::new(config.enabled),
            entries: Mutex::new(BoundedBuffer::new(config.max_entries)),
            ids,
        }
    }

    pub fn with_capacity(max_entries: usize) -> Self {
        Self::new(AuditConfig {
            max_entries,
            ..AuditConfig::default()
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Turns logging on or off. Entries already recorded are kept either way.
    pub fn set_enabled(&self, enabled: bool) {
        debug!("audit logging {}", if enabled { "enabled" } else { "disabled" });
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Records that `flag` was observed as `value` for `user`.
    pub fn log_check(&self, flag: &str, user: &User, value: bool, metadata: Option<Metadata>) {
        self.append(flag, user, AuditAction::Check, None, value, metadata);
    }

    /// Records a transition of `flag` from `old_value` to `new_value`.
    ///
    /// A transition that does not change the value is recorded as a check, not a toggle.
    pub fn log_state_change(
        &self,
        flag: &str,
        user: &User,
        old_value: bool,
        new_value: bool,
        metadata: Option<Metadata>,
    ) {
        let action = if old_value != new_value {
            AuditAction::Toggle
        } else {
            AuditAction::Check
        };
        self.append(flag, user, action, Some(old_value), new_value, metadata);
    }

    pub fn log_enable(&self, flag: &str, user: &User, metadata: Option<Metadata>) {
        self.append(flag, user, AuditAction::Enable, Some(false), true, metadata);
    }

    pub fn log_disable(&self, flag: &str, user: &User, metadata: Option<Metadata>) {
        self.append(flag, user, AuditAction::Disable, Some(true), false, metadata);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().capacity()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    fn append(
        &self,
        flag: &str,
        user: &User,
        action: AuditAction,
        old_value: Option<bool>,
        new_value: bool,
        metadata: Option<Metadata>,
    ) {
        if !self.is_enabled() {
            return;
        }
        let entry = AuditEntry {
            id: self.ids.next_id(),
            flag: flag.to_string(),
            user: user.clone(),
            action,
            old_value,
            new_value,
            timestamp: Utc::now(),
            metadata,
        };
        if let Some(evicted) = self.entries.lock().push(entry) {
            trace!("evicted audit entry {} for flag {}", evicted.id, evicted.flag);
        }
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(AuditConfig::default())
    }
}

impl AuditSource for AuditLog {
    fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().to_vec()
    }

    fn recent(&self, n: usize) -> Vec<AuditEntry> {
        self.entries.lock().last(n)
    }
}
