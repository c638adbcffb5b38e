//! Feature flag resolution for static toggles, role allow-lists and percentage rollouts.
//!
//! Flags are defined in a [FlagTable] and resolved for a [User] by [Resolver]. Percentage
//! rollouts hash `"<flag>-<user id>"` with a 32-bit MurmurHash3 (see [bucket]), so a user's
//! membership in a rollout never changes between evaluations.
//!
//! Two optional, bounded collectors observe resolution: [Telemetry] times operations and derives
//! latency statistics, [AuditLog] records checks and state changes. Both are explicit values the
//! host constructs and passes around; neither is global.
//!
//! # Logging
//!
//! The crate logs through the [`log`](https://docs.rs/log) facade and installs no logger itself.

mod audit;
mod compare;
mod config;
mod error;
mod eval;
mod flag;
mod hash;
mod health;
mod ring;
mod rule;
mod store;
mod telemetry;
mod test_common;
mod user;
mod util;
mod validation;

pub use audit::*;
pub use compare::*;
pub use config::*;
pub use error::*;
pub use eval::*;
pub use flag::*;
pub use hash::*;
pub use health::*;
pub use rule::*;
pub use store::*;
pub use telemetry::*;
pub use user::*;
pub use util::Metadata;
pub use validation::*;
