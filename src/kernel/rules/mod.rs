//! The rules evaluation engine (C5–C8): pattern matching, allow-listing,
//! alert-once dedupe, and the unknown-domain/IOC evaluators.

pub mod alert_once;
pub mod allowlist;
pub mod evaluators;
pub mod pattern;

pub use alert_once::{AlertOnceCache, AlertOnceRequest};
pub use allowlist::{AllowlistChecker, AllowlistService};
pub use evaluators::{Attribution, IocEvaluator, UnknownDomainEvaluator};
pub use pattern::{match_any, match_pattern, pattern_priority, Pattern, PatternType};
