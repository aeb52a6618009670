//! Trace granularity levels.
//!
//! # Ordering
//! ```text
//! ALL (0) → DB (1) → SERVICE (2) → API (3) → NONE (4)
//! most verbose                          least verbose
//! ```
//!
//! A call site declared at level `a` is traced when the configured level is
//! `b` and `rank(a) >= rank(b)`. Comparison goes through the rank table, never
//! through the textual names.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::observability::error::TelemetryError;

/// Which layers of the call stack produce spans.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Granularity {
    /// No spans are emitted.
    #[default]
    None,
    /// Spans for every layer up to and including the service layer.
    Service,
    /// Spans for every layer up to and including the DB layer.
    Db,
    /// Spans only for API calls.
    Api,
    /// Spans for almost every call.
    All,
}

/// Rank table, index 0 = most verbose.
const RANKS: [Granularity; 5] = [
    Granularity::All,
    Granularity::Db,
    Granularity::Service,
    Granularity::Api,
    Granularity::None,
];

impl Granularity {
    /// Position of this level in the fixed verbosity order.
    pub fn rank(self) -> usize {
        match self {
            Granularity::All => 0,
            Granularity::Db => 1,
            Granularity::Service => 2,
            Granularity::Api => 3,
            Granularity::None => 4,
        }
    }

    /// Every level, most verbose first.
    pub fn all_levels() -> &'static [Granularity; 5] {
        &RANKS
    }

    /// Whether a call site declared at `self` falls inside the band requested by `configured`.
    pub fn admitted_by(self, configured: Granularity) -> bool {
        !(self < configured)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Granularity::None => "none",
            Granularity::Service => "service",
            Granularity::Db => "db",
            Granularity::Api => "api",
            Granularity::All => "all",
        }
    }
}

impl PartialOrd for Granularity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Granularity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = TelemetryError;

    /// Case-sensitive match against `none|service|db|api|all`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Granularity::None),
            "service" => Ok(Granularity::Service),
            "db" => Ok(Granularity::Db),
            "api" => Ok(Granularity::Api),
            "all" => Ok(Granularity::All),
            other => Err(TelemetryError::InvalidConfiguration(format!(
                "unknown trace granularity '{}' (expected one of none, service, db, api, all)",
                other
            ))),
        }
    }
}

impl TryFrom<String> for Granularity {
    type Error = TelemetryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Granularity> for String {
    fn from(value: Granularity) -> Self {
        value.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_order() {
        let ranks: Vec<usize> = Granularity::all_levels().iter().map(|g| g.rank()).collect();
        assert_eq!(ranks, vec![0, 1, 2, 3, 4]);

        assert!(Granularity::All < Granularity::Db);
        assert!(Granularity::Db < Granularity::Service);
        assert!(Granularity::Service < Granularity::Api);
        assert!(Granularity::Api < Granularity::None);
        assert!(!(Granularity::All < Granularity::All));
    }

    #[test]
    fn test_order_is_not_lexical() {
        // "api" < "db" lexically, but API is the less verbose level
        assert!(Granularity::Db < Granularity::Api);
        assert!(Granularity::Service < Granularity::Api);
    }

    #[test]
    fn test_admission() {
        assert!(!Granularity::Db.admitted_by(Granularity::Service));
        assert!(!Granularity::Db.admitted_by(Granularity::Api));
        assert!(Granularity::All.admitted_by(Granularity::All));
        assert!(Granularity::Api.admitted_by(Granularity::Service));
        assert!(!Granularity::Api.admitted_by(Granularity::None));
    }

    #[test]
    fn test_parse_case_sensitive() {
        assert_eq!("db".parse::<Granularity>().unwrap(), Granularity::Db);
        assert_eq!("all".parse::<Granularity>().unwrap(), Granularity::All);
        assert!(matches!(
            "DB".parse::<Granularity>(),
            Err(TelemetryError::InvalidConfiguration(_))
        ));
        assert!("verbose".parse::<Granularity>().is_err());
    }

    #[test]
    fn test_string_round_trip() {
        for level in Granularity::all_levels() {
            let text: String = (*level).into();
            assert_eq!(Granularity::try_from(text).unwrap(), *level);
        }
    }
}
