//! Action outcome tokens

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Result of executing an action for one poll
///
/// The dispatcher maps `(state, outcome)` to the next state. What an outcome
/// means is decided per controller by its transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failed,
    Pending,
    Creating,
    Updating,
    Deleting,
    Running,
    Skipped,
    Imported,
    Suspended,
}

impl Outcome {
    pub const ALL: [Outcome; 10] = [
        Outcome::Success,
        Outcome::Failed,
        Outcome::Pending,
        Outcome::Creating,
        Outcome::Updating,
        Outcome::Deleting,
        Outcome::Running,
        Outcome::Skipped,
        Outcome::Imported,
        Outcome::Suspended,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failed => "failed",
            Outcome::Pending => "pending",
            Outcome::Creating => "creating",
            Outcome::Updating => "updating",
            Outcome::Deleting => "deleting",
            Outcome::Running => "running",
            Outcome::Skipped => "skipped",
            Outcome::Imported => "imported",
            Outcome::Suspended => "suspended",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Outcome::ALL
            .iter()
            .copied()
            .find(|o| o.as_str() == s)
            .ok_or_else(|| format!("unknown outcome: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_parse_back() {
        for outcome in Outcome::ALL {
            assert_eq!(outcome.as_str().parse::<Outcome>().unwrap(), outcome);
        }
        assert!("done".parse::<Outcome>().is_err());
    }
}
