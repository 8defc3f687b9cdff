use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Risk indicator supplied by an external scoring collaborator.
///
/// Scores are metadata: they are attached after sealing and are never part
/// of the hash input, so the ledger stays correct when the scorer is slow
/// or unavailable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawFraudScore")]
pub struct FraudScore {
    score: u8,
    pub reason: Option<String>,
}

impl FraudScore {
    pub const MAX: u8 = 100;

    /// Create a score, rejecting values above 100.
    pub fn new(score: u8, reason: Option<String>) -> Result<Self, TypeError> {
        if score > Self::MAX {
            return Err(TypeError::InvalidFraudScore(u16::from(score)));
        }
        Ok(Self { score, reason })
    }

    pub fn score(&self) -> u8 {
        self.score
    }
}

#[derive(Deserialize)]
struct RawFraudScore {
    score: u8,
    reason: Option<String>,
}

impl TryFrom<RawFraudScore> for FraudScore {
    type Error = TypeError;

    fn try_from(raw: RawFraudScore) -> Result<Self, Self::Error> {
        Self::new(raw.score, raw.reason)
    }
}
