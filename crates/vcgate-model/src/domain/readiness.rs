use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Whether the wrapped model is safe to invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Readiness {
    /// Model is still loading; conversions are refused.
    #[default]
    Loading,
    /// Model loaded and accepting work.
    Ready,
    /// Unrecoverable load or runtime fault. Terminal.
    Failed,
}

#[derive(Debug, Error)]
#[error("invalid readiness: {0} (expected: loading|ready|failed)")]
pub struct ReadinessParseError(String);

impl Readiness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Readiness::Loading => "loading",
            Readiness::Ready => "ready",
            Readiness::Failed => "failed",
        }
    }

    /// Returns `true` if moving from `self` to `next` is a legal transition.
    ///
    /// Loading -> Ready, Loading -> Failed and Ready -> Failed are the only ones.
    pub fn can_transition_to(&self, next: Readiness) -> bool {
        matches!(
            (self, next),
            (Readiness::Loading, Readiness::Ready)
                | (Readiness::Loading, Readiness::Failed)
                | (Readiness::Ready, Readiness::Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Readiness::Failed)
    }
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Readiness {
    type Err = ReadinessParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "loading" => Ok(Readiness::Loading),
            "ready" => Ok(Readiness::Ready),
            "failed" => Ok(Readiness::Failed),
            _ => Err(ReadinessParseError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transitions() {
        assert!(Readiness::Loading.can_transition_to(Readiness::Ready));
        assert!(Readiness::Loading.can_transition_to(Readiness::Failed));
        assert!(Readiness::Ready.can_transition_to(Readiness::Failed));

        assert!(!Readiness::Failed.can_transition_to(Readiness::Ready));
        assert!(!Readiness::Failed.can_transition_to(Readiness::Loading));
        assert!(!Readiness::Ready.can_transition_to(Readiness::Loading));
        assert!(!Readiness::Ready.can_transition_to(Readiness::Ready));
    }

    #[test]
    fn parse_and_display() {
        assert_eq!("Ready".parse::<Readiness>().unwrap(), Readiness::Ready);
        assert_eq!(Readiness::Failed.to_string(), "failed");
        assert!("booting".parse::<Readiness>().is_err());
    }
}
