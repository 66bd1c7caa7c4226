use std::fmt;

use serde::{Deserialize, Serialize};

/// Class of a request.
///
/// Conversions run against the model and are serialized through the slot.
/// Health checks never touch the slot and are always admitted.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobKind {
    Conversion,
    Health,
}

impl JobKind {
    pub const ALL: [JobKind; 2] = [JobKind::Conversion, JobKind::Health];

    /// Returns a short symbolic identifier for logging, metrics and routing:
    /// - `"conversion"`
    /// - `"health"`
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Conversion => "conversion",
            JobKind::Health => "health",
        }
    }

    /// Whether jobs of this kind need the execution slot.
    pub fn needs_slot(&self) -> bool {
        matches!(self, JobKind::Conversion)
    }

    /// Whether jobs of this kind pass the readiness gate while the model is not ready.
    pub fn bypasses_readiness(&self) -> bool {
        matches!(self, JobKind::Health)
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
