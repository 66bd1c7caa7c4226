use serde::{Deserialize, Serialize};

use crate::JobId;

/// State of the single process-wide execution slot.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "state", content = "jobId")]
pub enum SlotState {
    /// Nothing is running against the model.
    #[default]
    Idle,
    /// The model is busy with the given job.
    Occupied(JobId),
}

impl SlotState {
    pub fn is_idle(&self) -> bool {
        matches!(self, SlotState::Idle)
    }

    /// Job currently holding the slot, if any.
    pub fn occupant(&self) -> Option<&JobId> {
        match self {
            SlotState::Idle => None,
            SlotState::Occupied(id) => Some(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn occupant_reports_job() {
        let id = JobId::from("job-7");
        let state = SlotState::Occupied(id.clone());
        assert!(!state.is_idle());
        assert_eq!(state.occupant(), Some(&id));
        assert_eq!(SlotState::default().occupant(), None);
    }

    #[test]
    fn serde_shape() {
        let json = serde_json::to_string(&SlotState::Occupied(JobId::from("j"))).unwrap();
        assert_eq!(json, r#"{"state":"occupied","jobId":"j"}"#);
        let json = serde_json::to_string(&SlotState::Idle).unwrap();
        assert_eq!(json, r#"{"state":"idle"}"#);
    }
}
