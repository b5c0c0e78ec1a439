use foundation::time::Timestamp;
use serde::{Deserialize, Serialize};

fn forward() -> bool {
    true
}

/// Metadata of one simulation run.
///
/// Backward (retrospective) runs list their times newest first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScenarioMetadata {
    pub times: Vec<Timestamp>,
    #[serde(default)]
    pub heights: Vec<f64>,
    #[serde(default = "forward")]
    pub fwd: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug)]
pub enum ScenarioError {
    Json(serde_json::Error),
    NoTimes,
}

impl std::fmt::Display for ScenarioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScenarioError::Json(e) => write!(f, "invalid scenario metadata: {e}"),
            ScenarioError::NoTimes => write!(f, "scenario metadata lists no times"),
        }
    }
}

impl std::error::Error for ScenarioError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScenarioError::Json(e) => Some(e),
            ScenarioError::NoTimes => None,
        }
    }
}

impl ScenarioMetadata {
    pub fn from_json_str(payload: &str) -> Result<Self, ScenarioError> {
        let meta: Self = serde_json::from_str(payload).map_err(ScenarioError::Json)?;
        if meta.times.is_empty() {
            return Err(ScenarioError::NoTimes);
        }
        Ok(meta)
    }

    /// Times in increasing order whatever the run direction.
    pub fn semantic_times(&self) -> Vec<Timestamp> {
        if self.fwd {
            self.times.clone()
        } else {
            self.times.iter().rev().copied().collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use foundation::time::Timestamp;
    use pretty_assertions::assert_eq;

    use super::{ScenarioError, ScenarioMetadata};

    #[test]
    fn backward_runs_reverse_their_times() {
        let meta = ScenarioMetadata::from_json_str(
            r#"{"times": ["2017-03-02T00:00:00Z", "2017-03-01T18:00:00Z", 1488326400000],
                "heights": [0, 500], "fwd": false, "label": "Queens (back)"}"#,
        )
        .unwrap();
        assert!(!meta.fwd);
        assert_eq!(meta.heights, vec![0.0, 500.0]);
        assert_eq!(
            meta.semantic_times(),
            vec![
                Timestamp(1_488_326_400_000),
                Timestamp(1_488_391_200_000),
                Timestamp(1_488_412_800_000),
            ]
        );
    }

    #[test]
    fn direction_defaults_to_forward() {
        let meta = ScenarioMetadata::from_json_str(r#"{"times": [1, 2]}"#).unwrap();
        assert!(meta.fwd);
        assert_eq!(meta.semantic_times(), meta.times);
        assert_eq!(meta.label, None);
    }

    #[test]
    fn empty_or_malformed_metadata_is_rejected() {
        assert!(matches!(
            ScenarioMetadata::from_json_str(r#"{"times": []}"#),
            Err(ScenarioError::NoTimes)
        ));
        assert!(matches!(
            ScenarioMetadata::from_json_str(r#"{"heights": [0]}"#),
            Err(ScenarioError::Json(_))
        ));
    }
}
