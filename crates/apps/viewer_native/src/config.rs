use std::path::{Path, PathBuf};
use std::time::Duration;

use foundation::shape::{DimShape, DimValue};
use foundation::time::{TimeDuration, Timestamp};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DimensionKind {
    #[default]
    Value,
    Time,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DimensionConfig {
    pub name: String,
    #[serde(default)]
    pub kind: DimensionKind,
    pub values: Vec<Value>,
}

/// Files backing one cell of the scenario grid.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioEntry {
    pub coord: Vec<usize>,
    pub metadata: PathBuf,
    pub trajectories: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerConfig {
    pub dimensions: Vec<DimensionConfig>,
    pub scenarios: Vec<ScenarioEntry>,
    /// ISO-8601 trailing window of forward runs, e.g. `PT6H`.
    #[serde(default)]
    pub trail_duration: Option<String>,
    #[serde(default)]
    pub add_last_point: bool,
    #[serde(default = "default_transition_ms")]
    pub transition_ms: u64,
    #[serde(default)]
    pub looping: bool,
    #[serde(default)]
    pub load_timeout_ms: Option<u64>,
    #[serde(default)]
    pub start: Vec<usize>,
}

fn default_transition_ms() -> u64 {
    1000
}

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Json(serde_json::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io { path, source } => write!(f, "cannot read {}: {source}", path.display()),
            ConfigError::Json(e) => write!(f, "invalid viewer config: {e}"),
            ConfigError::Invalid(reason) => write!(f, "invalid viewer config: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Json(e) => Some(e),
            ConfigError::Invalid(_) => None,
        }
    }
}

impl ViewerConfig {
    /// Reads the config; scenario paths are resolved against its directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let payload = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_json_str(&payload)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        for entry in &mut config.scenarios {
            entry.metadata = base.join(&entry.metadata);
            entry.trajectories = base.join(&entry.trajectories);
        }
        Ok(config)
    }

    pub fn from_json_str(payload: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(payload).map_err(ConfigError::Json)?;
        if config.transition_ms == 0 {
            return Err(ConfigError::Invalid("transitionMs must be positive".into()));
        }
        Ok(config)
    }

    pub fn shape(&self) -> Result<DimShape, ConfigError> {
        let values = self
            .dimensions
            .iter()
            .map(|dim| {
                dim.values
                    .iter()
                    .map(|v| dimension_value(dim, v))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;
        DimShape::new(values).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn trail_duration(&self) -> Result<Option<TimeDuration>, ConfigError> {
        self.trail_duration
            .as_deref()
            .map(TimeDuration::parse_iso8601)
            .transpose()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn transition(&self) -> Duration {
        Duration::from_millis(self.transition_ms)
    }

    pub fn load_timeout(&self) -> Option<Duration> {
        self.load_timeout_ms.map(Duration::from_millis)
    }

    /// Starting coordinate, zero-padded to the number of dimensions.
    pub fn start_coord(&self) -> Vec<usize> {
        let mut coord = self.start.clone();
        coord.resize(self.dimensions.len(), 0);
        coord
    }
}

fn dimension_value(dim: &DimensionConfig, value: &Value) -> Result<DimValue, ConfigError> {
    let parsed = match dim.kind {
        DimensionKind::Value => serde_json::from_value::<DimValue>(value.clone()).map_err(ConfigError::Json),
        DimensionKind::Time => serde_json::from_value::<Timestamp>(value.clone())
            .map(DimValue::Time)
            .map_err(ConfigError::Json),
    }?;
    if matches!(parsed, DimValue::Object(_)) {
        return Err(ConfigError::Invalid(format!(
            "dimension {} has a non-primitive value {value}",
            dim.name
        )));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use foundation::shape::DimValue;
    use foundation::time::{TimeDuration, Timestamp};

    use super::{ConfigError, ViewerConfig};

    const CONFIG: &str = r#"{
        "dimensions": [
            {"name": "date", "kind": "time", "values": ["2017-03-01T00:00:00Z"]},
            {"name": "run", "values": ["release", "reception"]}
        ],
        "scenarios": [
            {"coord": [0, 0], "metadata": "a.json", "trajectories": "a.geojson"}
        ],
        "trailDuration": "PT2H",
        "addLastPoint": true,
        "start": [0]
    }"#;

    #[test]
    fn parses_dimensions_and_defaults() {
        let config = ViewerConfig::from_json_str(CONFIG).unwrap();
        let shape = config.shape().unwrap();
        assert_eq!(shape.dims(), &[1, 2]);
        assert_eq!(
            shape.values(0).unwrap()[0],
            DimValue::Time(Timestamp(1_488_326_400_000))
        );
        assert_eq!(
            config.trail_duration().unwrap(),
            Some(TimeDuration::from_hours(2))
        );
        assert_eq!(config.transition_ms, 1000);
        assert_eq!(config.start_coord(), vec![0, 0]);
        assert!(config.load_timeout().is_none());
    }

    #[test]
    fn rejects_object_dimension_values() {
        let config = ViewerConfig::from_json_str(
            r#"{"dimensions": [{"name": "x", "values": [{"a": 1}]}], "scenarios": []}"#,
        )
        .unwrap();
        assert!(matches!(config.shape(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_a_zero_transition() {
        let err = ViewerConfig::from_json_str(
            r#"{"dimensions": [], "scenarios": [], "transitionMs": 0}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
