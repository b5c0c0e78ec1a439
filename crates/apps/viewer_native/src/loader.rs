use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use formats::geojson::TrajectoryCollection;
use formats::scenario::ScenarioMetadata;
use foundation::shape::DimValue;
use futures_util::FutureExt;
use layers::{Direction, Scenario, TrajectoryLayer, TrajectoryLayerOptions, VisibleSink};
use streaming::{BoxError, LayerFuture, LayerLoader};
use tracing::debug;

use crate::config::ScenarioEntry;

/// Builds scenarios from metadata and trajectory files on disk.
pub struct FsScenarioLoader {
    entries: HashMap<Vec<usize>, ScenarioEntry>,
    trail: TrajectoryLayerOptions,
    sink: Arc<dyn VisibleSink>,
    next_layer_id: Arc<AtomicU64>,
}

impl FsScenarioLoader {
    /// `trail` carries the duration and terminal-marker settings; the
    /// direction comes from each scenario's metadata.
    pub fn new(
        entries: &[ScenarioEntry],
        trail: TrajectoryLayerOptions,
        sink: Arc<dyn VisibleSink>,
    ) -> Self {
        Self {
            entries: entries
                .iter()
                .map(|e| (e.coord.clone(), e.clone()))
                .collect(),
            trail,
            sink,
            next_layer_id: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl LayerLoader<Scenario> for FsScenarioLoader {
    fn make_layer(&self, coord: &[usize], values: &[DimValue]) -> Result<LayerFuture<Scenario>, BoxError> {
        let entry = self.entries.get(coord).cloned();
        let coord = coord.to_vec();
        let fallback_label = values
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" / ");
        let trail = self.trail;
        let sink = self.sink.clone();
        let layer_id = self.next_layer_id.fetch_add(1, Ordering::Relaxed);

        Ok(async move {
            let entry = entry.ok_or_else(|| format!("no scenario configured at {coord:?}"))?;
            debug!(?coord, metadata = %entry.metadata.display(), "reading scenario");
            let meta = ScenarioMetadata::from_json_str(&read(&entry.metadata).await?)?;
            let data = TrajectoryCollection::from_geojson_str(&read(&entry.trajectories).await?)?;

            let options = TrajectoryLayerOptions {
                direction: Direction::from_fwd(meta.fwd),
                ..trail
            };
            let renderer = Arc::new(TrajectoryLayer::new(layer_id, data, options, sink));
            let mut scenario = Scenario::from_metadata(&meta, renderer);
            if scenario.label.is_empty() {
                scenario.label = fallback_label;
            }
            Ok::<_, BoxError>(scenario)
        }
        .boxed())
    }
}

async fn read(path: &Path) -> Result<String, BoxError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| format!("cannot read {}: {e}", path.display()).into())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use foundation::shape::DimValue;
    use layers::{Direction, TrajectoryLayerOptions};
    use streaming::LayerLoader;

    use super::FsScenarioLoader;
    use crate::config::ScenarioEntry;
    use crate::sinks::VisibleLog;

    fn assets() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("assets")
    }

    fn loader() -> FsScenarioLoader {
        let entries = vec![ScenarioEntry {
            coord: vec![0, 1],
            metadata: assets().join("reception.json"),
            trajectories: assets().join("reception.geojson"),
        }];
        FsScenarioLoader::new(
            &entries,
            TrajectoryLayerOptions::default(),
            Arc::new(VisibleLog::default()),
        )
    }

    #[tokio::test]
    async fn loads_a_backward_scenario_from_disk() {
        let scenario = loader()
            .make_layer(&[0, 1], &[DimValue::Int(0), DimValue::Int(1)])
            .unwrap()
            .await
            .unwrap();
        assert_eq!(scenario.direction, Direction::Backward);
        assert!(scenario.times.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(scenario.label, "Queens reception");
    }

    #[tokio::test]
    async fn unknown_cells_reject_instead_of_failing_synchronously() {
        let future = loader().make_layer(&[0, 0], &[DimValue::Int(0), DimValue::Int(0)]);
        let err = future.unwrap().await.unwrap_err();
        assert!(err.to_string().contains("no scenario configured"));
    }
}
