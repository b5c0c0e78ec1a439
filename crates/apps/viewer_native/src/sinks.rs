use std::collections::BTreeMap;
use std::sync::Arc;

use layers::{LayerId, Scenario, VisibleSet, VisibleSink};
use parking_lot::Mutex;
use streaming::RenderSink;
use tracing::info;

/// Stands in for the map: logs scenario mounts.
#[derive(Debug, Default)]
pub struct ScenarioMountLog;

impl RenderSink<Scenario> for ScenarioMountLog {
    fn on_layer_activated(&self, coord: &[usize], layer: &Arc<Scenario>) {
        info!(?coord, label = %layer.label, "scenario shown");
    }

    fn on_layer_deactivated(&self, coord: &[usize], layer: &Arc<Scenario>) {
        info!(?coord, label = %layer.label, "scenario hidden");
    }
}

/// Logs every visible-set swap and remembers the latest set per layer.
#[derive(Default)]
pub struct VisibleLog {
    latest: Mutex<BTreeMap<u64, Arc<VisibleSet>>>,
}

impl VisibleLog {
    pub fn latest(&self) -> Vec<Arc<VisibleSet>> {
        self.latest.lock().values().cloned().collect()
    }
}

impl VisibleSink for VisibleLog {
    fn on_visible_changed(
        &self,
        layer: LayerId,
        _previous: Option<Arc<VisibleSet>>,
        next: Option<Arc<VisibleSet>>,
    ) {
        let mut latest = self.latest.lock();
        match next {
            Some(set) => {
                let points: usize = set
                    .features
                    .iter()
                    .map(|f| f.geometry.points().len())
                    .sum();
                info!(
                    %layer,
                    time = set.time.map(|t| t.millis()),
                    features = set.features.len(),
                    points,
                    "trajectories"
                );
                latest.insert(layer.0, set);
            }
            None => {
                info!(%layer, "no trajectory visible");
                latest.remove(&layer.0);
            }
        }
    }
}
