use std::sync::Arc;

use formats::geojson::{TrajectoryCollection, TrajectoryFeature};
use foundation::time::{TimeDuration, Timestamp};
use parking_lot::Mutex;
use runtime::event_bus::{TickEvent, TickKind, TickListener};
use serde_json::{Map, Value};
use tracing::trace;

use crate::layer::{Layer, LayerId};
use crate::simulations::ScenarioRenderer;
use crate::trajectory::{Direction, slice_feature, terminal_marker, window_for};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct TrajectoryLayerOptions {
    pub direction: Direction,
    /// Trailing window of forward runs; `None` shows everything since the
    /// origin.
    pub duration: Option<TimeDuration>,
    /// Add a `last = true` point at the head of every visible line.
    pub add_last_point: bool,
}

/// What one trajectory layer shows at one time.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VisibleSet {
    pub time: Option<Timestamp>,
    pub features: Vec<TrajectoryFeature>,
}

impl VisibleSet {
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn to_geojson_value(&self) -> Value {
        TrajectoryCollection {
            features: self.features.clone(),
        }
        .to_geojson_value()
    }
}

/// Receives the replacement of a layer's visible set.
///
/// `next` is `None` when nothing is visible any more.
pub trait VisibleSink: Send + Sync {
    fn on_visible_changed(
        &self,
        layer: LayerId,
        previous: Option<Arc<VisibleSet>>,
        next: Option<Arc<VisibleSet>>,
    );
}

/// Trajectories of one run, re-sliced on every committed clock tick.
pub struct TrajectoryLayer {
    id: LayerId,
    data: TrajectoryCollection,
    options: TrajectoryLayerOptions,
    dataset_max: Timestamp,
    current: Mutex<Option<Arc<VisibleSet>>>,
    sink: Arc<dyn VisibleSink>,
}

impl TrajectoryLayer {
    pub fn new(
        id: u64,
        data: TrajectoryCollection,
        options: TrajectoryLayerOptions,
        sink: Arc<dyn VisibleSink>,
    ) -> Self {
        let dataset_max = data.max_time().unwrap_or(Timestamp(i64::MAX));
        Self {
            id: LayerId(id),
            data,
            options,
            dataset_max,
            current: Mutex::new(None),
            sink,
        }
    }

    pub fn options(&self) -> &TrajectoryLayerOptions {
        &self.options
    }

    pub fn data(&self) -> &TrajectoryCollection {
        &self.data
    }

    /// Builds the visible set at `time` from scratch.
    pub fn extract_at(&self, time: Timestamp) -> VisibleSet {
        let window = window_for(
            self.options.direction,
            time,
            self.options.duration,
            self.dataset_max,
        );
        let mut features = Vec::new();
        for feature in &self.data.features {
            let Some(visible) = slice_feature(feature, window, self.options.direction) else {
                continue;
            };
            let marker = if self.options.add_last_point {
                terminal_marker(&visible)
            } else {
                None
            };
            features.push(visible);
            features.extend(marker);
        }
        VisibleSet {
            time: Some(time),
            features,
        }
    }

    /// Replaces the visible set with the one at `time`.
    pub fn update(&self, time: Timestamp) {
        let next = self.extract_at(time);
        let next = (!next.is_empty()).then(|| Arc::new(next));
        let previous = std::mem::replace(&mut *self.current.lock(), next.clone());
        trace!(
            layer = %self.id,
            time = time.millis(),
            features = next.as_ref().map_or(0, |s| s.features.len()),
            "trajectory layer updated"
        );
        self.sink.on_visible_changed(self.id, previous, next);
    }

    pub fn visible(&self) -> Option<Arc<VisibleSet>> {
        self.current.lock().clone()
    }

    /// Drops the visible set, e.g. when the layer stops being shown.
    pub fn clear(&self) {
        let previous = self.current.lock().take();
        if previous.is_some() {
            self.sink.on_visible_changed(self.id, previous, None);
        }
    }
}

impl Layer for TrajectoryLayer {
    fn id(&self) -> LayerId {
        self.id
    }
}

impl TickListener for TrajectoryLayer {
    fn on_tick(&self, event: &TickEvent) {
        if event.kind == TickKind::Committed {
            self.update(event.time);
        }
    }
}

impl ScenarioRenderer for TrajectoryLayer {
    fn clear(&self) {
        TrajectoryLayer::clear(self);
    }
}

/// Feature collection of several visible sets, for dumping.
pub fn merge_visible(sets: &[Arc<VisibleSet>]) -> Value {
    let features: Vec<Value> = sets
        .iter()
        .flat_map(|s| s.features.iter().map(TrajectoryFeature::to_geojson_value))
        .collect();
    let mut root = Map::new();
    root.insert("type".into(), Value::from("FeatureCollection"));
    root.insert("features".into(), Value::Array(features));
    Value::Object(root)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use formats::geojson::{TrajectoryCollection, TrajectoryGeometry};
    use foundation::time::{TimeDuration, Timestamp};
    use parking_lot::Mutex;
    use runtime::clock::Clock;
    use serde_json::json;

    use super::{TrajectoryLayer, TrajectoryLayerOptions, VisibleSet, VisibleSink, merge_visible};
    use crate::layer::{Layer, LayerId};
use crate::simulations::ScenarioRenderer;
    use crate::trajectory::Direction;

    #[derive(Default)]
    struct Swaps {
        log: Mutex<Vec<(bool, usize)>>,
    }

    impl VisibleSink for Swaps {
        fn on_visible_changed(
            &self,
            _layer: LayerId,
            previous: Option<Arc<VisibleSet>>,
            next: Option<Arc<VisibleSet>>,
        ) {
            self.log
                .lock()
                .push((previous.is_some(), next.map_or(0, |s| s.features.len())));
        }
    }

    fn data(times: [i64; 4]) -> TrajectoryCollection {
        TrajectoryCollection::from_geojson_value(&json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": {"times": times},
                    "geometry": {"type": "LineString", "coordinates": [[0, 0], [1, 1], [2, 2], [3, 3]]}
                },
                {
                    "type": "Feature",
                    "properties": {"name": "receptor"},
                    "geometry": {"type": "Point", "coordinates": [0, 0]}
                }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn forward_layer_grows_with_a_head_marker() {
        let sink = Arc::new(Swaps::default());
        let layer = TrajectoryLayer::new(
            1,
            data([0, 10, 20, 30]),
            TrajectoryLayerOptions {
                add_last_point: true,
                ..Default::default()
            },
            sink.clone(),
        );
        let set = layer.extract_at(Timestamp(15));
        assert_eq!(set.features.len(), 3);
        assert_eq!(
            set.features[0].geometry.points().len(),
            2,
            "points at 0 and 10 are visible"
        );
        assert_eq!(set.features[1].properties["last"], json!(true));
        assert!(matches!(set.features[2].geometry, TrajectoryGeometry::Point(_)));
        assert_eq!(layer.id(), LayerId(1));
    }

    #[test]
    fn trailing_duration_drops_old_points() {
        let layer = TrajectoryLayer::new(
            1,
            data([0, 10, 20, 30]),
            TrajectoryLayerOptions {
                duration: Some(TimeDuration::from_millis(10)),
                ..Default::default()
            },
            Arc::new(Swaps::default()),
        );
        let set = layer.extract_at(Timestamp(30));
        assert_eq!(set.features[0].times, Some(vec![Timestamp(30)]));
    }

    #[test]
    fn backward_layer_reaches_to_the_end_of_the_run() {
        let layer = TrajectoryLayer::new(
            2,
            data([30, 20, 10, 0]),
            TrajectoryLayerOptions {
                direction: Direction::Backward,
                ..Default::default()
            },
            Arc::new(Swaps::default()),
        );
        let set = layer.extract_at(Timestamp(20));
        assert_eq!(
            set.features[0].times,
            Some(vec![Timestamp(30), Timestamp(20)])
        );
    }

    #[test]
    fn committed_ticks_replace_the_visible_set() {
        let sink = Arc::new(Swaps::default());
        let layer = Arc::new(TrajectoryLayer::new(
            1,
            data([10, 20, 30, 40]),
            TrajectoryLayerOptions::default(),
            sink.clone(),
        ));
        let clock = Clock::new((0..5).map(|i| Timestamp(i * 10)).collect(), None);
        clock.subscribe(layer.clone());

        clock.set_current_index(2).unwrap();
        clock.set_current_index(3).unwrap();
        assert_eq!(*sink.log.lock(), vec![(false, 2), (true, 2)]);
        assert_eq!(layer.visible().unwrap().time, Some(Timestamp(30)));

        layer.clear();
        assert!(layer.visible().is_none());
        assert_eq!(sink.log.lock().last(), Some(&(true, 0)));

        let merged = merge_visible(&[Arc::new(layer.extract_at(Timestamp(40)))]);
        assert_eq!(merged["features"].as_array().map(Vec::len), Some(2));
    }
}
