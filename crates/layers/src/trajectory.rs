//! Time-window slicing of trajectory paths.
//!
//! Forward runs reveal a path growing from its origin as time advances,
//! keeping an optional trailing duration. Backward (retrospective) runs show
//! everything from the current time up to the end of the run, so the path
//! grows toward its origin as the clock moves back.

use std::ops::Range;

use formats::geojson::{TrajectoryFeature, TrajectoryGeometry};
use foundation::time::{TimeDuration, TimeWindow, Timestamp};
use serde_json::Value;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

impl Direction {
    pub fn from_fwd(fwd: bool) -> Self {
        if fwd {
            Direction::Forward
        } else {
            Direction::Backward
        }
    }

    pub fn is_forward(self) -> bool {
        self == Direction::Forward
    }
}

/// The window shown at `current`.
///
/// `dataset_max` is only used by backward runs, whose window always reaches
/// the end of the run.
pub fn window_for(
    direction: Direction,
    current: Timestamp,
    duration: Option<TimeDuration>,
    dataset_max: Timestamp,
) -> TimeWindow {
    match direction {
        Direction::Forward => TimeWindow::trailing(current, duration),
        Direction::Backward => TimeWindow::retrospective(current, dataset_max),
    }
}

/// Range of `times` visible in `window`, or `None` when the path lies
/// entirely outside it.
///
/// `times` is in storage order: increasing for forward runs, decreasing for
/// backward ones. Forward paths enter the window strictly after `min`;
/// backward paths include the point at `max`.
pub fn visible_range(
    times: &[Timestamp],
    window: TimeWindow,
    direction: Direction,
) -> Option<Range<usize>> {
    let (Some(&first), Some(&last)) = (times.first(), times.last()) else {
        return Some(0..0);
    };
    let TimeWindow { min, max } = window;

    let mut index_min = None;
    let mut index_max = None;
    match direction {
        Direction::Forward => {
            if first > max || last < min {
                return None;
            }
            if last > min {
                for (i, &t) in times.iter().enumerate() {
                    if index_min.is_none() && t > min {
                        index_min = Some(i);
                    }
                    if t > max {
                        index_max = Some(i);
                        break;
                    }
                }
            }
        }
        Direction::Backward => {
            if last > max || first < min {
                return None;
            }
            if last < max {
                for (i, &t) in times.iter().enumerate() {
                    if index_min.is_none() && t <= max {
                        index_min = Some(i);
                    }
                    if t < min {
                        index_max = Some(i);
                        break;
                    }
                }
            }
        }
    }

    let start = index_min.unwrap_or(0);
    let end = index_max.unwrap_or(times.len());
    Some(start..end.max(start))
}

/// The visible part of `feature`, or `None` if nothing of it is visible.
///
/// Features without times are static and pass through unchanged. A `Point`
/// is shown whole as long as its time is not rejected.
pub fn slice_feature(
    feature: &TrajectoryFeature,
    window: TimeWindow,
    direction: Direction,
) -> Option<TrajectoryFeature> {
    let times = match &feature.times {
        Some(times) if !times.is_empty() => times,
        _ => return Some(feature.clone()),
    };
    let range = visible_range(times, window, direction)?;

    let sliced = match &feature.geometry {
        TrajectoryGeometry::Point(_) => return Some(feature.clone()),
        TrajectoryGeometry::MultiPoint(ps) => TrajectoryGeometry::MultiPoint(ps[range.clone()].to_vec()),
        TrajectoryGeometry::LineString(ps) => TrajectoryGeometry::LineString(ps[range.clone()].to_vec()),
    };
    Some(feature.with_geometry(sliced, Some(times[range].to_vec())))
}

/// Standalone point at the end of a sliced line, flagged `last = true`.
pub fn terminal_marker(feature: &TrajectoryFeature) -> Option<TrajectoryFeature> {
    let TrajectoryGeometry::LineString(ps) = &feature.geometry else {
        return None;
    };
    let end = *ps.last()?;
    let times = feature
        .times
        .as_ref()
        .and_then(|ts| ts.last())
        .map(|&t| vec![t]);
    let mut marker = feature.with_geometry(TrajectoryGeometry::Point(end), times);
    marker.properties.insert("last".into(), Value::Bool(true));
    Some(marker)
}

#[cfg(test)]
mod tests {
    use formats::geojson::{GeoPoint, TrajectoryFeature, TrajectoryGeometry};
    use foundation::time::{TimeDuration, TimeWindow, Timestamp};
    use serde_json::{Map, json};

    use super::{Direction, slice_feature, terminal_marker, visible_range, window_for};

    fn ts(v: &[i64]) -> Vec<Timestamp> {
        v.iter().copied().map(Timestamp).collect()
    }

    fn window(min: i64, max: i64) -> TimeWindow {
        TimeWindow::new(Timestamp(min), Timestamp(max))
    }

    fn line(times: &[i64]) -> TrajectoryFeature {
        let points = (0..times.len())
            .map(|i| GeoPoint::new(i as f64, -(i as f64)))
            .collect();
        let mut properties = Map::new();
        properties.insert("times".into(), json!(times));
        TrajectoryFeature {
            id: Some("run".into()),
            properties,
            geometry: TrajectoryGeometry::LineString(points),
            times: Some(ts(times)),
        }
    }

    #[test]
    fn forward_slice_starts_strictly_after_min() {
        let range = visible_range(&ts(&[0, 10, 20, 30]), window(10, 25), Direction::Forward);
        assert_eq!(range, Some(2..3));
    }

    #[test]
    fn paths_outside_the_window_are_rejected() {
        assert_eq!(
            visible_range(&ts(&[10, 20, 30]), window(40, 50), Direction::Forward),
            None
        );
        assert_eq!(
            visible_range(&ts(&[30, 20, 10]), window(0, 5), Direction::Backward),
            None
        );
    }

    #[test]
    fn backward_slice_includes_the_boundary_point() {
        // Runs stored newest first.
        assert_eq!(
            visible_range(&ts(&[30, 20, 10]), window(5, 30), Direction::Backward),
            Some(0..3)
        );
        assert_eq!(
            visible_range(&ts(&[30, 20, 10]), window(20, 40), Direction::Backward),
            Some(0..2)
        );
        assert_eq!(
            visible_range(&ts(&[30, 20, 10]), window(21, 40), Direction::Backward),
            Some(0..1)
        );
    }

    #[test]
    fn unbounded_forward_window_reveals_from_origin() {
        let w = window_for(Direction::Forward, Timestamp(20), None, Timestamp(0));
        assert_eq!(
            visible_range(&ts(&[0, 10, 20, 30]), w, Direction::Forward),
            Some(0..3)
        );

        let trailing = window_for(
            Direction::Forward,
            Timestamp(30),
            Some(TimeDuration::from_millis(15)),
            Timestamp(0),
        );
        assert_eq!(trailing, window(15, 30));
        assert_eq!(
            visible_range(&ts(&[0, 10, 20, 30]), trailing, Direction::Forward),
            Some(2..4)
        );
    }

    #[test]
    fn backward_window_reaches_the_end_of_the_run() {
        let w = window_for(Direction::Backward, Timestamp(10), None, Timestamp(30));
        assert_eq!(w, window(10, 30));
    }

    #[test]
    fn slicing_keeps_points_and_times_aligned() {
        let sliced = slice_feature(&line(&[0, 10, 20, 30]), window(5, 25), Direction::Forward).unwrap();
        assert_eq!(sliced.times, Some(ts(&[10, 20])));
        assert_eq!(
            sliced.geometry,
            TrajectoryGeometry::LineString(vec![GeoPoint::new(1.0, -1.0), GeoPoint::new(2.0, -2.0)])
        );
        assert_eq!(sliced.properties["times"], json!([10, 20]));
        assert_eq!(sliced.id.as_deref(), Some("run"));

        assert!(slice_feature(&line(&[40, 50]), window(5, 25), Direction::Forward).is_none());
    }

    #[test]
    fn static_features_pass_through() {
        let mut feature = line(&[0, 1]);
        feature.times = None;
        assert_eq!(
            slice_feature(&feature, window(100, 200), Direction::Forward),
            Some(feature)
        );
    }

    #[test]
    fn terminal_marker_flags_the_last_visible_point() {
        let sliced = slice_feature(&line(&[0, 10, 20]), window(-5, 10), Direction::Forward).unwrap();
        let marker = terminal_marker(&sliced).unwrap();
        assert_eq!(marker.geometry, TrajectoryGeometry::Point(GeoPoint::new(1.0, -1.0)));
        assert_eq!(marker.properties["last"], json!(true));
        assert_eq!(marker.times, Some(ts(&[10])));

        let empty = slice_feature(&line(&[0, 10, 20]), window(-5, -1), Direction::Forward);
        assert!(empty.is_none());
        let head = slice_feature(&line(&[0, 10]), window(0, 0), Direction::Forward).unwrap();
        assert!(terminal_marker(&head).is_none());
    }
}
