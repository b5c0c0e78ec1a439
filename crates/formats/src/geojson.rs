use foundation::time::Timestamp;
use serde_json::{Map, Value};

/// Properties that may carry per-point times, in lookup order.
pub const TIME_PROPERTIES: [&str; 3] = ["times", "time", "linestringTimestamps"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lon_deg: f64,
    pub lat_deg: f64,
}

impl GeoPoint {
    pub fn new(lon_deg: f64, lat_deg: f64) -> Self {
        Self { lon_deg, lat_deg }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrajectoryGeometry {
    Point(GeoPoint),
    MultiPoint(Vec<GeoPoint>),
    LineString(Vec<GeoPoint>),
}

impl TrajectoryGeometry {
    pub fn points(&self) -> &[GeoPoint] {
        match self {
            TrajectoryGeometry::Point(p) => std::slice::from_ref(p),
            TrajectoryGeometry::MultiPoint(ps) | TrajectoryGeometry::LineString(ps) => ps,
        }
    }
}

/// One trajectory feature.
///
/// `times` holds the per-point times in storage order, or `None` for a
/// static feature.
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryFeature {
    pub id: Option<String>,
    pub properties: Map<String, Value>,
    pub geometry: TrajectoryGeometry,
    pub times: Option<Vec<Timestamp>>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrajectoryCollection {
    pub features: Vec<TrajectoryFeature>,
}

#[derive(Debug)]
pub enum GeoJsonError {
    NotAFeatureCollection,
    InvalidFeature { index: usize, reason: String },
}

impl std::fmt::Display for GeoJsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeoJsonError::NotAFeatureCollection => {
                write!(f, "expected GeoJSON FeatureCollection")
            }
            GeoJsonError::InvalidFeature { index, reason } => {
                write!(f, "invalid feature at index {index}: {reason}")
            }
        }
    }
}

impl std::error::Error for GeoJsonError {}

impl TrajectoryCollection {
    pub fn from_geojson_str(payload: &str) -> Result<Self, GeoJsonError> {
        let value: Value =
            serde_json::from_str(payload).map_err(|e| GeoJsonError::InvalidFeature {
                index: 0,
                reason: format!("JSON parse error: {e}"),
            })?;
        Self::from_geojson_value(&value)
    }

    pub fn from_geojson_value(value: &Value) -> Result<Self, GeoJsonError> {
        let obj = value.as_object().ok_or(GeoJsonError::NotAFeatureCollection)?;
        if obj.get("type").and_then(Value::as_str) != Some("FeatureCollection") {
            return Err(GeoJsonError::NotAFeatureCollection);
        }
        let features_val = obj
            .get("features")
            .and_then(Value::as_array)
            .ok_or(GeoJsonError::NotAFeatureCollection)?;

        let features = features_val
            .iter()
            .enumerate()
            .map(|(index, v)| {
                TrajectoryFeature::from_geojson_value(v)
                    .map_err(|reason| GeoJsonError::InvalidFeature { index, reason })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { features })
    }

    pub fn to_geojson_value(&self) -> Value {
        let mut root = Map::new();
        root.insert("type".into(), Value::from("FeatureCollection"));
        root.insert(
            "features".into(),
            Value::Array(
                self.features
                    .iter()
                    .map(TrajectoryFeature::to_geojson_value)
                    .collect(),
            ),
        );
        Value::Object(root)
    }

    pub fn to_geojson_string_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.to_geojson_value())
    }

    /// Largest time of any feature.
    pub fn max_time(&self) -> Option<Timestamp> {
        self.features
            .iter()
            .filter_map(|f| f.times.as_ref())
            .flatten()
            .copied()
            .max()
    }
}

impl TrajectoryFeature {
    fn from_geojson_value(value: &Value) -> Result<Self, String> {
        let obj = value.as_object().ok_or("feature must be an object")?;
        match obj.get("type").and_then(Value::as_str) {
            Some("Feature") => {}
            Some(other) => return Err(format!("unexpected feature type: {other}")),
            None => return Err("feature missing type".to_string()),
        }

        let id = match obj.get("id") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        let properties = obj
            .get("properties")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let geometry = parse_geometry(obj.get("geometry").ok_or("feature missing geometry")?)?;

        let times = match TIME_PROPERTIES.iter().find_map(|k| properties.get(*k)) {
            Some(v) => Some(parse_times(v)?),
            None => None,
        };
        if let (Some(times), TrajectoryGeometry::MultiPoint(_) | TrajectoryGeometry::LineString(_)) =
            (&times, &geometry)
        {
            let n = geometry.points().len();
            if times.len() != n {
                return Err(format!("{} times for {n} points", times.len()));
            }
        }

        Ok(Self {
            id,
            properties,
            geometry,
            times,
        })
    }

    /// Emits the feature as GeoJSON. Times stay in the properties they were
    /// read from.
    pub fn to_geojson_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("type".into(), Value::from("Feature"));
        if let Some(id) = &self.id {
            obj.insert("id".into(), Value::from(id.as_str()));
        }
        obj.insert("properties".into(), Value::Object(self.properties.clone()));
        obj.insert("geometry".into(), geometry_to_geojson_value(&self.geometry));
        Value::Object(obj)
    }

    /// Copy with new geometry and times, keeping id and properties.
    ///
    /// The time property is rewritten so the emitted feature stays
    /// consistent with its points.
    pub fn with_geometry(&self, geometry: TrajectoryGeometry, times: Option<Vec<Timestamp>>) -> Self {
        let mut properties = self.properties.clone();
        if let Some(times) = &times {
            if let Some(key) = TIME_PROPERTIES.iter().find(|k| properties.contains_key(**k)) {
                let value = match (&geometry, times.as_slice()) {
                    (TrajectoryGeometry::Point(_), [t]) => Value::from(t.millis()),
                    _ => Value::Array(times.iter().map(|t| Value::from(t.millis())).collect()),
                };
                properties.insert((*key).to_string(), value);
            }
        }
        Self {
            id: self.id.clone(),
            properties,
            geometry,
            times,
        }
    }
}

fn parse_times(value: &Value) -> Result<Vec<Timestamp>, String> {
    match value {
        Value::Array(items) => items.iter().map(parse_time).collect(),
        single => Ok(vec![parse_time(single)?]),
    }
}

fn parse_time(value: &Value) -> Result<Timestamp, String> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .map(Timestamp)
            .ok_or_else(|| format!("time {n} is not representable")),
        Value::String(s) => Timestamp::parse_utc(s).map_err(|e| e.to_string()),
        other => Err(format!("time must be a number or string, got {other}")),
    }
}

fn geometry_to_geojson_value(geom: &TrajectoryGeometry) -> Value {
    let (ty, coordinates) = match geom {
        TrajectoryGeometry::Point(p) => ("Point", point_coords(p)),
        TrajectoryGeometry::MultiPoint(ps) => {
            ("MultiPoint", Value::Array(ps.iter().map(point_coords).collect()))
        }
        TrajectoryGeometry::LineString(ps) => {
            ("LineString", Value::Array(ps.iter().map(point_coords).collect()))
        }
    };
    let mut obj = Map::new();
    obj.insert("type".into(), Value::from(ty));
    obj.insert("coordinates".into(), coordinates);
    Value::Object(obj)
}

fn point_coords(p: &GeoPoint) -> Value {
    Value::Array(vec![Value::from(p.lon_deg), Value::from(p.lat_deg)])
}

fn parse_geometry(value: &Value) -> Result<TrajectoryGeometry, String> {
    let obj = value.as_object().ok_or("geometry must be an object")?;
    let ty = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or("geometry missing type")?;
    let coords = obj
        .get("coordinates")
        .ok_or("geometry missing coordinates")?;

    match ty {
        "Point" => Ok(TrajectoryGeometry::Point(parse_point(coords)?)),
        "MultiPoint" => Ok(TrajectoryGeometry::MultiPoint(parse_points(coords)?)),
        "LineString" => Ok(TrajectoryGeometry::LineString(parse_points(coords)?)),
        other => Err(format!("unsupported geometry type: {other}")),
    }
}

fn parse_point(coords: &Value) -> Result<GeoPoint, String> {
    let arr = coords
        .as_array()
        .ok_or("Point coordinates must be an array")?;
    if arr.len() < 2 {
        return Err("Point coordinates must have [lon, lat]".to_string());
    }
    let lon = arr[0].as_f64().ok_or("Point lon must be a number")?;
    let lat = arr[1].as_f64().ok_or("Point lat must be a number")?;
    Ok(GeoPoint::new(lon, lat))
}

fn parse_points(coords: &Value) -> Result<Vec<GeoPoint>, String> {
    coords
        .as_array()
        .ok_or("coordinates must be an array")?
        .iter()
        .map(parse_point)
        .collect()
}

#[cfg(test)]
mod tests {
    use foundation::time::Timestamp;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::{GeoJsonError, GeoPoint, TrajectoryCollection, TrajectoryGeometry};

    fn collection() -> serde_json::Value {
        json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "id": 7,
                    "properties": {"linestringTimestamps": [0, 3600000, 7200000], "height": 10},
                    "geometry": {"type": "LineString", "coordinates": [[-73.9, 40.7], [-74.0, 40.8], [-74.2, 41.0]]}
                },
                {
                    "type": "Feature",
                    "properties": {"time": "2017-03-01T06:00:00Z"},
                    "geometry": {"type": "Point", "coordinates": [-73.9, 40.7]}
                },
                {
                    "type": "Feature",
                    "properties": {"name": "site"},
                    "geometry": {"type": "Point", "coordinates": [-73.8, 40.6]}
                }
            ]
        })
    }

    #[test]
    fn reads_times_from_known_properties() {
        let parsed = TrajectoryCollection::from_geojson_value(&collection()).unwrap();
        assert_eq!(parsed.features.len(), 3);
        assert_eq!(parsed.features[0].id.as_deref(), Some("7"));
        assert_eq!(
            parsed.features[0].times,
            Some(vec![Timestamp(0), Timestamp(3_600_000), Timestamp(7_200_000)])
        );
        assert_eq!(
            parsed.features[1].times,
            Some(vec![Timestamp(1_488_348_000_000)])
        );
        assert_eq!(parsed.features[2].times, None);
        assert_eq!(parsed.max_time(), Some(Timestamp(1_488_348_000_000)));
    }

    #[test]
    fn emitted_geojson_parses_back_to_the_same_features() {
        let parsed = TrajectoryCollection::from_geojson_value(&collection()).unwrap();
        let again = TrajectoryCollection::from_geojson_value(&parsed.to_geojson_value()).unwrap();
        assert_eq!(again, parsed);
    }

    #[test]
    fn with_geometry_rewrites_the_time_property() {
        let parsed = TrajectoryCollection::from_geojson_value(&collection()).unwrap();
        let line = &parsed.features[0];
        let head = line.with_geometry(
            TrajectoryGeometry::LineString(vec![GeoPoint::new(-73.9, 40.7)]),
            Some(vec![Timestamp(0)]),
        );
        assert_eq!(head.properties["linestringTimestamps"], json!([0]));
        assert_eq!(head.properties["height"], json!(10));
        assert_eq!(head.id, line.id);
    }

    #[test]
    fn rejects_mismatched_times_and_unsupported_geometry() {
        let bad_times = json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {"times": [0]},
                "geometry": {"type": "MultiPoint", "coordinates": [[0, 0], [1, 1]]}
            }]
        });
        assert!(matches!(
            TrajectoryCollection::from_geojson_value(&bad_times),
            Err(GeoJsonError::InvalidFeature { index: 0, .. })
        ));

        let polygon = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","properties":{},"geometry":{"type":"Polygon","coordinates":[]}}]}"#;
        let err = TrajectoryCollection::from_geojson_str(polygon).unwrap_err();
        assert!(err.to_string().contains("unsupported geometry type: Polygon"));

        assert!(matches!(
            TrajectoryCollection::from_geojson_str(r#"{"type":"Feature"}"#),
            Err(GeoJsonError::NotAFeatureCollection)
        ));
    }
}
