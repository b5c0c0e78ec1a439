use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::time::Timestamp;

/// One index per dimension.
pub type Coord = SmallVec<[usize; 4]>;

/// Row-major linearization of a [`Coord`] (last dimension varies fastest).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FlatIndex(pub usize);

/// A semantic value along one dimension (a time, a height, a scenario label...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DimValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    #[serde(skip_deserializing)]
    Time(Timestamp),
    Object(serde_json::Value),
}

impl DimValue {
    /// Millisecond value for comparisons against a date-typed dimension.
    pub fn as_millis(&self) -> Option<i64> {
        match self {
            DimValue::Time(t) => Some(t.0),
            DimValue::Int(i) => Some(*i),
            DimValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<Timestamp> {
        match self {
            DimValue::Time(t) => Some(*t),
            _ => None,
        }
    }

    fn is_object(&self) -> bool {
        matches!(self, DimValue::Object(_))
    }

    /// Primitive equality; integers and floats compare numerically.
    fn primitive_eq(&self, other: &DimValue) -> bool {
        match (self, other) {
            (DimValue::Int(a), DimValue::Float(b)) | (DimValue::Float(b), DimValue::Int(a)) => {
                *a as f64 == *b
            }
            _ => self == other,
        }
    }
}

impl std::fmt::Display for DimValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DimValue::Bool(b) => write!(f, "{b}"),
            DimValue::Int(i) => write!(f, "{i}"),
            DimValue::Float(x) => write!(f, "{x}"),
            DimValue::Text(s) => write!(f, "{s:?}"),
            DimValue::Time(t) => write!(f, "t={}ms", t.0),
            DimValue::Object(v) => write!(f, "{v}"),
        }
    }
}

impl From<Timestamp> for DimValue {
    fn from(t: Timestamp) -> Self {
        DimValue::Time(t)
    }
}

impl From<i64> for DimValue {
    fn from(i: i64) -> Self {
        DimValue::Int(i)
    }
}

impl From<f64> for DimValue {
    fn from(x: f64) -> Self {
        DimValue::Float(x)
    }
}

impl From<&str> for DimValue {
    fn from(s: &str) -> Self {
        DimValue::Text(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ShapeError {
    IndexOutOfBounds { dim: usize, index: usize, size: usize },
    RankMismatch { expected: usize, actual: usize },
    FlatOutOfRange { flat: usize, size: usize },
    DimOutOfRange { dim: usize, ndim: usize },
    EmptyDimension { dim: usize },
    ValueNotFound { dim: usize, value: String },
    UnsupportedValueType { dim: usize },
}

impl std::fmt::Display for ShapeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShapeError::IndexOutOfBounds { dim, index, size } => {
                write!(f, "index {index} out of bounds for dimension {dim} (size {size})")
            }
            ShapeError::RankMismatch { expected, actual } => {
                write!(f, "expected {expected} components, got {actual}")
            }
            ShapeError::FlatOutOfRange { flat, size } => {
                write!(f, "flat index {flat} out of range (size {size})")
            }
            ShapeError::DimOutOfRange { dim, ndim } => {
                write!(f, "dimension {dim} does not exist (ndim {ndim})")
            }
            ShapeError::EmptyDimension { dim } => write!(f, "dimension {dim} has no values"),
            ShapeError::ValueNotFound { dim, value } => {
                write!(f, "value {value} not found in array dimension {dim}")
            }
            ShapeError::UnsupportedValueType { dim } => write!(
                f,
                "can't get index of object values (except timestamps) in dimension {dim}"
            ),
        }
    }
}

impl std::error::Error for ShapeError {}

/// The per-dimension value sequences of an N-dimensional layer grid.
///
/// Immutable once built; all index arithmetic of the layer cache goes
/// through here.
#[derive(Debug, Clone, PartialEq)]
pub struct DimShape {
    values: Vec<Vec<DimValue>>,
    dims: Vec<usize>,
    size: usize,
}

impl DimShape {
    pub fn new(values: Vec<Vec<DimValue>>) -> Result<Self, ShapeError> {
        if let Some(dim) = values.iter().position(|v| v.is_empty()) {
            return Err(ShapeError::EmptyDimension { dim });
        }
        let dims: Vec<usize> = values.iter().map(Vec::len).collect();
        let size = dims.iter().product();
        Ok(Self { values, dims, size })
    }

    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Number of cells (cache slots).
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn values(&self, dim: usize) -> Option<&[DimValue]> {
        self.values.get(dim).map(Vec::as_slice)
    }

    pub fn check_dim(&self, dim: usize) -> Result<(), ShapeError> {
        if dim < self.ndim() {
            Ok(())
        } else {
            Err(ShapeError::DimOutOfRange {
                dim,
                ndim: self.ndim(),
            })
        }
    }

    pub fn to_flat(&self, coord: &[usize]) -> Result<FlatIndex, ShapeError> {
        self.check_rank(coord.len())?;
        let mut flat = 0usize;
        for (dim, (&index, &size)) in coord.iter().zip(&self.dims).enumerate() {
            if index >= size {
                return Err(ShapeError::IndexOutOfBounds { dim, index, size });
            }
            flat = flat * size + index;
        }
        Ok(FlatIndex(flat))
    }

    pub fn to_coord(&self, flat: FlatIndex) -> Result<Coord, ShapeError> {
        if flat.0 >= self.size {
            return Err(ShapeError::FlatOutOfRange {
                flat: flat.0,
                size: self.size,
            });
        }
        let mut coord: Coord = smallvec::smallvec![0; self.ndim()];
        let mut rem = flat.0;
        for (dim, &size) in self.dims.iter().enumerate().rev() {
            coord[dim] = rem % size;
            rem /= size;
        }
        Ok(coord)
    }

    /// Locates semantic values along each dimension.
    ///
    /// Date-typed dimensions (first value is a timestamp) compare by
    /// millisecond value; everything else uses primitive equality. Object
    /// values cannot be compared and fail fast.
    pub fn value_to_coord(&self, values: &[DimValue]) -> Result<Coord, ShapeError> {
        self.check_rank(values.len())?;
        let mut coord = Coord::with_capacity(self.ndim());
        for (dim, (axis, value)) in self.values.iter().zip(values).enumerate() {
            let position = match axis.first() {
                Some(DimValue::Time(_)) => {
                    if value.is_object() {
                        return Err(ShapeError::UnsupportedValueType { dim });
                    }
                    value.as_millis().and_then(|ms| {
                        axis.iter().position(|candidate| candidate.as_millis() == Some(ms))
                    })
                }
                Some(DimValue::Object(_)) => return Err(ShapeError::UnsupportedValueType { dim }),
                _ => {
                    if value.is_object() {
                        return Err(ShapeError::UnsupportedValueType { dim });
                    }
                    axis.iter().position(|candidate| candidate.primitive_eq(value))
                }
            };
            let index = position.ok_or_else(|| ShapeError::ValueNotFound {
                dim,
                value: value.to_string(),
            })?;
            coord.push(index);
        }
        Ok(coord)
    }

    pub fn coord_to_value(&self, coord: &[usize]) -> Result<Vec<DimValue>, ShapeError> {
        self.to_flat(coord)?;
        Ok(coord
            .iter()
            .zip(&self.values)
            .map(|(&i, axis)| axis[i].clone())
            .collect())
    }

    /// Every coordinate in flat (row-major) order.
    pub fn coords(&self) -> impl Iterator<Item = Coord> + '_ {
        (0..self.size).filter_map(|flat| self.to_coord(FlatIndex(flat)).ok())
    }

    fn check_rank(&self, actual: usize) -> Result<(), ShapeError> {
        if actual != self.ndim() {
            return Err(ShapeError::RankMismatch {
                expected: self.ndim(),
                actual,
            });
        }
        Ok(())
    }
}
