use std::sync::Arc;

use foundation::shape::{Coord, ShapeError};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A loader's future rejected (or timed out) for `coord`.
///
/// Cloned to every waiter of the shared load.
#[derive(Debug, Clone)]
pub struct LoadFailure {
    pub coord: Coord,
    cause: Arc<dyn std::error::Error + Send + Sync>,
}

impl LoadFailure {
    pub fn new(coord: Coord, cause: BoxError) -> Self {
        Self {
            coord,
            cause: Arc::from(cause),
        }
    }

    pub fn cause(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.cause.as_ref()
    }
}

impl std::fmt::Display for LoadFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "failed to load layer at {:?}: {}",
            self.coord.as_slice(),
            self.cause
        )
    }
}

impl std::error::Error for LoadFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.cause.as_ref() as _)
    }
}

#[derive(Debug)]
pub struct LoadTimedOut(pub std::time::Duration);

impl std::fmt::Display for LoadTimedOut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "layer load timed out after {:?}", self.0)
    }
}

impl std::error::Error for LoadTimedOut {}

#[derive(Debug, Clone)]
pub enum ArrayError {
    Shape(ShapeError),
    /// The loader broke its contract (it failed instead of returning a future).
    ContractViolation { coord: Coord, reason: String },
    Load(LoadFailure),
}

impl std::fmt::Display for ArrayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArrayError::Shape(e) => write!(f, "{e}"),
            ArrayError::ContractViolation { coord, reason } => write!(
                f,
                "loader did not return a future for {:?}: {reason}",
                coord.as_slice()
            ),
            ArrayError::Load(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ArrayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ArrayError::Shape(e) => Some(e),
            ArrayError::ContractViolation { .. } => None,
            ArrayError::Load(e) => Some(e),
        }
    }
}

impl From<ShapeError> for ArrayError {
    fn from(e: ShapeError) -> Self {
        ArrayError::Shape(e)
    }
}

impl From<LoadFailure> for ArrayError {
    fn from(e: LoadFailure) -> Self {
        ArrayError::Load(e)
    }
}
