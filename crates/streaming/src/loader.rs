use std::sync::Arc;

use foundation::shape::DimValue;
use futures_util::future::BoxFuture;

use crate::error::BoxError;

/// The pending result of one loader invocation.
pub type LayerFuture<L> = BoxFuture<'static, Result<L, BoxError>>;

/// Produces the layer for one cell of the grid.
///
/// Must hand back a future without doing the work synchronously; a
/// synchronous `Err` is treated as a contract violation. It is called while
/// the array's bookkeeping is locked, so it must not call back into the same
/// array before returning (the returned future may).
pub trait LayerLoader<L>: Send + Sync {
    fn make_layer(&self, coord: &[usize], values: &[DimValue]) -> Result<LayerFuture<L>, BoxError>;
}

/// Adapts a closure into a [`LayerLoader`].
pub struct FnLoader<F>(F);

pub fn loader_fn<L, F>(f: F) -> FnLoader<F>
where
    F: Fn(&[usize], &[DimValue]) -> Result<LayerFuture<L>, BoxError> + Send + Sync,
{
    FnLoader(f)
}

impl<L, F> LayerLoader<L> for FnLoader<F>
where
    F: Fn(&[usize], &[DimValue]) -> Result<LayerFuture<L>, BoxError> + Send + Sync,
{
    fn make_layer(&self, coord: &[usize], values: &[DimValue]) -> Result<LayerFuture<L>, BoxError> {
        (self.0)(coord, values)
    }
}

/// Mounts and unmounts layers in the visual scene.
pub trait RenderSink<L>: Send + Sync {
    fn on_layer_activated(&self, coord: &[usize], layer: &Arc<L>);
    fn on_layer_deactivated(&self, coord: &[usize], layer: &Arc<L>);
}

/// A sink for arrays nobody draws (preloading, tests).
#[derive(Debug, Default, Copy, Clone)]
pub struct NoopSink;

impl<L> RenderSink<L> for NoopSink {
    fn on_layer_activated(&self, _coord: &[usize], _layer: &Arc<L>) {}
    fn on_layer_deactivated(&self, _coord: &[usize], _layer: &Arc<L>) {}
}
