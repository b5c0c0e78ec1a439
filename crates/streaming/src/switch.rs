use std::sync::Arc;

use foundation::shape::{Coord, DimValue};
use smallvec::smallvec;
use tracing::{debug, info};

use crate::error::ArrayError;
use crate::layer_array::{Inner, LayerArray};

/// Where the array's view-switch protocol currently stands.
///
/// With overlapping switches, `Committing` wins over `AwaitingTarget`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SwitchPhase {
    Idle,
    /// At least one switch waits for its target and the in-flight barrier.
    AwaitingTarget,
    /// A switch is clearing the visible group and activating its target.
    Committing,
}

struct Awaiting<'a, L>(&'a Inner<L>);

impl<'a, L> Awaiting<'a, L> {
    fn enter(inner: &'a Inner<L>) -> Self {
        inner.state.lock().awaiting_switches += 1;
        Self(inner)
    }
}

impl<L> Drop for Awaiting<'_, L> {
    fn drop(&mut self) {
        self.0.state.lock().awaiting_switches -= 1;
    }
}

struct Committing<'a, L>(&'a Inner<L>);

impl<'a, L> Committing<'a, L> {
    fn enter(inner: &'a Inner<L>) -> Self {
        inner.state.lock().committing = true;
        Self(inner)
    }
}

impl<L> Drop for Committing<'_, L> {
    fn drop(&mut self) {
        self.0.state.lock().committing = false;
    }
}

impl<L: Send + Sync + 'static> LayerArray<L> {
    pub fn switch_phase(&self) -> SwitchPhase {
        let state = self.inner.state.lock();
        if state.committing {
            SwitchPhase::Committing
        } else if state.awaiting_switches > 0 {
            SwitchPhase::AwaitingTarget
        } else {
            SwitchPhase::Idle
        }
    }

    /// Makes `target` the only visible layer.
    ///
    /// Waits for the target and for every load in flight when the switch
    /// starts, then clears the visible group and activates the target. If
    /// the target fails to load nothing is committed. Overlapping switches
    /// all run to completion; the one committing last decides what is shown.
    pub async fn switch_to_index(&self, target: &[usize]) -> Result<Arc<L>, ArrayError> {
        let flat = self.inner.shape.to_flat(target)?;
        let load = self.load_index(target)?;
        let barrier = self.pending_all();

        let layer = {
            let _awaiting = Awaiting::enter(&self.inner);
            let (layer, ()) = futures_util::join!(load, barrier);
            layer?
        };

        let _serial = self.inner.commit_lock.lock().await;
        let _committing = Committing::enter(&self.inner);
        let cleared: Vec<(Coord, Arc<L>)> = {
            let mut state = self.inner.state.lock();
            let previous = std::mem::take(&mut state.visible);
            state.visible.push(flat);
            state.active = Some(Coord::from_slice(target));
            previous
                .into_iter()
                .filter_map(|f| {
                    let coord = self.inner.shape.to_coord(f).ok()?;
                    state.ready_layer(f).map(|layer| (coord, layer))
                })
                .collect()
        };

        for (coord, old) in &cleared {
            self.inner.sink.on_layer_deactivated(coord, old);
        }
        self.inner.sink.on_layer_activated(target, &layer);
        self.inner.stats.record_commit();
        info!(target = ?target, cleared = cleared.len(), "switched view");
        Ok(layer)
    }

    /// Switches along one dimension, keeping the other components of the
    /// active index (all zeros before the first switch).
    pub async fn switch_dim(&self, dim: usize, index: usize) -> Result<Arc<L>, ArrayError> {
        self.inner.shape.check_dim(dim)?;
        let mut coord = self
            .active_index()
            .unwrap_or_else(|| smallvec![0; self.inner.shape.ndim()]);
        coord[dim] = index;
        debug!(dim, index, "switching dimension");
        self.switch_to_index(&coord).await
    }

    pub async fn switch_to_value(&self, values: &[DimValue]) -> Result<Arc<L>, ArrayError> {
        let coord = self.inner.shape.value_to_coord(values)?;
        self.switch_to_index(&coord).await
    }
}
