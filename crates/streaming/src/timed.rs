use std::sync::Arc;

use foundation::shape::{Coord, ShapeError};
use foundation::time::Timestamp;
use runtime::event_bus::{TickEvent, TickKind, TickListener};
use smallvec::smallvec;
use tracing::{trace, warn};

use crate::error::ArrayError;
use crate::layer_array::{LayerArray, LoadHandle};

/// A [`LayerArray`] with one dimension bound to the shared clock.
///
/// Loading ticks preload the slot for the announced time; committed ticks
/// switch the view to it and preload the next `n_ahead` times.
pub struct TimeLayerArray<L> {
    array: LayerArray<L>,
    time_dim: usize,
    n_ahead: usize,
}

impl<L> Clone for TimeLayerArray<L> {
    fn clone(&self) -> Self {
        Self {
            array: self.array.clone(),
            time_dim: self.time_dim,
            n_ahead: self.n_ahead,
        }
    }
}

impl<L: Send + Sync + 'static> TimeLayerArray<L> {
    pub fn new(array: LayerArray<L>, time_dim: usize, n_ahead: usize) -> Result<Self, ArrayError> {
        array.shape().check_dim(time_dim)?;
        Ok(Self {
            array,
            time_dim,
            n_ahead,
        })
    }

    pub fn array(&self) -> &LayerArray<L> {
        &self.array
    }

    pub fn time_dim(&self) -> usize {
        self.time_dim
    }

    /// Times of the bound dimension, in storage order.
    pub fn times(&self) -> Vec<Timestamp> {
        self.array
            .shape()
            .values(self.time_dim)
            .unwrap_or_default()
            .iter()
            .filter_map(|v| v.as_time())
            .collect()
    }

    pub fn time_index(&self, t: Timestamp) -> Result<usize, ArrayError> {
        let values = self.array.shape().values(self.time_dim).unwrap_or_default();
        values
            .iter()
            .position(|v| v.as_millis() == Some(t.millis()))
            .ok_or_else(|| {
                ArrayError::Shape(ShapeError::ValueNotFound {
                    dim: self.time_dim,
                    value: t.millis().to_string(),
                })
            })
    }

    /// Active index with the time component replaced.
    fn coord_at(&self, index: usize) -> Coord {
        let mut coord = self
            .array
            .active_index()
            .unwrap_or_else(|| smallvec![0; self.array.shape().ndim()]);
        coord[self.time_dim] = index;
        coord
    }

    /// Starts loading the slot for `t` next to the active index.
    pub fn load_time(&self, t: Timestamp) -> Result<LoadHandle<L>, ArrayError> {
        let index = self.time_index(t)?;
        self.array.load_index(&self.coord_at(index))
    }

    /// Switches the time component to `t`.
    ///
    /// Returns `false` without doing anything if the view already shows `t`.
    pub async fn switch_time_val(&self, t: Timestamp) -> Result<bool, ArrayError> {
        let index = self.time_index(t)?;
        if let Some(active) = self.array.active_index() {
            if active[self.time_dim] == index {
                return Ok(false);
            }
        }
        self.array.switch_dim(self.time_dim, index).await?;
        Ok(true)
    }

    /// Follows the clock to `t` if this array has data for it.
    ///
    /// Returns whether `t` is on this array's axis. After switching, the
    /// next `n_ahead` times are preloaded.
    pub async fn update(&self, t: Timestamp) -> Result<bool, ArrayError> {
        let Ok(index) = self.time_index(t) else {
            trace!(time = t.millis(), "time not on this array's axis");
            return Ok(false);
        };
        self.switch_time_val(t).await?;

        let len = self.array.shape().dims()[self.time_dim];
        for ahead in (index + 1..len).take(self.n_ahead) {
            // Preload failures surface again when the time is switched to.
            let _ = self.array.load_index(&self.coord_at(ahead));
        }
        Ok(true)
    }
}

impl<L: Send + Sync + 'static> TickListener for TimeLayerArray<L> {
    fn on_tick(&self, event: &TickEvent) {
        match event.kind {
            TickKind::Loading => {
                if let Err(e) = self.load_time(event.time) {
                    trace!(error = %e, "no preload for tick");
                }
            }
            TickKind::Committed => {
                let Ok(rt) = tokio::runtime::Handle::try_current() else {
                    warn!("committed tick outside a Tokio runtime ignored");
                    return;
                };
                let this = self.clone();
                let time = event.time;
                rt.spawn(async move {
                    if let Err(e) = this.update(time).await {
                        warn!(error = %e, time = time.millis(), "time update failed");
                    }
                });
            }
        }
    }
}

/// Subscribes a time-bound array to `clock`.
pub fn follow_clock<L: Send + Sync + 'static>(
    clock: &runtime::clock::Clock,
    array: TimeLayerArray<L>,
) -> runtime::event_bus::SubscriptionId {
    clock.subscribe(Arc::new(array))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use foundation::shape::{Coord, DimShape, DimValue};
    use foundation::time::Timestamp;
    use futures_util::FutureExt;
    use runtime::clock::Clock;

    use super::{TimeLayerArray, follow_clock};
    use crate::error::{ArrayError, BoxError};
    use crate::layer_array::LayerArray;
    use crate::loader::{LayerFuture, NoopSink, loader_fn};
    use crate::residency::SlotState;

    /// Heights × times; loads resolve immediately.
    fn timed(n_ahead: usize) -> (TimeLayerArray<Vec<usize>>, Arc<AtomicUsize>) {
        let shape = DimShape::new(vec![
            vec![DimValue::Float(10.0), DimValue::Float(100.0)],
            [0, 3_600_000, 7_200_000, 10_800_000]
                .into_iter()
                .map(|ms| DimValue::Time(Timestamp(ms)))
                .collect(),
        ])
        .unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let loader = loader_fn(move |coord: &[usize], _values: &[DimValue]| {
            counter.fetch_add(1, Ordering::SeqCst);
            let coord = coord.to_vec();
            Ok::<LayerFuture<Vec<usize>>, BoxError>(async move { Ok(coord) }.boxed())
        });
        let array = LayerArray::<Vec<usize>>::new(shape, loader, Arc::new(NoopSink));
        (TimeLayerArray::new(array, 1, n_ahead).unwrap(), calls)
    }

    #[tokio::test]
    async fn switch_time_val_is_a_no_op_on_the_current_time() {
        let (timed, _) = timed(0);
        assert!(timed.switch_time_val(Timestamp(3_600_000)).await.unwrap());
        assert!(!timed.switch_time_val(Timestamp(3_600_000)).await.unwrap());
        assert_eq!(
            timed.array().active_index(),
            Some(Coord::from_slice(&[0, 1]))
        );
    }

    #[tokio::test]
    async fn update_switches_and_preloads_ahead() {
        let (timed, calls) = timed(2);
        timed.array().switch_to_index(&[1, 0]).await.unwrap();

        assert!(timed.update(Timestamp(3_600_000)).await.unwrap());
        assert_eq!(
            timed.array().active_index(),
            Some(Coord::from_slice(&[1, 1]))
        );
        timed.array().pending_all().await;
        assert_eq!(timed.array().slot_state(&[1, 2]).unwrap(), SlotState::Ready);
        assert_eq!(timed.array().slot_state(&[1, 3]).unwrap(), SlotState::Ready);
        assert_eq!(timed.array().slot_state(&[0, 2]).unwrap(), SlotState::Empty);
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        // Nothing left to preload at the end of the axis.
        assert!(timed.update(Timestamp(10_800_000)).await.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn unknown_times_are_reported() {
        let (timed, _) = timed(1);
        assert!(!timed.update(Timestamp(42)).await.unwrap());
        assert!(matches!(
            timed.load_time(Timestamp(42)),
            Err(ArrayError::Shape(_))
        ));
        assert_eq!(timed.times().len(), 4);
    }

    #[tokio::test]
    async fn follows_clock_ticks() {
        let (timed, _) = timed(1);
        let clock = Clock::new(timed.times(), None);
        follow_clock(&clock, timed.clone());

        clock.set_current_time(Timestamp(7_200_000));
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
        timed.array().pending_all().await;
        assert_eq!(
            timed.array().active_index(),
            Some(Coord::from_slice(&[0, 2]))
        );
        assert_eq!(timed.array().slot_state(&[0, 3]).unwrap(), SlotState::Ready);
    }
}
