use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use foundation::shape::{Coord, DimShape, DimValue, FlatIndex};
use futures_util::future::{BoxFuture, FutureExt, Shared, join_all};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::error::{ArrayError, BoxError, LoadFailure, LoadTimedOut};
use crate::loader::{LayerFuture, LayerLoader, RenderSink};
use crate::residency::SlotState;
use crate::stats::{LoadStats, LoadStatsSnapshot};

/// Shared handle on one load. Every clone observes the same outcome.
pub type LoadHandle<L> = Shared<BoxFuture<'static, Result<Arc<L>, LoadFailure>>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayerArrayOptions {
    /// Fail loads that take longer than this (requires a Tokio timer).
    pub load_timeout: Option<Duration>,
}

struct Slot<L> {
    state: SlotState,
    layer: Option<Arc<L>>,
}

impl<L> Default for Slot<L> {
    fn default() -> Self {
        Self {
            state: SlotState::Empty,
            layer: None,
        }
    }
}

pub(crate) struct ArrayState<L> {
    slots: Vec<Slot<L>>,
    /// Holds a flat index iff its slot is `Loading`.
    in_flight: BTreeMap<FlatIndex, LoadHandle<L>>,
    /// Visible group, in activation order.
    pub(crate) visible: Vec<FlatIndex>,
    pub(crate) active: Option<Coord>,
    pub(crate) awaiting_switches: usize,
    pub(crate) committing: bool,
}

impl<L> ArrayState<L> {
    pub(crate) fn ready_layer(&self, flat: FlatIndex) -> Option<Arc<L>> {
        self.slots.get(flat.0).and_then(|s| s.layer.clone())
    }
}

pub(crate) struct Inner<L> {
    pub(crate) shape: DimShape,
    loader: Box<dyn LayerLoader<L>>,
    pub(crate) sink: Arc<dyn RenderSink<L>>,
    options: LayerArrayOptions,
    pub(crate) state: Mutex<ArrayState<L>>,
    /// Serializes the clear/activate sequence of view switches.
    pub(crate) commit_lock: tokio::sync::Mutex<()>,
    pub(crate) stats: LoadStats,
}

/// Lazily loaded N-dimensional grid of layers.
///
/// Each cell is produced at most once by the injected [`LayerLoader`];
/// concurrent requests for a cell that is still loading share one load.
/// Cheap to clone: clones share the same cache.
pub struct LayerArray<L> {
    pub(crate) inner: Arc<Inner<L>>,
}

impl<L> Clone for LayerArray<L> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<L: Send + Sync + 'static> LayerArray<L> {
    pub fn new(
        shape: DimShape,
        loader: impl LayerLoader<L> + 'static,
        sink: Arc<dyn RenderSink<L>>,
    ) -> Self {
        Self::with_options(shape, loader, sink, LayerArrayOptions::default())
    }

    pub fn with_options(
        shape: DimShape,
        loader: impl LayerLoader<L> + 'static,
        sink: Arc<dyn RenderSink<L>>,
        options: LayerArrayOptions,
    ) -> Self {
        let slots = (0..shape.size()).map(|_| Slot::default()).collect();
        Self {
            inner: Arc::new(Inner {
                shape,
                loader: Box::new(loader),
                sink,
                options,
                state: Mutex::new(ArrayState {
                    slots,
                    in_flight: BTreeMap::new(),
                    visible: Vec::new(),
                    active: None,
                    awaiting_switches: 0,
                    committing: false,
                }),
                commit_lock: tokio::sync::Mutex::new(()),
                stats: LoadStats::default(),
            }),
        }
    }

    pub fn shape(&self) -> &DimShape {
        &self.inner.shape
    }

    pub fn stats(&self) -> LoadStatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Starts (or joins) the load of `coord` without displaying it.
    ///
    /// A ready slot yields an already-resolved handle; a loading slot yields
    /// the handle of the load in flight. Only an empty slot invokes the
    /// loader.
    pub fn load_index(&self, coord: &[usize]) -> Result<LoadHandle<L>, ArrayError> {
        let flat = self.inner.shape.to_flat(coord)?;
        let mut state = self.inner.state.lock();

        let slot = &state.slots[flat.0];
        match slot.state {
            SlotState::Ready => {
                if let Some(layer) = slot.layer.clone() {
                    self.inner.stats.record_ready_hit();
                    return Ok(futures_util::future::ready(Ok(layer)).boxed().shared());
                }
            }
            SlotState::Loading => {
                if let Some(handle) = state.in_flight.get(&flat) {
                    self.inner.stats.record_coalesced();
                    trace!(coord = ?coord, "joining in-flight load");
                    return Ok(handle.clone());
                }
            }
            SlotState::Empty => {}
        }

        let values = self.inner.shape.coord_to_value(coord)?;
        let future = self
            .inner
            .loader
            .make_layer(coord, &values)
            .map_err(|e| ArrayError::ContractViolation {
                coord: Coord::from_slice(coord),
                reason: e.to_string(),
            })?;
        self.inner.stats.record_invocation();
        debug!(coord = ?coord, "loading layer");

        let handle = track(
            Arc::downgrade(&self.inner),
            flat,
            Coord::from_slice(coord),
            future,
            self.inner.options.load_timeout,
        );
        state.slots[flat.0].state = SlotState::Loading;
        state.in_flight.insert(flat, handle.clone());
        drop(state);

        drive(&handle);
        Ok(handle)
    }

    /// Loads `coord` if needed and adds it to the visible group.
    ///
    /// Other visible layers are left in place.
    pub async fn add_index(&self, coord: &[usize]) -> Result<Arc<L>, ArrayError> {
        let flat = self.inner.shape.to_flat(coord)?;
        let layer = self.load_index(coord)?.await?;
        let newly_visible = {
            let mut state = self.inner.state.lock();
            if state.visible.contains(&flat) {
                false
            } else {
                state.visible.push(flat);
                true
            }
        };
        if newly_visible {
            self.inner.sink.on_layer_activated(coord, &layer);
        }
        Ok(layer)
    }

    /// Removes `coord` from the visible group.
    ///
    /// Returns whether anything was removed; never-loaded cells are a no-op.
    pub fn remove_index(&self, coord: &[usize]) -> Result<bool, ArrayError> {
        let flat = self.inner.shape.to_flat(coord)?;
        let removed = {
            let mut state = self.inner.state.lock();
            match state.visible.iter().position(|&f| f == flat) {
                Some(i) => {
                    state.visible.remove(i);
                    state.ready_layer(flat)
                }
                None => None,
            }
        };
        match removed {
            Some(layer) => {
                self.inner.sink.on_layer_deactivated(coord, &layer);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn add_value(&self, values: &[DimValue]) -> Result<Arc<L>, ArrayError> {
        let coord = self.inner.shape.value_to_coord(values)?;
        self.add_index(&coord).await
    }

    pub fn remove_value(&self, values: &[DimValue]) -> Result<bool, ArrayError> {
        let coord = self.inner.shape.value_to_coord(values)?;
        self.remove_index(&coord)
    }

    /// Settles once every load in flight *now* has settled.
    ///
    /// Loads started after this call are not waited on. Failures are not
    /// reported here; they reach whoever awaits the individual load.
    pub fn pending_all(&self) -> BoxFuture<'static, ()> {
        let handles: Vec<LoadHandle<L>> =
            self.inner.state.lock().in_flight.values().cloned().collect();
        join_all(handles).map(|_| ()).boxed()
    }

    pub fn slot_state(&self, coord: &[usize]) -> Result<SlotState, ArrayError> {
        let flat = self.inner.shape.to_flat(coord)?;
        Ok(self.inner.state.lock().slots[flat.0].state)
    }

    /// The loaded layer at `coord`, if ready.
    pub fn layer(&self, coord: &[usize]) -> Option<Arc<L>> {
        let flat = self.inner.shape.to_flat(coord).ok()?;
        self.inner.state.lock().ready_layer(flat)
    }

    pub fn active_index(&self) -> Option<Coord> {
        self.inner.state.lock().active.clone()
    }

    /// Layer at the active index, if any.
    pub fn active_layer(&self) -> Option<Arc<L>> {
        let coord = self.active_index()?;
        self.layer(&coord)
    }

    /// Coordinates of the visible group, in activation order.
    pub fn visible(&self) -> Vec<Coord> {
        let state = self.inner.state.lock();
        state
            .visible
            .iter()
            .filter_map(|&flat| self.inner.shape.to_coord(flat).ok())
            .collect()
    }

    pub fn in_flight_len(&self) -> usize {
        self.inner.state.lock().in_flight.len()
    }
}

/// Wraps a loader future so that completion updates the slot before any
/// waiter observes the result.
fn track<L: Send + Sync + 'static>(
    inner: Weak<Inner<L>>,
    flat: FlatIndex,
    coord: Coord,
    future: LayerFuture<L>,
    timeout: Option<Duration>,
) -> LoadHandle<L> {
    async move {
        let result = match timeout {
            Some(limit) => match tokio::time::timeout(limit, future).await {
                Ok(result) => result,
                Err(_) => Err(Box::new(LoadTimedOut(limit)) as BoxError),
            },
            None => future.await,
        };
        let result = result
            .map(Arc::new)
            .map_err(|cause| LoadFailure::new(coord, cause));
        if let Some(inner) = inner.upgrade() {
            inner.settle(flat, &result);
        }
        result
    }
    .boxed()
    .shared()
}

/// Loads are never cancelled: with a runtime around, keep polling the load
/// even if every waiter goes away.
fn drive<L: Send + Sync + 'static>(handle: &LoadHandle<L>) {
    match tokio::runtime::Handle::try_current() {
        Ok(rt) => {
            rt.spawn(handle.clone().map(|_| ()));
        }
        Err(_) => trace!("no runtime; load progresses only while awaited"),
    }
}

impl<L> Inner<L> {
    fn settle(&self, flat: FlatIndex, result: &Result<Arc<L>, LoadFailure>) {
        let mut state = self.state.lock();
        state.in_flight.remove(&flat);
        let slot = &mut state.slots[flat.0];
        match result {
            Ok(layer) => {
                slot.layer = Some(layer.clone());
                slot.state = SlotState::Ready;
                debug!(flat = flat.0, "layer ready");
            }
            Err(failure) => {
                slot.layer = None;
                slot.state = SlotState::Empty;
                self.stats.record_failure();
                warn!("{failure}");
            }
        }
    }
}
