use std::sync::Arc;

use formats::scenario::ScenarioMetadata;
use foundation::time::Timestamp;
use parking_lot::Mutex;
use runtime::clock::{Clock, TimesMode};
use runtime::event_bus::{SubscriptionId, TickEvent, TickListener};
use streaming::{ArrayError, LayerArray};
use tracing::{debug, info};

use crate::trajectory::Direction;

/// Draws a scenario while it follows the clock.
pub trait ScenarioRenderer: TickListener {
    /// Removes everything drawn so far.
    fn clear(&self);
}

/// Clock subscription on behalf of a scenario renderer.
struct RendererTicks(Arc<dyn ScenarioRenderer>);

impl TickListener for RendererTicks {
    fn on_tick(&self, event: &TickEvent) {
        self.0.on_tick(event);
    }
}

/// One simulation run as held by the scenario array.
pub struct Scenario {
    pub label: String,
    pub direction: Direction,
    /// Increasing, whatever the run direction.
    pub times: Vec<Timestamp>,
    pub heights: Vec<f64>,
    /// Follows the shared clock while this scenario is active.
    pub renderer: Arc<dyn ScenarioRenderer>,
}

impl Scenario {
    pub fn from_metadata(meta: &ScenarioMetadata, renderer: Arc<dyn ScenarioRenderer>) -> Self {
        Self {
            label: meta.label.clone().unwrap_or_default(),
            direction: Direction::from_fwd(meta.fwd),
            times: meta.semantic_times(),
            heights: meta.heights.clone(),
            renderer,
        }
    }

    /// Origin of the run: earliest time going forward, latest going back.
    pub fn start_time(&self) -> Option<Timestamp> {
        match self.direction {
            Direction::Forward => self.times.first().copied(),
            Direction::Backward => self.times.last().copied(),
        }
    }
}

impl std::fmt::Debug for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scenario")
            .field("label", &self.label)
            .field("direction", &self.direction)
            .field("times", &self.times.len())
            .field("heights", &self.heights)
            .finish()
    }
}

/// Keeps one shared clock in step with the active scenario of an array.
pub struct Simulations {
    array: LayerArray<Scenario>,
    clock: Mutex<Option<Arc<Clock>>>,
    /// The renderer following the clock, with its subscription.
    renderer: Mutex<Option<(SubscriptionId, Arc<dyn ScenarioRenderer>)>>,
}

impl Simulations {
    pub fn new(array: LayerArray<Scenario>) -> Self {
        Self {
            array,
            clock: Mutex::new(None),
            renderer: Mutex::new(None),
        }
    }

    /// Uses an existing clock instead of creating one on the first switch.
    pub fn with_clock(array: LayerArray<Scenario>, clock: Arc<Clock>) -> Self {
        Self {
            array,
            clock: Mutex::new(Some(clock)),
            renderer: Mutex::new(None),
        }
    }

    pub fn array(&self) -> &LayerArray<Scenario> {
        &self.array
    }

    pub fn clock(&self) -> Option<Arc<Clock>> {
        self.clock.lock().clone()
    }

    pub fn active_scenario(&self) -> Option<Arc<Scenario>> {
        self.array.active_layer()
    }

    /// Shows the scenario at `coord` and moves the clock onto its axis.
    pub async fn switch_to_index(&self, coord: &[usize]) -> Result<Arc<Scenario>, ArrayError> {
        let old_direction = self.active_scenario().map(|s| s.direction);
        let scenario = self.array.switch_to_index(coord).await?;
        let direction_changed = old_direction.is_some_and(|d| d != scenario.direction);
        info!(
            label = %scenario.label,
            direction = ?scenario.direction,
            direction_changed,
            "scenario switched"
        );

        let created = self.clock.lock().is_none();
        if !created {
            self.follow(&scenario);
        }
        let time = self.reset_timedim(direction_changed);
        if created {
            self.follow(&scenario);
            // The renderer missed the clock's first position.
            if let (Some(clock), Some(t)) = (self.clock(), time) {
                clock.set_current_time(t);
            }
        }
        Ok(scenario)
    }

    /// Single-dimension selection, as issued by a slider.
    pub async fn switch_dim(&self, dim: usize, index: usize) -> Result<Arc<Scenario>, ArrayError> {
        self.array.shape().check_dim(dim)?;
        let mut coord = self
            .array
            .active_index()
            .unwrap_or_else(|| (0..self.array.shape().ndim()).map(|_| 0).collect());
        coord[dim] = index;
        self.switch_to_index(&coord).await
    }

    /// Hands the clock subscription over to `scenario`'s renderer.
    ///
    /// The previous renderer is cleared once it no longer follows the clock.
    fn follow(&self, scenario: &Scenario) {
        let Some(clock) = self.clock() else {
            return;
        };
        let previous = {
            let mut current = self.renderer.lock();
            let previous = current.take();
            if let Some((id, _)) = &previous {
                clock.unsubscribe(*id);
            }
            let id = clock.subscribe(Arc::new(RendererTicks(scenario.renderer.clone())));
            *current = Some((id, scenario.renderer.clone()));
            previous
        };
        if let Some((_, old)) = previous {
            old.clear();
        }
    }

    /// Moves the clock onto the active scenario's time axis.
    ///
    /// Returns the clock's new current time. A changed direction restarts at
    /// the origin of the new run; otherwise the positional index is kept
    /// (falling back to the last time). The renderer is detached while the
    /// axis is replaced.
    pub fn reset_timedim(&self, direction_changed: bool) -> Option<Timestamp> {
        let scenario = self.active_scenario()?;

        let existing = self.clock.lock().clone();
        let Some(clock) = existing else {
            let clock = Arc::new(Clock::new(scenario.times.clone(), scenario.start_time()));
            *self.clock.lock() = Some(clock.clone());
            info!(times = scenario.times.len(), "created shared clock");
            return clock.current_time();
        };

        if !clock.has_times() {
            clock.set_available_times(scenario.times.clone(), TimesMode::Replace);
            return clock.current_time();
        }

        let target = if direction_changed {
            scenario.start_time()
        } else {
            clock
                .current_index()
                .and_then(|i| scenario.times.get(i).copied())
                .or_else(|| scenario.times.last().copied())
        };
        debug!(?target, direction_changed, "resetting time axis");

        let detached: Vec<SubscriptionId> = self.renderer.lock().iter().map(|(id, _)| *id).collect();
        clock.with_detached(&detached, |c| {
            c.set_available_times(scenario.times.clone(), TimesMode::Replace)
        });
        match target {
            Some(t) => clock.set_current_time(t),
            None => clock.current_time(),
        }
    }
}
