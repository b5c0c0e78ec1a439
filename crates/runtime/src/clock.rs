use std::sync::Arc;

use foundation::time::Timestamp;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::event_bus::{EventBus, SubscriptionId, TickEvent, TickKind, TickListener};

/// How a new set of available times is merged into the current axis.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TimesMode {
    Replace,
    Union,
    Intersect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClockError {
    IndexOutOfRange { index: usize, len: usize },
}

impl std::fmt::Display for ClockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClockError::IndexOutOfRange { index, len } => {
                write!(f, "time index {index} out of range ({len} available times)")
            }
        }
    }
}

impl std::error::Error for ClockError {}

#[derive(Debug, Default)]
struct ClockState {
    times: Vec<Timestamp>,
    current: Option<usize>,
    bus: EventBus,
}

/// Shared time axis driving every time-aware layer.
///
/// Ticks are delivered synchronously, outside the internal lock, so
/// listeners may query the clock while handling them.
#[derive(Debug, Default)]
pub struct Clock {
    state: Mutex<ClockState>,
}

impl Clock {
    pub fn new(times: Vec<Timestamp>, current: Option<Timestamp>) -> Self {
        let times = normalize(times);
        let current = match current {
            Some(t) => nearest_index(&times, t),
            None if times.is_empty() => None,
            None => Some(0),
        };
        Self {
            state: Mutex::new(ClockState {
                times,
                current,
                bus: EventBus::new(),
            }),
        }
    }

    pub fn current_time(&self) -> Option<Timestamp> {
        let state = self.state.lock();
        state.current.map(|i| state.times[i])
    }

    pub fn current_index(&self) -> Option<usize> {
        self.state.lock().current
    }

    pub fn available_times(&self) -> Vec<Timestamp> {
        self.state.lock().times.clone()
    }

    pub fn has_times(&self) -> bool {
        !self.state.lock().times.is_empty()
    }

    /// Moves to the available time nearest to `t`.
    ///
    /// Returns the time actually selected, or `None` on an empty axis.
    pub fn set_current_time(&self, t: Timestamp) -> Option<Timestamp> {
        let index = {
            let state = self.state.lock();
            nearest_index(&state.times, t)?
        };
        self.set_current_index(index).ok()
    }

    pub fn set_current_index(&self, index: usize) -> Result<Timestamp, ClockError> {
        let (time, receivers) = {
            let mut state = self.state.lock();
            let len = state.times.len();
            if index >= len {
                return Err(ClockError::IndexOutOfRange { index, len });
            }
            state.current = Some(index);
            (state.times[index], state.bus.receivers())
        };
        trace!(index, time = time.0, "clock tick");
        announce(&receivers, time, index);
        Ok(time)
    }

    /// Merges `times` into the axis, keeping the positional index.
    ///
    /// If the time under the (clamped) index changes, attached subscribers
    /// are told about it with a fresh Loading/Committed pair.
    pub fn set_available_times(&self, times: Vec<Timestamp>, mode: TimesMode) {
        let (tick, receivers) = {
            let mut state = self.state.lock();
            let previous = state.current.map(|i| state.times[i]);
            let incoming = normalize(times);
            let merged = if state.times.is_empty() {
                incoming
            } else {
                match mode {
                    TimesMode::Replace => incoming,
                    TimesMode::Union => normalize(
                        state.times.iter().copied().chain(incoming).collect(),
                    ),
                    TimesMode::Intersect => state
                        .times
                        .iter()
                        .copied()
                        .filter(|t| incoming.binary_search(t).is_ok())
                        .collect(),
                }
            };
            state.times = merged;

            let len = state.times.len();
            state.current = match (state.current, len) {
                (_, 0) => None,
                (Some(i), _) => Some(i.min(len - 1)),
                (None, _) => Some(0),
            };
            debug!(?mode, len, current = ?state.current, "available times changed");

            let now = state.current.map(|i| (state.times[i], i));
            match now {
                Some((time, index)) if Some(time) != previous => {
                    (Some((time, index)), state.bus.receivers())
                }
                _ => (None, Vec::new()),
            }
        };
        if let Some((time, index)) = tick {
            announce(&receivers, time, index);
        }
    }

    /// Index `steps` positions away from the current one.
    ///
    /// Wraps around when `looping`; otherwise `None` past either end.
    pub fn next_index(&self, steps: i64, looping: bool) -> Option<usize> {
        let state = self.state.lock();
        let len = state.times.len() as i64;
        let current = state.current? as i64;
        let next = current + steps;
        if (0..len).contains(&next) {
            Some(next as usize)
        } else if looping && len > 0 {
            Some(next.rem_euclid(len) as usize)
        } else {
            None
        }
    }

    pub fn subscribe(&self, listener: Arc<dyn TickListener>) -> SubscriptionId {
        self.state.lock().bus.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.state.lock().bus.unsubscribe(id)
    }

    pub fn is_attached(&self, id: SubscriptionId) -> bool {
        self.state.lock().bus.is_attached(id)
    }

    /// Runs `f` with the given subscriptions detached.
    ///
    /// No tick reaches a detached subscriber while `f` runs. Subscriptions
    /// are reattached afterwards, also when `f` unwinds.
    pub fn with_detached<R>(&self, ids: &[SubscriptionId], f: impl FnOnce(&Clock) -> R) -> R {
        struct Reattach<'a> {
            clock: &'a Clock,
            ids: &'a [SubscriptionId],
        }

        impl Drop for Reattach<'_> {
            fn drop(&mut self) {
                self.clock.state.lock().bus.set_detached(self.ids, false);
            }
        }

        self.state.lock().bus.set_detached(ids, true);
        let _reattach = Reattach { clock: self, ids };
        f(self)
    }
}

fn announce(receivers: &[Arc<dyn TickListener>], time: Timestamp, index: usize) {
    for kind in [TickKind::Loading, TickKind::Committed] {
        let event = TickEvent { kind, time, index };
        for listener in receivers {
            listener.on_tick(&event);
        }
    }
}

fn normalize(mut times: Vec<Timestamp>) -> Vec<Timestamp> {
    times.sort_unstable();
    times.dedup();
    times
}

fn nearest_index(times: &[Timestamp], t: Timestamp) -> Option<usize> {
    if times.is_empty() {
        return None;
    }
    match times.binary_search(&t) {
        Ok(i) => Some(i),
        Err(0) => Some(0),
        Err(i) if i >= times.len() => Some(times.len() - 1),
        Err(i) => {
            let before = t.0 - times[i - 1].0;
            let after = times[i].0 - t.0;
            Some(if after < before { i } else { i - 1 })
        }
    }
}
