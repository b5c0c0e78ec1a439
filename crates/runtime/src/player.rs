use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, interval_at};
use tracing::{debug, info};

use crate::clock::Clock;

/// Shortest cadence a player runs at; Tokio intervals need a non-zero period.
pub const MIN_TRANSITION: Duration = Duration::from_millis(1);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PlayerOptions {
    /// Wall-clock delay between two ticks.
    pub transition: Duration,
    pub looping: bool,
    /// Positions advanced per tick (negative plays backwards).
    pub steps: i64,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            transition: Duration::from_millis(1000),
            looping: false,
            steps: 1,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PlayerExit {
    Stopped,
    ReachedEnd,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct Control {
    transition: Duration,
    playing: bool,
}

/// Steps a [`Clock`] at a fixed cadence.
#[derive(Debug)]
pub struct Player {
    clock: Arc<Clock>,
    looping: bool,
    steps: i64,
    control: watch::Sender<Control>,
}

impl Player {
    pub fn new(clock: Arc<Clock>, options: PlayerOptions) -> Self {
        let (control, _) = watch::channel(Control {
            transition: options.transition.max(MIN_TRANSITION),
            playing: false,
        });
        Self {
            clock,
            looping: options.looping,
            steps: options.steps,
            control,
        }
    }

    pub fn clock(&self) -> &Arc<Clock> {
        &self.clock
    }

    pub fn transition_time(&self) -> Duration {
        self.control.borrow().transition
    }

    pub fn is_playing(&self) -> bool {
        self.control.borrow().playing
    }

    /// Changes the tick cadence. A running player restarts its interval.
    pub fn set_transition_time(&self, transition: Duration) {
        let transition = transition.max(MIN_TRANSITION);
        self.control.send_modify(|c| c.transition = transition);
        debug!(?transition, "player transition time changed");
    }

    pub fn stop(&self) {
        self.control.send_modify(|c| c.playing = false);
    }

    /// Plays until stopped or, when not looping, until the axis runs out.
    pub async fn run(&self) -> PlayerExit {
        let mut rx = self.control.subscribe();
        self.control.send_modify(|c| c.playing = true);
        info!(steps = self.steps, looping = self.looping, "player started");

        loop {
            let control = *rx.borrow_and_update();
            if !control.playing {
                return PlayerExit::Stopped;
            }

            let mut ticker = interval_at(Instant::now() + control.transition, control.transition);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(next) = self.clock.next_index(self.steps, self.looping) else {
                            self.control.send_modify(|c| c.playing = false);
                            info!("player reached the end of the time axis");
                            return PlayerExit::ReachedEnd;
                        };
                        // The axis may have been replaced between the two calls.
                        let _ = self.clock.set_current_index(next);
                    }
                    changed = rx.changed() => {
                        if changed.is_err() {
                            return PlayerExit::Stopped;
                        }
                        break;
                    }
                }
            }
        }
    }
}
