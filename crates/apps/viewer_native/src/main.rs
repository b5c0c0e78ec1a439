mod config;
mod loader;
mod sinks;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use layers::{Direction, Scenario, Simulations, TrajectoryLayerOptions, merge_visible};
use runtime::event_bus::{TickEvent, TickKind, TickListener};
use runtime::player::{Player, PlayerExit, PlayerOptions};
use streaming::{LayerArray, LayerArrayOptions};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::ViewerConfig;
use crate::loader::FsScenarioLoader;
use crate::sinks::{ScenarioMountLog, VisibleLog};

#[derive(Parser, Debug)]
#[command(author, version, about = "Plays trajectory scenarios against a shared clock")]
struct Args {
    /// Viewer configuration (JSON)
    #[arg(long, env = "VIEWER_CONFIG", default_value = "crates/apps/viewer_native/assets/viewer.json")]
    config: PathBuf,

    /// Starting scenario coordinate, e.g. 0,1 (overrides the config)
    #[arg(long, value_delimiter = ',')]
    scenario: Option<Vec<usize>>,

    /// Clock steps to play for each scenario
    #[arg(long, default_value_t = 4)]
    steps: usize,

    /// Milliseconds between two ticks (overrides the config)
    #[arg(long, env = "VIEWER_TRANSITION_MS", value_parser = clap::value_parser!(u64).range(1..))]
    transition_ms: Option<u64>,

    /// Afterwards select INDEX along dimension DIM, given as DIM:INDEX
    #[arg(long)]
    then: Option<String>,

    /// Write the final visible trajectories as GeoJSON
    #[arg(long)]
    dump: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    if let Err(err) = run(args).await {
        error!("viewer failed: {err}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = ViewerConfig::load(&args.config)?;
    let shape = config.shape()?;
    let transition = args
        .transition_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.transition());

    let visible = Arc::new(VisibleLog::default());
    let loader = FsScenarioLoader::new(
        &config.scenarios,
        TrajectoryLayerOptions {
            direction: Direction::Forward,
            duration: config.trail_duration()?,
            add_last_point: config.add_last_point,
        },
        visible.clone(),
    );
    let array = LayerArray::<Scenario>::with_options(
        shape,
        loader,
        Arc::new(ScenarioMountLog),
        LayerArrayOptions {
            load_timeout: config.load_timeout(),
        },
    );
    let sims = Simulations::new(array);

    let start = args.scenario.clone().unwrap_or_else(|| config.start_coord());
    sims.switch_to_index(&start).await?;
    play(&sims, transition, config.looping, args.steps).await;

    if let Some(then) = &args.then {
        let (dim, index) = parse_selection(then)?;
        sims.switch_dim(dim, index).await?;
        play(&sims, transition, config.looping, args.steps).await;
    }

    let stats = sims.array().stats();
    info!(
        loads = stats.loader_invocations,
        coalesced = stats.coalesced,
        failures = stats.failures,
        commits = stats.commits,
        "done"
    );

    if let Some(path) = &args.dump {
        let geojson = merge_visible(&visible.latest());
        tokio::fs::write(path, serde_json::to_string_pretty(&geojson)?).await?;
        info!("wrote {}", path.display());
    }
    Ok(())
}

/// Plays the active scenario in its own direction for `steps` ticks.
async fn play(sims: &Simulations, transition: Duration, looping: bool, steps: usize) {
    let (Some(clock), Some(scenario)) = (sims.clock(), sims.active_scenario()) else {
        return;
    };
    let player = Player::new(
        clock.clone(),
        PlayerOptions {
            transition,
            looping,
            steps: if scenario.direction.is_forward() { 1 } else { -1 },
        },
    );

    let counter = Arc::new(TickCounter::new());
    let id = clock.subscribe(counter.clone());
    let exit = tokio::select! {
        exit = player.run() => exit,
        () = counter.reached(steps) => {
            player.stop();
            PlayerExit::Stopped
        }
    };
    clock.unsubscribe(id);
    info!(
        label = %scenario.label,
        ?exit,
        time = ?clock.current_time().map(|t| t.millis()),
        "playback finished"
    );
}

struct TickCounter {
    committed: watch::Sender<usize>,
}

impl TickCounter {
    fn new() -> Self {
        Self {
            committed: watch::channel(0).0,
        }
    }

    async fn reached(&self, n: usize) {
        let mut rx = self.committed.subscribe();
        let _ = rx.wait_for(|count| *count >= n).await;
    }
}

impl TickListener for TickCounter {
    fn on_tick(&self, event: &TickEvent) {
        if event.kind == TickKind::Committed {
            self.committed.send_modify(|count| *count += 1);
        }
    }
}

fn parse_selection(text: &str) -> Result<(usize, usize), Box<dyn std::error::Error>> {
    let (dim, index) = text
        .split_once(':')
        .ok_or_else(|| format!("expected DIM:INDEX, got {text:?}"))?;
    Ok((dim.trim().parse()?, index.trim().parse()?))
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Args, parse_selection};

    #[test]
    fn parses_dimension_selections() {
        assert_eq!(parse_selection("1:0").unwrap(), (1, 0));
        assert_eq!(parse_selection(" 0 : 3 ").unwrap(), (0, 3));
        assert!(parse_selection("1").is_err());
        assert!(parse_selection("a:1").is_err());
    }

    #[test]
    fn transition_must_be_positive() {
        assert!(Args::try_parse_from(["viewer", "--transition-ms", "0"]).is_err());
        let args = Args::try_parse_from(["viewer", "--transition-ms", "250"]).unwrap();
        assert_eq!(args.transition_ms, Some(250));
    }
}
