/**
 * Mission Control Binary
 *
 * Runs the mission stack until SIGINT/SIGTERM:
 * 1. Loads the TOML config (defaults when no path is given)
 * 2. Opens the motion link and starts every control thread
 * 3. Waits for the kill switch to start the mission
 *
 * Usage: mission_control [config.toml]
 * RUST_LOG controls verbosity, default info.
 */

use bibi_mission::config::LinkKind;
use bibi_mission::signal::{install_shutdown_handler, shutdown_requested};
use bibi_mission::{CompetitionMission, MissionConfig, MissionControl};
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const STATUS_PERIOD: Duration = Duration::from_secs(5);

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match std::env::args().nth(1) {
        Some(path) => match MissionConfig::from_file(&path) {
            Ok(config) => {
                log::info!("loaded config from {}", path);
                config
            }
            Err(e) => {
                log::error!("failed to load {}: {}", path, e);
                return ExitCode::FAILURE;
            }
        },
        None => {
            log::info!("no config given, using defaults");
            MissionConfig::default()
        }
    };

    if let Err(e) = install_shutdown_handler() {
        log::error!("failed to install signal handler: {}", e);
        return ExitCode::FAILURE;
    }

    let control = match MissionControl::start(&config, Arc::new(CompetitionMission)) {
        Ok(control) => control,
        Err(e) => {
            log::error!("failed to start mission control: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if config.link.kind == LinkKind::Sim {
        // no hardware switch on the bench: flip it once so the mission runs
        log::warn!("simulated link, enabling kill switch in software");
        let kill = control.kill_switch_publisher();
        kill.publish(false);
        thread::sleep(Duration::from_millis(100));
        kill.publish(true);
    }

    let mut last_status = Instant::now();
    while !shutdown_requested() {
        thread::sleep(Duration::from_millis(100));
        if last_status.elapsed() >= STATUS_PERIOD {
            last_status = Instant::now();
            let state = control.control_state();
            log::info!(
                "{:?}, restarts {}, desired {:?}, measured {:?}",
                control.interlock_state(),
                control.restarts(),
                state.desired,
                state.measured
            );
        }
    }

    log::info!("shutdown requested");
    control.shutdown();
    ExitCode::SUCCESS
}
