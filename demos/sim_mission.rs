/**
 * Simulated Mission Walkthrough
 *
 * Runs the full stack against the simulated vehicle with a scripted kill
 * switch and fake target sightings:
 * 1. Enable, dive, transit the gate, hit both targets
 * 2. Pull the kill switch mid-run and watch the interlock reset
 * 3. Enable again and confirm the mission restarts from the first phase
 */

use bibi_mission::fusion::{SensorSource, TargetReport};
use bibi_mission::{CompetitionMission, MissionConfig, MissionControl, Phase};
use std::thread;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn phase(control: &MissionControl) -> Option<Phase> {
    control.handles().mission.context().map(|ctx| ctx.lock().phase())
}

/// `None` as target waits for the mission run to end.
fn wait_for_phase(control: &MissionControl, target: Option<Phase>, sighting: Option<TargetReport>, timeout: Duration) -> bool {
    let targets = control.target_publisher();
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if phase(control) == target {
            return true;
        }
        if let Some(report) = sighting {
            targets.publish(report);
        }
        thread::sleep(Duration::from_millis(20));
    }
    false
}

fn sighting(source: SensorSource, bearing: f32) -> Option<TargetReport> {
    Some(TargetReport { source, bearing, depth: None, apparent_size: 0.4 })
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut config = MissionConfig::default();
    config.mission.settle_delay_s = 0.5;
    config.mission.gate_depth = 8.0;
    config.mission.gate_time_s = 1.0;
    config.mission.dive_error_threshold = 1.0;
    config.mission.ram_time_s = 1.0;

    println!("==============================================");
    println!("  Simulated Mission");
    println!("==============================================");

    let control = match MissionControl::start(&config, Arc::new(CompetitionMission)) {
        Ok(control) => control,
        Err(e) => {
            eprintln!("failed to start: {}", e);
            return;
        }
    };
    let kill = control.kill_switch_publisher();
    let step = Duration::from_secs(15);

    kill.publish(false);
    thread::sleep(Duration::from_millis(100));
    kill.publish(true);
    println!("[KILL SWITCH] enabled");

    let stages = [
        (Some(Phase::TransitGate), None),
        (Some(Phase::ApproachFirstTarget), None),
        (Some(Phase::ApproachSecondTarget), sighting(SensorSource::FirstTarget, 30.0)),
    ];
    for (target, seen) in stages {
        if wait_for_phase(&control, target, seen, step) {
            println!("[PHASE] {:?}  desired {:?}", target, control.control_state().desired);
        } else {
            println!("[PHASE] timed out waiting for {:?}", target);
        }
    }

    kill.publish(false);
    println!("[KILL SWITCH] disabled mid-mission");
    thread::sleep(Duration::from_millis(300));
    println!(
        "[INTERLOCK] {:?}, restarts {}, live tokens {}",
        control.interlock_state(),
        control.restarts(),
        control.handles().tokens.live_count()
    );

    kill.publish(true);
    println!("[KILL SWITCH] enabled again");
    thread::sleep(Duration::from_millis(100));
    println!("[PHASE] restarted in {:?}", phase(&control));

    if wait_for_phase(&control, Some(Phase::ApproachFirstTarget), None, step)
        && wait_for_phase(&control, Some(Phase::ApproachSecondTarget), sighting(SensorSource::FirstTarget, 30.0), step)
        && wait_for_phase(&control, None, sighting(SensorSource::SecondTarget, 300.0), step)
    {
        println!("[PHASE] mission complete");
    } else {
        println!("[PHASE] mission stalled in {:?}", phase(&control));
    }

    control.shutdown();
    println!("Done.");
}
