mod common;

use std::sync::Arc;
use std::sync::Mutex;

use common::DMG_FREQUENCY;
use common::Dmg;
use common::SimHost;
use common::mean_interval;
use wisp::Control;
use wisp::Event;
use wisp::LoopMode;
use wisp::MachineError;
use wisp::ManualClock;
use wisp::Scheduler;
use wisp::SchedulerBuilder;
use wisp::SchedulerError;
use wisp::StartOptions;
use wisp::State;
use wisp::Topic;
use wisp::UNRECOVERABLE_TEXT;
use wisp::listener;

fn dmg(clock: &ManualClock, machine: Dmg) -> Scheduler<Dmg, ManualClock> {
    SchedulerBuilder::new(machine)
        .clock(clock.clone())
        .logic_frequency(DMG_FREQUENCY)
        .build()
        .unwrap()
}

fn options(loop_mode: LoopMode) -> StartOptions {
    StartOptions {
        rom_url: Some("tetris.gb".to_owned()),
        loop_mode,
    }
}

/// Collects every event of the given topics.
fn record(scheduler: &mut Scheduler<Dmg, ManualClock>, topics: &[Topic]) -> Arc<Mutex<Vec<Event>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let l = listener(move |e| sink.lock().unwrap().push(e.clone()));
    for topic in topics {
        scheduler.events_mut().bind(*topic, l.clone());
    }
    seen
}

#[test_log::test(tokio::test)]
async fn dmg_runs_at_full_speed() {
    let clock = ManualClock::new(0.0);
    let mut scheduler = dmg(&clock, Dmg::new(clock.clone()));
    let frames = record(&mut scheduler, &[Topic::Frame]);
    let mut host = SimHost::new(clock.clone(), 3_100.0);

    scheduler
        .start(options(LoopMode::FixedDelay), &mut host)
        .await
        .unwrap();

    // The window closes on the 180th logical frame
    let frames = frames.lock().unwrap();
    assert_eq!(frames.len(), 1);
    let Event::Frame(rates) = frames[0] else {
        panic!("expected a frame event, got {:?}", frames[0]);
    };
    assert_eq!(rates.framerate, 60);
    assert_eq!(rates.animationrate, 60);
    assert_eq!(scheduler.framerate(), 60);
    let speed = scheduler.emulation_speed();
    assert!((99.0..102.0).contains(&speed), "{speed}");
    assert_eq!(scheduler.state(), State::Stopped);
}

#[tokio::test]
async fn switching_loop_mode_mid_session() {
    let clock = ManualClock::new(0.0);
    let mut scheduler = dmg(&clock, Dmg::new(clock.clone()));
    let mut host = SimHost::new(clock.clone(), 2_000.0)
        .with_refresh(60.0)
        .at(1_000.0, Control::SetLoopMode(LoopMode::DisplayRefresh));

    scheduler
        .start(options(LoopMode::FixedDelay), &mut host)
        .await
        .unwrap();

    assert_eq!(scheduler.loop_mode(), LoopMode::DisplayRefresh);
    let times = scheduler.machine().tick_times();
    let (before, after): (Vec<f64>, Vec<f64>) = times.iter().partition(|t| **t < 1_000.0);
    assert!(before.len() >= 59, "{}", before.len());
    assert!(after.len() >= 58, "{}", after.len());
    // Pacing carries on at the same rate under the new strategy
    assert!((mean_interval(&after) - 1000.0 / 60.0).abs() < 0.1);
    assert!((times.len() as i64 - 120).abs() <= 2, "{}", times.len());
}

#[tokio::test]
async fn switching_to_missing_display_refresh_fails() {
    let clock = ManualClock::new(0.0);
    let mut scheduler = dmg(&clock, Dmg::new(clock.clone()));
    let mut host = SimHost::new(clock.clone(), 2_000.0)
        .at(500.0, Control::SetLoopMode(LoopMode::DisplayRefresh));

    let res = scheduler
        .start(options(LoopMode::Auto), &mut host)
        .await;

    assert_eq!(
        res,
        Err(SchedulerError::UnsupportedLoopMode(LoopMode::DisplayRefresh))
    );
    assert_eq!(scheduler.state(), State::Stopped);
    assert!(scheduler.machine().tick_times().len() >= 30);
}

#[test_log::test(tokio::test)]
async fn fatal_failure_recovers_within_session() {
    let clock = ManualClock::new(0.0);
    let machine = Dmg::new(clock.clone()).failing_at(10, MachineError::fatal("unreachable executed"));
    let mut scheduler = dmg(&clock, machine);
    let seen = record(&mut scheduler, &[Topic::Message, Topic::Error, Topic::Booted]);
    let mut host = SimHost::new(clock.clone(), 1_000.0).at(500.0, Control::Resume);

    scheduler
        .start(options(LoopMode::FixedDelay), &mut host)
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    let Event::Message(notice) = &seen[1] else {
        panic!("expected a message, got {:?}", seen[1]);
    };
    assert_eq!(notice.text, UNRECOVERABLE_TEXT);
    assert!(notice.error);
    // Initial boot, then the failure notice, the rebuild, and the error report
    assert_eq!(seen[0], Event::Booted);
    assert_eq!(&seen[2..], &[Event::Booted, Event::Error]);
    assert_eq!(scheduler.machine().hard_resets, 1);

    // Nothing ticked while the machine was paused
    let times = scheduler.machine().tick_times();
    assert!(times[9] < 500.0);
    assert!(times[10] >= 500.0);
    assert!(times.len() > 20);
}

#[tokio::test]
async fn transient_failure_pauses_session() {
    let clock = ManualClock::new(0.0);
    let machine = Dmg::new(clock.clone()).failing_at(3, MachineError::transient("bad opcode 0xd3"));
    let mut scheduler = dmg(&clock, machine);
    let seen = record(&mut scheduler, &[Topic::Message, Topic::Error]);
    let mut host = SimHost::new(clock.clone(), 1_000.0);

    scheduler
        .start(options(LoopMode::FixedDelay), &mut host)
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let Event::Message(notice) = &seen[0] else {
        panic!("expected a message, got {:?}", seen[0]);
    };
    assert_eq!(notice.text, "bad opcode 0xd3");
    assert_eq!(scheduler.machine().tick_times().len(), 3);
    assert_eq!(scheduler.machine().hard_resets, 0);
}
