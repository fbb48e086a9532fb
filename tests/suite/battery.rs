//! Consistency session feeding a speed test built from its own associations.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use syntest_engine::{
    AssociationPool, Effect, EffectRunner, ForcedChoiceConfig, ForcedChoiceGenerator, HostEvent,
    JsonlSubmitter, ManualClock, PointerEvent, SpeedSession, SpeedView, SurfacePoint,
};
use syntest_types::SessionPhase;
use tempfile::tempdir;

use crate::common::{controller, dispatch, next_event, plan, settle};

fn generator() -> ForcedChoiceGenerator {
    ForcedChoiceGenerator::new(ForcedChoiceConfig {
        candidates: 4,
        min_distance: 50.0,
        max_attempts: 200,
    })
    .unwrap()
}

#[tokio::test]
async fn associations_drive_the_speed_test() {
    let dir = tempdir().unwrap();
    let log = dir.path().join("battery.jsonl");
    let (runner, mut events) = EffectRunner::new(Arc::new(JsonlSubmitter::new(&log)), None);
    let mut runner = runner.with_tick_interval(Duration::from_millis(10));

    let clock = ManualClock::new();
    let mut c = controller(plan(&["A", "B", "C"], 2), &clock);
    c.start();
    let (_, total) = c.progress().unwrap();
    for _ in 0..total {
        let point = match c.current_step().unwrap().label.as_str() {
            "A" => SurfacePoint::new(0.0, 0.5),
            "B" => SurfacePoint::new(0.33, 0.5),
            _ => SurfacePoint::new(0.66, 0.5),
        };
        c.pointer(PointerEvent::Click(point));
        c.commit().unwrap();
        settle(&mut c, &mut runner, &mut events).await;
    }
    settle(&mut c, &mut runner, &mut events).await;
    assert_eq!(c.phase(), SessionPhase::Done);
    let summary = c.summary().unwrap().clone();
    assert!(summary.pass);

    let pool = AssociationPool::from_summary(&summary, generator(), Some(3));
    assert_eq!(pool.len(), 3);
    runner.set_source(Arc::new(pool));

    let clock = ManualClock::new();
    let mut s = SpeedSession::new(Some(c.session_id().to_string()), 1, Arc::new(clock.clone()));
    s.start().unwrap();

    let mut triggers = BTreeSet::new();
    let mut countdowns = 0;
    while !s.is_finished() {
        let ui = dispatch(&mut runner, s.drain_effects());
        if ui.iter().any(|e| matches!(e, Effect::OptionsRevealed { .. })) {
            let SpeedView::Revealed { trial } = s.view() else {
                panic!("options should be showing");
            };
            triggers.insert(trial.trigger().to_string());
            let expected = trial.expected_color();
            let id = trial
                .options()
                .iter()
                .find(|o| o.color == expected)
                .map(|o| o.id.clone())
                .unwrap();
            clock.advance(Duration::from_millis(250));
            assert!(s.select(&id).unwrap());
            continue;
        }
        match next_event(&mut events).await {
            HostEvent::TrialLoaded { ticket, result } => {
                s.on_trial_loaded(ticket, result);
            }
            HostEvent::CountdownTick { generation } => {
                if s.tick(generation) {
                    countdowns += 1;
                }
            }
            HostEvent::SubmissionFinished { ticket, result } => {
                s.on_submission_result(ticket, result);
            }
        }
    }

    assert_eq!(countdowns, 3);
    let expected: BTreeSet<String> = ["A", "B", "C"].into_iter().map(String::from).collect();
    assert_eq!(triggers, expected);
    let report = s.accuracy();
    assert_eq!(report.trials, 3);
    assert_eq!(report.correct, 3);
    assert_eq!(report.mean_correct_reaction_time_ms, Some(250.0));
    assert!(!runner.countdown_active());

    let text = std::fs::read_to_string(&log).unwrap();
    let forced = text
        .lines()
        .filter(|line| line.contains("\"payload\":\"forced_choice\""))
        .count();
    assert_eq!(forced, 3);
}
