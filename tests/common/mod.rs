//! Shared test utilities and fixtures

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use syntest_engine::{
    ControllerSettings, Effect, EffectRunner, HostEvent, HueLightnessPlane, ManualClock,
    PhasePlan, ScoringConfig, SessionPlan, TrialController,
};
use syntest_types::StimulusCatalog;
use tokio::sync::mpsc::UnboundedReceiver;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

pub fn plan(labels: &[&str], repeats: usize) -> SessionPlan {
    SessionPlan {
        title: "Letters".into(),
        intro: None,
        practice: None,
        testing: PhasePlan {
            catalog: StimulusCatalog::from_labels(labels.iter().copied(), None).unwrap(),
            repeats,
        },
    }
}

pub fn controller(plan: SessionPlan, clock: &ManualClock) -> TrialController {
    let settings = ControllerSettings {
        scoring: ScoringConfig::new(100.0).unwrap(),
        submit_practice: false,
        dev_navigation: false,
        seed: Some(5),
    };
    TrialController::new(
        plan,
        settings,
        Box::new(HueLightnessPlane::new(1.0).unwrap()),
        Arc::new(clock.clone()),
    )
    .unwrap()
}

/// Hand effects to the runner and return the ones meant for the UI.
pub fn dispatch(runner: &mut EffectRunner, effects: Vec<Effect>) -> Vec<Effect> {
    runner.apply_all(effects)
}

pub async fn next_event(events: &mut UnboundedReceiver<HostEvent>) -> HostEvent {
    tokio::time::timeout(EVENT_TIMEOUT, events.recv())
        .await
        .expect("host event before timeout")
        .expect("runner channel open")
}

/// Run the controller's pending submission through the runner and feed the
/// completion back.
pub async fn settle(
    controller: &mut TrialController,
    runner: &mut EffectRunner,
    events: &mut UnboundedReceiver<HostEvent>,
) {
    dispatch(runner, controller.drain_effects());
    match next_event(events).await {
        HostEvent::SubmissionFinished { ticket, result } => {
            controller.on_submission_result(ticket, result);
        }
        other => panic!("unexpected host event: {other:?}"),
    }
}

/// Mount `GET /next` answers for a two-trial remote speed test.
pub async fn mount_trial_source(server: &MockServer) {
    let trial = |index: usize, trigger: &str| {
        serde_json::json!({
            "id": format!("t{index}"),
            "trigger": trigger,
            "options": [
                { "id": 1, "hex": "#ff0000" },
                { "id": 2, "hex": "#0000ff" },
                { "id": 3, "r": 0, "g": 255, "b": 0 }
            ],
            "expectedColor": "#0000ff",
            "trialIndex": index,
            "totalTrials": 2
        })
    };
    for (index, trigger) in [(0, "A"), (1, "B")] {
        Mock::given(method("GET"))
            .and(path("/speed/next"))
            .and(query_param("trialIndex", index.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(trial(index, trigger)))
            .mount(server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/speed/next"))
        .and(query_param("trialIndex", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "done": true })))
        .mount(server)
        .await;
}
