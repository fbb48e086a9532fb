//! Speed test against an HTTP trial source.

use std::sync::Arc;
use std::time::Duration;

use syntest_engine::{
    EffectRunner, HostEvent, HttpTrialSource, JsonlSubmitter, MonotonicClock, OptionId,
    SpeedSession, SpeedView,
};
use tempfile::tempdir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{dispatch, mount_trial_source, next_event};

fn source(server: &MockServer) -> Arc<HttpTrialSource> {
    Arc::new(
        HttpTrialSource::new(format!("{}/speed", server.uri()), Duration::from_secs(5)).unwrap(),
    )
}

#[tokio::test]
async fn remote_trials_are_answered_and_logged() {
    let server = MockServer::start().await;
    mount_trial_source(&server).await;
    let dir = tempdir().unwrap();
    let log = dir.path().join("speed.jsonl");
    let (mut runner, mut events) =
        EffectRunner::new(Arc::new(JsonlSubmitter::new(&log)), Some(source(&server)));

    let mut s = SpeedSession::new(Some("s-1".into()), 0, Arc::new(MonotonicClock));
    s.start().unwrap();
    // Answer the first trial correctly and the second with red.
    let mut picks = vec![OptionId::new("1"), OptionId::new("2")];

    while !s.is_finished() {
        dispatch(&mut runner, s.drain_effects());
        match next_event(&mut events).await {
            HostEvent::TrialLoaded { ticket, result } => {
                assert!(s.on_trial_loaded(ticket, result));
                assert!(matches!(s.view(), SpeedView::Revealed { .. } | SpeedView::Finished));
                if let SpeedView::Revealed { trial } = s.view() {
                    assert_eq!(trial.options().len(), 3);
                    let pick = picks.pop().unwrap();
                    s.select(&pick).unwrap();
                }
            }
            HostEvent::SubmissionFinished { ticket, result } => {
                s.on_submission_result(ticket, result);
            }
            HostEvent::CountdownTick { .. } => panic!("countdown disabled"),
        }
    }

    let report = s.accuracy();
    assert_eq!(report.trials, 2);
    assert_eq!(report.correct, 1);
    assert!((report.accuracy - 0.5).abs() < 1e-9);

    let text = std::fs::read_to_string(&log).unwrap();
    let lines: Vec<serde_json::Value> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().all(|v| v["payload"] == "forced_choice"));
    assert!(lines.iter().all(|v| v["sessionId"] == "s-1"));
    assert_eq!(lines[0]["correct"], true);
    assert_eq!(lines[1]["correct"], false);
}

#[tokio::test]
async fn no_color_data_ends_the_test_immediately() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/speed/next"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(serde_json::json!({ "error": "no_color_data" })),
        )
        .mount(&server)
        .await;
    let dir = tempdir().unwrap();
    let (mut runner, mut events) = EffectRunner::new(
        Arc::new(JsonlSubmitter::new(dir.path().join("x.jsonl"))),
        Some(source(&server)),
    );

    let mut s = SpeedSession::new(None, 3, Arc::new(MonotonicClock));
    s.start().unwrap();
    dispatch(&mut runner, s.drain_effects());
    let HostEvent::TrialLoaded { ticket, result } = next_event(&mut events).await else {
        panic!("expected a trial load");
    };
    s.on_trial_loaded(ticket, result);
    assert!(s.is_finished());
    assert_eq!(s.accuracy().trials, 0);
}

#[tokio::test]
async fn load_failure_can_be_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/speed/next"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_trial_source(&server).await;
    let dir = tempdir().unwrap();
    let (mut runner, mut events) = EffectRunner::new(
        Arc::new(JsonlSubmitter::new(dir.path().join("x.jsonl"))),
        Some(source(&server)),
    );

    let mut s = SpeedSession::new(None, 0, Arc::new(MonotonicClock));
    s.start().unwrap();
    dispatch(&mut runner, s.drain_effects());
    let HostEvent::TrialLoaded { ticket, result } = next_event(&mut events).await else {
        panic!("expected a trial load");
    };
    s.on_trial_loaded(ticket, result);
    assert!(matches!(s.view(), SpeedView::LoadFailed { .. }));

    s.retry_load().unwrap();
    dispatch(&mut runner, s.drain_effects());
    let HostEvent::TrialLoaded { ticket, result } = next_event(&mut events).await else {
        panic!("expected a trial load");
    };
    s.on_trial_loaded(ticket, result);
    let SpeedView::Revealed { trial } = s.view() else {
        panic!("trial should be showing");
    };
    assert_eq!(trial.trigger(), "A");
}
