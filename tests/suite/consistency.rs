//! Consistency sessions driven through the effect runner with real submitters.

use std::sync::Arc;
use std::time::Duration;

use syntest_engine::{
    EffectRunner, HttpSubmitter, JsonlSubmitter, ManualClock, PendingQueue, PointerEvent,
    SurfacePoint, resync_pending,
};
use syntest_types::SessionPhase;
use tempfile::tempdir;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{controller, plan, settle};

fn hue_for(label: &str) -> SurfacePoint {
    match label {
        "A" => SurfacePoint::new(0.0, 0.5),
        "B" => SurfacePoint::new(0.5, 0.5),
        _ => SurfacePoint::new(0.25, 0.5),
    }
}

#[tokio::test]
async fn full_session_writes_every_payload_to_jsonl() {
    let dir = tempdir().unwrap();
    let log = dir.path().join("results.jsonl");
    let (mut runner, mut events) = EffectRunner::new(Arc::new(JsonlSubmitter::new(&log)), None);
    let clock = ManualClock::new();
    let mut c = controller(plan(&["A", "B"], 2), &clock);
    c.start();
    assert_eq!(c.phase(), SessionPhase::Testing);

    let (_, total) = c.progress().unwrap();
    for _ in 0..total {
        clock.advance(Duration::from_millis(400));
        let label = c.current_step().unwrap().label.to_string();
        assert!(c.pointer(PointerEvent::Click(hue_for(&label))));
        c.commit().unwrap();
        settle(&mut c, &mut runner, &mut events).await;
    }
    settle(&mut c, &mut runner, &mut events).await;
    assert_eq!(c.phase(), SessionPhase::Done);

    let summary = c.summary().unwrap();
    assert!(summary.pass);
    assert_eq!(summary.overall_mean, 0.0);
    assert_eq!(summary.valid_item_count(), 2);
    assert!((summary.mean_reaction_time_ms - 400.0).abs() < 1e-9);

    let text = std::fs::read_to_string(&log).unwrap();
    let kinds: Vec<String> = text
        .lines()
        .map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            value["payload"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(kinds, ["trial", "trial", "trial", "trial", "summary"]);
    assert!(c.pending().is_empty());
}

#[tokio::test]
async fn rejected_submissions_are_queued_on_skip_and_quit_then_resynced() {
    let down = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&down)
        .await;
    let submitter = HttpSubmitter::new(down.uri(), Duration::from_secs(5)).unwrap();
    let (mut runner, mut events) = EffectRunner::new(Arc::new(submitter), None);
    let clock = ManualClock::new();
    let mut c = controller(plan(&["A"], 2), &clock);
    c.start();

    c.set_no_color().unwrap();
    c.commit().unwrap();
    settle(&mut c, &mut runner, &mut events).await;
    assert_eq!(c.failure().unwrap().attempts, 1);
    assert_eq!(c.progress().unwrap().0, 0);

    c.retry_submission().unwrap();
    settle(&mut c, &mut runner, &mut events).await;
    assert_eq!(c.failure().unwrap().attempts, 2);

    c.skip_submission().unwrap();
    assert!(c.failure().is_none());
    assert_eq!(c.progress().unwrap().0, 1);
    assert_eq!(c.pending().len(), 1);

    // Quit with the second trial's submission still failed.
    c.set_no_color().unwrap();
    c.commit().unwrap();
    settle(&mut c, &mut runner, &mut events).await;
    assert_eq!(c.failure().unwrap().attempts, 1);
    let teardown = c.teardown();

    let dir = tempdir().unwrap();
    let queue_path = dir.path().join("pending.json");
    teardown.pending.save(&queue_path).unwrap();
    let mut queue = PendingQueue::load(&queue_path).unwrap();
    assert_eq!(queue.len(), 2);

    let up = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&up)
        .await;
    let submitter = HttpSubmitter::new(up.uri(), Duration::from_secs(5)).unwrap();
    assert_eq!(resync_pending(&mut queue, &submitter).await.unwrap(), 2);
    assert!(queue.is_empty());
    queue.save(&queue_path).unwrap();
    assert!(PendingQueue::load(&queue_path).unwrap().is_empty());

    let received = up.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(body.as_array().unwrap().len(), 2);
    assert!(body.as_array().unwrap().iter().all(|p| p["none"] == true));
}

#[tokio::test]
async fn missing_queue_file_loads_empty() {
    let dir = tempdir().unwrap();
    let queue = PendingQueue::load(&dir.path().join("absent.json")).unwrap();
    assert!(queue.is_empty());
}
