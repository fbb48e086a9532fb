//! Config files turned into runnable sessions.

use std::sync::Arc;

use syntest_config::{InsufficientItems, SyntestConfig};
use syntest_engine::{
    ControllerSettings, HueLightnessPlane, InsufficientItemPolicy, ManualClock, PhasePlan,
    ScoringConfig, SessionPlan, TrialController,
};
use syntest_types::{SessionPhase, StimulusDomain};
use tempfile::tempdir;

const CONFIG: &str = r##"
[session]
title = "Note colors"
intro = "Choose a color for each note."
catalog = "notes"
repeats = 2
practice_catalog = "warmup"
seed = 42

[catalogs.notes]
domain = "tone"
items = ["C4", "E4", "G4"]

[catalogs.warmup]
items = ["SUN"]

[scoring]
cutoff = 90.0
insufficient_items = "fail"

[submission]
pending_path = "queue.json"
"##;

#[test]
fn config_file_builds_a_practice_then_testing_session() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, CONFIG).unwrap();

    let config = SyntestConfig::load_from(&path).unwrap();
    let testing = config.testing_catalog().unwrap();
    assert_eq!(testing.len(), 3);
    assert!(
        testing
            .items()
            .iter()
            .all(|item| item.domain == StimulusDomain::Tone)
    );
    let practice = config.practice_catalog().unwrap().unwrap();
    assert_eq!(practice.len(), 1);
    assert_eq!(config.submission.pending_path().file_name().unwrap(), "queue.json");

    let policy = match config.scoring.insufficient_items {
        InsufficientItems::Exclude => InsufficientItemPolicy::Exclude,
        InsufficientItems::Fail => InsufficientItemPolicy::FailSession,
    };
    let plan = SessionPlan {
        title: config.session.title.clone(),
        intro: config.session.intro.clone(),
        practice: Some(PhasePlan {
            catalog: practice,
            repeats: config.session.practice_repeats,
        }),
        testing: PhasePlan {
            catalog: testing,
            repeats: config.session.repeats,
        },
    };
    let settings = ControllerSettings {
        scoring: ScoringConfig::new(config.scoring.cutoff)
            .unwrap()
            .with_policy(policy),
        submit_practice: config.session.submit_practice,
        dev_navigation: config.session.dev_navigation,
        seed: config.session.seed,
    };
    let mut c = TrialController::new(
        plan,
        settings,
        Box::new(HueLightnessPlane::new(config.capture.saturation).unwrap()),
        Arc::new(ManualClock::new()),
    )
    .unwrap();

    c.start();
    assert_eq!(c.phase(), SessionPhase::Intro);
    assert_eq!(c.intro(), Some("Choose a color for each note."));
    c.acknowledge_intro().unwrap();
    assert_eq!(c.phase(), SessionPhase::Practice);
    assert_eq!(c.current_step().unwrap().label.as_str(), "SUN");
    assert_eq!(c.title(), "Note colors");
}

#[test]
fn broken_config_reports_its_path() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[session\n").unwrap();
    let err = SyntestConfig::load_from(&path).unwrap_err();
    assert!(err.to_string().contains("config.toml"));
}
