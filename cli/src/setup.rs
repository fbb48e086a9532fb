//! Turning configuration into engine collaborators.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use syntest_config::{InsufficientItems, SyntestConfig, data_dir};
use syntest_engine::{
    ControllerSettings, FanoutSubmitter, ForcedChoiceConfig, ForcedChoiceGenerator,
    HttpSubmitter, HttpTrialSource, InsufficientItemPolicy, JsonlSubmitter, PhasePlan,
    ScoringConfig, SessionPlan, Submitter, TrialSource,
};

use crate::assets;

/// User config (explicit path, `SYNTEST_CONFIG`, or `~/.syntest/config.toml`)
/// layered over the bundled defaults. Falls back to the bundled config alone.
pub fn load_config(explicit: Option<&Path>) -> Result<SyntestConfig> {
    let bundled = assets::default_config()?;
    let user = match explicit {
        Some(path) => Some(SyntestConfig::load_from(path)?),
        None => SyntestConfig::load()?,
    };
    Ok(match user {
        Some(user) => user.with_fallback_catalogs(bundled),
        None => bundled.clone(),
    })
}

pub fn session_plan(config: &SyntestConfig, catalog: Option<&str>) -> Result<SessionPlan> {
    let testing = match catalog {
        Some(name) => config.catalog(name)?,
        None => config.testing_catalog()?,
    };
    let practice = config.practice_catalog()?.map(|catalog| PhasePlan {
        catalog,
        repeats: config.session.practice_repeats,
    });
    Ok(SessionPlan {
        title: config.session.title.clone(),
        intro: config.session.intro.clone(),
        practice,
        testing: PhasePlan {
            catalog: testing,
            repeats: config.session.repeats,
        },
    })
}

pub fn controller_settings(
    config: &SyntestConfig,
    seed: Option<u64>,
) -> Result<ControllerSettings> {
    let policy = match config.scoring.insufficient_items {
        InsufficientItems::Exclude => InsufficientItemPolicy::Exclude,
        InsufficientItems::Fail => InsufficientItemPolicy::FailSession,
    };
    let scoring = ScoringConfig::new(config.scoring.cutoff)?.with_policy(policy);
    Ok(ControllerSettings {
        scoring,
        submit_practice: config.session.submit_practice,
        dev_navigation: config.session.dev_navigation,
        seed: seed.or(config.session.seed),
    })
}

pub fn choice_generator(config: &SyntestConfig) -> Result<ForcedChoiceGenerator> {
    let fc = &config.forced_choice;
    Ok(ForcedChoiceGenerator::new(ForcedChoiceConfig {
        candidates: fc.candidates,
        min_distance: fc.min_distance,
        max_attempts: fc.max_attempts,
    })?)
}

/// Local JSON-lines copy, plus the HTTP endpoint when one is configured.
pub fn submitter(config: &SyntestConfig) -> Result<Arc<dyn Submitter>> {
    let submission = &config.submission;
    let jsonl_path = submission
        .jsonl_path
        .clone()
        .unwrap_or_else(|| data_dir().join("results.jsonl"));
    let local: Arc<dyn Submitter> = Arc::new(JsonlSubmitter::new(jsonl_path));
    let Some(endpoint) = submission.endpoint().filter(|e| !e.trim().is_empty()) else {
        return Ok(local);
    };
    let remote = HttpSubmitter::new(endpoint, Duration::from_secs(submission.timeout_secs))
        .context("failed to build submission client")?;
    Ok(Arc::new(FanoutSubmitter::new(vec![local, Arc::new(remote)])))
}

pub fn remote_source(config: &SyntestConfig, url: Option<&str>) -> Result<Arc<dyn TrialSource>> {
    let Some(url) = url
        .map(str::to_string)
        .or_else(|| config.submission.trial_source())
        .filter(|u| !u.trim().is_empty())
    else {
        bail!("no trial source configured: pass --source or set submission.trial_source");
    };
    let source = HttpTrialSource::new(url, Duration::from_secs(config.submission.timeout_secs))
        .context("failed to build trial source client")?;
    Ok(Arc::new(source))
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use syntest_config::SyntestConfig;
    use syntest_engine::InsufficientItemPolicy;

    use super::{choice_generator, controller_settings, remote_source, session_plan};
    use crate::assets;

    fn config(extra: &str) -> SyntestConfig {
        SyntestConfig::from_toml_str(extra, Path::new("test.toml"))
            .unwrap()
            .with_fallback_catalogs(assets::default_config().unwrap())
    }

    #[test]
    fn plan_uses_named_catalog_and_practice() {
        let config = config(
            "[session]\ncatalog = \"digits\"\npractice_catalog = \"warmup\"\npractice_repeats = 2\n",
        );
        let plan = session_plan(&config, None).unwrap();
        assert_eq!(plan.testing.catalog.len(), 10);
        let practice = plan.practice.unwrap();
        assert_eq!(practice.catalog.len(), 3);
        assert_eq!(practice.repeats, 2);

        let plan = session_plan(&config, Some("weekdays")).unwrap();
        assert_eq!(plan.testing.catalog.len(), 7);
        assert!(session_plan(&config, Some("nope")).is_err());
    }

    #[test]
    fn settings_map_policy_and_seed() {
        let config = config(
            "[session]\nseed = 9\n[scoring]\ncutoff = 80.0\ninsufficient_items = \"fail\"\n",
        );
        let settings = controller_settings(&config, None).unwrap();
        assert_eq!(settings.seed, Some(9));
        assert_eq!(settings.scoring.cutoff(), 80.0);
        assert_eq!(settings.scoring.policy(), InsufficientItemPolicy::FailSession);
        assert_eq!(controller_settings(&config, Some(1)).unwrap().seed, Some(1));

        let bad = config_with_cutoff(-1.0);
        assert!(controller_settings(&bad, None).is_err());
    }

    fn config_with_cutoff(cutoff: f64) -> SyntestConfig {
        config(&format!("[scoring]\ncutoff = {cutoff:?}\n"))
    }

    #[test]
    fn generator_rejects_bad_forced_choice_config() {
        assert!(choice_generator(&config("")).is_ok());
        assert!(choice_generator(&config("[forced_choice]\ncandidates = 1\n")).is_err());
    }

    #[test]
    fn speed_needs_a_source() {
        let config = config("");
        assert!(remote_source(&config, None).is_err());
        assert!(remote_source(&config, Some("http://127.0.0.1:9/speed")).is_ok());
    }
}
