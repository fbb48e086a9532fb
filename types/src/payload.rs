//! Submission payloads handed to the persistence collaborator.
//!
//! Field names follow camelCase on the wire. The engine never depends on a
//! particular transport; these are plain serde values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ConsistencySummary, Rgb, TrialResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialKind {
    Practice,
    Consistency,
    ForcedChoice,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialPayload {
    pub session_id: String,
    pub trial_type: TrialKind,
    pub stimulus_label: String,
    pub stimulus_id: u32,
    pub stimulus_type: String,
    pub block_index: usize,
    pub position_in_block: usize,
    pub color: Option<Rgb>,
    pub none: bool,
    pub reaction_time_ms: u64,
    pub completed_at: DateTime<Utc>,
}

impl TrialPayload {
    #[must_use]
    pub fn from_response(
        session_id: &str,
        kind: TrialKind,
        response: &TrialResponse,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            trial_type: kind,
            stimulus_label: response.step.label.to_string(),
            stimulus_id: response.step.stimulus_id.value(),
            stimulus_type: response.step.domain.as_str().to_string(),
            block_index: response.step.block_index,
            position_in_block: response.step.position_in_block,
            color: response.color(),
            none: response.is_none(),
            reaction_time_ms: response.reaction_time_ms,
            completed_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForcedChoicePayload {
    pub session_id: String,
    pub trial_type: TrialKind,
    pub trial_index: usize,
    pub trial_id: String,
    pub stimulus_label: String,
    pub selected_option_id: String,
    pub selected_color: Rgb,
    pub expected_color: Rgb,
    pub correct: bool,
    pub reaction_time_ms: u64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryPayload {
    pub session_id: String,
    pub title: String,
    pub mean_distance: f64,
    pub std_deviation: f64,
    pub median_distance: f64,
    pub pair_count: usize,
    pub valid_items: usize,
    pub none_fraction: f64,
    pub mean_reaction_time_ms: f64,
    pub consistency_score: Option<f64>,
    pub cutoff: f64,
    pub pass: bool,
    pub completed_at: DateTime<Utc>,
}

impl SummaryPayload {
    #[must_use]
    pub fn from_summary(
        session_id: &str,
        title: &str,
        summary: &ConsistencySummary,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            title: title.to_string(),
            mean_distance: summary.overall_mean,
            std_deviation: summary.overall_sd,
            median_distance: summary.median_distance,
            pair_count: summary.pair_count,
            valid_items: summary.valid_item_count(),
            none_fraction: summary.none_fraction,
            mean_reaction_time_ms: summary.mean_reaction_time_ms,
            consistency_score: summary.consistency_score(),
            cutoff: summary.cutoff,
            pass: summary.pass,
            completed_at,
        }
    }
}

/// Anything the engine hands to the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "payload", rename_all = "snake_case")]
pub enum Submission {
    Trial(TrialPayload),
    ForcedChoice(ForcedChoicePayload),
    Summary(SummaryPayload),
}

impl Submission {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Submission::Trial(_) => "trial",
            Submission::ForcedChoice(_) => "forced_choice",
            Submission::Summary(_) => "summary",
        }
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        match self {
            Submission::Trial(p) => &p.session_id,
            Submission::ForcedChoice(p) => &p.session_id,
            Submission::Summary(p) => &p.session_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{Submission, TrialKind, TrialPayload};
    use crate::{Answer, NonEmptyString, Rgb, StimulusDomain, StimulusId, TrialResponse, TrialStep};

    #[test]
    fn trial_payload_wire_shape() {
        let response = TrialResponse {
            step: TrialStep {
                stimulus_id: StimulusId::new(3),
                label: NonEmptyString::new("K").unwrap(),
                domain: StimulusDomain::Letter,
                block_index: 2,
                position_in_block: 1,
            },
            answer: Answer::Color(Rgb::new(255, 0, 0)),
            reaction_time_ms: 812,
        };
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let payload = Submission::Trial(TrialPayload::from_response(
            "s-1",
            TrialKind::Consistency,
            &response,
            at,
        ));
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["payload"], "trial");
        assert_eq!(json["trialType"], "consistency");
        assert_eq!(json["stimulusLabel"], "K");
        assert_eq!(json["blockIndex"], 2);
        assert_eq!(json["color"]["hex"], "#ff0000");
        assert_eq!(json["none"], false);
        assert_eq!(json["reactionTimeMs"], 812);

        let back: Submission = serde_json::from_value(json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn none_response_serializes_null_color() {
        let response = TrialResponse {
            step: TrialStep {
                stimulus_id: StimulusId::new(0),
                label: NonEmptyString::new("7").unwrap(),
                domain: StimulusDomain::Digit,
                block_index: 0,
                position_in_block: 0,
            },
            answer: Answer::NoColor,
            reaction_time_ms: 0,
        };
        let payload =
            TrialPayload::from_response("s", TrialKind::Practice, &response, Utc::now());
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json["color"].is_null());
        assert_eq!(json["none"], true);
    }
}
