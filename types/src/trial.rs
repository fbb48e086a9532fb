//! Trial steps, committed responses, and session phases.

use serde::{Deserialize, Serialize};

use crate::{NonEmptyString, Rgb, StimulusDomain, StimulusId};

/// One presentation slot in a deck. Immutable once the deck is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialStep {
    pub stimulus_id: StimulusId,
    pub label: NonEmptyString,
    pub domain: StimulusDomain,
    pub block_index: usize,
    pub position_in_block: usize,
}

/// The committed answer of a trial.
///
/// A response is either a color or an explicit "no color" flag, never both and
/// never neither. Encoding it as an enum makes the other states unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "color")]
pub enum Answer {
    Color(Rgb),
    NoColor,
}

/// A frozen response, appended to the response list on commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialResponse {
    pub step: TrialStep,
    pub answer: Answer,
    pub reaction_time_ms: u64,
}

impl TrialResponse {
    #[must_use]
    pub fn color(&self) -> Option<Rgb> {
        match self.answer {
            Answer::Color(color) => Some(color),
            Answer::NoColor => None,
        }
    }

    /// True when the participant explicitly reported no color.
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self.answer, Answer::NoColor)
    }
}

/// Top-level phase of a consistency session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Intro,
    Practice,
    Testing,
    Done,
}

impl SessionPhase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionPhase::Intro => "intro",
            SessionPhase::Practice => "practice",
            SessionPhase::Testing => "testing",
            SessionPhase::Done => "done",
        }
    }

    /// Phases that traverse a deck of trials.
    #[must_use]
    pub fn has_deck(self) -> bool {
        matches!(self, SessionPhase::Practice | SessionPhase::Testing)
    }
}

#[cfg(test)]
mod tests {
    use super::{Answer, SessionPhase, TrialResponse, TrialStep};
    use crate::{NonEmptyString, Rgb, StimulusDomain, StimulusId};

    fn step() -> TrialStep {
        TrialStep {
            stimulus_id: StimulusId::new(0),
            label: NonEmptyString::new("A").unwrap(),
            domain: StimulusDomain::Letter,
            block_index: 0,
            position_in_block: 0,
        }
    }

    #[test]
    fn color_and_none_are_exclusive() {
        let colored = TrialResponse {
            step: step(),
            answer: Answer::Color(Rgb::new(1, 2, 3)),
            reaction_time_ms: 10,
        };
        assert_eq!(colored.color(), Some(Rgb::new(1, 2, 3)));
        assert!(!colored.is_none());

        let none = TrialResponse {
            answer: Answer::NoColor,
            ..colored
        };
        assert_eq!(none.color(), None);
        assert!(none.is_none());
    }

    #[test]
    fn deck_phases() {
        assert!(SessionPhase::Practice.has_deck());
        assert!(SessionPhase::Testing.has_deck());
        assert!(!SessionPhase::Intro.has_deck());
        assert!(!SessionPhase::Done.has_deck());
    }
}
