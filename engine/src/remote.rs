//! HTTP collaborators: payload submission and forced-choice trial source.

use std::time::Duration;

use serde::Deserialize;
use syntest_types::{Rgb, Submission};

use crate::forced_choice::{ChoiceOption, NextTrial, OptionId, TrialDescriptor};
use crate::runtime::{SubmitFut, Submitter, TrialFut, TrialSource};
use crate::submission::{SourceError, SubmissionError};
use crate::EngineError;

const MAX_ERROR_BODY_BYTES: usize = 4 * 1024;

fn build_client(timeout: Duration) -> Result<reqwest::Client, EngineError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| EngineError::invalid(format!("failed to build HTTP client: {e}")))
}

async fn read_capped_error_body(response: reqwest::Response) -> String {
    let mut text = response.text().await.unwrap_or_default();
    if text.len() > MAX_ERROR_BODY_BYTES {
        let mut cut = MAX_ERROR_BODY_BYTES;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}

/// POSTs payload batches as a JSON array.
#[derive(Debug, Clone)]
pub struct HttpSubmitter {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSubmitter {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, EngineError> {
        Ok(Self {
            client: build_client(timeout)?,
            endpoint: endpoint.into(),
        })
    }

    async fn post(&self, batch: &[Submission]) -> Result<(), SubmissionError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(batch)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SubmissionError::Timeout
                } else {
                    SubmissionError::Transport(e.to_string())
                }
            })?;
        let status = response.status();
        if !status.is_success() {
            let message = read_capped_error_body(response).await;
            tracing::warn!(%status, "Submission endpoint rejected batch");
            return Err(SubmissionError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        tracing::debug!(count = batch.len(), "Submitted batch");
        Ok(())
    }
}

impl Submitter for HttpSubmitter {
    fn submit<'a>(&'a self, batch: &'a [Submission]) -> SubmitFut<'a> {
        Box::pin(self.post(batch))
    }
}

/// GETs `{base}/next?trialIndex=N`.
#[derive(Debug, Clone)]
pub struct HttpTrialSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTrialSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, EngineError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into(),
        })
    }

    fn url(&self, index: usize) -> String {
        format!("{}/next?trialIndex={index}", self.base_url.trim_end_matches('/'))
    }

    async fn fetch(&self, index: usize) -> Result<NextTrial, SourceError> {
        let response = self
            .client
            .get(self.url(index))
            .send()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            let body = read_capped_error_body(response).await;
            if is_no_color_data(&body) {
                tracing::info!("Trial source has no color associations");
                return Ok(NextTrial::Done);
            }
            return Err(SourceError::Rejected {
                status: status.as_u16(),
                message: body,
            });
        }
        if !status.is_success() {
            let message = read_capped_error_body(response).await;
            return Err(SourceError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        let body = response
            .text()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;
        parse_next_trial(&body, index)
    }
}

impl TrialSource for HttpTrialSource {
    fn next_trial(&self, index: usize) -> TrialFut<'_> {
        Box::pin(self.fetch(index))
    }
}

fn is_no_color_data(body: &str) -> bool {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: String,
    }
    serde_json::from_str::<ErrorBody>(body).is_ok_and(|b| b.error == "no_color_data")
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireId {
    Text(String),
    Number(u64),
}

impl WireId {
    fn into_string(self) -> String {
        match self {
            WireId::Text(s) => s,
            WireId::Number(n) => n.to_string(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireColor {
    Hex(String),
    Channels { r: u8, g: u8, b: u8 },
}

impl WireColor {
    fn into_rgb(self) -> Result<Rgb, SourceError> {
        match self {
            WireColor::Hex(hex) => {
                Rgb::parse_hex(&hex).map_err(|e| SourceError::InvalidTrial(e.to_string()))
            }
            WireColor::Channels { r, g, b } => Ok(Rgb::new(r, g, b)),
        }
    }
}

#[derive(Deserialize)]
struct WireOption {
    id: WireId,
    #[serde(default)]
    color: Option<WireColor>,
    #[serde(default)]
    hex: Option<String>,
    #[serde(default)]
    r: Option<u8>,
    #[serde(default)]
    g: Option<u8>,
    #[serde(default)]
    b: Option<u8>,
}

impl WireOption {
    fn into_option(self) -> Result<ChoiceOption, SourceError> {
        let id = self.id.into_string();
        let color = match (self.color, self.hex, self.r, self.g, self.b) {
            (Some(color), ..) => color.into_rgb()?,
            (None, Some(hex), ..) => WireColor::Hex(hex).into_rgb()?,
            (None, None, Some(r), Some(g), Some(b)) => Rgb::new(r, g, b),
            _ => {
                return Err(SourceError::InvalidTrial(format!(
                    "option {id} has no color"
                )));
            }
        };
        Ok(ChoiceOption {
            id: OptionId::new(id),
            color,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTrial {
    #[serde(default)]
    done: bool,
    id: Option<WireId>,
    #[serde(alias = "trigger")]
    target_trigger: Option<String>,
    #[serde(default)]
    options: Vec<WireOption>,
    expected_color: Option<WireColor>,
    #[serde(alias = "index")]
    trial_index: Option<usize>,
    total_trials: Option<usize>,
}

fn parse_next_trial(body: &str, requested: usize) -> Result<NextTrial, SourceError> {
    let wire: WireTrial = serde_json::from_str(body)
        .map_err(|e| SourceError::InvalidTrial(format!("malformed trial descriptor: {e}")))?;
    if wire.done {
        return Ok(NextTrial::Done);
    }
    let missing = |field: &str| SourceError::InvalidTrial(format!("descriptor is missing {field}"));
    let id = wire.id.ok_or_else(|| missing("id"))?.into_string();
    let target_trigger = wire.target_trigger.ok_or_else(|| missing("trigger"))?;
    let expected_color = wire
        .expected_color
        .ok_or_else(|| missing("expectedColor"))?
        .into_rgb()?;
    let options = wire
        .options
        .into_iter()
        .map(WireOption::into_option)
        .collect::<Result<Vec<_>, _>>()?;
    if options.is_empty() {
        return Err(missing("options"));
    }
    Ok(NextTrial::Trial(TrialDescriptor {
        id,
        target_trigger,
        options,
        expected_color,
        trial_index: wire.trial_index.unwrap_or(requested),
        total_trials: wire.total_trials.unwrap_or(0),
    }))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use syntest_types::{Rgb, Submission, SummaryPayload};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::{HttpSubmitter, HttpTrialSource, parse_next_trial};
    use crate::runtime::{Submitter, TrialSource};
    use crate::submission::{SourceError, SubmissionError};
    use crate::{NextTrial, OptionId};

    fn payload() -> Submission {
        Submission::Summary(SummaryPayload {
            session_id: "s".into(),
            title: "Letters".into(),
            mean_distance: 12.0,
            std_deviation: 3.0,
            median_distance: 11.0,
            pair_count: 9,
            valid_items: 3,
            none_fraction: 0.0,
            mean_reaction_time_ms: 800.0,
            consistency_score: Some(0.75),
            cutoff: 100.0,
            pass: true,
            completed_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        })
    }

    #[tokio::test]
    async fn submitter_posts_json_array() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/submit"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let submitter =
            HttpSubmitter::new(format!("{}/submit", server.uri()), Duration::from_secs(5)).unwrap();
        submitter.submit(&[payload()]).await.unwrap();

        let received = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(body[0]["payload"], "summary");
        assert_eq!(body[0]["meanDistance"], 12.0);
    }

    #[tokio::test]
    async fn submitter_maps_non_success_to_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let submitter = HttpSubmitter::new(server.uri(), Duration::from_secs(5)).unwrap();
        let err = submitter.submit(&[payload()]).await.unwrap_err();
        assert_eq!(
            err,
            SubmissionError::Rejected {
                status: 503,
                message: "maintenance".into()
            }
        );
    }

    #[tokio::test]
    async fn trial_source_parses_descriptor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/speed/next"))
            .and(query_param("trialIndex", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 17,
                "trigger": "A",
                "options": [
                    {"id": "a", "hex": "#ff0000"},
                    {"id": "b", "color": {"r": 0, "g": 0, "b": 255}},
                    {"id": 3, "r": 0, "g": 255, "b": 0}
                ],
                "expectedColor": "#f00",
                "index": 2,
                "totalTrials": 5
            })))
            .mount(&server)
            .await;

        let source =
            HttpTrialSource::new(format!("{}/speed/", server.uri()), Duration::from_secs(5))
                .unwrap();
        let NextTrial::Trial(descriptor) = source.next_trial(2).await.unwrap() else {
            panic!("expected a trial");
        };
        assert_eq!(descriptor.id, "17");
        assert_eq!(descriptor.target_trigger, "A");
        assert_eq!(descriptor.expected_color, Rgb::new(255, 0, 0));
        assert_eq!(descriptor.options[1].color, Rgb::new(0, 0, 255));
        assert_eq!(descriptor.options[2].id, OptionId::new("3"));
        assert_eq!(descriptor.trial_index, 2);
        assert_eq!(descriptor.total_trials, 5);
    }

    #[tokio::test]
    async fn trial_source_done_and_no_color_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("trialIndex", "0"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(serde_json::json!({"error": "no_color_data"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("trialIndex", "1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"done": true, "totalTrials": 4})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("trialIndex", "2"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let source = HttpTrialSource::new(server.uri(), Duration::from_secs(5)).unwrap();
        assert_eq!(source.next_trial(0).await.unwrap(), NextTrial::Done);
        assert_eq!(source.next_trial(1).await.unwrap(), NextTrial::Done);
        assert!(matches!(
            source.next_trial(2).await,
            Err(SourceError::Rejected { status: 500, .. })
        ));
    }

    #[test]
    fn descriptor_without_expected_color_is_invalid() {
        let body = r##"{"id":"x","trigger":"A","options":[{"id":"a","hex":"#000"}]}"##;
        assert!(matches!(
            parse_next_trial(body, 0),
            Err(SourceError::InvalidTrial(_))
        ));
    }
}
