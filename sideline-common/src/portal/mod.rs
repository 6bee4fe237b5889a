use core::time::Duration;
use log::{info, warn};
use reqwest::{
    Client, ClientBuilder, Method, RequestBuilder, StatusCode,
    header::{AUTHORIZATION, HeaderValue},
};
use schedule::{ActionSubmission, CodeChallenge, MatchId, MatchInfo, ScheduleId};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::error::Error;

pub mod schedule;

/// Result of interpreting a snapshot response body: either one of the two
/// reserved sentinel strings or the data collection itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Snapshot<T> {
    /// No data will ever arrive for this topic; the matching push channel
    /// should be stopped.
    Timeout,
    /// Valid zero-length state; the push channel stays open.
    NotStarted,
    Data(Vec<T>),
}

impl<T: DeserializeOwned> Snapshot<T> {
    pub fn from_value(body: Value) -> Result<Self, Box<dyn Error>> {
        match body {
            Value::String(sentinel) => match sentinel.as_str() {
                "timeout" => Ok(Self::Timeout),
                "notstarted" => Ok(Self::NotStarted),
                other => Err(Box::new(ApiError::new(format!(
                    "Unknown sentinel value: {other}"
                )))),
            },
            data => Ok(Self::Data(serde_json::from_value(data)?)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Success,
    Rejected(String),
}

pub struct PortalClient {
    base_url: String,
    access_token: Option<String>,
    client: Client,
}

impl PortalClient {
    pub fn new(
        base_url: &str,
        access_token: Option<&str>,
        require_https: bool,
        timeout: Duration,
    ) -> Result<Self, Box<dyn Error>> {
        let client = ClientBuilder::new()
            .https_only(require_https)
            .timeout(timeout)
            .build()?;

        let base_url = base_url.trim_end_matches('/').to_string();

        Ok(Self {
            base_url,
            access_token: access_token.map(|s| s.to_string()),
            client,
        })
    }

    pub fn set_token(&mut self, token: &str) {
        self.access_token = Some(token.to_string());
    }

    /// One-shot session configuration fetch: score categories plus match
    /// setup. Called exactly once per session.
    pub fn get_match_info(
        &self,
        schedule_id: ScheduleId,
    ) -> impl std::future::Future<Output = Result<MatchInfo, Box<dyn Error>>> + use<> {
        let url = format!("{}/api/schedules/referee-match-info", self.base_url);

        let request = authenticated_request(&self.client, Method::GET, &url, &self.access_token)
            .query(&[("scheduleId", schedule_id)])
            .send();

        async move {
            let response = request.await?;

            if response.status() == StatusCode::OK {
                let body = response.text().await?;
                let info: MatchInfo = serde_json::from_str(&body)?;
                Ok(info)
            } else {
                warn!("portal match info fetch failed, response: {:?}", response);
                let body = response.text().await?;
                Err(Box::new(ApiError::new(body)))?
            }
        }
    }

    pub fn get_team_totals(
        &self,
        match_id: MatchId,
    ) -> impl std::future::Future<Output = Result<Snapshot<schedule::TeamTotal>, Box<dyn Error>>>
    + use<> {
        let url = format!("{}/api/matches/match-total-points", self.base_url);

        let request = authenticated_request(&self.client, Method::GET, &url, &self.access_token)
            .query(&[("matchId", match_id)])
            .send();

        async move {
            let response = request.await?;

            if response.status() == StatusCode::OK {
                let body = response.json::<Value>().await?;
                Snapshot::from_value(body)
            } else {
                warn!("portal team totals fetch failed, response: {:?}", response);
                let body = response.text().await?;
                Err(Box::new(ApiError::new(body)))?
            }
        }
    }

    pub fn get_action_list(
        &self,
        schedule_id: ScheduleId,
    ) -> impl std::future::Future<Output = Result<Snapshot<schedule::ActionRecord>, Box<dyn Error>>>
    + use<> {
        let url = format!("{}/api/actions/referee-actions", self.base_url);

        let request = authenticated_request(&self.client, Method::GET, &url, &self.access_token)
            .query(&[("scheduleId", schedule_id)])
            .send();

        async move {
            let response = request.await?;

            if response.status() == StatusCode::OK {
                let body = response.json::<Value>().await?;
                Snapshot::from_value(body)
            } else {
                warn!("portal action list fetch failed, response: {:?}", response);
                let body = response.text().await?;
                Err(Box::new(ApiError::new(body)))?
            }
        }
    }

    /// Asks the server to send a one-time access code to the assigned
    /// official, returning the expected code length and entry window.
    pub fn request_access_code(
        &self,
        schedule_id: ScheduleId,
    ) -> impl std::future::Future<Output = Result<CodeChallenge, Box<dyn Error>>> + use<> {
        let url = format!("{}/api/schedules/send-access-code", self.base_url);

        let request = authenticated_request(&self.client, Method::POST, &url, &self.access_token)
            .query(&[("scheduleId", schedule_id)])
            .send();

        async move {
            let response = request.await?;

            if response.status() == StatusCode::OK {
                let challenge = response.json::<CodeChallenge>().await?;
                info!(
                    "access code of {} characters sent, valid for {}s",
                    challenge.code_length, challenge.timeout_seconds
                );
                Ok(challenge)
            } else {
                warn!("portal code request failed, response: {:?}", response);
                let body = response.text().await?;
                Err(Box::new(ApiError::new(body)))?
            }
        }
    }

    /// A returned `Rejected` means the server processed and refused the code;
    /// transport problems surface as `Err` so the caller can tell the two
    /// apart (only the former consumes a verification attempt).
    pub fn verify_access_code(
        &self,
        schedule_id: ScheduleId,
        code: &str,
    ) -> impl std::future::Future<Output = Result<VerifyOutcome, Box<dyn Error>>> + use<> {
        let url = format!("{}/api/schedules/verify-access-code", self.base_url);

        let request = authenticated_request(&self.client, Method::POST, &url, &self.access_token)
            .query(&[
                ("scheduleId", schedule_id.to_string()),
                ("code", code.to_string()),
            ])
            .send();

        async move {
            let response = request.await?;

            if response.status() == StatusCode::OK || response.status() == StatusCode::BAD_REQUEST {
                let body = response.json::<Value>().await?;
                if let Some(message) = body["message"].as_str() {
                    if message.eq_ignore_ascii_case("success") {
                        info!("access code accepted");
                        Ok(VerifyOutcome::Success)
                    } else {
                        warn!("access code rejected: {message}");
                        Ok(VerifyOutcome::Rejected(message.to_string()))
                    }
                } else {
                    Err(Box::new(ApiError::new(
                        "Message not found in response".to_string(),
                    )))?
                }
            } else {
                warn!("portal code verify failed, response: {:?}", response);
                let body = response.text().await?;
                Err(Box::new(ApiError::new(body)))?
            }
        }
    }

    pub fn send_action(
        &self,
        submission: &ActionSubmission,
    ) -> impl std::future::Future<Output = Result<(), Box<dyn Error>>> + use<> {
        let url = format!("{}/api/actions/send-action", self.base_url);

        let request = authenticated_request(&self.client, Method::POST, &url, &self.access_token)
            .json(submission)
            .send();

        async move {
            let response = request.await?;

            if response.status() == StatusCode::OK {
                info!("portal action submission successful");
                Ok(())
            } else {
                warn!("portal action submission failed, response: {:?}", response);
                let body = response.text().await?;
                Err(Box::new(ApiError::new(body)))?
            }
        }
    }
}

fn authenticated_request(
    client: &Client,
    method: Method,
    url: &str,
    access_token: &Option<String>,
) -> RequestBuilder {
    let mut request = client.request(method, url);
    if let Some(token) = access_token {
        request = request.header(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
    }
    request
}

#[derive(Debug)]
struct ApiError {
    message: String,
}

impl ApiError {
    fn new(message: String) -> Self {
        Self { message }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::{schedule::TeamTotal, *};
    use serde_json::json;

    #[test]
    fn test_snapshot_sentinels() {
        assert_eq!(
            Snapshot::<TeamTotal>::from_value(json!("timeout")).unwrap(),
            Snapshot::Timeout
        );
        assert_eq!(
            Snapshot::<TeamTotal>::from_value(json!("notstarted")).unwrap(),
            Snapshot::NotStarted
        );
        assert!(Snapshot::<TeamTotal>::from_value(json!("later")).is_err());
    }

    #[test]
    fn test_snapshot_data() {
        let body = json!([
            {"id": 5, "name": "Reds", "image": "https://img.example/reds.png", "total": 12},
            {"id": 6, "name": "Blues", "total": 9}
        ]);
        let snapshot = Snapshot::<TeamTotal>::from_value(body).unwrap();
        let Snapshot::Data(totals) = snapshot else {
            panic!("expected data");
        };
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[0].total, 12);
        assert_eq!(totals[1].image, None);
    }

    #[test]
    fn test_snapshot_malformed_data() {
        assert!(Snapshot::<TeamTotal>::from_value(json!([{"id": "not-a-number"}])).is_err());
    }
}
