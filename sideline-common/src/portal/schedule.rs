use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};
use time::Time;

time::serde::format_description!(hms_time, Time, "[hour]:[minute]:[second]");

pub type ScheduleId = u64;
pub type MatchId = u64;

/// One-shot configuration payload for a session: the score category list and
/// the match setup. Fetched exactly once per session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchInfo {
    #[serde(rename = "scoreCategories")]
    pub score_categories: Vec<ScoreCategory>,
    #[serde(rename = "matchInfo")]
    pub config: MatchConfig,
}

/// Immutable once fetched. Start and end are times of day; the session date
/// supplies the day when the clock is built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchConfig {
    #[serde(rename = "matchId")]
    pub match_id: MatchId,
    #[serde(with = "hms_time", rename = "startTime")]
    pub start_time: Time,
    #[serde(with = "hms_time", rename = "endTime")]
    pub end_time: Time,
    #[serde(with = "hms_duration", rename = "halfDuration")]
    pub half_duration: Duration,
    #[serde(with = "hms_duration", rename = "breakDuration")]
    pub break_duration: Duration,
    pub halves: Vec<MatchHalf>,
    pub teams: Vec<TeamEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchHalf {
    #[serde(rename = "halfId")]
    pub id: u64,
    #[serde(rename = "halfName")]
    pub name: String,
}

#[serde_with::skip_serializing_none]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamEntry {
    #[serde(rename = "teamMatchId")]
    pub id: u64,
    #[serde(rename = "teamName")]
    pub name: String,
    #[serde(rename = "teamLogo")]
    pub logo: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreKind {
    Credit,
    Debit,
}

impl fmt::Display for ScoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Credit => write!(f, "Credit"),
            Self::Debit => write!(f, "Debit"),
        }
    }
}

/// Static for the match; fetched once with the match config.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreCategory {
    #[serde(rename = "scoreCategoryId")]
    pub id: u64,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: ScoreKind,
    #[serde(rename = "point")]
    pub points: i32,
}

/// Running total for one team. The whole collection is replaced on every
/// push or snapshot refresh, never merged element-wise.
#[serde_with::skip_serializing_none]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamTotal {
    pub id: u64,
    pub name: String,
    pub image: Option<String>,
    pub total: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Accepted,
    Rejected,
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Pending => write!(f, "pending"),
            Self::Accepted => write!(f, "accepted"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// One scoring action in the feed, denormalized so it renders without joins.
/// The list is replaced wholesale on each update.
#[serde_with::skip_serializing_none]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub id: u64,
    #[serde(rename = "scoreCategoryId")]
    pub score_category_id: u64,
    #[serde(rename = "scoreCategoryDescription")]
    pub score_category_description: String,
    #[serde(rename = "scoreCategoryPoint")]
    pub points: i32,
    #[serde(rename = "scoreCategoryType")]
    pub kind: ScoreKind,
    #[serde(with = "hms_duration", rename = "eventTime")]
    pub event_time: Duration,
    #[serde(rename = "teamMatchId")]
    pub team_id: u64,
    #[serde(rename = "teamName")]
    pub team_name: String,
    #[serde(rename = "teamLogo")]
    pub team_logo: Option<String>,
    #[serde(rename = "halfName")]
    pub half_name: String,
    pub status: ApprovalStatus,
}

/// POST body for a new scoring action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSubmission {
    #[serde(with = "hms_duration", rename = "eventTime")]
    pub event_time: Duration,
    #[serde(rename = "matchHalfId")]
    pub match_half_id: u64,
    #[serde(rename = "scoreCategoryId")]
    pub score_category_id: u64,
    #[serde(rename = "teamMatchId")]
    pub team_match_id: u64,
    #[serde(rename = "scheduleId")]
    pub schedule_id: ScheduleId,
}

/// Response to an access-code request: how long the code is and how long the
/// entry window stays open.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeChallenge {
    #[serde(rename = "codeLength")]
    pub code_length: u8,
    #[serde(rename = "timeoutSeconds")]
    pub timeout_seconds: u16,
}

mod hms_duration {
    use serde::{self, Deserialize, Deserializer, Serializer, de::Error};
    use std::time::Duration;

    pub fn serialize<S>(dur: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let secs = dur.as_secs();
        serializer.serialize_str(&format!(
            "{:02}:{:02}:{:02}",
            secs / 3600,
            (secs % 3600) / 60,
            secs % 60
        ))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        let mut parts = text.split(':');
        let (h, m, s) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(h), Some(m), Some(s), None) => (h, m, s),
            _ => return Err(D::Error::custom(format!("invalid HH:MM:SS value: {text}"))),
        };
        let parse = |part: &str| {
            part.parse::<u64>()
                .map_err(|_| D::Error::custom(format!("invalid HH:MM:SS value: {text}")))
        };
        Ok(Duration::from_secs(
            parse(h)? * 3600 + parse(m)? * 60 + parse(s)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::time;

    #[test]
    fn test_deserialize_match_info() {
        let json = r#"{
            "scoreCategories": [
                {"scoreCategoryId": 7, "description": "Goal", "type": "credit", "point": 3},
                {"scoreCategoryId": 8, "description": "Foul", "type": "debit", "point": 1}
            ],
            "matchInfo": {
                "matchId": 42,
                "startTime": "10:00:00",
                "endTime": "12:00:00",
                "halfDuration": "00:45:00",
                "breakDuration": "00:15:00",
                "halves": [
                    {"halfId": 1, "halfName": "1"},
                    {"halfId": 2, "halfName": "2"}
                ],
                "teams": [
                    {"teamMatchId": 5, "teamName": "Reds", "teamLogo": "https://img.example/reds.png"},
                    {"teamMatchId": 6, "teamName": "Blues"}
                ]
            }
        }"#;
        let info: MatchInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.score_categories.len(), 2);
        assert_eq!(info.score_categories[0].kind, ScoreKind::Credit);
        assert_eq!(info.score_categories[1].points, 1);
        assert_eq!(info.config.match_id, 42);
        assert_eq!(info.config.start_time, time!(10:00:00));
        assert_eq!(info.config.half_duration, Duration::from_secs(45 * 60));
        assert_eq!(info.config.break_duration, Duration::from_secs(15 * 60));
        assert_eq!(info.config.halves[1].id, 2);
        assert_eq!(info.config.teams[1].logo, None);
    }

    #[test]
    fn test_serialize_action_submission() {
        let submission = ActionSubmission {
            event_time: Duration::from_secs(50 * 60),
            match_half_id: 1,
            score_category_id: 7,
            team_match_id: 5,
            schedule_id: 99,
        };
        let serialized = serde_json::to_string(&submission).unwrap();
        assert_eq!(
            serialized,
            r#"{"eventTime":"00:50:00","matchHalfId":1,"scoreCategoryId":7,"teamMatchId":5,"scheduleId":99}"#
        );
    }

    #[test]
    fn test_deserialize_action_record() {
        let json = r#"{
            "id": 1001,
            "scoreCategoryId": 7,
            "scoreCategoryDescription": "Goal",
            "scoreCategoryPoint": 3,
            "scoreCategoryType": "credit",
            "eventTime": "01:02:03",
            "teamMatchId": 5,
            "teamName": "Reds",
            "teamLogo": "https://img.example/reds.png",
            "halfName": "2",
            "status": "pending"
        }"#;
        let record: ActionRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.event_time, Duration::from_secs(3723));
        assert_eq!(record.status, ApprovalStatus::Pending);
        assert_eq!(record.kind, ScoreKind::Credit);
    }

    #[test]
    fn test_reject_malformed_event_time() {
        let result: Result<ActionSubmission, _> = serde_json::from_str(
            r#"{"eventTime":"50:00","matchHalfId":1,"scoreCategoryId":7,"teamMatchId":5,"scheduleId":99}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_code_challenge() {
        let challenge: CodeChallenge =
            serde_json::from_str(r#"{"codeLength": 5, "timeoutSeconds": 120}"#).unwrap();
        assert_eq!(challenge.code_length, 5);
        assert_eq!(challenge.timeout_seconds, 120);
    }
}
