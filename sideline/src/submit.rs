use log::info;
use sideline_common::{
    clock::{ClockState, MatchPhase, format_elapsed},
    portal::{
        PortalClient,
        schedule::{ActionSubmission, MatchConfig, ScheduleId},
    },
};
use std::time::Duration;
use thiserror::Error;

/// Refused before any network call is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitRefusal {
    #[error("scoring is only available during a half (currently: {0})")]
    NoActiveHalf(MatchPhase),
    #[error("half {0} is not part of this match")]
    UnknownHalf(u8),
}

/// Turns an operator tap into a time-stamped, half-scoped submission.
/// No optimistic local update: the new action only becomes visible through
/// the next push or snapshot cycle.
#[derive(Debug, Clone, Copy)]
pub struct ActionSubmitter {
    schedule_id: ScheduleId,
}

impl ActionSubmitter {
    pub fn new(schedule_id: ScheduleId) -> Self {
        Self { schedule_id }
    }

    /// Resolves the active half by the clock's half ordinal. The event time
    /// is the elapsed match time, floor-truncated to whole seconds.
    pub fn build(
        &self,
        config: &MatchConfig,
        clock: &ClockState,
        score_category_id: u64,
        team_id: u64,
    ) -> Result<ActionSubmission, SubmitRefusal> {
        let half_number = clock
            .phase
            .half_number()
            .ok_or(SubmitRefusal::NoActiveHalf(clock.phase))?;
        let half = config
            .halves
            .get(usize::from(half_number) - 1)
            .ok_or(SubmitRefusal::UnknownHalf(half_number))?;

        Ok(ActionSubmission {
            event_time: Duration::from_secs(clock.elapsed.as_secs()),
            match_half_id: half.id,
            score_category_id,
            team_match_id: team_id,
            schedule_id: self.schedule_id,
        })
    }

    pub async fn submit(
        &self,
        portal: &PortalClient,
        submission: ActionSubmission,
    ) -> Result<(), Box<dyn std::error::Error>> {
        info!(
            "Submitting category {} for team {} at {} (half {})",
            submission.score_category_id,
            submission.team_match_id,
            format_elapsed(submission.event_time),
            submission.match_half_id,
        );
        portal.send_action(&submission).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sideline_common::portal::schedule::MatchHalf;
    use time::macros::time;

    fn config() -> MatchConfig {
        MatchConfig {
            match_id: 42,
            start_time: time!(10:00:00),
            end_time: time!(12:00:00),
            half_duration: Duration::from_secs(45 * 60),
            break_duration: Duration::from_secs(15 * 60),
            halves: vec![
                MatchHalf {
                    id: 11,
                    name: "1".to_string(),
                },
                MatchHalf {
                    id: 12,
                    name: "2".to_string(),
                },
            ],
            teams: vec![],
        }
    }

    fn clock(phase: MatchPhase, elapsed: Duration) -> ClockState {
        ClockState {
            phase,
            elapsed,
            progress: 0.5,
        }
    }

    #[test]
    fn test_refuses_outside_a_half() {
        let submitter = ActionSubmitter::new(99);
        let config = config();

        for phase in [MatchPhase::NotStarted, MatchPhase::Break, MatchPhase::FullTime] {
            assert_eq!(
                submitter.build(&config, &clock(phase, Duration::ZERO), 7, 5),
                Err(SubmitRefusal::NoActiveHalf(phase))
            );
        }
    }

    #[test]
    fn test_builds_half_scoped_submission() {
        let submitter = ActionSubmitter::new(99);
        let state = clock(
            MatchPhase::Half(2),
            Duration::from_secs(65 * 60) + Duration::from_millis(400),
        );

        let submission = submitter.build(&config(), &state, 7, 5).unwrap();
        assert_eq!(submission.match_half_id, 12);
        assert_eq!(submission.event_time, Duration::from_secs(65 * 60));
        assert_eq!(submission.score_category_id, 7);
        assert_eq!(submission.team_match_id, 5);
        assert_eq!(submission.schedule_id, 99);
    }

    #[test]
    fn test_refuses_a_half_missing_from_the_list() {
        let submitter = ActionSubmitter::new(99);
        let state = clock(MatchPhase::Half(3), Duration::from_secs(7000));
        assert_eq!(
            submitter.build(&config(), &state, 7, 5),
            Err(SubmitRefusal::UnknownHalf(3))
        );
    }
}
