use crate::hub::{ChannelHandle, HubClient};
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde_json::Value;
use sideline_common::{
    clock::{ClockState, MatchClock, MatchPhase},
    portal::{
        PortalClient, Snapshot,
        schedule::{ActionRecord, MatchId, ScheduleId, TeamTotal},
    },
};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::MissedTickBehavior,
};

pub fn totals_topic(match_id: MatchId) -> String {
    format!("team-totals/{match_id}")
}

pub fn actions_topic(schedule_id: ScheduleId) -> String {
    format!("action-list/{schedule_id}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Connecting,
    Live,
    TornDown,
}

/// Whole-collection replacement from either source (snapshot or push).
/// Last write observed wins; no element-wise merging anywhere.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    Totals(Vec<TeamTotal>),
    Actions(Vec<ActionRecord>),
}

/// Reconciles the one-shot snapshots with the two push channels and owns the
/// channel lifecycle. `start` is guarded so re-invocation is a no-op; `stop`
/// is unconditional and idempotent.
#[derive(Debug)]
pub struct SessionSync {
    state: SyncState,
    started: bool,
    totals_channel: Option<ChannelHandle>,
    actions_channel: Option<ChannelHandle>,
}

impl SessionSync {
    pub fn new() -> Self {
        Self {
            state: SyncState::Idle,
            started: false,
            totals_channel: None,
            actions_channel: None,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn totals_live(&self) -> bool {
        self.totals_channel.is_some()
    }

    pub fn actions_live(&self) -> bool {
        self.actions_channel.is_some()
    }

    /// Issues both subscriptions and both snapshot fetches. The transition to
    /// `Live` is optimistic: it does not wait for any response, and pushes may
    /// arrive before (or after) the snapshot they race against.
    pub async fn start(
        &mut self,
        portal: &PortalClient,
        hub: &HubClient,
        match_id: MatchId,
        schedule_id: ScheduleId,
        updates: mpsc::Sender<SessionUpdate>,
    ) {
        if self.started {
            return;
        }
        self.started = true;
        self.state = SyncState::Connecting;
        info!("Starting session sync for match {match_id} / schedule {schedule_id}");

        let totals_updates = updates.clone();
        self.totals_channel = hub
            .subscribe(&totals_topic(match_id), move |payload| {
                dispatch_push(payload, &totals_updates, "team totals", SessionUpdate::Totals);
            })
            .await;

        let actions_updates = updates.clone();
        self.actions_channel = hub
            .subscribe(&actions_topic(schedule_id), move |payload| {
                dispatch_push(payload, &actions_updates, "action list", SessionUpdate::Actions);
            })
            .await;

        self.state = SyncState::Live;

        let (totals, actions) = tokio::join!(
            portal.get_team_totals(match_id),
            portal.get_action_list(schedule_id),
        );
        match totals {
            Ok(snapshot) => self.apply_totals_snapshot(snapshot, &updates).await,
            Err(e) => warn!("Team totals snapshot failed: {e}"),
        }
        match actions {
            Ok(snapshot) => self.apply_actions_snapshot(snapshot, &updates).await,
            Err(e) => warn!("Action list snapshot failed: {e}"),
        }
    }

    /// A `timeout` sentinel is a one-way degrade for its topic: the channel is
    /// stopped and nulled, and never reconnected. Empty totals keep whatever
    /// state is already shown.
    async fn apply_totals_snapshot(
        &mut self,
        snapshot: Snapshot<TeamTotal>,
        updates: &mpsc::Sender<SessionUpdate>,
    ) {
        match snapshot {
            Snapshot::Timeout => {
                info!("Team totals snapshot reported timeout, stopping the totals channel");
                if let Some(mut channel) = self.totals_channel.take() {
                    channel.stop();
                }
            }
            Snapshot::NotStarted => {}
            Snapshot::Data(totals) => {
                if !totals.is_empty() {
                    let _ = updates.send(SessionUpdate::Totals(totals)).await;
                }
            }
        }
    }

    async fn apply_actions_snapshot(
        &mut self,
        snapshot: Snapshot<ActionRecord>,
        updates: &mpsc::Sender<SessionUpdate>,
    ) {
        match snapshot {
            Snapshot::Timeout => {
                info!("Action list snapshot reported timeout, stopping the actions channel");
                if let Some(mut channel) = self.actions_channel.take() {
                    channel.stop();
                }
            }
            Snapshot::NotStarted => {}
            Snapshot::Data(actions) => {
                let _ = updates.send(SessionUpdate::Actions(actions)).await;
            }
        }
    }

    /// Mandatory teardown on session exit. Safe when handles are already gone.
    pub fn stop(&mut self) {
        if let Some(mut channel) = self.totals_channel.take() {
            channel.stop();
        }
        if let Some(mut channel) = self.actions_channel.take() {
            channel.stop();
        }
        self.started = false;
        self.state = SyncState::TornDown;
        info!("Session sync torn down");
    }
}

impl Default for SessionSync {
    fn default() -> Self {
        Self::new()
    }
}

/// Push frames carry the same shapes as the snapshot responses, so they go
/// through the same sentinel decoder; a sentinel over the channel is ignored.
fn dispatch_push<T, F>(payload: Value, updates: &mpsc::Sender<SessionUpdate>, what: &str, wrap: F)
where
    T: DeserializeOwned,
    F: FnOnce(Vec<T>) -> SessionUpdate,
{
    match Snapshot::<T>::from_value(payload) {
        Ok(Snapshot::Data(items)) => {
            if updates.try_send(wrap(items)).is_err() {
                warn!("Dropped a {what} push, the update queue is closed or full");
            }
        }
        Ok(_) => warn!("Sentinel received on the {what} channel, ignoring"),
        Err(e) => warn!("Malformed {what} push discarded: {e}"),
    }
}

/// Recomputes the clock once per second from absolute time and publishes it.
/// The task cancels itself once full time is reached.
pub fn spawn_clock(clock: MatchClock, updates: watch::Sender<ClockState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let state = clock.state_at(OffsetDateTime::now_utc());
            let full_time = state.phase == MatchPhase::FullTime;
            if updates.send(state).is_err() {
                return;
            }
            if full_time {
                info!("Full time reached, clock ticker stopped");
                return;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn live_session() -> SessionSync {
        SessionSync {
            state: SyncState::Live,
            started: true,
            totals_channel: Some(ChannelHandle::dummy("team-totals/42")),
            actions_channel: Some(ChannelHandle::dummy("action-list/99")),
        }
    }

    #[test]
    fn test_topics() {
        assert_eq!(totals_topic(42), "team-totals/42");
        assert_eq!(actions_topic(99), "action-list/99");
    }

    #[tokio::test]
    async fn test_totals_timeout_stops_only_the_totals_channel() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut sync = live_session();

        sync.apply_totals_snapshot(Snapshot::Timeout, &tx).await;

        assert!(!sync.totals_live());
        assert!(sync.actions_live());
        assert_eq!(sync.state(), SyncState::Live);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_actions_timeout_stops_only_the_actions_channel() {
        let (tx, _rx) = mpsc::channel(4);
        let mut sync = live_session();

        sync.apply_actions_snapshot(Snapshot::Timeout, &tx).await;

        assert!(sync.totals_live());
        assert!(!sync.actions_live());
    }

    #[tokio::test]
    async fn test_notstarted_leaves_the_channel_open() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut sync = live_session();

        sync.apply_totals_snapshot(Snapshot::NotStarted, &tx).await;

        assert!(sync.totals_live());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_empty_totals_keep_prior_state_but_actions_replace() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut sync = live_session();

        sync.apply_totals_snapshot(Snapshot::Data(vec![]), &tx).await;
        assert!(rx.try_recv().is_err());

        sync.apply_actions_snapshot(Snapshot::Data(vec![]), &tx).await;
        assert_eq!(rx.try_recv().unwrap(), SessionUpdate::Actions(vec![]));
    }

    #[tokio::test]
    async fn test_stop_is_unconditional_and_idempotent() {
        let mut sync = live_session();
        sync.stop();
        assert_eq!(sync.state(), SyncState::TornDown);
        assert!(!sync.totals_live());
        assert!(!sync.actions_live());

        // both handles already null
        sync.stop();
        assert_eq!(sync.state(), SyncState::TornDown);

        // a torn down session may be started again
        assert!(!sync.started);
    }

    #[tokio::test]
    async fn test_push_dispatch_wraps_data_and_ignores_sentinels() {
        let (tx, mut rx) = mpsc::channel(4);

        dispatch_push::<TeamTotal, _>(
            json!([{"id": 5, "name": "Reds", "total": 12}]),
            &tx,
            "team totals",
            SessionUpdate::Totals,
        );
        let SessionUpdate::Totals(totals) = rx.try_recv().unwrap() else {
            panic!("expected totals");
        };
        assert_eq!(totals[0].total, 12);

        dispatch_push::<TeamTotal, _>(json!("timeout"), &tx, "team totals", SessionUpdate::Totals);
        dispatch_push::<TeamTotal, _>(json!({"bad": true}), &tx, "team totals", SessionUpdate::Totals);
        assert!(rx.try_recv().is_err());
    }
}
