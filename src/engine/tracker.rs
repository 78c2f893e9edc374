//! Session segmentation. [advance] is a pure transition function over an owned [TrackerState];
//! [SessionTracker] only keeps the current state between ticks.

use std::{mem, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::storage::entities::{ActivitySession, FocusSnapshot, NormalizedActivity};

use super::classifier::MEETINGS;

/// Idle threshold for every category except meetings.
pub const IDLE_THRESHOLD: Duration = Duration::seconds(300);
/// Meetings are often watched without touching the keyboard.
pub const MEETING_IDLE_THRESHOLD: Duration = Duration::seconds(3600);
/// Idle gaps shorter than this are dropped instead of being logged as inactive time.
pub const MIN_INACTIVE_DURATION: Duration = Duration::seconds(300);
/// Sessions shorter than this are sampling noise.
pub const MIN_SESSION_DURATION: Duration = Duration::seconds(1);

/// Session that has been opened but not yet closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenSession {
    pub start: DateTime<Utc>,
    pub window_title: Arc<str>,
    pub process_name: Arc<str>,
    pub details: Arc<str>,
    pub category: Arc<str>,
}

impl OpenSession {
    fn open(start: DateTime<Utc>, snapshot: &FocusSnapshot, activity: &NormalizedActivity) -> Self {
        Self {
            start,
            window_title: snapshot.window_title.clone(),
            process_name: snapshot.process_name.clone(),
            details: activity.details.clone(),
            category: activity.category.clone(),
        }
    }

    /// Whether the observation describes a different activity. The process name alone doesn't
    /// start a new session.
    fn differs_from(&self, snapshot: &FocusSnapshot, activity: &NormalizedActivity) -> bool {
        self.window_title != snapshot.window_title
            || self.details != activity.details
            || self.category != activity.category
    }

    /// Closes the session at `end`. Returns nothing when the session isn't worth a row: shorter
    /// than [MIN_SESSION_DURATION] or without a foreground window.
    fn close(self, end: DateTime<Utc>) -> Option<ActivitySession> {
        if end - self.start < MIN_SESSION_DURATION {
            debug!("Dropping {:?} shorter than a second", self.window_title);
            return None;
        }
        if self.window_title.is_empty() {
            debug!("Dropping session without a foreground window");
            return None;
        }
        Some(ActivitySession {
            start: self.start,
            end,
            window_title: self.window_title,
            process_name: self.process_name,
            details: self.details,
            category: self.category,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TrackerState {
    #[default]
    NoSession,
    Active(OpenSession),
    Idle { since: DateTime<Utc> },
}

impl TrackerState {
    pub fn is_idle(&self) -> bool {
        matches!(self, TrackerState::Idle { .. })
    }

    pub fn open_session(&self) -> Option<&OpenSession> {
        match self {
            TrackerState::Active(session) => Some(session),
            _ => None,
        }
    }

    /// Latest time a session boundary was placed at.
    fn last_boundary(&self) -> Option<DateTime<Utc>> {
        match self {
            TrackerState::NoSession => None,
            TrackerState::Active(session) => Some(session.start),
            TrackerState::Idle { since } => Some(*since),
        }
    }
}

/// Everything the tracker learns during one tick.
#[derive(Debug, Clone)]
pub struct Observation {
    pub snapshot: FocusSnapshot,
    pub activity: NormalizedActivity,
    /// Time since the last user input. `None` on ticks where idleness isn't sampled.
    pub idle: Option<Duration>,
    pub now: DateTime<Utc>,
}

pub struct Transition {
    pub state: TrackerState,
    pub closed: Vec<ActivitySession>,
}

impl Transition {
    fn stay(state: TrackerState) -> Self {
        Self {
            state,
            closed: vec![],
        }
    }
}

/// Idle threshold that applies while `category` is in focus.
pub fn idle_threshold(category: &str) -> Duration {
    if category == MEETINGS {
        MEETING_IDLE_THRESHOLD
    } else {
        IDLE_THRESHOLD
    }
}

/// Computes the next state and the sessions that got closed on the way.
pub fn advance(state: TrackerState, observation: &Observation) -> Transition {
    let Observation {
        snapshot,
        activity,
        idle,
        now,
    } = observation;
    let idle = *idle;

    // Boundaries never move backwards, even when the wall clock does.
    let now = match state.last_boundary() {
        Some(boundary) if *now < boundary => {
            warn!("Clock went back by {}s", (boundary - *now).num_seconds());
            boundary
        }
        _ => *now,
    };

    // While idle there is no open session, so the category in focus decides.
    let threshold = idle_threshold(
        state
            .open_session()
            .map(|v| &*v.category)
            .unwrap_or(&*activity.category),
    );
    let is_idle = idle.map(|idle| idle >= threshold);

    match (state, is_idle) {
        (TrackerState::Idle { since }, Some(false)) => {
            let mut closed = vec![];
            let idle_for = now - since;
            if idle_for >= MIN_INACTIVE_DURATION {
                info!("Back after {}s of inactivity", idle_for.num_seconds());
                closed.push(ActivitySession::inactive(since, now));
            } else {
                debug!("Ignoring short idle period of {}s", idle_for.num_seconds());
            }
            Transition {
                state: TrackerState::Active(OpenSession::open(now, snapshot, activity)),
                closed,
            }
        }
        (state @ TrackerState::Idle { .. }, _) => Transition::stay(state),
        (state, Some(true)) => {
            info!(
                "Going idle, no input for {}s",
                idle.map(|v| v.num_seconds()).unwrap_or_default()
            );
            let closed = match state {
                TrackerState::Active(session) => session.close(now).into_iter().collect(),
                _ => vec![],
            };
            Transition {
                state: TrackerState::Idle { since: now },
                closed,
            }
        }
        (TrackerState::NoSession, _) => Transition::stay(TrackerState::Active(
            OpenSession::open(now, snapshot, activity),
        )),
        (TrackerState::Active(session), _) if session.differs_from(snapshot, activity) => {
            debug!(
                "Focus moved from {:?} to {:?}",
                session.window_title, snapshot.window_title
            );
            Transition {
                closed: session.close(now).into_iter().collect(),
                state: TrackerState::Active(OpenSession::open(now, snapshot, activity)),
            }
        }
        (state, _) => Transition::stay(state),
    }
}

/// Holds the [TrackerState] of one tracked stream between ticks.
#[derive(Debug, Default)]
pub struct SessionTracker {
    state: TrackerState,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &TrackerState {
        &self.state
    }

    pub fn observe(&mut self, observation: &Observation) -> Vec<ActivitySession> {
        let Transition { state, closed } = advance(mem::take(&mut self.state), observation);
        self.state = state;
        closed
    }
}
