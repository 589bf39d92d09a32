//! Trade status state machine.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The status of a trade offer in its lifecycle.
///
/// State transitions:
/// ```text
/// Created ──► AwaitingAnnouncement ──► LockPending ──► Pending ──► Accepted ──► ExchangePending ──► Completed
///    │                 │                    │                          │               │
///    └─────────────────┴────────────────────┴──────────────────────────┴───────────────┴──► Error
/// ```
///
/// A lock confirmation may overtake the announcement, so `Pending` is also
/// reachable from `AwaitingAnnouncement`, and an exchange confirmation may
/// overtake the `ExchangePending` write, so `Completed` is reachable from
/// `Accepted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TradeStatus {
    /// Trade persisted, inventory lock not yet submitted.
    #[default]
    Created,

    /// Lock submitted, creation not yet announced on the bus.
    AwaitingAnnouncement,

    /// Creation announced, waiting for the inventory lock confirmation.
    LockPending,

    /// Items locked, waiting for the counter-party to accept.
    Pending,

    /// Counter-party accepted, exchange about to be submitted.
    Accepted,

    /// Exchange submitted, waiting for the inventory confirmation.
    ExchangePending,

    /// Items exchanged (terminal state).
    Completed,

    /// A submission to the inventory service failed (terminal state).
    Error,
}

impl TradeStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [TradeStatus; 8] = [
        TradeStatus::Created,
        TradeStatus::AwaitingAnnouncement,
        TradeStatus::LockPending,
        TradeStatus::Pending,
        TradeStatus::Accepted,
        TradeStatus::ExchangePending,
        TradeStatus::Completed,
        TradeStatus::Error,
    ];

    /// Returns true if the trade is still waiting for its items to be locked.
    pub fn is_awaiting_lock(&self) -> bool {
        matches!(
            self,
            TradeStatus::AwaitingAnnouncement | TradeStatus::LockPending
        )
    }

    /// Returns true if the trade can be accepted in this status.
    pub fn can_accept(&self) -> bool {
        matches!(self, TradeStatus::Pending)
    }

    /// Returns true if an exchange confirmation can complete the trade.
    pub fn can_complete(&self) -> bool {
        matches!(self, TradeStatus::Accepted | TradeStatus::ExchangePending)
    }

    /// Returns true if the trade can still move to `Error`.
    pub fn can_fail(&self) -> bool {
        matches!(
            self,
            TradeStatus::Created
                | TradeStatus::AwaitingAnnouncement
                | TradeStatus::LockPending
                | TradeStatus::Accepted
                | TradeStatus::ExchangePending
        )
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TradeStatus::Completed | TradeStatus::Error)
    }

    /// Returns true if moving from this status to `next` is legal.
    pub fn can_transition_to(&self, next: TradeStatus) -> bool {
        use TradeStatus::*;

        if next == Error {
            return self.can_fail();
        }

        matches!(
            (self, next),
            (Created, AwaitingAnnouncement)
                | (AwaitingAnnouncement, LockPending)
                | (AwaitingAnnouncement, Pending)
                | (LockPending, Pending)
                | (Pending, Accepted)
                | (Accepted, ExchangePending)
                | (Accepted, Completed)
                | (ExchangePending, Completed)
        )
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Created => "Created",
            TradeStatus::AwaitingAnnouncement => "AwaitingAnnouncement",
            TradeStatus::LockPending => "LockPending",
            TradeStatus::Pending => "Pending",
            TradeStatus::Accepted => "Accepted",
            TradeStatus::ExchangePending => "ExchangePending",
            TradeStatus::Completed => "Completed",
            TradeStatus::Error => "Error",
        }
    }
}

impl std::fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when parsing an unknown status name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown trade status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for TradeStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TradeStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}
