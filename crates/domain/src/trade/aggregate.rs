//! Trade offer aggregate.

use chrono::{DateTime, Utc};
use common::{TradeId, UserId};
use serde::{Deserialize, Serialize};

use super::{Item, TradeError, TradeStatus};

/// Trade offer aggregate root.
///
/// A barter proposal from `owner_id` to `wanted_items_owner_id`: the owner's
/// `offered_items` in exchange for the counter-party's `wanted_items`.
/// Identity, parties and item lists are fixed at creation; only the status
/// moves, and only through [`TradeOffer::update_status`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOffer {
    id: TradeId,
    owner_id: UserId,
    wanted_items_owner_id: UserId,
    status: TradeStatus,
    offered_items: Vec<Item>,
    wanted_items: Vec<Item>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,

    /// Revision used for optimistic concurrency; 0 until the first update.
    #[serde(default)]
    version: i64,
}

/// Flat view of every stored field, used by persistence adapters to
/// rebuild an aggregate without going through creation-time validation.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeOfferRecord {
    pub id: TradeId,
    pub owner_id: UserId,
    pub wanted_items_owner_id: UserId,
    pub status: TradeStatus,
    pub offered_items: Vec<Item>,
    pub wanted_items: Vec<Item>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl TradeOffer {
    /// Creates a new trade offer in `Created` status.
    ///
    /// Fails if the id or either party is blank, or if either item list is
    /// empty. Items are already validated by [`Item::new`].
    pub fn create(
        id: TradeId,
        owner_id: UserId,
        wanted_items_owner_id: UserId,
        offered_items: Vec<Item>,
        wanted_items: Vec<Item>,
    ) -> Result<Self, TradeError> {
        if id.is_nil() {
            return Err(TradeError::EmptyTradeId);
        }

        if owner_id.is_empty() {
            return Err(TradeError::EmptyOwnerId);
        }

        if wanted_items_owner_id.is_empty() {
            return Err(TradeError::EmptyWantedItemsOwnerId);
        }

        if offered_items.is_empty() {
            return Err(TradeError::NoOfferedItems);
        }

        if wanted_items.is_empty() {
            return Err(TradeError::NoWantedItems);
        }

        Ok(Self {
            id,
            owner_id,
            wanted_items_owner_id,
            status: TradeStatus::Created,
            offered_items,
            wanted_items,
            created_at: Utc::now(),
            updated_at: None,
            version: 0,
        })
    }

    /// Sets the status and stamps `updated_at`.
    ///
    /// No transition check happens here; callers decide legality with
    /// [`TradeStatus::can_transition_to`] and friends.
    pub fn update_status(&mut self, status: TradeStatus) {
        self.status = status;
        self.updated_at = Some(Utc::now());
    }

    /// Records that a conditional write of this trade succeeded.
    ///
    /// Repositories call this so the in-hand copy matches the stored revision.
    pub fn mark_persisted(&mut self) {
        self.version += 1;
    }
}

// Query methods
impl TradeOffer {
    pub fn id(&self) -> TradeId {
        self.id
    }

    pub fn owner_id(&self) -> &UserId {
        &self.owner_id
    }

    pub fn wanted_items_owner_id(&self) -> &UserId {
        &self.wanted_items_owner_id
    }

    pub fn status(&self) -> TradeStatus {
        self.status
    }

    pub fn offered_items(&self) -> &[Item] {
        &self.offered_items
    }

    pub fn wanted_items(&self) -> &[Item] {
        &self.wanted_items
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    /// Returns true if `user` is one of the two parties of this trade.
    pub fn is_party(&self, user: &UserId) -> bool {
        &self.owner_id == user || &self.wanted_items_owner_id == user
    }

    /// Returns true if the trade reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

impl From<TradeOfferRecord> for TradeOffer {
    fn from(record: TradeOfferRecord) -> Self {
        Self {
            id: record.id,
            owner_id: record.owner_id,
            wanted_items_owner_id: record.wanted_items_owner_id,
            status: record.status,
            offered_items: record.offered_items,
            wanted_items: record.wanted_items,
            created_at: record.created_at,
            updated_at: record.updated_at,
            version: record.version,
        }
    }
}

impl From<&TradeOffer> for TradeOfferRecord {
    fn from(trade: &TradeOffer) -> Self {
        Self {
            id: trade.id,
            owner_id: trade.owner_id.clone(),
            wanted_items_owner_id: trade.wanted_items_owner_id.clone(),
            status: trade.status,
            offered_items: trade.offered_items.clone(),
            wanted_items: trade.wanted_items.clone(),
            created_at: trade.created_at,
            updated_at: trade.updated_at,
            version: trade.version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn items(id: &str) -> Vec<Item> {
        vec![Item::new(id, 1).unwrap()]
    }

    fn new_trade() -> TradeOffer {
        TradeOffer::create(
            TradeId::new(),
            UserId::new("alice"),
            UserId::new("bob"),
            items("sword"),
            items("shield"),
        )
        .unwrap()
    }

    #[test]
    fn test_create_starts_in_created() {
        let trade = new_trade();
        assert_eq!(trade.status(), TradeStatus::Created);
        assert!(trade.updated_at().is_none());
        assert_eq!(trade.version(), 0);
        assert_eq!(trade.offered_items()[0].id(), "sword");
        assert_eq!(trade.wanted_items()[0].id(), "shield");
    }

    #[test]
    fn test_create_rejects_nil_id() {
        let result = TradeOffer::create(
            TradeId::from_uuid(Uuid::nil()),
            UserId::new("alice"),
            UserId::new("bob"),
            items("sword"),
            items("shield"),
        );
        assert!(matches!(result, Err(TradeError::EmptyTradeId)));
    }

    #[test]
    fn test_create_rejects_blank_parties() {
        let result = TradeOffer::create(
            TradeId::new(),
            UserId::new(""),
            UserId::new("bob"),
            items("sword"),
            items("shield"),
        );
        assert!(matches!(result, Err(TradeError::EmptyOwnerId)));

        let result = TradeOffer::create(
            TradeId::new(),
            UserId::new("alice"),
            UserId::new(""),
            items("sword"),
            items("shield"),
        );
        assert!(matches!(result, Err(TradeError::EmptyWantedItemsOwnerId)));
    }

    #[test]
    fn test_create_rejects_empty_item_lists() {
        let result = TradeOffer::create(
            TradeId::new(),
            UserId::new("alice"),
            UserId::new("bob"),
            vec![],
            items("shield"),
        );
        assert!(matches!(result, Err(TradeError::NoOfferedItems)));

        let result = TradeOffer::create(
            TradeId::new(),
            UserId::new("alice"),
            UserId::new("bob"),
            items("sword"),
            vec![],
        );
        assert!(matches!(result, Err(TradeError::NoWantedItems)));
    }

    #[test]
    fn test_update_status_stamps_updated_at() {
        let mut trade = new_trade();
        trade.update_status(TradeStatus::AwaitingAnnouncement);

        assert_eq!(trade.status(), TradeStatus::AwaitingAnnouncement);
        let updated_at = trade.updated_at().unwrap();
        assert!(updated_at >= trade.created_at());
    }

    #[test]
    fn test_update_status_is_unconditional() {
        let mut trade = new_trade();
        trade.update_status(TradeStatus::Completed);
        trade.update_status(TradeStatus::Created);
        assert_eq!(trade.status(), TradeStatus::Created);
    }

    #[test]
    fn test_is_party() {
        let trade = new_trade();
        assert!(trade.is_party(&UserId::new("alice")));
        assert!(trade.is_party(&UserId::new("bob")));
        assert!(!trade.is_party(&UserId::new("mallory")));
    }

    #[test]
    fn test_record_roundtrip_preserves_version() {
        let mut trade = new_trade();
        trade.mark_persisted();
        trade.mark_persisted();

        let record = TradeOfferRecord::from(&trade);
        assert_eq!(record.version, 2);

        let restored = TradeOffer::from(record);
        assert_eq!(restored, trade);
    }
}
