//! Ledger Aggregate
//!
//! Account lifecycle: creation, freeze/unfreeze, deletion. Commands
//! check invariants against replayed state, then stage events; nothing
//! touches the store until `persist`. Write-path checks always replay
//! from the event log, never from a projection.

use uuid::Uuid;

use crate::domain::{DomainError, LedgerEvent};
use crate::event_store::{EventStore, EventStoreError, NewEvent};

use super::Aggregate;

/// Account lifecycle aggregate.
///
/// State is derived from events; commands stage new events after
/// invariant checks and apply them to in-memory state immediately, so
/// a later command in the same session sees the staged effect.
#[derive(Debug, Clone)]
pub struct Ledger {
    id: Uuid,
    exists: bool,
    name: Option<String>,
    owner: Option<String>,
    frozen: bool,
    freeze_reason: Option<String>,
    freeze_authorized_by: Option<String>,
    deleted: bool,
    version: i64,
    staged: Vec<LedgerEvent>,
}

impl Ledger {
    fn empty(id: Uuid) -> Self {
        Self {
            id,
            exists: false,
            name: None,
            owner: None,
            frozen: false,
            freeze_reason: None,
            freeze_authorized_by: None,
            deleted: false,
            version: 0,
            staged: Vec::new(),
        }
    }

    /// Rebuild the aggregate by replaying the account's event stream.
    ///
    /// An account with no history loads as a fresh, non-existent
    /// aggregate; `create_account` is its only legal command. Balance
    /// movement events in the stream are skipped, but their versions
    /// still advance the aggregate's stream position.
    pub async fn retrieve(store: &dyn EventStore, id: Uuid) -> Result<Self, EventStoreError> {
        let records = store.load_events(id).await?;

        let mut ledger = Self::empty(id);
        for record in records {
            if let Ok(event) = serde_json::from_value::<LedgerEvent>(record.payload.clone()) {
                ledger = ledger.apply(event);
            }
            ledger.version = record.version;
        }
        Ok(ledger)
    }

    // ======================================================================
    // Commands
    // ======================================================================

    /// Create the account. Fails if it already exists or was deleted.
    pub fn create_account(
        &mut self,
        name: impl Into<String>,
        owner: Option<String>,
    ) -> Result<(), DomainError> {
        if self.deleted {
            return Err(DomainError::AccountDeleted(self.id));
        }
        if self.exists {
            return Err(DomainError::AccountExists(self.id));
        }

        self.stage(LedgerEvent::AccountCreated {
            name: name.into(),
            owner,
        });
        Ok(())
    }

    /// Freeze the account, blocking all money movement until unfrozen.
    pub fn freeze_account(
        &mut self,
        reason: impl Into<String>,
        authorized_by: Option<String>,
    ) -> Result<(), DomainError> {
        self.ensure_live()?;
        if self.frozen {
            return Err(DomainError::AccountFrozen {
                reason: self.freeze_reason.clone().unwrap_or_default(),
            });
        }

        self.stage(LedgerEvent::AccountFrozen {
            reason: reason.into(),
            authorized_by,
        });
        Ok(())
    }

    /// Unfreeze the account. Fails if the account is not frozen.
    pub fn unfreeze_account(
        &mut self,
        reason: impl Into<String>,
        authorized_by: Option<String>,
    ) -> Result<(), DomainError> {
        self.ensure_live()?;
        if !self.frozen {
            return Err(DomainError::AccountNotFrozen);
        }

        self.stage(LedgerEvent::AccountUnfrozen {
            reason: reason.into(),
            authorized_by,
        });
        Ok(())
    }

    /// Delete the account. A frozen account must be unfrozen first;
    /// callers enforce the zero-balance rule before invoking this.
    pub fn delete_account(&mut self) -> Result<(), DomainError> {
        self.ensure_live()?;
        if self.frozen {
            return Err(DomainError::AccountFrozen {
                reason: self.freeze_reason.clone().unwrap_or_default(),
            });
        }

        self.stage(LedgerEvent::AccountDeleted);
        Ok(())
    }

    fn ensure_live(&self) -> Result<(), DomainError> {
        if self.deleted {
            return Err(DomainError::AccountDeleted(self.id));
        }
        if !self.exists {
            return Err(DomainError::AccountNotFound(self.id));
        }
        Ok(())
    }

    fn stage(&mut self, event: LedgerEvent) {
        self.fold(&event);
        self.staged.push(event);
    }

    fn fold(&mut self, event: &LedgerEvent) {
        match event {
            LedgerEvent::AccountCreated { name, owner } => {
                self.exists = true;
                self.name = Some(name.clone());
                self.owner = owner.clone();
            }
            LedgerEvent::AccountFrozen {
                reason,
                authorized_by,
            } => {
                self.frozen = true;
                self.freeze_reason = Some(reason.clone());
                self.freeze_authorized_by = authorized_by.clone();
            }
            LedgerEvent::AccountUnfrozen { .. } => {
                self.frozen = false;
                self.freeze_reason = None;
                self.freeze_authorized_by = None;
            }
            LedgerEvent::AccountDeleted => {
                self.deleted = true;
            }
        }
    }

    // ======================================================================
    // Persistence
    // ======================================================================

    /// Append staged events at the version this aggregate was loaded
    /// at. On success the buffer is cleared and the version advances;
    /// a `ConcurrencyConflict` means the caller must reload and retry.
    pub async fn persist(&mut self, store: &dyn EventStore) -> Result<String, EventStoreError> {
        let mut events = Vec::with_capacity(self.staged.len());
        for staged in &self.staged {
            events.push(NewEvent::from_event(
                Self::aggregate_type(),
                staged.event_type(),
                staged,
            )?);
        }

        let count = events.len() as i64;
        let head = store.append(self.id, self.version, events).await?;
        self.version += count;
        self.staged.clear();
        Ok(head)
    }

    // ======================================================================
    // Getters
    // ======================================================================

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn freeze_reason(&self) -> Option<&str> {
        self.freeze_reason.as_deref()
    }

    pub fn freeze_authorized_by(&self) -> Option<&str> {
        self.freeze_authorized_by.as_deref()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Events staged but not yet persisted
    pub fn staged_events(&self) -> &[LedgerEvent] {
        &self.staged
    }

    /// Fail with the appropriate error unless the account exists, is
    /// not deleted, and is not frozen. Activities call this before
    /// staging balance movements.
    pub fn ensure_open(&self) -> Result<(), DomainError> {
        self.ensure_live()?;
        if self.frozen {
            return Err(DomainError::AccountFrozen {
                reason: self.freeze_reason.clone().unwrap_or_default(),
            });
        }
        Ok(())
    }
}

impl Aggregate for Ledger {
    type Event = LedgerEvent;

    fn aggregate_type() -> &'static str {
        "Ledger"
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(mut self, event: Self::Event) -> Self {
        self.fold(&event);
        self
    }
}
