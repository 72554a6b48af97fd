//! Transaction Aggregate
//!
//! Balance movements for one account: credits and debits. Frozen-state
//! blocking is the Ledger aggregate's concern; activities consult it
//! before staging movements here.

use uuid::Uuid;

use crate::domain::{DomainError, Money, TransactionEvent};
use crate::event_store::{EventStore, EventStoreError, NewEvent};

use super::Aggregate;

/// Balance aggregate for one account.
#[derive(Debug, Clone)]
pub struct TransactionAccount {
    id: Uuid,
    balance: Money,
    version: i64,
    staged: Vec<TransactionEvent>,
}

impl TransactionAccount {
    fn empty(id: Uuid) -> Self {
        Self {
            id,
            balance: Money::ZERO,
            version: 0,
            staged: Vec::new(),
        }
    }

    /// Rebuild the balance by replaying the account's event stream.
    ///
    /// Lifecycle events in the stream are skipped; their versions still
    /// advance the aggregate's stream position.
    pub async fn retrieve(store: &dyn EventStore, id: Uuid) -> Result<Self, EventStoreError> {
        let records = store.load_events(id).await?;

        let mut account = Self::empty(id);
        for record in records {
            if let Ok(event) = serde_json::from_value::<TransactionEvent>(record.payload.clone()) {
                account = account.apply(event);
            }
            account.version = record.version;
        }
        Ok(account)
    }

    // ======================================================================
    // Commands
    // ======================================================================

    /// Credit the account. The amount must be non-negative.
    pub fn credit(&mut self, amount: Money, description: Option<String>) -> Result<(), DomainError> {
        if amount.is_negative() {
            return Err(DomainError::InvalidAmount(format!(
                "cannot credit negative amount {amount}"
            )));
        }
        self.balance
            .try_add(amount)
            .map_err(|e| DomainError::InvalidAmount(e.to_string()))?;

        self.stage(TransactionEvent::MoneyAdded {
            amount,
            description,
        });
        Ok(())
    }

    /// Debit the account. Fails if the balance would go negative.
    pub fn debit(&mut self, amount: Money, description: Option<String>) -> Result<(), DomainError> {
        if amount.is_negative() {
            return Err(DomainError::InvalidAmount(format!(
                "cannot debit negative amount {amount}"
            )));
        }
        if !self.balance.is_sufficient_for(amount) {
            return Err(DomainError::insufficient_funds(amount, self.balance));
        }

        self.stage(TransactionEvent::MoneySubtracted {
            amount,
            description,
        });
        Ok(())
    }

    fn stage(&mut self, event: TransactionEvent) {
        self.fold(&event);
        self.staged.push(event);
    }

    fn fold(&mut self, event: &TransactionEvent) {
        match event {
            TransactionEvent::MoneyAdded { amount, .. } => {
                match self.balance.try_add(*amount) {
                    Ok(balance) => self.balance = balance,
                    Err(e) => {
                        // Replaying a historical overflow: keep the
                        // current balance rather than wrap.
                        tracing::error!(
                            account_id = %self.id,
                            error = %e,
                            "balance overflow during credit replay"
                        );
                    }
                }
            }
            TransactionEvent::MoneySubtracted { amount, .. } => {
                match self.balance.try_sub(*amount) {
                    Ok(balance) => self.balance = balance,
                    Err(e) => {
                        tracing::error!(
                            account_id = %self.id,
                            error = %e,
                            "balance underflow during debit replay"
                        );
                    }
                }
            }
        }
    }

    // ======================================================================
    // Persistence
    // ======================================================================

    /// Append staged events at the version this aggregate was loaded
    /// at. On success the buffer is cleared and the version advances.
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

    pub fn balance(&self) -> Money {
        self.balance
    }

    /// Events staged but not yet persisted
    pub fn staged_events(&self) -> &[TransactionEvent] {
        &self.staged
    }
}

impl Aggregate for TransactionAccount {
    type Event = TransactionEvent;

    fn aggregate_type() -> &'static str {
        "Transaction"
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
