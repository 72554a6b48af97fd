//! Domain module
//!
//! Value objects, events, and seams shared across the ledger core.

pub mod authz;
pub mod clock;
pub mod context;
pub mod error;
pub mod events;
pub mod money;

pub use authz::{AllowAll, Authorizer, SharedAuthorizer};
pub use clock::{Clock, FixedClock, SharedClock, SystemClock};
pub use context::OperationContext;
pub use error::DomainError;
pub use events::{LedgerEvent, TransactionEvent};
pub use money::{Money, MoneyError};
