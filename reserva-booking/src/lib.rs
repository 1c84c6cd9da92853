pub mod idempotency;
pub mod lock;
pub mod manager;

pub use idempotency::{IdempotencyClaim, IdempotencyCoordinator, IdempotencyDescriptor};
pub use lock::{DistributedLock, LockError};
pub use manager::{BookingTransactionManager, CreateBookingCommand, CreateOutcome};
