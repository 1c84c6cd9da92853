use crate::idempotency::{IdempotencyClaim, IdempotencyCoordinator, IdempotencyDescriptor};
use crate::lock::{DistributedLock, LockError};
use chrono::NaiveDate;
use reserva_core::booking::NewBooking;
use reserva_core::cache::AtomicCache;
use reserva_core::error::{BookingError, ConflictCode};
use reserva_core::repository::{BookingStore, StoreError};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct CreateBookingCommand {
    pub user_id: String,
    pub resource_id: String,
    pub date: NaiveDate,
}

/// Outcome of a create request: either a fresh 201 or a verbatim replay of
/// a previously stored response (success or failure alike).
#[derive(Debug, Clone)]
pub struct CreateOutcome {
    pub replayed: bool,
    pub status_code: u16,
    pub body: Value,
}

/// Orchestrates idempotency claim, distributed lock, and transactional
/// check-then-insert into one create-booking operation. This is the single
/// place where internal faults become the external error taxonomy.
pub struct BookingTransactionManager {
    lock: DistributedLock,
    idempotency: IdempotencyCoordinator,
    store: Arc<dyn BookingStore>,
    lock_ttl: Duration,
}

impl BookingTransactionManager {
    pub fn new(
        cache: Arc<dyn AtomicCache>,
        store: Arc<dyn BookingStore>,
        lock_ttl: Duration,
    ) -> Self {
        Self {
            lock: DistributedLock::new(cache.clone()),
            idempotency: IdempotencyCoordinator::new(cache),
            store,
            lock_ttl,
        }
    }

    pub async fn create_booking(
        &self,
        cmd: &CreateBookingCommand,
        descriptor: &IdempotencyDescriptor,
    ) -> Result<CreateOutcome, BookingError> {
        let lock_key = format!("{}:{}", cmd.resource_id, cmd.date.format("%Y-%m-%d"));
        let holder = descriptor.key.clone();
        let mut owned = false;

        match self
            .run(cmd, descriptor, &lock_key, &holder, &mut owned)
            .await
        {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                // Compensation: the owner must still complete the record so
                // duplicate callers replay this failure instead of hanging,
                // and the lock release is attempted unconditionally (it is
                // a no-op when the holder token does not match). Cleanup
                // failures never mask the original error.
                if owned {
                    if let Err(cleanup) = self
                        .idempotency
                        .complete(descriptor, err.status_code(), &err.response_body())
                        .await
                    {
                        warn!("idempotency completion failed during cleanup: {cleanup}");
                    }
                }
                if let Err(cleanup) = self.lock.release(&lock_key, &holder).await {
                    warn!("lock release failed during cleanup: {cleanup}");
                }
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        cmd: &CreateBookingCommand,
        descriptor: &IdempotencyDescriptor,
        lock_key: &str,
        holder: &str,
        owned: &mut bool,
    ) -> Result<CreateOutcome, BookingError> {
        match self
            .idempotency
            .claim(descriptor)
            .await
            .map_err(|e| BookingError::server(e.to_string()))?
        {
            IdempotencyClaim::Cached { status_code, body } => {
                return Ok(CreateOutcome {
                    replayed: true,
                    status_code,
                    body,
                });
            }
            IdempotencyClaim::Contended => {
                return Err(BookingError::conflict(
                    ConflictCode::IdempotencyInProgress,
                    "Another request with this idempotency key is in progress",
                ));
            }
            IdempotencyClaim::Owned => {
                *owned = true;
            }
        }

        self.lock
            .acquire(lock_key, holder, self.lock_ttl)
            .await
            .map_err(|e| match e {
                LockError::Held { .. } => BookingError::conflict(
                    ConflictCode::ResourceLocked,
                    format!(
                        "Resource {} on {} is currently being booked by another user",
                        cmd.resource_id,
                        cmd.date.format("%Y-%m-%d")
                    ),
                ),
                LockError::Backend(e) => BookingError::server(e.to_string()),
            })?;

        let new = NewBooking {
            user_id: cmd.user_id.clone(),
            resource_id: cmd.resource_id.clone(),
            date: cmd.date,
        };
        let booking = self
            .store
            .check_and_insert(&new)
            .await
            .map_err(|e| match e {
                // The constraint catching what the point lookup missed is
                // the same conflict from the caller's point of view.
                StoreError::AlreadyBooked { .. } | StoreError::UniqueViolation { .. } => {
                    BookingError::conflict(
                        ConflictCode::AlreadyBooked,
                        format!(
                            "Resource {} is already booked on {}",
                            cmd.resource_id,
                            cmd.date.format("%Y-%m-%d")
                        ),
                    )
                }
                other => BookingError::server(other.to_string()),
            })?;

        let body = json!({
            "success": true,
            "message": "Booking created successfully",
            "booking": booking,
        });

        self.idempotency
            .complete(descriptor, 201, &body)
            .await
            .map_err(|e| BookingError::server(e.to_string()))?;
        self.lock
            .release(lock_key, holder)
            .await
            .map_err(|e| BookingError::server(e.to_string()))?;

        info!(booking_id = %booking.id, resource_id = %booking.resource_id, "booking created");

        Ok(CreateOutcome {
            replayed: false,
            status_code: 201,
            body,
        })
    }
}
