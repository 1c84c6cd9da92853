use crate::booking::{Booking, BookingFilter, BookingStatus, NewBooking};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("resource {resource_id} is already booked on {date}")]
    AlreadyBooked {
        resource_id: String,
        date: NaiveDate,
    },

    /// The uniqueness constraint rejected an insert that got past the
    /// point lookup. Last line of defense when the lock was bypassed or
    /// its TTL raced ahead of the transaction.
    #[error("unique constraint rejected booking of {resource_id} on {date}")]
    UniqueViolation {
        resource_id: String,
        date: NaiveDate,
    },

    #[error("booking not found")]
    NotFound,

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Durable booking storage. `check_and_insert` is the only operation with
/// concurrency hazards; the rest is plain CRUD.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Atomic check-then-insert within one transaction: fails with
    /// `AlreadyBooked` when a confirmed booking exists for the slot, and
    /// with `UniqueViolation` when the schema-level constraint rejects
    /// the write.
    async fn check_and_insert(&self, new: &NewBooking) -> Result<Booking, StoreError>;

    async fn list_by_user(
        &self,
        user_id: &str,
        filter: &BookingFilter,
    ) -> Result<Vec<Booking>, StoreError>;

    async fn cancel(&self, booking_id: Uuid, user_id: &str) -> Result<Booking, StoreError>;

    /// Resource ids with a confirmed booking on the given date.
    async fn booked_resources(&self, date: NaiveDate) -> Result<Vec<String>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// In-memory store for tests. The mutex makes check-then-insert atomic,
/// mirroring the transactional guarantee of the Postgres implementation.
#[derive(Debug, Default)]
pub struct InMemoryBookingStore {
    bookings: Mutex<Vec<Booking>>,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn confirmed_count(&self, resource_id: &str, date: NaiveDate) -> usize {
        self.bookings
            .lock()
            .unwrap()
            .iter()
            .filter(|b| {
                b.resource_id == resource_id
                    && b.date == date
                    && b.status == BookingStatus::Confirmed
            })
            .count()
    }

    pub fn len(&self) -> usize {
        self.bookings.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn check_and_insert(&self, new: &NewBooking) -> Result<Booking, StoreError> {
        let mut bookings = self.bookings.lock().unwrap();
        let taken = bookings.iter().any(|b| {
            b.resource_id == new.resource_id
                && b.date == new.date
                && b.status == BookingStatus::Confirmed
        });
        if taken {
            return Err(StoreError::AlreadyBooked {
                resource_id: new.resource_id.clone(),
                date: new.date,
            });
        }

        let booking = Booking {
            id: Uuid::new_v4(),
            user_id: new.user_id.clone(),
            resource_id: new.resource_id.clone(),
            date: new.date,
            status: BookingStatus::Confirmed,
            created_at: Utc::now(),
        };
        bookings.push(booking.clone());
        Ok(booking)
    }

    async fn list_by_user(
        &self,
        user_id: &str,
        filter: &BookingFilter,
    ) -> Result<Vec<Booking>, StoreError> {
        let bookings = self.bookings.lock().unwrap();
        let mut found: Vec<Booking> = bookings
            .iter()
            .filter(|b| b.user_id == user_id && b.status == BookingStatus::Confirmed)
            .filter(|b| {
                filter
                    .resource_id
                    .as_ref()
                    .map_or(true, |r| &b.resource_id == r)
            })
            .filter(|b| filter.date.map_or(true, |d| b.date == d))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn cancel(&self, booking_id: Uuid, user_id: &str) -> Result<Booking, StoreError> {
        let mut bookings = self.bookings.lock().unwrap();
        let booking = bookings
            .iter_mut()
            .find(|b| b.id == booking_id && b.user_id == user_id)
            .ok_or(StoreError::NotFound)?;
        booking.status = BookingStatus::Cancelled;
        Ok(booking.clone())
    }

    async fn booked_resources(&self, date: NaiveDate) -> Result<Vec<String>, StoreError> {
        let bookings = self.bookings.lock().unwrap();
        let mut resources: Vec<String> = bookings
            .iter()
            .filter(|b| b.date == date && b.status == BookingStatus::Confirmed)
            .map(|b| b.resource_id.clone())
            .collect();
        resources.sort();
        resources.dedup();
        Ok(resources)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
