pub mod booking;
pub mod cache;
pub mod error;
pub mod repository;

pub use booking::{Booking, BookingFilter, BookingStatus, NewBooking};
pub use cache::{AtomicCache, CacheError, InMemoryCache};
pub use error::{BookingError, ConflictCode};
pub use repository::{BookingStore, InMemoryBookingStore, StoreError};
