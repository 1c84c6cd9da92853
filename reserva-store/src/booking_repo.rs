use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reserva_core::booking::{Booking, BookingFilter, BookingStatus, NewBooking};
use reserva_core::repository::{BookingStore, StoreError};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    user_id: String,
    resource_id: String,
    date: NaiveDate,
    status: String,
    created_at: chrono::DateTime<Utc>,
}

impl BookingRow {
    fn into_booking(self) -> Result<Booking, StoreError> {
        let status = self
            .status
            .parse::<BookingStatus>()
            .map_err(StoreError::Backend)?;
        Ok(Booking {
            id: self.id,
            user_id: self.user_id,
            resource_id: self.resource_id,
            date: self.date,
            status,
            created_at: self.created_at,
        })
    }
}

/// Transaction-scoped booking queries. The transaction is begun and
/// committed by `PostgresBookingStore::check_and_insert`.
pub struct BookingRepository;

impl BookingRepository {
    pub async fn find_confirmed(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        resource_id: &str,
        date: NaiveDate,
    ) -> Result<Option<Booking>, StoreError> {
        let row = sqlx::query_as::<_, BookingRow>(
            r#"
            SELECT id, user_id, resource_id, date, status, created_at
            FROM bookings
            WHERE resource_id = $1 AND date = $2 AND status = 'confirmed'
            "#,
        )
        .bind(resource_id)
        .bind(date)
        .fetch_optional(&mut **tx)
        .await
        .map_err(backend)?;

        row.map(BookingRow::into_booking).transpose()
    }

    pub async fn insert(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        new: &NewBooking,
    ) -> Result<Booking, StoreError> {
        let booking = Booking {
            id: Uuid::new_v4(),
            user_id: new.user_id.clone(),
            resource_id: new.resource_id.clone(),
            date: new.date,
            status: BookingStatus::Confirmed,
            created_at: Utc::now(),
        };

        let result = sqlx::query(
            r#"
            INSERT INTO bookings (id, user_id, resource_id, date, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(booking.id)
        .bind(&booking.user_id)
        .bind(&booking.resource_id)
        .bind(booking.date)
        .bind(booking.status.as_str())
        .bind(booking.created_at)
        .execute(&mut **tx)
        .await;

        match result {
            Ok(_) => Ok(booking),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::UniqueViolation {
                    resource_id: new.resource_id.clone(),
                    date: new.date,
                })
            }
            Err(e) => Err(backend(e)),
        }
    }
}

/// Durable booking storage over Postgres. The partial unique index on
/// (resource_id, date) WHERE status = 'confirmed' backs the core
/// invariant independently of the lock.
pub struct PostgresBookingStore {
    pool: PgPool,
}

impl PostgresBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookingStore for PostgresBookingStore {
    async fn check_and_insert(&self, new: &NewBooking) -> Result<Booking, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        if BookingRepository::find_confirmed(&mut tx, &new.resource_id, new.date)
            .await?
            .is_some()
        {
            // Dropping the transaction rolls it back.
            return Err(StoreError::AlreadyBooked {
                resource_id: new.resource_id.clone(),
                date: new.date,
            });
        }

        let booking = BookingRepository::insert(&mut tx, new).await?;
        tx.commit().await.map_err(backend)?;
        Ok(booking)
    }

    async fn list_by_user(
        &self,
        user_id: &str,
        filter: &BookingFilter,
    ) -> Result<Vec<Booking>, StoreError> {
        let rows = sqlx::query_as::<_, BookingRow>(
            r#"
            SELECT id, user_id, resource_id, date, status, created_at
            FROM bookings
            WHERE user_id = $1
              AND status = 'confirmed'
              AND ($2::text IS NULL OR resource_id = $2)
              AND ($3::date IS NULL OR date = $3)
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .bind(filter.resource_id.as_deref())
        .bind(filter.date)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter().map(BookingRow::into_booking).collect()
    }

    async fn cancel(&self, booking_id: Uuid, user_id: &str) -> Result<Booking, StoreError> {
        let row = sqlx::query_as::<_, BookingRow>(
            r#"
            UPDATE bookings
            SET status = 'cancelled'
            WHERE id = $1 AND user_id = $2
            RETURNING id, user_id, resource_id, date, status, created_at
            "#,
        )
        .bind(booking_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.ok_or(StoreError::NotFound)?.into_booking()
    }

    async fn booked_resources(&self, date: NaiveDate) -> Result<Vec<String>, StoreError> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT resource_id
            FROM bookings
            WHERE date = $1 AND status = 'confirmed'
            "#,
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}
