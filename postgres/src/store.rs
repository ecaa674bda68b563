//! `PostgreSQL` implementation of [`BookingStore`].
//!
//! Writes that can create overlap (`insert`, `reschedule`) run in a transaction that
//! first takes `pg_advisory_xact_lock` on the provider day, then checks for overlapping
//! active bookings, then writes. The lock is released on commit or rollback, so the
//! no-overlap invariant holds across processes sharing the database.
//!
//! Every write inserts its `booking_history` row in the same transaction.

use booking_engine_core::ports::{PortFuture, RescheduleUpdate, StatusUpdate, StoreError};
use booking_engine_core::{
    Actor, Booking, BookingId, BookingStatus, BookingStore, ClientId, HistoryAction, HistoryEntry,
    Money, NaiveDate, ProviderId, ServiceId, TimeOfDay, TimeRange,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use uuid::Uuid;

const SELECT_BOOKING: &str = r"
    SELECT id, provider_id, client_id, service_ids, booking_date, time_start, time_end,
           total_price_cents, status, cancellation_reason, confirmed_at, completed_at,
           cancelled_at, no_show_at, reschedule_count, created_at
    FROM bookings
";

const SELECT_HISTORY: &str = r"
    SELECT booking_id, action, actor_role, actor_id, previous_status, new_status,
           previous_date, previous_start, previous_end, reason, notes, recorded_at
    FROM booking_history
    WHERE booking_id = $1
    ORDER BY id
";

const RETURNING_BOOKING: &str = r"
    RETURNING id, provider_id, client_id, service_ids, booking_date, time_start, time_end,
              total_price_cents, status, cancellation_reason, confirmed_at, completed_at,
              cancelled_at, no_show_at, reschedule_count, created_at
";

/// Booking store backed by a `bookings` table.
///
/// # Example
///
/// ```no_run
/// use booking_engine_postgres::PostgresBookingStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = PostgresBookingStore::connect("postgres://localhost/bookings").await?;
/// store.migrate().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct PostgresBookingStore {
    pool: PgPool,
}

impl PostgresBookingStore {
    /// Connects with a default pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the database cannot be reached.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(unavailable)?;
        Ok(Self::from_pool(pool))
    }

    /// Wraps an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Applies the embedded schema migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("migration failed: {e}")))
    }

    async fn find(&self, id: BookingId) -> Result<Option<Booking>, StoreError> {
        let sql = format!("{SELECT_BOOKING} WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;
        row.as_ref().map(row_to_booking).transpose()
    }

    async fn active_for(&self, provider_id: ProviderId, date: NaiveDate) -> Result<Vec<Booking>, StoreError> {
        let sql = format!(
            "{SELECT_BOOKING} WHERE provider_id = $1 AND booking_date = $2 \
             AND status IN ('pending', 'confirmed') ORDER BY time_start"
        );
        let rows = sqlx::query(&sql)
            .bind(*provider_id.as_uuid())
            .bind(date)
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable)?;
        rows.iter().map(row_to_booking).collect()
    }

    async fn insert_booking(&self, booking: Booking) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;
        lock_provider_day(&mut tx, booking.provider_id, booking.date).await?;

        if overlaps_active(&mut tx, booking.provider_id, booking.date, &booking.time, None).await? {
            metrics::counter!("booking_store_overlap_rejected_total", "operation" => "insert").increment(1);
            return Err(StoreError::Overlap {
                provider_id: booking.provider_id,
                date: booking.date,
            });
        }

        let service_ids: Vec<Uuid> = booking.service_ids.iter().map(|id| *id.as_uuid()).collect();
        let inserted = sqlx::query(
            r"
            INSERT INTO bookings (
                id, provider_id, client_id, service_ids, booking_date, time_start, time_end,
                total_price_cents, status, reschedule_count, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO NOTHING
            ",
        )
        .bind(*booking.id.as_uuid())
        .bind(*booking.provider_id.as_uuid())
        .bind(*booking.client_id.as_uuid())
        .bind(service_ids)
        .bind(booking.date)
        .bind(minutes_column(booking.time_start()))
        .bind(minutes_column(booking.time_end()))
        .bind(cents_column(booking.total_price)?)
        .bind(booking.status.as_str())
        .bind(count_column(booking.reschedule_count)?)
        .bind(booking.created_at)
        .execute(&mut *tx)
        .await
        .map_err(unavailable)?;

        if inserted.rows_affected() == 0 {
            return Err(StoreError::DuplicateId(booking.id));
        }
        append_history(&mut tx, &HistoryEntry::created(&booking)).await?;
        tx.commit().await.map_err(unavailable)?;

        tracing::debug!(booking_id = %booking.id, date = %booking.date, "Booking row inserted");
        Ok(())
    }

    async fn update_booking_status(&self, id: BookingId, update: StatusUpdate) -> Result<Booking, StoreError> {
        // Column names come from a closed enum, never from input
        let timestamp = update
            .timestamp_field()
            .map(|field| format!(", {} = $2", field.column()))
            .unwrap_or_default();
        let sql = format!(
            "UPDATE bookings SET status = $1{timestamp}, \
             cancellation_reason = COALESCE($3, cancellation_reason) \
             WHERE id = $4 AND status = $5 {RETURNING_BOOKING}"
        );
        let reason = (update.target == BookingStatus::Cancelled)
            .then(|| update.cancellation_reason.clone())
            .flatten();

        let mut tx = self.pool.begin().await.map_err(unavailable)?;
        let row = sqlx::query(&sql)
            .bind(update.target.as_str())
            .bind(update.at)
            .bind(reason)
            .bind(*id.as_uuid())
            .bind(update.expected.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(unavailable)?;

        let Some(row) = row else {
            drop(tx);
            return Err(self.stale_or_missing(id, update.expected).await);
        };
        let booking = row_to_booking(&row)?;
        append_history(&mut tx, &HistoryEntry::status_change(id, &update)).await?;
        tx.commit().await.map_err(unavailable)?;
        Ok(booking)
    }

    async fn reschedule_booking(&self, id: BookingId, update: RescheduleUpdate) -> Result<Booking, StoreError> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;

        let sql = format!("{SELECT_BOOKING} WHERE id = $1 FOR UPDATE");
        let current = sqlx::query(&sql)
            .bind(*id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(unavailable)?
            .ok_or(StoreError::NotFound(id))?;
        let before = row_to_booking(&current)?;
        let provider_id = before.provider_id;
        if before.status != update.expected {
            return Err(StoreError::StaleStatus {
                id,
                expected: update.expected,
                actual: before.status,
            });
        }

        lock_provider_day(&mut tx, provider_id, update.date).await?;
        if overlaps_active(&mut tx, provider_id, update.date, &update.time, Some(id)).await? {
            metrics::counter!("booking_store_overlap_rejected_total", "operation" => "reschedule").increment(1);
            return Err(StoreError::Overlap {
                provider_id,
                date: update.date,
            });
        }

        let sql = format!(
            "UPDATE bookings SET booking_date = $1, time_start = $2, time_end = $3, \
             reschedule_count = reschedule_count + 1 WHERE id = $4 {RETURNING_BOOKING}"
        );
        let row = sqlx::query(&sql)
            .bind(update.date)
            .bind(minutes_column(update.time.start()))
            .bind(minutes_column(update.time.end()))
            .bind(*id.as_uuid())
            .fetch_one(&mut *tx)
            .await
            .map_err(unavailable)?;
        let booking = row_to_booking(&row)?;
        append_history(&mut tx, &HistoryEntry::rescheduled(&before, &update)).await?;
        tx.commit().await.map_err(unavailable)?;
        Ok(booking)
    }

    async fn history_of(&self, id: BookingId) -> Result<Vec<HistoryEntry>, StoreError> {
        let rows = sqlx::query(SELECT_HISTORY)
            .bind(*id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable)?;
        rows.iter().map(row_to_history).collect()
    }

    /// Explains why a compare-and-set matched no row.
    async fn stale_or_missing(&self, id: BookingId, expected: BookingStatus) -> StoreError {
        let row = sqlx::query("SELECT status FROM bookings WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await;
        match row {
            Ok(Some(row)) => match status_column(&row) {
                Ok(actual) => StoreError::StaleStatus { id, expected, actual },
                Err(err) => err,
            },
            Ok(None) => StoreError::NotFound(id),
            Err(err) => unavailable(err),
        }
    }
}

impl BookingStore for PostgresBookingStore {
    fn find_by_id(&self, id: BookingId) -> PortFuture<'_, Option<Booking>, StoreError> {
        Box::pin(self.find(id))
    }

    fn find_non_terminal_for_provider_date(
        &self,
        provider_id: ProviderId,
        date: NaiveDate,
    ) -> PortFuture<'_, Vec<Booking>, StoreError> {
        Box::pin(self.active_for(provider_id, date))
    }

    fn insert(&self, booking: Booking) -> PortFuture<'_, (), StoreError> {
        Box::pin(self.insert_booking(booking))
    }

    fn update_status(&self, id: BookingId, update: StatusUpdate) -> PortFuture<'_, Booking, StoreError> {
        Box::pin(self.update_booking_status(id, update))
    }

    fn reschedule(&self, id: BookingId, update: RescheduleUpdate) -> PortFuture<'_, Booking, StoreError> {
        Box::pin(self.reschedule_booking(id, update))
    }

    fn history(&self, id: BookingId) -> PortFuture<'_, Vec<HistoryEntry>, StoreError> {
        Box::pin(self.history_of(id))
    }
}

// ============================================================================
// Transaction helpers
// ============================================================================

/// Serializes writers of one provider day until the transaction ends.
async fn lock_provider_day(
    tx: &mut Transaction<'_, Postgres>,
    provider_id: ProviderId,
    date: NaiveDate,
) -> Result<(), StoreError> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(provider_day_key(provider_id, date))
        .execute(&mut **tx)
        .await
        .map_err(unavailable)?;
    Ok(())
}

async fn overlaps_active(
    tx: &mut Transaction<'_, Postgres>,
    provider_id: ProviderId,
    date: NaiveDate,
    range: &TimeRange,
    except: Option<BookingId>,
) -> Result<bool, StoreError> {
    let row = sqlx::query(
        r"
        SELECT EXISTS (
            SELECT 1 FROM bookings
            WHERE provider_id = $1
              AND booking_date = $2
              AND status IN ('pending', 'confirmed')
              AND time_start < $4
              AND time_end > $3
              AND ($5::uuid IS NULL OR id <> $5)
        )
        ",
    )
    .bind(*provider_id.as_uuid())
    .bind(date)
    .bind(minutes_column(range.start()))
    .bind(minutes_column(range.end()))
    .bind(except.map(|id| *id.as_uuid()))
    .fetch_one(&mut **tx)
    .await
    .map_err(unavailable)?;
    column(&row, 0_usize)
}

async fn append_history(tx: &mut Transaction<'_, Postgres>, entry: &HistoryEntry) -> Result<(), StoreError> {
    sqlx::query(
        r"
        INSERT INTO booking_history (
            booking_id, action, actor_role, actor_id, previous_status, new_status,
            previous_date, previous_start, previous_end, reason, notes, recorded_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ",
    )
    .bind(*entry.booking_id.as_uuid())
    .bind(entry.action.as_str())
    .bind(entry.actor.role())
    .bind(entry.actor.subject())
    .bind(entry.previous_status.map(BookingStatus::as_str))
    .bind(entry.new_status.as_str())
    .bind(entry.previous_date)
    .bind(entry.previous_time.map(|time| minutes_column(time.start())))
    .bind(entry.previous_time.map(|time| minutes_column(time.end())))
    .bind(entry.reason.as_deref())
    .bind(entry.notes.as_deref())
    .bind(entry.at)
    .execute(&mut **tx)
    .await
    .map_err(unavailable)?;
    Ok(())
}

/// Advisory lock key text for a provider day
fn provider_day_key(provider_id: ProviderId, date: NaiveDate) -> String {
    format!("booking:{provider_id}:{date}")
}

// ============================================================================
// Row mapping
// ============================================================================

fn unavailable(err: impl std::fmt::Display) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

fn column<'r, T, I>(row: &'r PgRow, index: I) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
    I: sqlx::ColumnIndex<PgRow> + std::fmt::Debug,
{
    row.try_get(&index)
        .map_err(|e| StoreError::Corrupt(format!("column {index:?}: {e}")))
}

fn status_column(row: &PgRow) -> Result<BookingStatus, StoreError> {
    let code: String = column(row, "status")?;
    parse_status(&code)
}

fn parse_status(code: &str) -> Result<BookingStatus, StoreError> {
    BookingStatus::parse(code).ok_or_else(|| StoreError::Corrupt(format!("unknown status {code:?}")))
}

fn time_column(row: &PgRow, name: &'static str) -> Result<TimeOfDay, StoreError> {
    let minutes: i16 = column(row, name)?;
    time_of_day(name, minutes)
}

fn time_of_day(name: &'static str, minutes: i16) -> Result<TimeOfDay, StoreError> {
    u16::try_from(minutes)
        .ok()
        .and_then(TimeOfDay::from_minutes)
        .ok_or_else(|| StoreError::Corrupt(format!("{name} out of range: {minutes}")))
}

fn minutes_column(time: TimeOfDay) -> i16 {
    // Minutes of a day always fit: at most 1440
    i16::try_from(time.minutes()).unwrap_or(i16::MAX)
}

fn cents_column(money: Money) -> Result<i64, StoreError> {
    i64::try_from(money.cents()).map_err(|_| StoreError::Corrupt(format!("price too large: {}", money.cents())))
}

fn count_column(count: u32) -> Result<i32, StoreError> {
    i32::try_from(count).map_err(|_| StoreError::Corrupt(format!("reschedule count too large: {count}")))
}

fn row_to_booking(row: &PgRow) -> Result<Booking, StoreError> {
    let start = time_column(row, "time_start")?;
    let end = time_column(row, "time_end")?;
    let time = TimeRange::new(start, end).map_err(|e| StoreError::Corrupt(e.to_string()))?;

    let cents: i64 = column(row, "total_price_cents")?;
    let total_price = u64::try_from(cents)
        .map(Money::from_cents)
        .map_err(|_| StoreError::Corrupt(format!("negative price: {cents}")))?;

    let reschedule_count: i32 = column(row, "reschedule_count")?;
    let reschedule_count = u32::try_from(reschedule_count)
        .map_err(|_| StoreError::Corrupt(format!("negative reschedule count: {reschedule_count}")))?;

    let service_ids: Vec<Uuid> = column(row, "service_ids")?;

    Ok(Booking {
        id: BookingId::from_uuid(column(row, "id")?),
        provider_id: ProviderId::from_uuid(column(row, "provider_id")?),
        client_id: ClientId::from_uuid(column(row, "client_id")?),
        service_ids: service_ids.into_iter().map(ServiceId::from_uuid).collect(),
        date: column(row, "booking_date")?,
        time,
        total_price,
        status: status_column(row)?,
        cancellation_reason: column(row, "cancellation_reason")?,
        confirmed_at: column(row, "confirmed_at")?,
        completed_at: column(row, "completed_at")?,
        cancelled_at: column(row, "cancelled_at")?,
        no_show_at: column(row, "no_show_at")?,
        reschedule_count,
        created_at: column(row, "created_at")?,
    })
}

fn row_to_history(row: &PgRow) -> Result<HistoryEntry, StoreError> {
    let action: String = column(row, "action")?;
    let action = HistoryAction::parse(&action)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown history action {action:?}")))?;

    let role: String = column(row, "actor_role")?;
    let subject: Option<Uuid> = column(row, "actor_id")?;
    let actor = Actor::from_parts(&role, subject)
        .ok_or_else(|| StoreError::Corrupt(format!("invalid actor {role:?}")))?;

    let previous_status: Option<String> = column(row, "previous_status")?;
    let new_status: String = column(row, "new_status")?;

    let previous_start: Option<i16> = column(row, "previous_start")?;
    let previous_end: Option<i16> = column(row, "previous_end")?;
    let previous_time = match (previous_start, previous_end) {
        (Some(start), Some(end)) => Some(
            TimeRange::new(time_of_day("previous_start", start)?, time_of_day("previous_end", end)?)
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
        ),
        (None, None) => None,
        _ => return Err(StoreError::Corrupt("half of a previous interval is missing".into())),
    };

    Ok(HistoryEntry {
        booking_id: BookingId::from_uuid(column(row, "booking_id")?),
        action,
        actor,
        previous_status: previous_status.as_deref().map(parse_status).transpose()?,
        new_status: parse_status(&new_status)?,
        previous_date: column(row, "previous_date")?,
        previous_time,
        reason: column(row, "reason")?,
        notes: column(row, "notes")?,
        at: column(row, "recorded_at")?,
    })
}
