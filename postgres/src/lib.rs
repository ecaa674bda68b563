//! `PostgreSQL` booking store for the booking engine.
//!
//! This crate provides a PostgreSQL-based implementation of the `BookingStore` port
//! from `booking-engine-core`. It uses sqlx and supports:
//!
//! - Overlap-free inserts and reschedules across processes (transactional advisory
//!   lock per provider day)
//! - Compare-and-set status transitions with their timestamp in one statement
//! - Embedded schema migrations
//! - Connection pooling
//!
//! # Example
//!
//! ```ignore
//! use booking_engine_postgres::PostgresBookingStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresBookingStore::connect("postgres://localhost/bookings").await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod store;

pub use store::PostgresBookingStore;
