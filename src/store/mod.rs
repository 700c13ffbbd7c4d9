//! Storage layer: port traits plus the single Postgres adapter implementing all of them.

pub mod migrations;
pub mod ports;
pub mod postgres;

pub use migrations::run_pending_migrations;
pub use ports::*;
pub use postgres::PgStore;
