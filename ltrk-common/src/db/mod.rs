//! Database access layer: initialization, schema, models, migrations

pub mod init;
pub mod migrations;
pub mod models;

pub use init::{create_schema, init_database, init_default_settings};
