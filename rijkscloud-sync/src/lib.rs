//! Rijkscloud inventory synchronisation.
//!
//! The [`backend`] module converges the local inventory with the remote
//! provider; [`executors`] wraps the provisioning operations an external
//! task queue drives; [`store`] and [`pg_store`] hold the persisted copy.

pub mod backend;
pub mod executors;
pub mod migrations;
pub mod models;
pub mod pg_store;
pub mod settings;
pub mod store;
pub mod sync_job;
pub mod translate;
