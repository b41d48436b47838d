//! REST surface for the reconciliation rollback engine.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod handlers;
pub mod router;
