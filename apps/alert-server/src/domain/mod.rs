//! Domain Layer - Alert conditions and subscription tracking.
//!
//! This layer contains the core alert types and the subscription registry.
//! Nothing here performs I/O.

/// Alert conditions, price samples, and the firing rule.
pub mod alert;

/// Per-connection subscription tracking.
pub mod subscription;
