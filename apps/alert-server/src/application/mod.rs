//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with external systems.

/// Port interfaces for external systems (price upstreams).
pub mod ports;

/// Application services for price sampling, alert evaluation, and delivery.
pub mod services;
