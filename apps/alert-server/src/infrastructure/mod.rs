//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus the network surfaces.

/// Configuration loading.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Public HTTP server (alert WebSocket and dashboard REST API).
pub mod http;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Upstream price source adapters.
pub mod price;

/// OpenTelemetry tracing integration.
pub mod telemetry;

/// WebSocket alert channel.
pub mod websocket;
