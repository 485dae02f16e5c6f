//! # Transport Module
//!
//! Delivery of serialized payloads to the collection endpoint.
//!
//! This module handles:
//! - The `Transport` seam the delivery engine sends through
//! - An HTTP implementation posting to `/api/v1/measurements`
//! - Optional pre-shared API key header

pub mod http;

pub use http::HttpTransport;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::TransportError;

/// Trait for sending one payload to the collector
///
/// Implementations report success only when the collector accepted the
/// payload; everything else is a `TransportError`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one serialized record
    async fn send(&self, payload: Bytes) -> Result<(), TransportError>;
}
