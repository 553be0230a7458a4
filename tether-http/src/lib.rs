//! Outbound HTTP transport for Tether
//!
//! The orchestrator talks to remote services only through the
//! [`HttpTransport`] trait. [`ReqwestTransport`] is the production
//! implementation; the `mock` feature adds a scripted in-memory transport.

pub mod client;
pub mod errors;
pub mod types;

#[cfg(feature = "mock")]
pub mod mock;

// Re-export main types for convenience
pub use client::{HttpTransport, ReqwestTransport};
pub use errors::HttpError;
pub use types::{HttpMethod, HttpMethodError, HttpRequest, HttpResponse};

#[cfg(feature = "mock")]
pub use mock::{MockReply, MockTransport, RecordedCall};
