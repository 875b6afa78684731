//! Signature-verified webhook ingress.
//!
//! Exposes `POST /webhook`: the raw body is authenticated against the
//! provider's HMAC signature header, parsed into an [`InboundEvent`],
//! deduplicated through the event store, and fanned out to the topic
//! queues. Everything downstream of the 200 response is asynchronous.
//!
//! [`InboundEvent`]: orderflow_events::InboundEvent

pub mod error;
pub mod handlers;
pub mod router;
pub mod signature;
pub mod state;

pub use error::{ApiResult, ErrorResponse, IngestError};
pub use handlers::{WebhookResponse, SIGNATURE_HEADER};
pub use router::ingest_router;
pub use signature::{compute_signature, verify, SignatureRejection, DEFAULT_TOLERANCE};
pub use state::IngestState;
