//! Webhook ingestion: envelopes, headers, signatures and payloads.
//!
//! A delivery is trusted in stages. The envelope and headers are read first,
//! the signature is checked against the raw body, and only then is the body
//! parsed into a [`WebhookPayload`].

pub mod envelope;
pub mod headers;
pub mod payload;
pub mod signature;

pub use envelope::{Envelope, EnvelopeError, parse_envelope};
pub use headers::{
    DELIVERY_HEADER, EVENT_HEADER, RequiredHeaders, SIGNATURE_HEADER, require_headers,
};
pub use payload::{PayloadError, WebhookPayload};
pub use signature::{
    SignatureError, compute_signature, format_signature_header, parse_signature_header,
    sign_payload, verify_signature,
};
