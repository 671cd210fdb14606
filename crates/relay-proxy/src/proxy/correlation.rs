//! Correlation IDs tying a relayed request's log lines and spans together.
//!
//! The id is recorded on spans only; it never appears on the wire.

use uuid::Uuid;

/// Generate a new correlation ID (UUID v4).
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}
