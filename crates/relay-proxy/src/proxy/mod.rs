//! Backend relay: URL composition, header filtering, forwarding and errors.

pub mod correlation;
pub mod error;
pub mod forward;
pub mod headers;
