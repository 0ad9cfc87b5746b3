//! Refresh-token records, opaque credential encoding, and redacted secrets.

pub mod opaque;
pub mod record;
pub mod secret;
