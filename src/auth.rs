//! Auth-domain identifiers, federated identities, delegation sessions, and token models.

pub mod id;
pub mod identity;
pub mod session;
pub mod token;

pub use id::*;
pub use identity::*;
pub use session::*;
pub use token::{opaque::*, record::*, secret::*};
