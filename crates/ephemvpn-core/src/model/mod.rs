// ── Domain model ──

pub mod identity;
pub mod namespace;
pub mod peer;

pub use identity::{Identity, KeyMetadata};
pub use namespace::Namespace;
pub use peer::{ClientStatus, PeerAssignment, SkipReason, SkippedClient};
