//! In-memory registries shared by the connection workers and the gossip loop
pub mod peers;
pub mod resource;
pub mod resources;

pub use peers::{PeerRegistry, PeerSelector, RandomSelector};
pub use resource::{Peer, Resource, FILE_SCHEME, OWNER_WILDCARD};
pub use resources::{matches_template, ResourceRegistry};
