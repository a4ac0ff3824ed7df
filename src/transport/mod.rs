//! TCP transport: inbound admission and worker service, outbound peer client
pub mod admission;
pub mod connector;
pub mod receiver;
pub mod traits;

pub use admission::ConnectionLimiter;
pub use connector::{FetchedResource, TcpConnector};
pub use receiver::{Connection, ConnectionHandler, TcpReceiver};
pub use traits::PeerConnector;
