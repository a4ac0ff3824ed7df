pub mod cli;
pub mod error;
pub mod node;
pub mod protocol;
pub mod registry;
pub mod settings;
pub mod transport;
