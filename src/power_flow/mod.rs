//! Network assembly: element construction and topology validation.

pub mod graph;
pub mod network;
pub mod registry;

pub use graph::{LinkRef, NetworkGraph};
pub use network::Network;
pub use registry::{BuildContext, ElementRegistry};
