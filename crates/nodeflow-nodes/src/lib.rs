pub mod builtin;
pub mod registry;

pub use registry::{NodeFactory, NodeRegistry};
