//! Node repository implementations.

pub mod memory;
pub mod node;

pub use memory::MemoryNodeRepository;
pub use node::PgNodeRepository;
