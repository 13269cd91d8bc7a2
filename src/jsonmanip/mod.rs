//! Declarative JSON-to-JSON transformation: an event walker over input
//! documents, a conditional algebra, and path-addressed mappings.

pub mod conditional;
pub mod mapping;
pub mod walker;
