//! Field-typed document processing: schemas map JSON input to engine
//! terms, values and stored data, and translate structured query JSON to
//! engine query trees.

pub mod display;
pub mod field;
pub mod schema;
mod search;
