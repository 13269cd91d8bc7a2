pub mod categoriser;
pub mod hierarchy;
