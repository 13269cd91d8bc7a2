//! Match-time aggregation: streaming spies and the info-handler layer
//! that attaches them to a search.

pub mod infohandlers;
pub mod matchspy;
