use serde_json::Value;

use crate::engine::document::Document;

/// A document waiting to be run through a pipe.
#[derive(Debug)]
pub struct ProcessingTask {
    pub coll_name: String,
    pub pipe_name: String,
    pub doc: Value,
}

/// A task for a collection's writer thread. Tasks for one collection are
/// applied in queue order.
#[derive(Debug)]
pub enum IndexingTask {
    UpdateDoc { idterm: String, doc: Document },
    DeleteDoc { idterm: String },
    /// Commit everything queued so far and mark the checkpoint reached.
    Checkpoint { checkid: String },
}
