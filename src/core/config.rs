use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Directory holding one subdirectory per collection.
    pub datadir: PathBuf,

    /// Worker threads draining the processing queue.
    pub worker_threads: usize,

    /// Processing queue sizes.
    pub processing_throttle_size: usize,
    pub processing_max_size: usize,

    /// Per-collection indexing queue sizes.
    pub indexing_throttle_size: usize,
    pub indexing_max_size: usize,

    /// Documents allowed in the tail fragment before rotating to a new one.
    pub max_newdb_docs: u64,

    /// Checkpoints untouched for this long are swept.
    pub checkpoint_max_age_secs: u64,

    /// Errors recorded in detail per checkpoint; further errors only count.
    pub max_recorded_errors: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            datadir: PathBuf::from("./data"),
            worker_threads: num_cpus::get(),
            processing_throttle_size: 1000,
            processing_max_size: 2000,
            indexing_throttle_size: 1000,
            indexing_max_size: 2000,
            max_newdb_docs: 10_000_000,
            checkpoint_max_age_secs: 60 * 60 * 24, // one day
            max_recorded_errors: 100,
        }
    }
}
