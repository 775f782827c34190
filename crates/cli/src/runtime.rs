//! Multithreaded runtime builder.

use std::io::Result;

use tokio::runtime::{Builder as RtBuilder, Runtime};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuntimeConfig {
    SingleThreaded,
    /// Zero worker threads means one per core.
    MultiThreaded { worker_threads: usize },
}

impl RuntimeConfig {
    pub fn from_worker_threads(worker_threads: Option<usize>) -> Self {
        match worker_threads {
            Some(1) => Self::SingleThreaded,
            Some(worker_threads) => Self::MultiThreaded { worker_threads },
            None => Self::MultiThreaded { worker_threads: 0 },
        }
    }
}

pub fn build_runtime(cfg: RuntimeConfig) -> Result<Runtime> {
    let mut builder = match cfg {
        RuntimeConfig::SingleThreaded => RtBuilder::new_current_thread(),
        RuntimeConfig::MultiThreaded { worker_threads } => {
            let mut builder = RtBuilder::new_multi_thread();
            if worker_threads > 0 {
                builder.worker_threads(worker_threads);
            }
            builder
        }
    };

    builder.enable_all().build()
}
