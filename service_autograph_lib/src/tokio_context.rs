use tokio::runtime::Handle;

use crate::service::{Job, SchedulingContext};

/// Runs jobs on a tokio runtime's blocking thread pool.
#[derive(Debug, Clone)]
pub struct TokioContext {
    handle: Handle,
}
impl TokioContext {
    pub fn new(handle: Handle) -> Self {
        TokioContext { handle }
    }

    /// The runtime the caller is running in, if any.
    pub fn try_current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}
impl SchedulingContext for TokioContext {
    fn submit(&self, job: Job) {
        // The join handle is not needed; results flow through the call object.
        drop(self.handle.spawn_blocking(job));
    }
}
