use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{PipeError, PipeResult};

/// Owns the background task of one stage.
///
/// Dropping the handle detaches the task; it keeps running until its input is
/// exhausted or its consumer goes away.
pub struct StageHandle {
    name: String,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl StageHandle {
    pub(crate) fn new(name: &str, cancel: CancellationToken, join: JoinHandle<()>) -> Self {
        Self {
            name: name.to_string(),
            cancel,
            join,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Asks the stage to stop. Any send it is blocked on is released.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the stage task to terminate.
    pub async fn join(self) -> PipeResult<()> {
        self.join
            .await
            .map_err(|e| PipeError::from_join(&self.name, e))
    }
}

impl std::fmt::Debug for StageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageHandle")
            .field("name", &self.name)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("finished", &self.join.is_finished())
            .finish()
    }
}
