use tokio_util::sync::CancellationToken;

/// Per-stage settings.
#[derive(Clone, Debug)]
pub struct StageOptions {
    pub name: String,
    /// Output capacity; 0 = rendezvous hand-off.
    pub capacity: usize,
    /// Cancelling the parent cancels the stage.
    pub parent: Option<CancellationToken>,
}

impl StageOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_parent(mut self, parent: &CancellationToken) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        match &self.parent {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        }
    }
}

impl Default for StageOptions {
    fn default() -> Self {
        Self {
            name: "stage".to_string(),
            capacity: 0,
            parent: None,
        }
    }
}
