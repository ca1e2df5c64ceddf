use std::fmt::Display;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::{
    config::StageOptions,
    error::PipeResult,
    handle::StageHandle,
    merge::merge_with,
    sequence::{Inlet, Sequence},
    source::source_with,
    transform::{fan_out, transform_with, try_transform_with},
};

/// Assembles stages under one cancellation scope and keeps every handle.
///
/// Dropping the pipeline cancels all of its stages.
pub struct Pipeline {
    name: String,
    capacity: usize,
    cancel: CancellationToken,
    handles: Vec<StageHandle>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capacity: 0,
            cancel: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    /// Output capacity for every stage created afterwards; 0 = rendezvous.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Ties the pipeline to `parent`: cancelling it stops every stage.
    /// Call before adding stages.
    pub fn with_parent(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of stage tasks owned.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn source<T, I>(&mut self, items: I) -> Sequence<T>
    where
        T: Send + 'static,
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        let (sequence, handle) = source_with(items, self.options("source"));
        self.handles.push(handle);
        sequence
    }

    pub fn transform<T, U, I, F>(&mut self, input: I, f: F) -> Sequence<U>
    where
        T: Send + 'static,
        U: Send + 'static,
        I: Inlet<Item = T> + 'static,
        F: FnMut(T) -> U + Send + 'static,
    {
        let (sequence, handle) = transform_with(input, f, self.options("transform"));
        self.handles.push(handle);
        sequence
    }

    pub fn try_transform<T, U, E, I, F>(&mut self, input: I, f: F) -> Sequence<U>
    where
        T: Send + 'static,
        U: Send + 'static,
        E: Display + 'static,
        I: Inlet<Item = T> + 'static,
        F: FnMut(T) -> Result<U, E> + Send + 'static,
    {
        let (sequence, handle) = try_transform_with(input, f, self.options("transform"));
        self.handles.push(handle);
        sequence
    }

    pub fn fan_out<T, U, F>(
        &mut self,
        input: Sequence<T>,
        workers: usize,
        f: F,
    ) -> PipeResult<Vec<Sequence<U>>>
    where
        T: Send + 'static,
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let stages = fan_out(input, workers, f, self.options("worker"))?;
        let mut outputs = Vec::with_capacity(stages.len());
        for (sequence, handle) in stages {
            self.handles.push(handle);
            outputs.push(sequence);
        }
        Ok(outputs)
    }

    pub fn merge<T, I, It>(&mut self, inputs: It) -> PipeResult<Sequence<T>>
    where
        T: Send + 'static,
        I: Inlet<Item = T> + 'static,
        It: IntoIterator<Item = I>,
    {
        let (sequence, handle) = merge_with(inputs, self.options("merge"))?;
        self.handles.push(handle.into_stage_handle());
        Ok(sequence)
    }

    /// Waits for every stage. Returns the first task failure, if any.
    pub async fn join(mut self) -> PipeResult<()> {
        let handles = std::mem::take(&mut self.handles);
        let mut first_err = None;
        for result in join_all(handles.into_iter().map(StageHandle::join)).await {
            if let Err(e) = result {
                log::error!("{}: stage task failed: {}", self.name, e);
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn options(&self, kind: &str) -> StageOptions {
        StageOptions::named(format!("{}/{}-{}", self.name, kind, self.handles.len()))
            .with_capacity(self.capacity)
            .with_parent(&self.cancel)
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod pipeline_test;
