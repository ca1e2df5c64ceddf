use std::{
    convert::Infallible,
    fmt::Display,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

use tokio_util::sync::CancellationToken;

use crate::{
    config::StageOptions,
    error::{PipeError, PipeResult},
    handle::StageHandle,
    sequence::{Inlet, Sequence, SequenceSender, channel},
};

/// Emits `f(x)` for every `x` of `input`, in order. Completes when `input`
/// completes; an upstream fault is passed through.
pub fn transform<T, U, I, F>(input: I, f: F) -> (Sequence<U>, StageHandle)
where
    T: Send + 'static,
    U: Send + 'static,
    I: Inlet<Item = T> + 'static,
    F: FnMut(T) -> U + Send + 'static,
{
    transform_with(input, f, StageOptions::named("transform"))
}

pub fn transform_with<T, U, I, F>(
    input: I,
    mut f: F,
    options: StageOptions,
) -> (Sequence<U>, StageHandle)
where
    T: Send + 'static,
    U: Send + 'static,
    I: Inlet<Item = T> + 'static,
    F: FnMut(T) -> U + Send + 'static,
{
    try_transform_with(input, move |x| Ok::<U, Infallible>(f(x)), options)
}

/// Like [`transform`], but `f` may fail. The first error ends the output with
/// [`PipeError::Faulted`].
pub fn try_transform<T, U, E, I, F>(input: I, f: F) -> (Sequence<U>, StageHandle)
where
    T: Send + 'static,
    U: Send + 'static,
    E: Display + 'static,
    I: Inlet<Item = T> + 'static,
    F: FnMut(T) -> Result<U, E> + Send + 'static,
{
    try_transform_with(input, f, StageOptions::named("transform"))
}

pub fn try_transform_with<T, U, E, I, F>(
    input: I,
    f: F,
    options: StageOptions,
) -> (Sequence<U>, StageHandle)
where
    T: Send + 'static,
    U: Send + 'static,
    E: Display + 'static,
    I: Inlet<Item = T> + 'static,
    F: FnMut(T) -> Result<U, E> + Send + 'static,
{
    let (sender, sequence) = channel(options.capacity);
    let cancel = options.cancel_token();

    let name = options.name.clone();
    let cancel_clone = cancel.clone();
    let join =
        tokio::spawn(async move { transform_loop(name, input, f, sender, cancel_clone).await });

    (sequence, StageHandle::new(&options.name, cancel, join))
}

/// Starts `workers` transform stages that all pull from `input`. Each item is
/// mapped by exactly one worker.
pub fn fan_out<T, U, F>(
    input: Sequence<T>,
    workers: usize,
    f: F,
    options: StageOptions,
) -> PipeResult<Vec<(Sequence<U>, StageHandle)>>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T) -> U + Send + Sync + 'static,
{
    if workers == 0 {
        return Err(PipeError::InvalidArgument(
            "fan_out needs at least one worker".to_string(),
        ));
    }

    let shared = input.share();
    let f = Arc::new(f);
    let stages = (0..workers)
        .map(|i| {
            let f = Arc::clone(&f);
            let worker_options = StageOptions {
                name: format!("{}-{}", options.name, i),
                ..options.clone()
            };
            transform_with(shared.clone(), move |x| f(x), worker_options)
        })
        .collect();
    Ok(stages)
}

async fn transform_loop<T, U, E, I, F>(
    name: String,
    mut input: I,
    mut f: F,
    sender: SequenceSender<U>,
    cancel: CancellationToken,
) where
    E: Display + 'static,
    I: Inlet<Item = T>,
    F: FnMut(T) -> Result<U, E>,
{
    let mut mapped = 0usize;
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                log::debug!("{}: cancelled after {} items", name, mapped);
                sender.close_with(PipeError::cancelled(&name));
                return;
            }
            _ = sender.closed() => {
                log::debug!("{}: consumer dropped after {} items", name, mapped);
                return;
            }
            next = input.pull() => next,
        };

        let item = match next {
            Some(Ok(item)) => item,
            Some(Err(fault)) => {
                log::warn!("{}: upstream fault: {}", name, fault);
                sender.close_with(fault);
                return;
            }
            None => break,
        };

        let value = match catch_unwind(AssertUnwindSafe(|| f(item))) {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                let fault = PipeError::faulted(&name, e);
                log::error!("{}: {}", name, fault);
                sender.close_with(fault);
                return;
            }
            Err(payload) => {
                let fault = PipeError::panicked(&name, payload);
                log::error!("{}: {}", name, fault);
                sender.close_with(fault);
                return;
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                log::debug!("{}: cancelled after {} items", name, mapped);
                sender.close_with(PipeError::cancelled(&name));
                return;
            }
            result = sender.send(value) => {
                if result.is_err() {
                    log::debug!("{}: consumer dropped after {} items", name, mapped);
                    return;
                }
            }
        }
        mapped += 1;
    }

    log::debug!("{}: input completed, {} items", name, mapped);
}

#[cfg(test)]
#[path = "transform_test.rs"]
mod transform_test;
