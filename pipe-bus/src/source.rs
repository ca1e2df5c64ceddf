use std::panic::{AssertUnwindSafe, catch_unwind};

use tokio_util::sync::CancellationToken;

use crate::{
    config::StageOptions,
    error::PipeError,
    handle::StageHandle,
    sequence::{Sequence, SequenceSender, channel},
};

/// Emits every item of `items` in order, then completes.
pub fn source<T, I>(items: I) -> (Sequence<T>, StageHandle)
where
    T: Send + 'static,
    I: IntoIterator<Item = T>,
    I::IntoIter: Send + 'static,
{
    source_with(items, StageOptions::named("source"))
}

pub fn source_with<T, I>(items: I, options: StageOptions) -> (Sequence<T>, StageHandle)
where
    T: Send + 'static,
    I: IntoIterator<Item = T>,
    I::IntoIter: Send + 'static,
{
    let (sender, sequence) = channel(options.capacity);
    let cancel = options.cancel_token();

    let name = options.name.clone();
    let cancel_clone = cancel.clone();
    let iter = items.into_iter();
    let join = tokio::spawn(async move { source_loop(name, iter, sender, cancel_clone).await });

    (sequence, StageHandle::new(&options.name, cancel, join))
}

async fn source_loop<T, It>(
    name: String,
    mut iter: It,
    sender: SequenceSender<T>,
    cancel: CancellationToken,
) where
    It: Iterator<Item = T>,
{
    let mut sent = 0usize;
    loop {
        let item = match catch_unwind(AssertUnwindSafe(|| iter.next())) {
            Ok(Some(item)) => item,
            Ok(None) => break,
            Err(payload) => {
                let fault = PipeError::panicked(&name, payload);
                log::error!("{}: {}", name, fault);
                sender.close_with(fault);
                return;
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                log::debug!("{}: cancelled after {} items", name, sent);
                sender.close_with(PipeError::cancelled(&name));
                return;
            }
            result = sender.send(item) => {
                if result.is_err() {
                    log::debug!("{}: consumer dropped after {} items", name, sent);
                    return;
                }
            }
        }
        sent += 1;
    }

    log::debug!("{}: finished, {} items", name, sent);
}

#[cfg(test)]
#[path = "source_test.rs"]
mod source_test;
