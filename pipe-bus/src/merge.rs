//! Fan-in combiner.
//!
//! ```text
//!  input 0 ──► [forwarder 0] ──┐
//!  input 1 ──► [forwarder 1] ──┼──► output (rendezvous)
//!  input N ──► [forwarder N] ──┘        ▲
//!                   │                   │ closed once
//!                   └── countdown ──► [coordinator]
//! ```
//!
//! Each forwarder copies items from its input to the shared output and counts
//! the latch down when its input completes (or faults, or is cancelled). The
//! coordinator waits for the latch, reaps every forwarder and then drops the
//! last output sender, which completes the output exactly once.
//!
//! Items from one input keep their order; the interleaving across inputs is
//! whatever the scheduler produces.

use std::sync::{
    Arc, OnceLock,
    atomic::{AtomicBool, AtomicU8, Ordering},
};

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    config::StageOptions,
    error::{PipeError, PipeResult},
    handle::StageHandle,
    latch::{Countdown, CountdownGuard},
    sequence::{Inlet, Sequence, SequenceSender, channel},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeState {
    /// At least one input is still active.
    Running,
    /// Every input has completed; the output is about to be closed.
    Draining,
    /// The output completion has been emitted.
    Closed,
}

impl MergeState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => MergeState::Running,
            1 => MergeState::Draining,
            _ => MergeState::Closed,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    Active,
    Completed,
}

struct MergeShared {
    name: String,
    state: AtomicU8,
    latch: Arc<Countdown>,
    slots: Vec<AtomicBool>,
    fault: OnceLock<PipeError>,
}

impl MergeShared {
    fn new(name: &str, inputs: usize) -> Self {
        Self {
            name: name.to_string(),
            state: AtomicU8::new(MergeState::Running as u8),
            latch: Countdown::new(inputs),
            slots: (0..inputs).map(|_| AtomicBool::new(false)).collect(),
            fault: OnceLock::new(),
        }
    }

    fn state(&self) -> MergeState {
        MergeState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: MergeState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Keeps the first fault only.
    fn record_fault(&self, fault: PipeError) {
        if let Err(fault) = self.fault.set(fault) {
            log::debug!("{}: additional fault ignored: {}", self.name, fault);
        }
    }
}

/// Marks a slot completed when dropped, then counts the latch down, so a
/// panicking forwarder still completes its slot.
struct SlotGuard {
    shared: Arc<MergeShared>,
    slot: usize,
    _countdown: CountdownGuard,
}

impl SlotGuard {
    fn new(shared: &Arc<MergeShared>, slot: usize) -> Self {
        Self {
            shared: Arc::clone(shared),
            slot,
            _countdown: shared.latch.guard(),
        }
    }
}

impl Drop for SlotGuard {
    // fields drop after this body: the slot reads Completed before the count moves
    fn drop(&mut self) {
        self.shared.slots[self.slot].store(true, Ordering::Release);
    }
}

/// Handle for a running merge: owns the coordinator task, which in turn owns
/// every forwarder.
pub struct MergeHandle {
    stage: StageHandle,
    shared: Arc<MergeShared>,
}

impl MergeHandle {
    pub fn name(&self) -> &str {
        self.stage.name()
    }

    pub fn state(&self) -> MergeState {
        self.shared.state()
    }

    /// Number of inputs that have not completed yet.
    pub fn active_inputs(&self) -> usize {
        self.shared.latch.remaining()
    }

    pub fn slot_states(&self) -> Vec<SlotState> {
        self.shared
            .slots
            .iter()
            .map(|done| {
                if done.load(Ordering::Acquire) {
                    SlotState::Completed
                } else {
                    SlotState::Active
                }
            })
            .collect()
    }

    /// Stops every forwarder. The output still completes, with
    /// [`PipeError::Cancelled`].
    pub fn stop(&self) {
        self.stage.stop();
    }

    pub fn is_finished(&self) -> bool {
        self.stage.is_finished()
    }

    /// Waits until the coordinator and all forwarders have terminated.
    pub async fn join(self) -> PipeResult<()> {
        self.stage.join().await
    }

    pub fn into_stage_handle(self) -> StageHandle {
        self.stage
    }
}

/// Merges `inputs` into one sequence. Fails with
/// [`PipeError::InvalidArgument`] when `inputs` is empty; nothing is spawned
/// in that case.
pub fn merge<T, I, It>(inputs: It) -> PipeResult<(Sequence<T>, MergeHandle)>
where
    T: Send + 'static,
    I: Inlet<Item = T> + 'static,
    It: IntoIterator<Item = I>,
{
    merge_with(inputs, StageOptions::named("merge"))
}

pub fn merge_with<T, I, It>(
    inputs: It,
    options: StageOptions,
) -> PipeResult<(Sequence<T>, MergeHandle)>
where
    T: Send + 'static,
    I: Inlet<Item = T> + 'static,
    It: IntoIterator<Item = I>,
{
    let inputs: Vec<I> = inputs.into_iter().collect();
    if inputs.is_empty() {
        return Err(PipeError::InvalidArgument(
            "merge needs at least one input".to_string(),
        ));
    }

    let (sender, sequence) = channel(options.capacity);
    let cancel = options.cancel_token();
    let shared = Arc::new(MergeShared::new(&options.name, inputs.len()));
    log::debug!("{}: merging {} inputs", options.name, inputs.len());

    let forwarders: Vec<JoinHandle<()>> = inputs
        .into_iter()
        .enumerate()
        .map(|(slot, input)| {
            let guard = SlotGuard::new(&shared, slot);
            let sender = sender.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { forward(slot, input, sender, cancel, guard).await })
        })
        .collect();

    let coordinator_shared = Arc::clone(&shared);
    let join =
        tokio::spawn(async move { coordinate(coordinator_shared, forwarders, sender).await });

    let handle = MergeHandle {
        stage: StageHandle::new(&options.name, cancel, join),
        shared,
    };
    Ok((sequence, handle))
}

async fn forward<T, I>(
    slot: usize,
    mut input: I,
    sender: SequenceSender<T>,
    cancel: CancellationToken,
    guard: SlotGuard,
) where
    I: Inlet<Item = T>,
{
    let name = &guard.shared.name;
    let mut forwarded = 0usize;
    let mut cancelled = false;
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                cancelled = true;
                break;
            }
            _ = sender.closed() => {
                log::debug!("{}: output dropped, stopping all inputs", name);
                cancel.cancel();
                break;
            }
            next = input.pull() => next,
        };

        match next {
            Some(Ok(item)) => {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        cancelled = true;
                        break;
                    }
                    result = sender.send(item) => {
                        if result.is_err() {
                            log::debug!("{}: output dropped, stopping all inputs", name);
                            cancel.cancel();
                            break;
                        }
                    }
                }
                forwarded += 1;
            }
            Some(Err(fault)) => {
                log::warn!("{}: input {} faulted: {}", name, slot, fault);
                guard.shared.record_fault(fault);
                break;
            }
            None => break,
        }
    }

    if cancelled {
        guard.shared.record_fault(PipeError::cancelled(name));
    }
    log::trace!("{}: input {} done, {} items forwarded", name, slot, forwarded);
    drop(sender);
    drop(input);
    drop(guard);
}

async fn coordinate<T>(
    shared: Arc<MergeShared>,
    forwarders: Vec<JoinHandle<()>>,
    sender: SequenceSender<T>,
) {
    shared.latch.wait().await;
    shared.set_state(MergeState::Draining);

    for result in join_all(forwarders).await {
        if let Err(e) = result {
            shared.record_fault(PipeError::from_join(&shared.name, e));
        }
    }

    // every forwarder has been reaped, so this is the last sender
    match shared.fault.get() {
        Some(fault) => {
            log::debug!("{}: closing output with fault: {}", shared.name, fault);
            sender.close_with(fault.clone());
        }
        None => {
            log::debug!("{}: all inputs completed, closing output", shared.name);
            drop(sender);
        }
    }
    shared.set_state(MergeState::Closed);
}

#[cfg(test)]
#[path = "merge_test.rs"]
mod merge_test;
