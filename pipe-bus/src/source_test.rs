use std::time::Duration;

use super::{source, source_with};
use crate::{config::StageOptions, error::PipeError};

#[tokio::test]
async fn test_source_yields_items_in_order() -> anyhow::Result<()> {
    let (sequence, handle) = source(vec![2, 3, 5, 7]);
    assert_eq!(handle.name(), "source");

    assert_eq!(sequence.drain().await?, vec![2, 3, 5, 7]);
    handle.join().await?;
    Ok(())
}

#[tokio::test]
async fn test_source_empty_list_completes() -> anyhow::Result<()> {
    let (mut sequence, handle) = source(Vec::<u8>::new());
    assert_eq!(sequence.recv().await, None);
    handle.join().await?;
    Ok(())
}

#[tokio::test]
async fn test_source_read_one_by_one() -> anyhow::Result<()> {
    let (mut sequence, _handle) = source([2, 3]);
    assert_eq!(sequence.recv().await, Some(Ok(2)));
    assert_eq!(sequence.recv().await, Some(Ok(3)));
    assert_eq!(sequence.recv().await, None);
    Ok(())
}

#[tokio::test]
async fn test_source_panicking_iterator_faults() {
    let items = (0..5).map(|n| {
        if n == 2 {
            panic!("item {} unavailable", n);
        }
        n
    });
    let (sequence, handle) = source_with(items, StageOptions::named("numbers"));

    let mut got = Vec::new();
    let mut sequence = sequence;
    let mut fault = None;
    while let Some(item) = sequence.recv().await {
        match item {
            Ok(n) => got.push(n),
            Err(e) => fault = Some(e),
        }
    }

    assert_eq!(got, vec![0, 1]);
    assert_eq!(
        fault,
        Some(PipeError::Panicked {
            stage: "numbers".to_string(),
            message: "item 2 unavailable".to_string(),
        })
    );
    assert!(handle.join().await.is_ok());
}

#[tokio::test]
async fn test_source_stop_releases_blocked_send() -> anyhow::Result<()> {
    let (mut sequence, handle) = source(0..);

    assert_eq!(sequence.recv().await, Some(Ok(0)));
    // the producer is now parked on the rendezvous for the next item
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!handle.is_finished());

    handle.stop();
    tokio::time::timeout(Duration::from_secs(1), async {
        while !handle.is_finished() {
            tokio::task::yield_now().await;
        }
    })
    .await?;

    let mut last = None;
    while let Some(item) = sequence.recv().await {
        last = Some(item);
    }
    assert_eq!(last, Some(Err(PipeError::cancelled("source"))));
    Ok(())
}

#[tokio::test]
async fn test_source_exits_when_consumer_dropped() -> anyhow::Result<()> {
    let (sequence, handle) = source(0..);
    drop(sequence);
    tokio::time::timeout(Duration::from_secs(1), handle.join()).await??;
    Ok(())
}

#[tokio::test]
async fn test_source_buffered_capacity() -> anyhow::Result<()> {
    let (sequence, handle) = source_with(0..4, StageOptions::named("buffered").with_capacity(4));

    // with room for every item the producer finishes without a consumer
    tokio::time::timeout(Duration::from_secs(1), async {
        while !handle.is_finished() {
            tokio::task::yield_now().await;
        }
    })
    .await?;

    assert_eq!(sequence.drain().await?, vec![0, 1, 2, 3]);
    Ok(())
}
