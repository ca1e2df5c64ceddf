use futures::StreamExt;
use pipe_bus::{PipeError, Pipeline, StageOptions, source_with, transform_with};
use tokio_util::sync::CancellationToken;

mod config;

use config::DemoConfig;

/// Default filters, then `rust_log` on top so any directive in it wins.
fn log_builder(rust_log: Option<&str>) -> env_logger::Builder {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(log::LevelFilter::Info)
        .filter_module("pipe_bus", log::LevelFilter::Debug);
    if let Some(filters) = rust_log {
        builder.parse_filters(filters);
    }
    builder
}

fn init_logging() {
    log_builder(std::env::var("RUST_LOG").ok().as_deref()).init();
}

fn square(n: i64) -> i64 {
    n * n
}

/// Reads two squares one by one, then ranges over the squares, then over the
/// squares of the squares.
async fn squares_demo(config: &DemoConfig, cancel: &CancellationToken) -> anyhow::Result<()> {
    let options = |name: &str| {
        StageOptions::named(name)
            .with_capacity(config.capacity())
            .with_parent(cancel)
    };

    let (numbers, numbers_handle) = source_with(config.values().to_vec(), options("numbers"));
    let (mut squares, squares_handle) = transform_with(numbers, square, options("squares"));
    for _ in 0..2 {
        match squares.recv().await {
            Some(n) => println!("{}", n?),
            None => break,
        }
    }
    // the rest is never read
    drop(squares);
    squares_handle.join().await?;
    numbers_handle.join().await?;

    let (numbers, numbers_handle) = source_with(config.values().to_vec(), options("numbers"));
    let (mut squares, squares_handle) = transform_with(numbers, square, options("squares"));
    while let Some(n) = squares.next().await {
        println!("{}", n?);
    }
    squares_handle.join().await?;
    numbers_handle.join().await?;

    let mut pipeline = Pipeline::new("squares")
        .with_capacity(config.capacity())
        .with_parent(cancel);
    let numbers = pipeline.source(config.values().to_vec());
    let squares = pipeline.transform(numbers, square);
    let fourth_powers = pipeline.transform(squares, square);
    for n in fourth_powers.drain().await? {
        println!("{}", n);
    }
    pipeline.join().await?;
    Ok(())
}

/// Squares the numbers on several workers sharing one source and merges
/// their outputs.
async fn fan_in_demo(config: &DemoConfig, cancel: &CancellationToken) -> anyhow::Result<()> {
    let mut pipeline = Pipeline::new("fan-in")
        .with_capacity(config.capacity())
        .with_parent(cancel);
    let numbers = pipeline.source(config.values().to_vec());
    let workers = pipeline.fan_out(numbers, config.workers(), square)?;
    let mut merged = pipeline.merge(workers)?;
    log::info!("fan-in: {} stages running", pipeline.len());

    while let Some(item) = merged.next().await {
        match item {
            Ok(n) => println!("{}", n),
            Err(PipeError::Cancelled { stage }) => {
                log::info!("fan-in: interrupted ({})", stage);
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }
    pipeline.join().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let config = config::config();

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_clone.cancel();
        }
    });

    squares_demo(config, &cancel).await?;
    fan_in_demo(config, &cancel).await?;
    Ok(())
}
