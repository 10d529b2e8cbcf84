//! Example: Retrying a mutation and waiting for a resource to converge
//!
//! This example demonstrates:
//! 1. Retrying a call that fails while a dependency propagates
//! 2. Waiting for a simulated resource to leave its pending state
//! 3. Failing fast when the resource lands in an unexpected state
//!
//! Run with:
//! ```bash
//! RUST_LOG=converge_core=debug cargo run -p converge-core --example converge_example
//! ```

use converge_core::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum ApiError {
    #[error("InvalidParameterValue: the role cannot be assumed")]
    RoleNotReady,
    #[error("Throttling: rate exceeded")]
    Throttled,
}

/// Example 1: Retry until the role propagates
async fn example_retry() -> anyhow::Result<()> {
    println!("\n=== Example 1: Retry Through Propagation ===\n");

    let spec = RetrySpec::builder()
        .operation("create function")
        .timeout(Duration::from_secs(5))
        .classifier(classify::any_of([
            classify::message_contains(["cannot be assumed"]),
            classify::classifier(|e: &ApiError| matches!(e, ApiError::Throttled).into()),
        ]))
        .backoff(
            ExponentialBackoff::builder()
                .min_interval(Duration::from_millis(100))
                .max_interval(Duration::from_secs(1))
                .build(),
        )
        .build()?;

    let attempts = Arc::new(AtomicU32::new(0));
    let start = Instant::now();

    let arn = spec
        .execute(|| {
            let attempts = Arc::clone(&attempts);
            async move {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                if attempt < 3 {
                    println!("  Attempt {}: role not ready", attempt + 1);
                    Err(ApiError::RoleNotReady)
                } else {
                    println!("  Attempt {}: created", attempt + 1);
                    Ok("arn:aws:lambda:us-east-1:000000000000:function:demo")
                }
            }
        })
        .await?;

    println!("\nResult: {}", arn);
    println!("Total attempts: {}", attempts.load(Ordering::SeqCst));
    println!("Total time: {:?}", start.elapsed());
    println!("Expected delays: 100ms + 200ms + 400ms = ~700ms");

    Ok(())
}

/// Example 2: Wait for a resource to become available
async fn example_wait() -> anyhow::Result<()> {
    println!("\n=== Example 2: Wait for State ===\n");

    let spec = WaitSpec::builder()
        .resource("db instance demo")
        .pending(["creating", "backing-up"])
        .target(["available"])
        .timeout(Duration::from_secs(10))
        .delay(Duration::from_millis(200))
        .poll_interval(Duration::from_millis(250))
        .build()?;

    let states = ["creating", "creating", "backing-up", "available"];
    let probes = AtomicU32::new(0);

    let instance = spec
        .wait_for(|| {
            let n = probes.fetch_add(1, Ordering::SeqCst) as usize;
            let state = states[n.min(states.len() - 1)];
            println!("  Probe {}: {}", n + 1, state);
            async move { Ok::<_, ApiError>(ProbeResult::new("demo", state)) }
        })
        .await?;

    println!("\nConverged: {:?}", instance);
    Ok(())
}

/// Example 3: An unexpected state ends the wait immediately
async fn example_unexpected_state() -> anyhow::Result<()> {
    println!("\n=== Example 3: Unexpected State ===\n");

    let spec = WaitSpec::builder()
        .resource("nat gateway demo")
        .pending(["pending"])
        .target(["available"])
        .timeout(Duration::from_secs(600))
        .build()?;

    let result = spec
        .wait_for(|| async { Ok::<_, ApiError>(ProbeResult::new((), "failed")) })
        .await;

    match result {
        Err(Error::UnexpectedState { observed, expected }) => {
            println!("Failed fast on '{}' (wanted {:?})", observed, expected);
        }
        other => println!("Unexpected outcome: {:?}", other),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("🔁 converge examples");

    example_retry().await?;
    example_wait().await?;
    example_unexpected_state().await?;

    println!("\n✅ All examples completed");
    Ok(())
}
