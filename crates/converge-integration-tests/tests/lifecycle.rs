//! End-to-end create and delete flows against the simulated control plane

mod common;

use converge_core::timeouts::{Operation, ResourceTimeouts};
use converge_integration_tests::{
    AdapterError, ControlPlane, FakeControlPlane, Lifecycle, create_resource, delete_resource,
};
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_create_waits_until_available() {
    common::init_tracing();
    let plane = FakeControlPlane::new().with_lifecycle(
        "nat-gateway",
        Lifecycle::new("pending").then(Duration::from_secs(12), "available"),
    );
    let start = Instant::now();

    let gateway = create_resource(&plane, "nat-gateway", &ResourceTimeouts::default())
        .await
        .unwrap();

    assert_eq!(gateway.state, "available");
    assert!(start.elapsed() >= Duration::from_secs(12));
    // Backoff is capped at 5s, so convergence is noticed promptly
    assert!(start.elapsed() < Duration::from_secs(18));
}

#[tokio::test(start_paused = true)]
async fn test_create_tolerates_read_after_write_lag() {
    common::init_tracing();
    let plane = FakeControlPlane::new()
        .with_visibility_lag(Duration::from_secs(4))
        .with_lifecycle(
            "subnet",
            Lifecycle::new("pending").then(Duration::from_secs(6), "available"),
        );

    let subnet = create_resource(&plane, "subnet", &ResourceTimeouts::default())
        .await
        .unwrap();

    assert_eq!(subnet.kind, "subnet");
    assert_eq!(subnet.state, "available");
}

#[tokio::test(start_paused = true)]
async fn test_create_fails_fast_on_failed_state() {
    common::init_tracing();
    let plane = FakeControlPlane::new().with_lifecycle(
        "db-instance",
        Lifecycle::new("pending").then(Duration::from_secs(3), "failed"),
    );
    let start = Instant::now();

    let err = create_resource(&plane, "db-instance", &ResourceTimeouts::default())
        .await
        .unwrap_err();

    match err {
        AdapterError::Converge(converge_core::Error::UnexpectedState { observed, expected }) => {
            assert_eq!(observed, "failed");
            assert_eq!(expected, vec!["available".to_string()]);
        }
        other => panic!("Expected UnexpectedState, got {other:?}"),
    }
    assert!(start.elapsed() < Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn test_create_honors_configured_timeout() {
    common::init_tracing();
    let plane = FakeControlPlane::new().with_lifecycle(
        "cluster",
        Lifecycle::new("pending").then(Duration::from_secs(3600), "available"),
    );
    let timeouts: ResourceTimeouts = serde_json::from_str(r#"{"create": "2m"}"#).unwrap();
    assert_eq!(timeouts.get(Operation::Create), Some(Duration::from_secs(120)));
    let start = Instant::now();

    let err = create_resource(&plane, "cluster", &timeouts)
        .await
        .unwrap_err();

    match err {
        AdapterError::Converge(err) => {
            assert!(err.is_timeout());
            assert!(err.to_string().contains("pending"));
        }
        other => panic!("Expected Timeout, got {other:?}"),
    }
    assert!(start.elapsed() >= Duration::from_secs(120));
    assert!(start.elapsed() < Duration::from_secs(130));
}

#[tokio::test(start_paused = true)]
async fn test_create_retries_throttled_submission() {
    common::init_tracing();
    let plane = FakeControlPlane::new().with_throttling(2);
    // Burn one call so the create submission lands on a throttled slot
    assert!(plane.describe("vol-warmup").await.is_err());

    let volume = create_resource(&plane, "volume", &ResourceTimeouts::default())
        .await
        .unwrap();

    assert_eq!(volume.state, "available");
    // warm-up, throttled create, create, then at least two probes
    assert!(plane.calls() >= 5);
}

#[tokio::test(start_paused = true)]
async fn test_delete_waits_until_gone() {
    common::init_tracing();
    let plane = FakeControlPlane::new().with_delete_latency(Duration::from_secs(20));
    let volume = plane.create("volume").await.unwrap();
    let start = Instant::now();

    delete_resource(&plane, &volume.id, &ResourceTimeouts::default())
        .await
        .unwrap();

    assert!(start.elapsed() >= Duration::from_secs(20));
    assert!(plane.describe(&volume.id).await.unwrap_err().is_not_found());
}

#[tokio::test(start_paused = true)]
async fn test_delete_of_missing_resource_succeeds() {
    common::init_tracing();
    let plane = FakeControlPlane::new();
    let start = Instant::now();

    delete_resource(&plane, "vol-does-not-exist", &ResourceTimeouts::default())
        .await
        .unwrap();

    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_delete_timeout_from_default_entry() {
    common::init_tracing();
    let plane = FakeControlPlane::new().with_delete_latency(Duration::from_secs(3600));
    let volume = plane.create("volume").await.unwrap();
    let timeouts = ResourceTimeouts::default().with_default(Duration::from_secs(30));

    let err = delete_resource(&plane, &volume.id, &timeouts)
        .await
        .unwrap_err();

    match err {
        AdapterError::Converge(converge_core::Error::Timeout {
            last_state,
            expected,
            timeout,
            ..
        }) => {
            assert_eq!(last_state.as_deref(), Some("deleting"));
            assert!(expected.is_empty());
            assert_eq!(timeout, Duration::from_secs(30));
        }
        other => panic!("Expected Timeout, got {other:?}"),
    }
}
