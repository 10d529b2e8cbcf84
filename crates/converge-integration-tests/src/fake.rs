//! In-memory control plane whose resources change state over (virtual) time.
//!
//! All timing uses `tokio::time::Instant`, so tests running with a paused
//! clock drive lifecycles deterministically.

use crate::control_plane::{ApiError, ControlPlane, Resource};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;
use uuid::Uuid;

/// Timed sequence of states a resource walks through after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lifecycle {
    steps: Vec<(Duration, String)>,
}

impl Lifecycle {
    /// Start in `initial` state.
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            steps: vec![(Duration::ZERO, initial.into())],
        }
    }

    /// Enter `state` once the resource is `at` old.
    pub fn then(mut self, at: Duration, state: impl Into<String>) -> Self {
        self.steps.push((at, state.into()));
        self
    }

    fn state_at(&self, age: Duration) -> &str {
        self.steps
            .iter()
            .take_while(|(at, _)| *at <= age)
            .last()
            .map_or("", |(_, state)| state.as_str())
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Lifecycle::new("pending").then(Duration::from_secs(5), "available")
    }
}

#[derive(Debug)]
struct Record {
    kind: String,
    created: Instant,
    lifecycle: Lifecycle,
    deleting_since: Option<Instant>,
}

#[derive(Debug, Default)]
struct State {
    records: HashMap<String, Record>,
    roles: HashMap<String, Instant>,
}

/// Simulated eventually consistent control plane.
#[derive(Debug)]
pub struct FakeControlPlane {
    state: Mutex<State>,
    lifecycles: HashMap<String, Lifecycle>,
    visibility_lag: Duration,
    delete_latency: Duration,
    throttle_every: Option<u32>,
    calls: AtomicU32,
}

impl Default for FakeControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeControlPlane {
    /// Plane with immediately visible resources and a 5s delete latency.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            lifecycles: HashMap::new(),
            visibility_lag: Duration::ZERO,
            delete_latency: Duration::from_secs(5),
            throttle_every: None,
            calls: AtomicU32::new(0),
        }
    }

    /// Lifecycle for newly created resources of `kind`.
    pub fn with_lifecycle(mut self, kind: impl Into<String>, lifecycle: Lifecycle) -> Self {
        self.lifecycles.insert(kind.into(), lifecycle);
        self
    }

    /// How long a new resource stays invisible to `describe`.
    pub fn with_visibility_lag(mut self, lag: Duration) -> Self {
        self.visibility_lag = lag;
        self
    }

    /// How long a resource stays in `deleting` before it disappears.
    pub fn with_delete_latency(mut self, latency: Duration) -> Self {
        self.delete_latency = latency;
        self
    }

    /// Throttle every `n`th API call.
    pub fn with_throttling(mut self, every: u32) -> Self {
        self.throttle_every = Some(every.max(1));
        self
    }

    /// Register a role that becomes assumable after `propagation`.
    pub async fn add_role(&self, name: impl Into<String>, propagation: Duration) {
        let mut state = self.state.lock().await;
        state.roles.insert(name.into(), Instant::now() + propagation);
    }

    /// Total API calls served, throttled ones included.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn admit(&self, call: &str) -> Result<(), ApiError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.throttle_every {
            Some(every) if n % every == 0 => {
                trace!(call, n, "Throttling call");
                Err(ApiError::Throttled)
            }
            _ => Ok(()),
        }
    }

    fn lifecycle_for(&self, kind: &str) -> Lifecycle {
        self.lifecycles.get(kind).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn create(&self, kind: &str) -> Result<Resource, ApiError> {
        self.admit("create")?;

        let id = format!("{kind}-{}", &Uuid::new_v4().simple().to_string()[..12]);
        let lifecycle = self.lifecycle_for(kind);
        let resource = Resource {
            id: id.clone(),
            kind: kind.to_string(),
            state: lifecycle.state_at(Duration::ZERO).to_string(),
        };

        let mut state = self.state.lock().await;
        state.records.insert(
            id.clone(),
            Record {
                kind: kind.to_string(),
                created: Instant::now(),
                lifecycle,
                deleting_since: None,
            },
        );
        trace!(id = %id, kind, "Created resource");
        Ok(resource)
    }

    async fn describe(&self, id: &str) -> Result<Resource, ApiError> {
        self.admit("describe")?;

        let now = Instant::now();
        let not_found = || ApiError::NotFound { id: id.to_string() };
        let mut state = self.state.lock().await;
        let record = state.records.get(id).ok_or_else(not_found)?;

        let age = now.duration_since(record.created);
        if age < self.visibility_lag {
            return Err(not_found());
        }

        let current = match record.deleting_since {
            Some(since) if now.duration_since(since) >= self.delete_latency => None,
            Some(_) => Some("deleting".to_string()),
            None => Some(record.lifecycle.state_at(age).to_string()),
        };
        let kind = record.kind.clone();

        let Some(current) = current else {
            state.records.remove(id);
            trace!(id, "Resource deletion completed");
            return Err(not_found());
        };

        Ok(Resource {
            id: id.to_string(),
            kind,
            state: current,
        })
    }

    async fn delete(&self, id: &str) -> Result<(), ApiError> {
        self.admit("delete")?;

        let mut state = self.state.lock().await;
        let record = state
            .records
            .get_mut(id)
            .ok_or_else(|| ApiError::NotFound { id: id.to_string() })?;
        record.deleting_since.get_or_insert_with(Instant::now);
        trace!(id, "Deletion submitted");
        Ok(())
    }

    async fn create_function(&self, name: &str, role: &str) -> Result<Resource, ApiError> {
        self.admit("create_function")?;

        let mut state = self.state.lock().await;
        let ready_at = *state.roles.get(role).ok_or_else(|| {
            ApiError::InvalidParameter(format!("role {role} does not exist"))
        })?;
        if Instant::now() < ready_at {
            return Err(ApiError::InvalidParameter(
                "The role defined for the function cannot be assumed by Lambda".to_string(),
            ));
        }

        state.records.insert(
            name.to_string(),
            Record {
                kind: "function".to_string(),
                created: Instant::now(),
                lifecycle: Lifecycle::new("Active"),
                deleting_since: None,
            },
        );
        Ok(Resource {
            id: name.to_string(),
            kind: "function".to_string(),
            state: "Active".to_string(),
        })
    }
}
