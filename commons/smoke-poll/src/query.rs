use std::fmt;

use tokio::time::Instant;

/// Identifies one cluster resource to fetch on every poll tick.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceQuery {
    pub kind: String,
    pub name: String,
    pub namespace: String,
    /// Kubectl-style path such as `{.status.phase}`. When absent the fetcher
    /// picks a default state for the kind.
    pub json_path: Option<String>,
}

impl ResourceQuery {
    pub fn new(
        kind: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            namespace: namespace.into(),
            json_path: None,
        }
    }

    pub fn with_json_path(mut self, path: impl Into<String>) -> Self {
        self.json_path = Some(path.into());
        self
    }

    /// Key used in [`crate::PollResult::final_observations`]:
    /// `namespace/kind/name`.
    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.namespace, self.kind, self.name)
    }
}

impl fmt::Display for ResourceQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} -n {}", self.kind, self.name, self.namespace)?;
        if let Some(path) = &self.json_path {
            write!(f, " -o jsonpath={path}")?;
        }
        Ok(())
    }
}

/// One snapshot of a resource taken by a fetcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceObservation {
    pub name: String,
    pub raw_state: String,
    pub observed_at: Instant,
}

impl ResourceObservation {
    /// Stamps the observation with the current monotonic instant.
    pub fn new(name: impl Into<String>, raw_state: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            raw_state: raw_state.into(),
            observed_at: Instant::now(),
        }
    }
}

/// What the poller last knows about a tracked resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LastState {
    /// No fetch cycle reached this resource.
    Unknown,
    /// The last fetch failed with a retryable error.
    Missing { reason: String },
    Observed(ResourceObservation),
}

impl LastState {
    pub fn raw_state(&self) -> Option<&str> {
        match self {
            LastState::Observed(obs) => Some(obs.raw_state.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for LastState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LastState::Unknown => write!(f, "<not fetched>"),
            LastState::Missing { reason } => write!(f, "<missing: {reason}>"),
            LastState::Observed(obs) => write!(f, "{:?}", obs.raw_state),
        }
    }
}
