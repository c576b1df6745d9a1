use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PollConfig;
use crate::error::{FetchError, PollError};
use crate::predicate::StatePredicate;
use crate::query::{LastState, ResourceObservation, ResourceQuery};

/// Reads the current state of one resource.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    async fn fetch(
        &self,
        query: &ResourceQuery,
    ) -> Result<ResourceObservation, FetchError>;
}

#[async_trait]
impl<T: ResourceFetcher + ?Sized> ResourceFetcher for Arc<T> {
    async fn fetch(
        &self,
        query: &ResourceQuery,
    ) -> Result<ResourceObservation, FetchError> {
        (**self).fetch(query).await
    }
}

#[async_trait]
impl<T: ResourceFetcher + ?Sized> ResourceFetcher for &T {
    async fn fetch(
        &self,
        query: &ResourceQuery,
    ) -> Result<ResourceObservation, FetchError> {
        (**self).fetch(query).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Polling,
    Satisfied,
    TimedOut,
    Aborted,
}

/// Outcome of one poll invocation.
#[derive(Debug, Clone)]
pub struct PollResult {
    pub succeeded: bool,
    pub state: PollState,
    /// Last-known state per resource, keyed by `namespace/kind/name`.
    pub final_observations: BTreeMap<String, LastState>,
    pub elapsed: Duration,
    /// Number of fetch cycles started.
    pub attempts: u32,
    pub predicate: String,
    pub queries: Vec<ResourceQuery>,
}

impl PollResult {
    pub fn state_of(&self, query: &ResourceQuery) -> Option<&LastState> {
        self.final_observations.get(&query.key())
    }

    /// Converts a timed-out result into [`PollError::Timeout`].
    pub fn ensure_satisfied(self) -> Result<PollResult, PollError> {
        if self.succeeded {
            Ok(self)
        } else {
            Err(PollError::Timeout(Box::new(self)))
        }
    }
}

impl fmt::Display for PollResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} waiting for {} resource(s) to be {} after {:?} ({} attempt(s))",
            self.state,
            self.queries.len(),
            self.predicate,
            self.elapsed,
            self.attempts
        )?;
        for q in &self.queries {
            let last = self
                .final_observations
                .get(&q.key())
                .unwrap_or(&LastState::Unknown);
            write!(f, "\n  {q}: {last}")?;
        }
        Ok(())
    }
}

/// Polls a set of resources at a fixed interval until every one of them
/// satisfies the predicate, the timeout elapses, or polling is aborted.
pub struct ReadinessPoller<F> {
    fetcher: F,
    cancel: CancellationToken,
}

impl<F: ResourceFetcher> ReadinessPoller<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Runs the poll loop. A timeout is reported as `Ok` with
    /// `succeeded == false`; fatal fetch errors and cancellation are `Err`.
    pub async fn poll(
        &self,
        queries: &[ResourceQuery],
        config: &PollConfig,
    ) -> Result<PollResult, PollError> {
        let mut run = PollRun::new(queries, config);
        run.transition(PollState::Polling);

        loop {
            run.attempts += 1;
            let mut all_satisfied = true;

            for query in queries {
                if self.cancel.is_cancelled() {
                    return Err(PollError::Cancelled(Box::new(
                        run.finish(PollState::Aborted),
                    )));
                }
                let remaining =
                    config.timeout.saturating_sub(run.started.elapsed());
                let fetched = tokio::select! {
                    _ = self.cancel.cancelled() => {
                        return Err(PollError::Cancelled(Box::new(
                            run.finish(PollState::Aborted),
                        )));
                    }
                    fetched = tokio::time::timeout(remaining, self.fetcher.fetch(query)) => fetched,
                };
                let Ok(fetched) = fetched else {
                    warn!(resource = %query, ?remaining, "fetch still pending at deadline");
                    run.record(
                        query,
                        LastState::Missing {
                            reason: format!("no response within {remaining:?}"),
                        },
                    );
                    return Ok(run.finish(PollState::TimedOut));
                };
                match fetched {
                    Ok(obs) => {
                        let ok = config.predicate.test(&obs.raw_state);
                        debug!(
                            resource = %query,
                            state = %obs.raw_state,
                            satisfied = ok,
                            "observed"
                        );
                        all_satisfied &= ok;
                        run.record(query, LastState::Observed(obs));
                    }
                    Err(e) if e.is_fatal() => {
                        warn!(resource = %query, error = %e, "fatal fetch error");
                        return Err(PollError::Fatal {
                            query: query.clone(),
                            source: e,
                            report: Box::new(run.finish(PollState::Aborted)),
                        });
                    }
                    Err(e) => {
                        debug!(resource = %query, error = %e, "not yet available");
                        all_satisfied = false;
                        run.record(
                            query,
                            LastState::Missing {
                                reason: e.to_string(),
                            },
                        );
                    }
                }
            }

            if all_satisfied {
                return Ok(run.finish(PollState::Satisfied));
            }

            if run.started.elapsed() + config.interval > config.timeout {
                return Ok(run.finish(PollState::TimedOut));
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    return Err(PollError::Cancelled(Box::new(
                        run.finish(PollState::Aborted),
                    )));
                }
                _ = tokio::time::sleep(config.interval) => {}
            }
        }
    }

    /// Single fetch with no retry budget.
    pub async fn check_once(
        &self,
        query: &ResourceQuery,
        predicate: &StatePredicate,
    ) -> Result<ResourceObservation, PollError> {
        match self.fetcher.fetch(query).await {
            Ok(obs) if predicate.test(&obs.raw_state) => {
                debug!(resource = %query, state = %obs.raw_state, "check passed");
                Ok(obs)
            }
            Ok(obs) => Err(PollError::Assertion {
                query: query.clone(),
                predicate: predicate.description().to_string(),
                observed: LastState::Observed(obs),
            }),
            Err(e) if e.is_fatal() => {
                let report =
                    PollRun::new(std::slice::from_ref(query), &one_shot(predicate))
                        .finish(PollState::Aborted);
                Err(PollError::Fatal {
                    query: query.clone(),
                    source: e,
                    report: Box::new(report),
                })
            }
            Err(e) => Err(PollError::Assertion {
                query: query.clone(),
                predicate: predicate.description().to_string(),
                observed: LastState::Missing {
                    reason: e.to_string(),
                },
            }),
        }
    }
}

fn one_shot(predicate: &StatePredicate) -> PollConfig {
    PollConfig::new(predicate.clone())
        .interval(Duration::ZERO)
        .timeout(Duration::ZERO)
}

/// Bookkeeping owned by a single poll invocation.
struct PollRun {
    started: Instant,
    attempts: u32,
    state: PollState,
    observations: BTreeMap<String, LastState>,
    predicate: String,
    queries: Vec<ResourceQuery>,
}

impl PollRun {
    fn new(queries: &[ResourceQuery], config: &PollConfig) -> Self {
        let observations = queries
            .iter()
            .map(|q| (q.key(), LastState::Unknown))
            .collect();
        Self {
            started: Instant::now(),
            attempts: 0,
            state: PollState::Idle,
            observations,
            predicate: config.predicate.description().to_string(),
            queries: queries.to_vec(),
        }
    }

    fn transition(&mut self, next: PollState) {
        debug!(from = ?self.state, to = ?next, "poll state");
        self.state = next;
    }

    fn record(&mut self, query: &ResourceQuery, last: LastState) {
        self.observations.insert(query.key(), last);
    }

    fn finish(mut self, terminal: PollState) -> PollResult {
        self.transition(terminal);
        let result = PollResult {
            succeeded: terminal == PollState::Satisfied,
            state: terminal,
            final_observations: self.observations,
            elapsed: self.started.elapsed(),
            attempts: self.attempts,
            predicate: self.predicate,
            queries: self.queries,
        };
        if result.succeeded {
            info!(
                elapsed = ?result.elapsed,
                attempts = result.attempts,
                "resources ready: {:?}",
                result.final_observations
            );
        } else {
            warn!("{result}");
        }
        result
    }
}
