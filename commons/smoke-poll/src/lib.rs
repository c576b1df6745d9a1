//! Fixed-interval readiness polling for cluster resources.
//!
//! A [`ReadinessPoller`] repeatedly asks a [`ResourceFetcher`] for the state
//! of every tracked [`ResourceQuery`] until all of them satisfy a
//! [`StatePredicate`] or the [`PollConfig`] timeout elapses.

mod config;
mod error;
mod poller;
mod predicate;
mod query;

pub use config::{DEFAULT_INTERVAL, DEFAULT_TIMEOUT, PollConfig};
pub use error::{FetchError, PollError};
pub use poller::{PollResult, PollState, ReadinessPoller, ResourceFetcher};
pub use predicate::StatePredicate;
pub use query::{LastState, ResourceObservation, ResourceQuery};
pub use tokio_util::sync::CancellationToken;
