//! Query handling: options, named-query resolution, execution and caching.
//!
//! [`QueryDispatcher`] is the entry point; it routes one [`QueryOption`] to
//! the operation its mode names and returns a normalized result.

pub mod cache;
pub mod dispatcher;
pub mod executor;
pub mod option;
pub mod resolver;

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::{DatasourceError, Result};

pub use cache::{CacheEntry, CacheStore};
pub use dispatcher::QueryDispatcher;
pub use executor::{ExecutionEngine, ExecutionPhase, PollPolicy, POLL_INTERVAL, POLL_TIMEOUT};
pub use option::{AuthType, ConnectionSettings, OutputFormat, QueryMode, QueryOption, TimeRange};
pub use resolver::NamedQueryResolver;

/// Runs `fut` unless `cancel` fires first.
pub(crate) async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;

        _ = cancel.cancelled() => Err(DatasourceError::Cancelled),
        result = fut => result,
    }
}
