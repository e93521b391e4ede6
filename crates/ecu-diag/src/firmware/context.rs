//! Deadline, cancellation and reporting for one firmware transfer

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::EcuError;
use crate::events::{EventSink, TracingSink};

/// Bounds a dump, flash or reset
///
/// Every ECU exchange of a transfer runs through [`TransferContext::run`], so
/// a cancelled token or a passed deadline ends the operation at the next
/// exchange at the latest.
#[derive(Clone)]
pub struct TransferContext {
    deadline: Instant,
    budget: Duration,
    cancel: CancellationToken,
    sink: Arc<dyn EventSink>,
}

impl TransferContext {
    /// Context expiring `budget` from now, reporting through `tracing`
    pub fn new(budget: Duration) -> Self {
        Self {
            deadline: Instant::now() + budget,
            budget,
            cancel: CancellationToken::new(),
            sink: Arc::new(TracingSink),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn sink(&self) -> &Arc<dyn EventSink> {
        &self.sink
    }

    /// Fail if the transfer was cancelled or ran out of time
    pub fn check(&self) -> Result<(), EcuError> {
        if self.cancel.is_cancelled() {
            return Err(EcuError::Cancelled);
        }
        if Instant::now() >= self.deadline {
            return Err(EcuError::DeadlineExceeded(self.budget));
        }
        Ok(())
    }

    /// Run one exchange, aborting it on cancellation or deadline
    pub async fn run<T, E, F>(&self, fut: F) -> Result<T, EcuError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<EcuError>,
    {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(EcuError::Cancelled),
            _ = tokio::time::sleep_until(self.deadline) => Err(EcuError::DeadlineExceeded(self.budget)),
            result = fut => result.map_err(Into::into),
        }
    }

    /// Sleep that still honours cancellation and the deadline
    pub async fn sleep(&self, duration: Duration) -> Result<(), EcuError> {
        self.run(async {
            tokio::time::sleep(duration).await;
            Ok::<(), EcuError>(())
        })
        .await
    }

    pub fn message(&self, message: impl AsRef<str>) {
        self.sink.on_message(message.as_ref());
    }

    pub fn progress(&self, value: i64) {
        self.sink.on_progress(value);
    }
}

impl std::fmt::Debug for TransferContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferContext")
            .field("budget", &self.budget)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
