use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use super::RenderError;

/// Bounds how many renders run at once and how long each may take.
///
/// A permit is held for the whole render and released when the future
/// completes, times out or is dropped, so a disconnected client frees its slot.
#[derive(Debug, Clone)]
pub struct RenderPool {
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl RenderPool {
    pub fn new(concurrency: usize, timeout: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            timeout,
        }
    }

    pub async fn run<F, T>(&self, render: F) -> Result<T, RenderError>
    where
        F: Future<Output = Result<T, RenderError>>,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| RenderError::PoolClosed)?;
        log::debug!(
            "Render slot acquired ({} left)",
            self.permits.available_permits()
        );

        match tokio::time::timeout(self.timeout, render).await {
            Ok(result) => result,
            Err(_) => {
                log::error!("Render exceeded {:?}, cancelled", self.timeout);
                Err(RenderError::Timeout(self.timeout))
            }
        }
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}
