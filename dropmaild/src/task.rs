use anyhow::{bail, Result};
use std::{future::Future, time::Duration};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(200);

/// handle of an engine running on its own task
pub struct Task {
    name: &'static str,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Task {
    pub(crate) fn spawn<F, Fut>(name: &'static str, run: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(cancel.clone()));

        Self {
            name,
            cancel,
            handle,
        }
    }

    pub async fn shutdown(self) -> Result<()> {
        self.cancel.cancel();

        let mut handle = self.handle;

        tokio::select! {
            result = &mut handle => {
                match result {
                    Ok(()) => Ok(()),
                    Err(error) => bail!("error while waiting for {} to shutdown: {}", self.name, error)
                }
            }
            _ = tokio::time::sleep(SHUTDOWN_TIMEOUT) => {
                handle.abort();
                bail!("{} shutdown timedout, aborting instead...", self.name)
            }
        }
    }
}
