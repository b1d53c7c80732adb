use std::future::Future;

use gangway_core::prelude::{ShutdownHandle, ShutdownSignalError};

/// Runs async work for the synchronous hooks.
///
/// There is one executor per run. Virtual users live on their own OS threads and block on the
/// executor's runtime, so all network I/O shares one pool of worker threads.
#[derive(Debug)]
pub struct Executor {
    runtime: tokio::runtime::Runtime,
    shutdown_handle: ShutdownHandle,
}

impl Executor {
    pub(crate) fn new(runtime: tokio::runtime::Runtime, shutdown_handle: ShutdownHandle) -> Self {
        Self {
            runtime,
            shutdown_handle,
        }
    }

    /// Run async code in place, blocking until it completes.
    ///
    /// Note that the future will be cancelled if the run is stopped, in which case a
    /// [ShutdownSignalError] is returned. Use this for work that is safe to abandon, such as
    /// waiting out think time.
    pub fn execute_in_place<T>(
        &self,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> anyhow::Result<T> {
        let mut shutdown_listener = self.shutdown_handle.new_listener();
        self.runtime.block_on(async move {
            tokio::select! {
                result = fut => result,
                _ = shutdown_listener.wait_for_shutdown() => {
                    Err(anyhow::anyhow!(ShutdownSignalError::default()))
                },
            }
        })
    }

    /// Run async code in place and always let it finish, even when the run is stopping.
    ///
    /// Requests to the system under test go through here so that a stop never cuts a request off
    /// half way and records a bogus failure.
    pub fn execute_to_completion<T>(&self, fut: impl Future<Output = T>) -> T {
        self.runtime.block_on(fut)
    }

    /// Submit async code to be run in the background.
    ///
    /// Note that the future will not be cancelled if the runner is shutdown. It is also not guaranteed
    /// that the runner will wait for the future to complete before shutting down.
    pub fn spawn(&self, fut: impl Future<Output = ()> + Send + 'static) {
        self.runtime.spawn(fut);
    }
}
