//! Running immediate-scope work on tokio's blocking pool.

use keystone_core::BoxError;
use keystone_core::context::Executor;
use tokio::runtime::Handle;

/// An [`Executor`] that hands each job to `spawn_blocking`.
///
/// Reconcile jobs create and destroy services synchronously and linger
/// until the inactivity timeout, so they never run on async workers.
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: Handle,
}

impl TokioExecutor {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Uses the runtime the caller is running in, if any.
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl Executor for TokioExecutor {
    fn execute(&self, job: Box<dyn FnOnce() + Send + 'static>) -> Result<(), BoxError> {
        // The JoinHandle is dropped; the job runs detached.
        self.handle.spawn_blocking(job);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use keystone_core::{LocatorBuilder, ServiceClass, enable_immediate_scope, scopes};

    use super::*;

    #[test]
    fn test_current_outside_runtime() {
        assert!(TokioExecutor::current().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_immediate_services_created_on_blocking_pool() {
        struct Warmup;

        let locator = LocatorBuilder::new("tokio-immediate").build().unwrap();
        let controller = enable_immediate_scope(&locator).unwrap();
        controller.set_executor(Arc::new(TokioExecutor::current().unwrap()));
        controller.set_thread_inactivity_timeout(Duration::from_millis(100));

        let started = Arc::new(AtomicUsize::new(0));
        let counter = started.clone();
        let warmup = ServiceClass::builder::<Warmup>()
            .in_scope(scopes::IMMEDIATE)
            .default_constructor(|| Warmup)
            .post_construct("start", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .build();
        let mut config = locator.configuration().unwrap();
        config.add_class(warmup).unwrap();
        config.commit().unwrap();

        let waiting = controller.clone();
        let idle = tokio::task::spawn_blocking(move || waiting.wait_until_idle(Duration::from_secs(5)))
            .await
            .unwrap();
        assert!(idle);
        assert_eq!(started.load(Ordering::SeqCst), 1);
        locator.shutdown();
    }
}
