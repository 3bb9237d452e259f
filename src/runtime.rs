//! Long-running service components.
//!
//! # Component model
//!
//! A [`Component`] is an independently-runnable unit of the service: the
//! HTTP server, the real-time fan-out worker, the email worker. Each one is
//! constructed with its shared state already captured, then handed to
//! [`spawn_components`].
//!
//! Any component error cancels the shared [`CancellationToken`] so the
//! siblings shut down cleanly; [`ServiceHandle::join`] reports the first
//! error.

use std::future::Future;
use std::pin::Pin;

use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::AppError;

/// A boxed, owned future returned by [`Component::run`].
pub type ComponentFuture = Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'static>>;

pub trait Component: Send + 'static {
    /// Stable identifier used in log messages.
    fn id(&self) -> &str;

    /// Consume the component and return its run-loop. The future should
    /// return once `shutdown` is cancelled.
    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture;
}

/// Handle to a running component set.
pub struct ServiceHandle {
    inner: JoinHandle<Result<(), AppError>>,
}

impl ServiceHandle {
    /// Await all components and return the first error, if any.
    pub async fn join(self) -> Result<(), AppError> {
        match self.inner.await {
            Ok(r) => r,
            Err(e) => Err(AppError::Server(format!("component supervisor panicked: {e}"))),
        }
    }
}

/// Spawn each [`Component`] as its own Tokio task.
///
/// - a component returning `Err` (or panicking) cancels `shutdown`;
/// - the manager task drains the remaining components and returns the first
///   error encountered.
pub fn spawn_components(
    components: Vec<Box<dyn Component>>,
    shutdown: CancellationToken,
) -> ServiceHandle {
    let handle = tokio::spawn(async move {
        let mut set: JoinSet<Result<(), AppError>> = JoinSet::new();

        for component in components {
            let id = component.id().to_string();
            debug!(component = %id, "spawning component");
            set.spawn(component.run(shutdown.clone()));
        }

        let mut first_err: Option<AppError> = None;

        while let Some(res) = set.join_next().await {
            match res {
                Err(e) => {
                    error!("component panicked: {e}");
                    shutdown.cancel();
                    first_err.get_or_insert_with(|| AppError::Server(format!("component panicked: {e}")));
                }
                Ok(Err(e)) => {
                    error!("component error: {e}");
                    shutdown.cancel();
                    first_err.get_or_insert(e);
                }
                Ok(Ok(())) => {}
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    });

    ServiceHandle { inner: handle }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Idle(&'static str);

    impl Component for Idle {
        fn id(&self) -> &str {
            self.0
        }

        fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
            Box::pin(async move {
                shutdown.cancelled().await;
                Ok(())
            })
        }
    }

    struct Failing;

    impl Component for Failing {
        fn id(&self) -> &str {
            "failing"
        }

        fn run(self: Box<Self>, _shutdown: CancellationToken) -> ComponentFuture {
            Box::pin(async { Err(AppError::Server("boom".into())) })
        }
    }

    #[tokio::test]
    async fn clean_shutdown_joins_ok() {
        let token = CancellationToken::new();
        let handle = spawn_components(vec![Box::new(Idle("a")), Box::new(Idle("b"))], token.clone());
        token.cancel();
        handle.join().await.unwrap();
    }

    #[tokio::test]
    async fn one_failure_cancels_siblings() {
        let token = CancellationToken::new();
        let handle = spawn_components(vec![Box::new(Idle("a")), Box::new(Failing)], token.clone());
        let err = handle.join().await.unwrap_err();
        assert!(err.to_string().contains("boom"));
        assert!(token.is_cancelled());
    }
}
