//! Request-scoped cancellation, threaded into every public operation per
//! spec.md §5 ("every public operation takes a request context ... a
//! cancelled context aborts in-flight fetches and tree iterations").

use tokio_util::sync::CancellationToken;

use crate::error::RegistryError;

#[derive(Clone, Default)]
pub struct RequestContext {
    cancellation: CancellationToken,
}

impl RequestContext {
    /// A context with no parent — cancellable only via its own `cancel()`.
    /// Intended for call sites (tests, one-off tooling) with no server
    /// lifecycle to derive cancellation from; RPC handlers should use
    /// [`RequestContext::from_parent`] instead so a real shutdown signal
    /// actually reaches in-flight fetches.
    pub fn new() -> Self {
        Self { cancellation: CancellationToken::new() }
    }

    /// A context whose cancellation is tied to `parent`: cancelling the
    /// parent (e.g. the server's shutdown token) cancels every outstanding
    /// request context derived from it, which aborts their in-flight
    /// fetches and tree walks per spec.md §5.
    pub fn from_parent(parent: &CancellationToken) -> Self {
        Self { cancellation: parent.child_token() }
    }

    pub fn child(&self) -> Self {
        Self { cancellation: self.cancellation.child_token() }
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Races a blocking computation (already spawned via
    /// `tokio::task::spawn_blocking`) against cancellation. If the context
    /// is cancelled first, the blocking task is abandoned (it keeps running
    /// to completion on its worker thread — libgit2 operations are not
    /// preemptible — but its result is never observed and never populates a
    /// cache, satisfying the "partially populated caches must not be made
    /// visible" invariant).
    pub async fn race<T: Send + 'static>(
        &self,
        handle: tokio::task::JoinHandle<Result<T, RegistryError>>,
    ) -> Result<T, RegistryError> {
        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => {
                Err(RegistryError::Unavailable("request cancelled".to_owned()))
            }
            joined = handle => {
                match joined {
                    Ok(result) => result,
                    Err(e) => Err(RegistryError::internal(format!("fetch task panicked: {e}"))),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelling_the_parent_token_cancels_every_derived_context() {
        let shutdown = CancellationToken::new();
        let a = RequestContext::from_parent(&shutdown);
        let b = RequestContext::from_parent(&shutdown);
        assert!(!a.is_cancelled());
        assert!(!b.is_cancelled());

        shutdown.cancel();

        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
    }

    #[tokio::test]
    async fn race_aborts_when_the_parent_token_is_cancelled() {
        let shutdown = CancellationToken::new();
        let ctx = RequestContext::from_parent(&shutdown);

        let handle = tokio::task::spawn_blocking(|| -> Result<(), RegistryError> {
            std::thread::sleep(std::time::Duration::from_secs(30));
            Ok(())
        });

        shutdown.cancel();
        let result = ctx.race(handle).await;
        assert!(matches!(result, Err(RegistryError::Unavailable(_))));
    }
}
