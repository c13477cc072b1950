//! # Request Correlation
//!
//! A per-call identifier attached to the dynamic extent of one inbound
//! request so log lines emitted from anywhere inside that call (including
//! the pipeline worker thread) can be tied back to it.
//!
//! Propagation is two-layered: async code runs inside a task-local
//! [`scope`], and worker threads re-bind the captured id with [`bind`],
//! whose guard restores the previous value on drop. Both layers release on
//! every exit path, success or panic, so an id can never leak onto an
//! unrelated later call.

use std::cell::RefCell;
use std::fmt;

/// Opaque correlation token for one inbound call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a fresh random id (32 hex digits, hyphenated 8-4-4-4-12).
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

tokio::task_local! {
    static TASK_REQUEST_ID: RequestId;
}

thread_local! {
    static THREAD_REQUEST_ID: RefCell<Option<RequestId>> = const { RefCell::new(None) };
}

/// Read the id bound to the current execution extent, if any.
///
/// Checks the async task scope first, then the worker-thread binding.
pub fn current() -> Option<RequestId> {
    if let Ok(id) = TASK_REQUEST_ID.try_with(Clone::clone) {
        return Some(id);
    }
    THREAD_REQUEST_ID.with(|cell| cell.borrow().clone())
}

/// Run a future with `id` bound to its entire async extent.
///
/// The binding is released when the future completes, by any path.
pub async fn scope<F>(id: RequestId, fut: F) -> F::Output
where
    F: std::future::Future,
{
    TASK_REQUEST_ID.scope(id, fut).await
}

/// Bind `id` on the current thread until the returned guard drops.
///
/// Used on pipeline worker threads, which are outside any task scope. The
/// guard restores the previous binding on drop, including during unwind.
pub fn bind(id: RequestId) -> BindGuard {
    let previous = THREAD_REQUEST_ID.with(|cell| cell.borrow_mut().replace(id));
    BindGuard { previous }
}

/// Releases a thread binding made by [`bind`].
pub struct BindGuard {
    previous: Option<RequestId>,
}

impl Drop for BindGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        THREAD_REQUEST_ID.with(|cell| *cell.borrow_mut() = previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_is_empty_without_binding() {
        assert!(current().is_none());
    }

    #[test]
    fn test_id_format() {
        let id = RequestId::new();
        let parts: Vec<&str> = id.as_str().split('-').collect();
        assert_eq!(
            parts.iter().map(|p| p.len()).collect::<Vec<_>>(),
            vec![8, 4, 4, 4, 12]
        );
        assert_ne!(id, RequestId::new());
    }

    #[test]
    fn test_thread_bind_and_release() {
        let id = RequestId::new();
        {
            let _guard = bind(id.clone());
            assert_eq!(current(), Some(id));
        }
        assert!(current().is_none());
    }

    #[test]
    fn test_bind_restores_previous_on_drop() {
        let outer = RequestId::new();
        let inner = RequestId::new();
        let _outer_guard = bind(outer.clone());
        {
            let _inner_guard = bind(inner.clone());
            assert_eq!(current(), Some(inner));
        }
        assert_eq!(current(), Some(outer));
    }

    #[test]
    fn test_bind_released_on_panic() {
        let result = std::panic::catch_unwind(|| {
            let _guard = bind(RequestId::new());
            panic!("boom");
        });
        assert!(result.is_err());
        assert!(current().is_none());
    }

    #[tokio::test]
    async fn test_scope_covers_async_extent() {
        let id = RequestId::new();
        let seen = scope(id.clone(), async { current() }).await;
        assert_eq!(seen, Some(id));
        assert!(current().is_none());
    }

    #[tokio::test]
    async fn test_scope_reaches_spawn_blocking_via_rebind() {
        let id = RequestId::new();
        let seen = scope(id.clone(), async {
            let captured = current().expect("bound in scope");
            tokio::task::spawn_blocking(move || {
                let _guard = bind(captured);
                current()
            })
            .await
            .unwrap()
        })
        .await;
        assert_eq!(seen, Some(id));
    }

    #[tokio::test]
    async fn test_scope_released_after_error_path() {
        let id = RequestId::new();
        let result: Result<(), &str> = scope(id, async { Err("failed") }).await;
        assert!(result.is_err());
        assert!(current().is_none());
    }
}
