//! Request-scoped storage that follows a request across `.await` points.
//!
//! A [`Scope`] is a private key/value map. It is installed as a tokio
//! task-local for the duration of a future, so every continuation of that
//! future sees it, while futures running in other scopes (interleaved on the
//! same worker threads) never do. Values written through [`set`] are visible
//! to [`get`] anywhere inside the same scope.
//!
//! `tokio::spawn` does not inherit task-locals; use [`spawn`] (or
//! [`current`] + [`Scope::enter`]) to carry a scope into a new task.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::task::futures::TaskLocalFuture;
use tokio::task::JoinHandle;

tokio::task_local! {
    static ACTIVE_SCOPE: Scope;
}

type Slot = Arc<dyn Any + Send + Sync>;

/// Handle to one isolated storage scope. Clones share the same map.
#[derive(Clone, Default)]
pub struct Scope {
    values: Arc<Mutex<HashMap<&'static str, Slot>>>,
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<&'static str> = match self.values.lock() {
            Ok(values) => values.keys().copied().collect(),
            Err(_) => Vec::new(),
        };
        f.debug_struct("Scope").field("keys", &keys).finish()
    }
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `fut` with this scope active.
    pub fn enter<F: Future>(self, fut: F) -> TaskLocalFuture<Scope, F> {
        ACTIVE_SCOPE.scope(self, fut)
    }

    /// Run a synchronous callback with this scope active.
    pub fn enter_sync<R>(self, f: impl FnOnce() -> R) -> R {
        ACTIVE_SCOPE.sync_scope(self, f)
    }

    pub fn insert<T: Any + Send + Sync>(&self, key: &'static str, value: T) {
        if let Ok(mut values) = self.values.lock() {
            values.insert(key, Arc::new(value));
        }
    }

    pub fn lookup<T: Any + Send + Sync + Clone>(&self, key: &'static str) -> Option<T> {
        let slot = self.values.lock().ok()?.get(key).cloned()?;
        slot.downcast_ref::<T>().cloned()
    }
}

/// Run `fut` inside a fresh scope.
pub fn bind_scope<F: Future>(fut: F) -> TaskLocalFuture<Scope, F> {
    Scope::new().enter(fut)
}

/// Wrap a future factory so every invocation runs in its own fresh scope.
pub fn bind_fn<A, F, Fut>(f: F) -> impl Fn(A) -> TaskLocalFuture<Scope, Fut> + Clone
where
    F: Fn(A) -> Fut + Clone,
    Fut: Future,
{
    move |arg| bind_scope(f(arg))
}

/// The active scope, if any.
pub fn current() -> Option<Scope> {
    ACTIVE_SCOPE.try_with(Scope::clone).ok()
}

/// Store `value` in the active scope. Returns `false` outside any scope.
pub fn set<T: Any + Send + Sync>(key: &'static str, value: T) -> bool {
    ACTIVE_SCOPE
        .try_with(|scope| scope.insert(key, value))
        .is_ok()
}

/// Read `key` from the active scope. `None` outside any scope, when the key
/// is unset, or when it holds a different type.
pub fn get<T: Any + Send + Sync + Clone>(key: &'static str) -> Option<T> {
    ACTIVE_SCOPE.try_with(|scope| scope.lookup(key)).ok().flatten()
}

/// `tokio::spawn` that carries the active scope into the new task.
pub fn spawn<F>(fut: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    match current() {
        Some(scope) => tokio::spawn(scope.enter(fut)),
        None => tokio::spawn(fut),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const KEY: &str = "test.key";

    #[test]
    fn test_get_outside_scope_is_absent() {
        assert_eq!(get::<String>(KEY), None);
        assert!(!set(KEY, "lost".to_string()));
        assert!(current().is_none());
    }

    #[tokio::test]
    async fn test_set_then_get_across_awaits() {
        let seen = bind_scope(async {
            assert!(set(KEY, 41u64));
            tokio::time::sleep(Duration::from_millis(1)).await;
            tokio::task::yield_now().await;
            get::<u64>(KEY)
        })
        .await;
        assert_eq!(seen, Some(41));
        assert_eq!(get::<u64>(KEY), None);
    }

    #[tokio::test]
    async fn test_type_mismatch_is_absent() {
        bind_scope(async {
            set(KEY, 1u32);
            assert_eq!(get::<String>(KEY), None);
        })
        .await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_interleaved_scopes_are_isolated() {
        let mut handles = Vec::new();
        for i in 0..50u64 {
            handles.push(tokio::spawn(bind_scope(async move {
                set(KEY, i);
                // Stagger wakeups so completions interleave.
                tokio::time::sleep(Duration::from_millis((50 - i) % 7)).await;
                tokio::task::yield_now().await;
                get::<u64>(KEY)
            })));
        }
        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap(), Some(i as u64));
        }
    }

    #[tokio::test]
    async fn test_spawn_carries_scope() {
        let inner = bind_scope(async {
            set(KEY, "outer".to_string());
            spawn(async {
                tokio::task::yield_now().await;
                get::<String>(KEY)
            })
            .await
            .unwrap()
        })
        .await;
        assert_eq!(inner.as_deref(), Some("outer"));
    }

    #[tokio::test]
    async fn test_bind_fn_gives_fresh_scope_per_call() {
        let handler = bind_fn(|v: u64| async move {
            let before = get::<u64>(KEY);
            set(KEY, v);
            (before, get::<u64>(KEY))
        });

        assert_eq!(handler(1).await, (None, Some(1)));
        assert_eq!(handler(2).await, (None, Some(2)));
    }

    #[test]
    fn test_enter_sync() {
        let scope = Scope::new();
        scope.insert(KEY, 9i32);
        assert_eq!(scope.clone().enter_sync(|| get::<i32>(KEY)), Some(9));
    }
}
