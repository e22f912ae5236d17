use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use tracing::{debug, trace};

use crate::argument::{ArgumentCategory, ListenerArgument};
use crate::error::{ListenerError, Result};
use crate::function::ListenerFunction;

/// Identifies one registration so it can be removed later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

/// An owner that contributes listener functions to a registry.
///
/// Functions usually capture a clone of the owner's `Arc` so the owner stays
/// alive for as long as it is registered.
pub trait ListenerModule: Send + Sync + 'static {
    /// The listener functions this owner declares.
    fn listener_functions(self: Arc<Self>) -> Vec<ListenerFunction>;
}

#[derive(Clone)]
struct Entry {
    handle: ListenerHandle,
    owner: Option<OwnerRef>,
    function: ListenerFunction,
}

#[derive(Clone)]
struct OwnerRef {
    addr: usize,
    _keep_alive: Arc<dyn Any + Send + Sync>,
}

struct Inner {
    entries: ArcSwap<Vec<Entry>>,
    // Serializes writers; readers only load the current snapshot.
    write_lock: Mutex<()>,
    next_handle: AtomicU64,
}

/// Copy-on-write registry of listener functions.
///
/// Dispatch iterates an immutable snapshot, so listeners may register or
/// remove other listeners from inside a callback. Cloning the registry
/// yields another handle to the same set.
#[derive(Clone)]
pub struct ListenerRegistry {
    inner: Arc<Inner>,
}

impl ListenerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: ArcSwap::from_pointee(Vec::new()),
                write_lock: Mutex::new(()),
                next_handle: AtomicU64::new(1),
            }),
        }
    }

    /// Register every listener function declared by `owner`.
    ///
    /// Fails if the owner declares nothing or this owner instance is already
    /// registered.
    pub fn register<O: ListenerModule>(&self, owner: Arc<O>) -> Result<ListenerHandle> {
        let name = type_name::<O>();
        let addr = Arc::as_ptr(&owner) as *const () as usize;
        let _guard = self.lock_writers();

        if self
            .inner
            .entries
            .load()
            .iter()
            .any(|entry| entry.owner.as_ref().is_some_and(|o| o.addr == addr))
        {
            return Err(ListenerError::AlreadyRegistered(name));
        }

        let functions = Arc::clone(&owner).listener_functions();
        if functions.is_empty() {
            return Err(ListenerError::NoListeners(name));
        }

        let handle = self.next_handle();
        let keep_alive: Arc<dyn Any + Send + Sync> = owner;
        let owner = OwnerRef {
            addr,
            _keep_alive: keep_alive,
        };
        debug!(owner = name, count = functions.len(), "registering listeners");

        let mut next = Vec::clone(&self.inner.entries.load());
        next.extend(functions.into_iter().map(|function| Entry {
            handle,
            owner: Some(owner.clone()),
            function,
        }));
        self.inner.entries.store(Arc::new(next));
        Ok(handle)
    }

    /// Register a single function without an owner.
    pub fn add(&self, function: ListenerFunction) -> ListenerHandle {
        let _guard = self.lock_writers();
        let handle = self.next_handle();
        let mut next = Vec::clone(&self.inner.entries.load());
        next.push(Entry {
            handle,
            owner: None,
            function,
        });
        self.inner.entries.store(Arc::new(next));
        handle
    }

    /// Register a closure for the concrete argument type `T`.
    pub fn on<T, F>(&self, callback: F) -> ListenerHandle
    where
        T: ListenerArgument,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.add(ListenerFunction::new(callback))
    }

    /// Register a closure for every argument in `category`.
    pub fn on_category<F>(&self, category: ArgumentCategory, callback: F) -> ListenerHandle
    where
        F: Fn(&dyn ListenerArgument) + Send + Sync + 'static,
    {
        self.add(ListenerFunction::for_category(category, callback))
    }

    /// Remove every function registered under `handle`.
    ///
    /// Returns `false` if nothing was registered under it.
    pub fn unregister(&self, handle: ListenerHandle) -> bool {
        let _guard = self.lock_writers();
        let current = self.inner.entries.load();
        let next: Vec<Entry> = current
            .iter()
            .filter(|entry| entry.handle != handle)
            .cloned()
            .collect();
        let removed = next.len() != current.len();
        if removed {
            self.inner.entries.store(Arc::new(next));
        }
        removed
    }

    /// Remove every registration.
    pub fn clear(&self) {
        let _guard = self.lock_writers();
        self.inner.entries.store(Arc::new(Vec::new()));
    }

    /// Functions that accept a value of `type_id` in `category`.
    pub fn listening_for(&self, type_id: TypeId, category: ArgumentCategory) -> Vec<ListenerFunction> {
        self.inner
            .entries
            .load()
            .iter()
            .filter(|entry| entry.function.accepts(type_id, category))
            .map(|entry| entry.function.clone())
            .collect()
    }

    /// Whether any function accepts a value of `type_id` in `category`.
    pub fn is_listening_for(&self, type_id: TypeId, category: ArgumentCategory) -> bool {
        self.inner
            .entries
            .load()
            .iter()
            .any(|entry| entry.function.accepts(type_id, category))
    }

    /// Offer `value` to every matching function, returning how many ran.
    ///
    /// A panicking listener propagates to the caller.
    pub fn fire(&self, value: &dyn ListenerArgument) -> usize {
        let snapshot = self.inner.entries.load_full();
        let fired = snapshot
            .iter()
            .filter(|entry| entry.function.offer(value))
            .count();
        trace!(?value, fired, "dispatched to listeners");
        fired
    }

    /// Number of registered functions.
    pub fn len(&self) -> usize {
        self.inner.entries.load().len()
    }

    /// Whether no functions are registered.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.load().is_empty()
    }

    fn next_handle(&self) -> ListenerHandle {
        ListenerHandle(self.inner.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    fn lock_writers(&self) -> std::sync::MutexGuard<'_, ()> {
        self.inner
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.inner.entries.load();
        f.debug_struct("ListenerRegistry")
            .field(
                "functions",
                &entries
                    .iter()
                    .map(|entry| entry.function.argument_name())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}
