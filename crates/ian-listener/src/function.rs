use std::any::{type_name, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::argument::{ArgumentCategory, ListenerArgument};

type Callback = Arc<dyn Fn(&dyn ListenerArgument) + Send + Sync>;

/// What a listener function declared it accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKey {
    /// Exactly one concrete argument type.
    Type(TypeId),
    /// Every argument in a category.
    Category(ArgumentCategory),
}

/// A single-argument callback bound to the argument type it accepts.
#[derive(Clone)]
pub struct ListenerFunction {
    key: ListenerKey,
    argument: &'static str,
    callback: Callback,
}

impl ListenerFunction {
    /// Bind a callback to the concrete argument type `T`.
    pub fn new<T, F>(callback: F) -> Self
    where
        T: ListenerArgument,
        F: Fn(&T) + Send + Sync + 'static,
    {
        Self {
            key: ListenerKey::Type(TypeId::of::<T>()),
            argument: type_name::<T>(),
            callback: Arc::new(move |value: &dyn ListenerArgument| {
                if let Some(value) = value.as_any().downcast_ref::<T>() {
                    callback(value);
                }
            }),
        }
    }

    /// Bind a callback to every argument in `category`.
    pub fn for_category<F>(category: ArgumentCategory, callback: F) -> Self
    where
        F: Fn(&dyn ListenerArgument) + Send + Sync + 'static,
    {
        let argument = match category {
            ArgumentCategory::Packet => "<any packet>",
            ArgumentCategory::ConnectionEvent => "<any connection event>",
        };
        Self {
            key: ListenerKey::Category(category),
            argument,
            callback: Arc::new(callback),
        }
    }

    /// The declared argument key.
    pub fn key(&self) -> ListenerKey {
        self.key
    }

    /// Name of the declared argument type, for diagnostics.
    pub fn argument_name(&self) -> &'static str {
        self.argument
    }

    /// Whether a value of `type_id` in `category` would be accepted.
    pub fn accepts(&self, type_id: TypeId, category: ArgumentCategory) -> bool {
        match self.key {
            ListenerKey::Type(declared) => declared == type_id,
            ListenerKey::Category(declared) => declared == category,
        }
    }

    /// Invoke the callback if it accepts `value`. Returns whether it ran.
    pub fn offer(&self, value: &dyn ListenerArgument) -> bool {
        if !self.accepts(value.as_any().type_id(), value.category()) {
            return false;
        }
        (self.callback)(value);
        true
    }
}

impl fmt::Debug for ListenerFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerFunction")
            .field("argument", &self.argument)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::listener_argument;

    #[derive(Debug)]
    struct Alpha(u32);
    listener_argument!(Alpha, ArgumentCategory::Packet);

    #[derive(Debug)]
    struct Beta;
    listener_argument!(Beta, ArgumentCategory::Packet);

    #[derive(Debug)]
    struct Lost;
    listener_argument!(Lost, ArgumentCategory::ConnectionEvent);

    #[test]
    fn typed_function_only_accepts_its_type() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let function = ListenerFunction::new(move |alpha: &Alpha| {
            counter.fetch_add(alpha.0 as usize, Ordering::SeqCst);
        });

        assert!(function.offer(&Alpha(7)));
        assert!(!function.offer(&Beta));
        assert!(!function.offer(&Lost));
        assert_eq!(seen.load(Ordering::SeqCst), 7);
        assert_eq!(function.key(), ListenerKey::Type(TypeId::of::<Alpha>()));
        assert!(function.argument_name().ends_with("Alpha"));
    }

    #[test]
    fn category_function_accepts_every_member() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let function = ListenerFunction::for_category(ArgumentCategory::Packet, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(function.offer(&Alpha(1)));
        assert!(function.offer(&Beta));
        assert!(!function.offer(&Lost));
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn accepts_checks_without_a_value() {
        let function = ListenerFunction::new(|_: &Beta| {});
        assert!(function.accepts(TypeId::of::<Beta>(), ArgumentCategory::Packet));
        assert!(!function.accepts(TypeId::of::<Alpha>(), ArgumentCategory::Packet));
    }
}
