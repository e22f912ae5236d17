use std::any::Any;
use std::fmt;

/// Broad family a listener argument belongs to.
///
/// A listener declared for a category receives every value in it, which is
/// how "any packet" or "any connection event" listeners are expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgumentCategory {
    /// Packets decoded from the wire.
    Packet,
    /// Lifecycle events raised by the connection itself.
    ConnectionEvent,
}

/// A value that can be dispatched to listeners.
///
/// Implement with [`listener_argument!`](crate::listener_argument).
pub trait ListenerArgument: Any + Send + Sync + fmt::Debug {
    /// The category this value is dispatched under.
    fn category(&self) -> ArgumentCategory;

    /// Upcast for downcasting to the concrete type.
    fn as_any(&self) -> &dyn Any;
}

/// Implement [`ListenerArgument`] for a type in the given category.
#[macro_export]
macro_rules! listener_argument {
    ($ty:ty, $category:expr) => {
        impl $crate::ListenerArgument for $ty {
            fn category(&self) -> $crate::ArgumentCategory {
                $category
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }
        }
    };
}
