//! Typed listener registry for dispatching Artemis packets and connection events.
//!
//! Application code registers closures tagged with the argument type they
//! accept. Values are offered to every function whose declared type matches
//! the value's concrete type, or whose declared category contains it.
//!
//! ```
//! use ian_listener::{listener_argument, ArgumentCategory, ListenerRegistry};
//!
//! #[derive(Debug)]
//! struct Ping;
//! listener_argument!(Ping, ArgumentCategory::Packet);
//!
//! let registry = ListenerRegistry::new();
//! registry.on(|_: &Ping| println!("ping"));
//! assert_eq!(registry.fire(&Ping), 1);
//! ```

pub mod argument;
pub mod error;
pub mod function;
pub mod registry;

pub use argument::{ArgumentCategory, ListenerArgument};
pub use error::{ListenerError, Result};
pub use function::{ListenerFunction, ListenerKey};
pub use registry::{ListenerHandle, ListenerModule, ListenerRegistry};
