/// Errors raised while registering listeners.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListenerError {
    /// The owner produced no listener functions.
    #[error("{0} declares no listener functions")]
    NoListeners(&'static str),

    /// The same owner instance is already registered.
    #[error("{0} is already registered")]
    AlreadyRegistered(&'static str),
}

pub type Result<T> = std::result::Result<T, ListenerError>;
