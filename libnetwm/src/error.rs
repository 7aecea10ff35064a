use std::error::Error as StdError;
use std::fmt;

/// `NetwmResult<T>` provides a simplified result type with a common error type
pub type NetwmResult<T> = std::result::Result<T, ErrorWrapper>;

/// NetwmError defines all the internal errors that `libnetwm` might return
///
/// Malformed or missing properties are never reported through this type. The codec treats
/// them as absent and the cached value falls back to its default.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum NetwmError {
    AtomsUnavailable,
    InvalidDesktop(String),
    InvalidDirection(u32),
    InvalidWinState(String),
    InvalidWinType(String),
    ManagerOnly(&'static str),
    NoPendingEvents,
    ObserverOnly(&'static str),
}
impl std::error::Error for NetwmError {}
impl fmt::Display for NetwmError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            NetwmError::AtomsUnavailable => write!(f, "display server did not resolve the protocol atoms"),
            NetwmError::InvalidDesktop(ref err) => write!(f, "invalid desktop was given: {}", err),
            NetwmError::InvalidDirection(ref err) => write!(f, "invalid move/resize direction was given: {}", err),
            NetwmError::InvalidWinState(ref err) => write!(f, "invalid state was given: {}", err),
            NetwmError::InvalidWinType(ref err) => write!(f, "invalid type was given: {}", err),
            NetwmError::ManagerOnly(ref op) => write!(f, "{} may only be used in the manager role", op),
            NetwmError::NoPendingEvents => write!(f, "no events are pending"),
            NetwmError::ObserverOnly(ref op) => write!(f, "{} may only be used in the observer role", op),
        }
    }
}

/// ErrorWrapper provides wrapper around all the underlying library dependencys that `libnetwm` uses
/// such that we can easily surface all errors from `libnetwm` in a single easy way.
#[derive(Debug)]
pub enum ErrorWrapper {
    Netwm(NetwmError),

    // x11rb errors
    Connect(x11rb::errors::ConnectError),
    Connection(x11rb::errors::ConnectionError),
    Reply(x11rb::errors::ReplyError),
}
impl ErrorWrapper {
    /// Implemented directly on the `Error` type to reduce casting required
    pub fn is<T: StdError + 'static>(&self) -> bool {
        self.as_ref().is::<T>()
    }

    /// Implemented directly on the `Error` type to reduce casting required
    pub fn downcast_ref<T: StdError + 'static>(&self) -> Option<&T> {
        self.as_ref().downcast_ref::<T>()
    }

    /// Implemented directly on the `Error` type to reduce casting required
    pub fn downcast_mut<T: StdError + 'static>(&mut self) -> Option<&mut T> {
        self.as_mut().downcast_mut::<T>()
    }

    /// Implemented directly on the `Error` type to reduce casting required
    /// which allows for using as_ref to get the correct pass through.
    pub fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.as_ref().source()
    }
}
impl StdError for ErrorWrapper {}

impl fmt::Display for ErrorWrapper {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ErrorWrapper::Netwm(ref err) => write!(f, "{}", err),
            ErrorWrapper::Connect(ref err) => write!(f, "{}", err),
            ErrorWrapper::Connection(ref err) => write!(f, "{}", err),
            ErrorWrapper::Reply(ref err) => write!(f, "{}", err),
        }
    }
}

impl AsRef<dyn StdError> for ErrorWrapper {
    fn as_ref(&self) -> &(dyn StdError + 'static) {
        match *self {
            ErrorWrapper::Netwm(ref err) => err,
            ErrorWrapper::Connect(ref err) => err,
            ErrorWrapper::Connection(ref err) => err,
            ErrorWrapper::Reply(ref err) => err,
        }
    }
}

impl AsMut<dyn StdError> for ErrorWrapper {
    fn as_mut(&mut self) -> &mut (dyn StdError + 'static) {
        match *self {
            ErrorWrapper::Netwm(ref mut err) => err,
            ErrorWrapper::Connect(ref mut err) => err,
            ErrorWrapper::Connection(ref mut err) => err,
            ErrorWrapper::Reply(ref mut err) => err,
        }
    }
}

impl From<NetwmError> for ErrorWrapper {
    fn from(err: NetwmError) -> ErrorWrapper {
        ErrorWrapper::Netwm(err)
    }
}

// x11rb errors
//--------------------------------------------------------------------------------------------------
impl From<x11rb::errors::ConnectError> for ErrorWrapper {
    fn from(err: x11rb::errors::ConnectError) -> ErrorWrapper {
        ErrorWrapper::Connect(err)
    }
}

impl From<x11rb::errors::ConnectionError> for ErrorWrapper {
    fn from(err: x11rb::errors::ConnectionError) -> ErrorWrapper {
        ErrorWrapper::Connection(err)
    }
}

impl From<x11rb::errors::ReplyError> for ErrorWrapper {
    fn from(err: x11rb::errors::ReplyError) -> ErrorWrapper {
        ErrorWrapper::Reply(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errors() {
        let err: ErrorWrapper = NetwmError::ManagerOnly("set_client_list").into();
        assert!(err.is::<NetwmError>());
        assert_eq!(err.downcast_ref::<NetwmError>(), Some(&NetwmError::ManagerOnly("set_client_list")));
        assert_eq!(err.to_string(), "set_client_list may only be used in the manager role");
    }
}
