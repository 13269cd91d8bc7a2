use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input: bad JSON shape, unknown enum value, missing field.
    InvalidValue,
    /// Operation requires a handle in a different state.
    InvalidState,
    /// OS-level failure; carries the raw errno when available.
    System,
    /// Bad serialisation in a wire-format value stream.
    Network,
    /// Mutex, condition or thread-start failure.
    Thread,
    /// Failure inside the embedded index engine.
    Engine,
    OutOfMemory,
}

#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
    pub errno: Option<i32>,
}

impl Error {
    pub fn new(kind: ErrorKind, context: impl Into<String>) -> Self {
        Error {
            kind,
            context: context.into(),
            errno: None,
        }
    }

    pub fn invalid_value(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::InvalidValue, context)
    }

    pub fn invalid_state(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::InvalidState, context)
    }

    pub fn sys(context: impl Into<String>, errno: Option<i32>) -> Self {
        Error {
            kind: ErrorKind::System,
            context: context.into(),
            errno,
        }
    }

    pub fn network(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Network, context)
    }

    pub fn engine(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Engine, context)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.errno {
            Some(e) => write!(f, "{:?}: {} (errno {})", self.kind, self.context, e),
            None => write!(f, "{:?}: {}", self.kind, self.context),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error {
            kind: ErrorKind::System,
            context: err.to_string(),
            errno: err.raw_os_error(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::new(ErrorKind::InvalidValue, err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::new(ErrorKind::Engine, format!("record codec: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
