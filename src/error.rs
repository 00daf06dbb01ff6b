use std::{fmt, io};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    Internal = 3,
    Usage = 4,
    // The consumer stopped pulling children (or the host interrupted a remote call). Never converted into a diagnostic.
    Cancelled = 5,
    // Target memory unreadable.
    MemoryAccess = 6,
    // Symbol or type not found.
    TypeResolution = 7,
    // Layout invariant violated, e.g. unknown slot state or null data pointer with nonzero size.
    Decode = 8,
    // Encoded synthetic payload failed to parse.
    RoundTrip = 9,
    // Remote call failed in the inspected process.
    Evaluation = 10,
    Sanity = 16,
    TooLong = 20,
    NotContainer = 28,
}

#[derive(Debug)]
pub enum ErrorEnum {
    IO(io::Error),
    Code(ErrorCode),
}

#[derive(Clone)]
pub struct Error {
    pub error: ErrorEnum,
    pub message: String,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn new(code: ErrorCode, message: String) -> Error {
        Error {error: ErrorEnum::Code(code), message}
    }

    pub fn code(&self) -> Option<ErrorCode> { match &self.error { ErrorEnum::Code(c) => Some(*c), _ => None } }

    pub fn is_cancelled(&self) -> bool { self.code() == Some(ErrorCode::Cancelled) }
    pub fn is_memory_access(&self) -> bool { self.code() == Some(ErrorCode::MemoryAccess) }
    pub fn is_type_resolution(&self) -> bool { self.code() == Some(ErrorCode::TypeResolution) }
    pub fn is_decode(&self) -> bool { self.code() == Some(ErrorCode::Decode) }
    pub fn is_round_trip(&self) -> bool { self.code() == Some(ErrorCode::RoundTrip) }
    pub fn is_evaluation(&self) -> bool { self.code() == Some(ErrorCode::Evaluation) }

    // Short category name shown in inline diagnostics, e.g. "<memory error: ...>".
    pub fn category(&self) -> &'static str {
        match &self.error {
            ErrorEnum::IO(_) => "io error",
            ErrorEnum::Code(ErrorCode::MemoryAccess) => "memory error",
            ErrorEnum::Code(ErrorCode::TypeResolution) => "type error",
            ErrorEnum::Code(ErrorCode::Decode) => "decode error",
            ErrorEnum::Code(ErrorCode::RoundTrip) => "encoding error",
            ErrorEnum::Code(ErrorCode::Evaluation) => "evaluation error",
            ErrorEnum::Code(ErrorCode::Cancelled) => "cancelled",
            ErrorEnum::Code(_) => "error",
        }
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        Error {error: ErrorEnum::IO(error), message: String::new()}
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(error: std::str::Utf8Error) -> Self {
        Error {error: ErrorEnum::Code(ErrorCode::Decode), message: format!("{}", error)}
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(error: std::string::FromUtf8Error) -> Self {
        Error {error: ErrorEnum::Code(ErrorCode::Decode), message: format!("{}", error)}
    }
}

impl From<std::fmt::Error> for Error {
    fn from(error: std::fmt::Error) -> Self {
        Error {error: ErrorEnum::Code(ErrorCode::Decode), message: format!("{}", error)}
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error {error: ErrorEnum::Code(ErrorCode::RoundTrip), message: format!("{}", error)}
    }
}

// For printing to log.
impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error {
            &ErrorEnum::Code(code) => write!(f, "{}: {}", code as i64, self.message),
            ErrorEnum::IO(error) => write!(f, "{}: {}", self.message, error),
        }
    }
}

// For showing to the user.
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error {
            &ErrorEnum::Code(_) => write!(f, "{}", self.message),
            ErrorEnum::IO(error) if self.message.is_empty() => write!(f, "{}", error),
            ErrorEnum::IO(error) => write!(f, "{}: {}", self.message, error),
        }
    }
}

impl Clone for ErrorEnum {
    fn clone(&self) -> Self {
        match self {
            Self::Code(c) => Self::Code(*c),
            Self::IO(e) => Self::IO(match e.raw_os_error() {
                Some(os) => io::Error::from_raw_os_error(os),
                None => e.kind().into(),
            }),
        }
    }
}

#[macro_export]
macro_rules! error {
    ($code:ident, $($arg:tt)*) => (
        $crate::error::Error {error: $crate::error::ErrorEnum::Code($crate::error::ErrorCode::$code), message: format!($($arg)*)}
    );
}

#[macro_export]
macro_rules! err {
    ($code:ident, $($arg:tt)*) => (
        Err($crate::error!($code, $($arg)*))
    );
}
