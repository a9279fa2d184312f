use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;

#[derive(Debug)]
pub enum ExtenderError {
    /// The extender (or one of its inputs) was configured inconsistently
    Configuration(ConfigurationError),

    /// The device allocator could not satisfy a request
    Allocation { requested: usize, available: usize },

    /// Work scheduled on a compute stream failed, surfaced at synchronization
    Synchronization(SyncFault),

    /// The compute stream worker or its thread pool could not be started
    StreamCreation(String),

    /// A line in a seed pair file could not be parsed
    SeedParse { line: usize, message: String },

    /// A sequence file did not contain a usable sequence
    InvalidSequence(String),

    /// Error variant when an extender configuration file could not be parsed
    ConfigParse(serde_json::Error),

    /// Other IO errors
    IOError(io::Error),
}

/// Reasons an extender configuration or invocation is rejected before any work is scheduled.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    /// The number of score table entries is not the square of the alphabet size
    ScoreTableSize { expected: usize, actual: usize },

    AlphabetSize(i32),

    XDropThreshold(i32),

    DeviceId(i32),

    /// The allocator hands out memory on a different device than the one requested
    DeviceMismatch { allocator: i32, requested: i32 },

    EntropySaturation(f64),

    /// A caller provided buffer is too small for the requested operation
    InsufficientBuffer { name: &'static str, required: usize, capacity: usize },
}

/// Faults raised by work on a compute stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncFault {
    WorkFailed(String),
    WorkPanicked(String),
    StreamClosed,
    Timeout,
}

impl Error for ExtenderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match *self {
            Self::ConfigParse(ref source) => Some(source),
            Self::IOError(ref source) => Some(source),
            _ => None
        }
    }
}

impl From<ConfigurationError> for ExtenderError {
    fn from(value: ConfigurationError) -> Self {
        Self::Configuration(value)
    }
}

impl From<SyncFault> for ExtenderError {
    fn from(value: SyncFault) -> Self {
        Self::Synchronization(value)
    }
}

impl From<io::Error> for ExtenderError {
    fn from(value: io::Error) -> Self {
        Self::IOError(value)
    }
}

impl From<serde_json::Error> for ExtenderError {
    fn from(value: serde_json::Error) -> Self {
        Self::ConfigParse(value)
    }
}

impl Display for ConfigurationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::ScoreTableSize { expected, actual } =>
                write!(f, "The score table has {actual} entries, but the alphabet size requires {expected}!"),
            Self::AlphabetSize(size) =>
                write!(f, "Invalid alphabet size {size}, should be positive."),
            Self::XDropThreshold(xdrop) =>
                write!(f, "Invalid X-drop threshold {xdrop}, should be positive."),
            Self::DeviceId(id) =>
                write!(f, "Invalid device id {id}."),
            Self::DeviceMismatch { allocator, requested } =>
                write!(f, "The allocator belongs to device {allocator}, but the extender was bound to device {requested}!"),
            Self::EntropySaturation(bits) =>
                write!(f, "Invalid entropy saturation {bits} bits, should be finite and positive."),
            Self::InsufficientBuffer { name, required, capacity } =>
                write!(f, "Buffer '{name}' holds {capacity} entries, but {required} are required!"),
        }
    }
}

impl Display for SyncFault {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WorkFailed(msg) => write!(f, "stream work failed: {msg}"),
            Self::WorkPanicked(msg) => write!(f, "stream work panicked: {msg}"),
            Self::StreamClosed => write!(f, "the compute stream is no longer running"),
            Self::Timeout => write!(f, "timed out waiting for the compute stream"),
        }
    }
}

impl Display for ExtenderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Configuration(ref err) =>
                write!(f, "Invalid configuration: {err}"),
            Self::Allocation { requested, available } =>
                write!(f, "Could not allocate {requested} bytes of device memory ({available} bytes available)!"),
            Self::Synchronization(ref fault) =>
                write!(f, "Synchronization failed, {fault}."),
            Self::StreamCreation(ref msg) =>
                write!(f, "Could not create compute stream: {msg}"),
            Self::SeedParse { line, ref message } =>
                write!(f, "Could not parse seed pair on line {line}: {message}"),
            Self::InvalidSequence(ref msg) =>
                write!(f, "Invalid sequence input: {msg}"),
            Self::ConfigParse(_) =>
                write!(f, "Could not parse the extender configuration!"),
            Self::IOError(ref err) =>
                err.fmt(f),
        }
    }
}
