use std::{error::Error, fmt, io};

use ml_core::MlError;

/// The worker module's result type.
pub type Result<T> = std::result::Result<T, WorkerErr>;

/// Worker failures.
#[derive(Debug)]
pub enum WorkerErr {
    /// A local round failed, nothing was committed.
    Training {
        worker: usize,
        round: usize,
        source: MlError,
    },
    Ml(MlError),
    InvalidConfig(String),
    Io(io::Error),
    Parse(serde_json::Error),
}

impl WorkerErr {
    /// The numerical error behind this failure, if any.
    pub fn ml_error(&self) -> Option<&MlError> {
        match self {
            WorkerErr::Training { source, .. } | WorkerErr::Ml(source) => Some(source),
            _ => None,
        }
    }
}

impl fmt::Display for WorkerErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerErr::Training {
                worker,
                round,
                source,
            } => write!(f, "worker {worker} failed round {round}: {source}"),
            WorkerErr::Ml(e) => write!(f, "{e}"),
            WorkerErr::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            WorkerErr::Io(e) => write!(f, "io error: {e}"),
            WorkerErr::Parse(e) => write!(f, "parse error: {e}"),
        }
    }
}

impl Error for WorkerErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            WorkerErr::Training { source, .. } | WorkerErr::Ml(source) => Some(source),
            WorkerErr::Io(e) => Some(e),
            WorkerErr::Parse(e) => Some(e),
            WorkerErr::InvalidConfig(_) => None,
        }
    }
}

impl From<MlError> for WorkerErr {
    fn from(value: MlError) -> Self {
        Self::Ml(value)
    }
}

impl From<io::Error> for WorkerErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for WorkerErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<WorkerErr> for io::Error {
    fn from(value: WorkerErr) -> Self {
        match value {
            WorkerErr::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
