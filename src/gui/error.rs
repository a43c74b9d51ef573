use std::{borrow::Cow, error::Error, fmt, io, path::PathBuf, sync::mpsc};

#[derive(Debug)]
pub enum RangingGuiError {
    IOError(io::Error),

    /// Returned when a directory of traces cannot be listed.
    DirectoryUnreadable { dir: PathBuf, error: io::Error },

    MPSCRecvError(mpsc::RecvError),
    /// The worker thread panicked
    JoinError,
}

impl fmt::Display for RangingGuiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            RangingGuiError::IOError(error) => Cow::from(format!("terminal error: {}", error)),
            RangingGuiError::DirectoryUnreadable { dir, error } => Cow::from(format!(
                "cannot list traces in '{}': {}",
                dir.display(),
                error
            )),
            RangingGuiError::MPSCRecvError(error) => {
                Cow::from(format!("worker channel closed: {}", error))
            }
            RangingGuiError::JoinError => Cow::from("worker thread panicked"),
        };

        write!(f, "{}", msg)
    }
}

impl Error for RangingGuiError {}

impl From<io::Error> for RangingGuiError {
    fn from(value: io::Error) -> Self {
        Self::IOError(value)
    }
}

impl From<mpsc::RecvError> for RangingGuiError {
    fn from(value: mpsc::RecvError) -> Self {
        Self::MPSCRecvError(value)
    }
}
