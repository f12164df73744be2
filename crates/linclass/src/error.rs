use std::error::Error;
use std::fmt;
use std::io;

/// Error type shared by every stage of reading, training and evaluation.
#[derive(Debug)]
pub enum ClassifierError {
    /// Malformed training data; `line` is 1-based (0 when not tied to a line).
    InvalidData { line: usize, message: String },
    /// An interned id past the end of the table.
    OutOfRange { id: usize, size: usize },
    UnknownAlgorithm(String),
    UnknownTask(String),
    InvalidParameter { name: String, value: String },
    /// A training instance that cannot contribute to the expectations.
    DegenerateInstance { index: usize, reason: String },
    /// The dataset was used for training before `finalize` was called.
    NotFinalized,
    ModelFormat { line: usize, message: String },
    Io(io::Error),
}

impl fmt::Display for ClassifierError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ClassifierError::InvalidData { line, message } => {
                if *line > 0 {
                    write!(f, "in line {}, {}", line, message)
                } else {
                    write!(f, "{}", message)
                }
            }
            ClassifierError::OutOfRange { id, size } => {
                write!(f, "id {} is out of range for a table of {} items", id, size)
            }
            ClassifierError::UnknownAlgorithm(name) => {
                write!(f, "unknown training algorithm specified: {}", name)
            }
            ClassifierError::UnknownTask(name) => write!(f, "unknown task type specified: {}", name),
            ClassifierError::InvalidParameter { name, value } => {
                write!(f, "invalid value '{}' for parameter '{}'", value, name)
            }
            ClassifierError::DegenerateInstance { index, reason } => {
                write!(f, "instance #{} cannot be used for training: {}", index, reason)
            }
            ClassifierError::NotFinalized => write!(f, "the dataset has not been finalized"),
            ClassifierError::ModelFormat { line, message } => {
                write!(f, "model file, line {}: {}", line, message)
            }
            ClassifierError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl Error for ClassifierError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ClassifierError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ClassifierError {
    fn from(err: io::Error) -> Self {
        ClassifierError::Io(err)
    }
}

impl From<csv::Error> for ClassifierError {
    fn from(err: csv::Error) -> Self {
        let line = err.position().map(|p| p.line() as usize).unwrap_or(0);
        if err.is_io_error() {
            match err.into_kind() {
                csv::ErrorKind::Io(io_err) => ClassifierError::Io(io_err),
                other => ClassifierError::InvalidData {
                    line,
                    message: format!("{:?}", other),
                },
            }
        } else {
            ClassifierError::InvalidData {
                line,
                message: err.to_string(),
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, ClassifierError>;
