use backtrace::Backtrace;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::result::Result;
use std::sync::Arc;

/// Error kinds for index operations.
///
/// `NotFound` and `AlreadyExists` are recoverable and expected during
/// normal operation. `Corruption` means the on-disk structure no longer
/// matches what the engine wrote and needs an operator.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrorKind {
    /// The requested index entry, value directory or backlink does not exist
    NotFound,
    /// A uniqueness or rename-target constraint was violated
    AlreadyExists,
    /// A path exists but is of the wrong kind (symlink vs file vs directory)
    Corruption,
    /// An index was initialized before its entity directory existed
    Precondition,
    /// A value, primary key or pattern that cannot be used as a path component
    InvalidValue,
    /// A directory entry name is not valid UTF-8
    EncodingError,
    /// Permission denied by the filesystem
    PermissionDenied,
    /// Any other filesystem failure
    IOError,
    /// Internal error (usually indicates a bug)
    InternalError,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::NotFound => write!(f, "Not found"),
            ErrorKind::AlreadyExists => write!(f, "Already exists"),
            ErrorKind::Corruption => write!(f, "Index corrupted"),
            ErrorKind::Precondition => write!(f, "Precondition failed"),
            ErrorKind::InvalidValue => write!(f, "Invalid value"),
            ErrorKind::EncodingError => write!(f, "Encoding error"),
            ErrorKind::PermissionDenied => write!(f, "Permission denied"),
            ErrorKind::IOError => write!(f, "IO error"),
            ErrorKind::InternalError => write!(f, "Internal error"),
        }
    }
}

/// Identifies the index entry an error refers to.
///
/// `value` holds the attribute value for unique and normal indices and the
/// primary key for backlink errors (where `index_by` is [`PRIMARY_MARKER`]).
///
/// [`PRIMARY_MARKER`]: crate::common::PRIMARY_MARKER
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct EntryRef {
    pub type_name: String,
    pub index_by: String,
    pub value: String,
}

impl EntryRef {
    pub fn new(type_name: &str, index_by: &str, value: &str) -> Self {
        EntryRef {
            type_name: type_name.to_string(),
            index_by: index_by.to_string(),
            value: value.to_string(),
        }
    }
}

impl Display for EntryRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}={}", self.type_name, self.index_by, self.value)
    }
}

/// Error type of every fallible index operation.
///
/// Carries a message, an [`ErrorKind`], the entry it concerns (for
/// `NotFound`, `AlreadyExists` and `Corruption`) and an optional cause.
/// An unresolved backtrace is captured on creation and resolved only when
/// the error is printed with `{:?}`.
///
/// # Examples
///
/// ```rust
/// use linkdex::errors::{ErrorKind, IndexError};
///
/// let err = IndexError::not_found("User", "Email", "nobody@example.com");
/// assert!(err.is_not_found());
/// assert_eq!(err.kind(), &ErrorKind::NotFound);
/// assert_eq!(err.entry().unwrap().value, "nobody@example.com");
/// ```
#[derive(Clone)]
pub struct IndexError {
    message: String,
    error_kind: ErrorKind,
    entry: Option<EntryRef>,
    cause: Option<Box<IndexError>>,
    io_error: Option<Arc<std::io::Error>>,
    backtrace: Arc<Backtrace>,
}

impl IndexError {
    /// Creates a new `IndexError` with the specified message and error kind.
    pub fn new(message: &str, error_kind: ErrorKind) -> Self {
        IndexError {
            message: message.to_string(),
            error_kind,
            entry: None,
            cause: None,
            io_error: None,
            backtrace: Arc::new(Backtrace::new_unresolved()),
        }
    }

    /// Creates a new `IndexError` wrapping a cause.
    pub fn new_with_cause(message: &str, error_kind: ErrorKind, cause: IndexError) -> Self {
        IndexError {
            message: message.to_string(),
            error_kind,
            entry: None,
            cause: Some(Box::new(cause)),
            io_error: None,
            backtrace: Arc::new(Backtrace::new_unresolved()),
        }
    }

    pub fn not_found(type_name: &str, index_by: &str, value: &str) -> Self {
        IndexError::new(
            &format!("{}.{} has no entry for '{}'", type_name, index_by, value),
            ErrorKind::NotFound,
        )
        .with_entry(EntryRef::new(type_name, index_by, value))
    }

    pub fn already_exists(type_name: &str, index_by: &str, value: &str) -> Self {
        IndexError::new(
            &format!("{}.{} already has an entry for '{}'", type_name, index_by, value),
            ErrorKind::AlreadyExists,
        )
        .with_entry(EntryRef::new(type_name, index_by, value))
    }

    pub fn corruption(message: &str) -> Self {
        IndexError::new(message, ErrorKind::Corruption)
    }

    pub fn invalid_value(message: &str) -> Self {
        IndexError::new(message, ErrorKind::InvalidValue)
    }

    /// Attaches the entry the error refers to.
    pub fn with_entry(mut self, entry: EntryRef) -> Self {
        self.entry = Some(entry);
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.error_kind
    }

    pub fn entry(&self) -> Option<&EntryRef> {
        self.entry.as_ref()
    }

    pub fn cause(&self) -> Option<&IndexError> {
        self.cause.as_deref()
    }

    pub fn is_not_found(&self) -> bool {
        self.error_kind == ErrorKind::NotFound
    }

    pub fn is_already_exists(&self) -> bool {
        self.error_kind == ErrorKind::AlreadyExists
    }

    pub fn is_corruption(&self) -> bool {
        self.error_kind == ErrorKind::Corruption
    }
}

impl Display for IndexError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Debug for IndexError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{}\nCaused by: {:?}", self.message, cause),
            None => {
                let mut backtrace = (*self.backtrace).clone();
                backtrace.resolve();
                write!(f, "{}\n{:?}", self.message, backtrace)
            }
        }
    }
}

impl Error for IndexError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match (&self.cause, &self.io_error) {
            (Some(cause), _) => Some(cause.as_ref()),
            (None, Some(io_error)) => Some(&**io_error),
            (None, None) => None,
        }
    }
}

/// Shorthand for `Result<T, IndexError>`.
pub type IndexResult<T> = Result<T, IndexError>;

impl From<std::io::Error> for IndexError {
    fn from(err: std::io::Error) -> Self {
        let error_kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            std::io::ErrorKind::AlreadyExists => ErrorKind::AlreadyExists,
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            _ => ErrorKind::IOError,
        };
        let mut error = IndexError::new(&format!("IO error: {}", err), error_kind);
        error.io_error = Some(Arc::new(err));
        error
    }
}

impl From<regex::Error> for IndexError {
    fn from(err: regex::Error) -> Self {
        IndexError::new(&format!("Invalid search pattern: {}", err), ErrorKind::InvalidValue)
    }
}

impl From<String> for IndexError {
    fn from(msg: String) -> Self {
        IndexError::new(&msg, ErrorKind::InternalError)
    }
}

impl From<&str> for IndexError {
    fn from(msg: &str) -> Self {
        IndexError::new(msg, ErrorKind::InternalError)
    }
}
