use std::{error::Error, fmt};

/// Convenience type for a result that may contain a `FuseConfigError`.
pub type FuseConfigResult<T> = std::result::Result<T, FuseConfigError>;

/// The category of a `FuseConfigError`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ErrorKind {
  /// The descriptor file could not be opened or is not well-formed XML.
  DocumentLoadFailure,

  /// A path expression could not be parsed or uses an unbound namespace prefix.
  QueryFailure,

  /// The target region was not found, or was found more than once.
  AmbiguousOrMissingRegion,

  /// A required descriptor attribute is missing or is not an integer literal.
  MalformedAttribute,

  /// A register's bit width is not a whole number of bytes.
  MalformedRegisterWidth,

  /// A register's mode list is missing, duplicated, or describes too many bits.
  MalformedModeList,

  /// A setting was requested before any descriptor was loaded.
  ConfigurationsNotLoaded,

  /// No field with the requested name exists.
  UnknownSetting,

  /// The field is reserved padding.
  NotWritable,

  /// The field was already set during this session.
  AlreadySet,

  /// The value is not a reference name or an in-range number for the field.
  InvalidValue,
}
impl ErrorKind {
  /// Whether errors of this kind leave the session without a usable model.
  pub fn is_fatal(&self) -> bool {
    match self {
      ErrorKind::DocumentLoadFailure
      | ErrorKind::QueryFailure
      | ErrorKind::AmbiguousOrMissingRegion
      | ErrorKind::MalformedAttribute
      | ErrorKind::MalformedRegisterWidth
      | ErrorKind::MalformedModeList => true,
      _ => false,
    }
  }
}

/// Error struct for all errors thrown by this crate or the crates on which it depends.
#[derive(Debug)]
pub struct FuseConfigError {
  /// What went wrong, broadly.
  pub kind: ErrorKind,

  /// Description of the error that occurred.
  pub details: String,
}
impl FuseConfigError {
  pub(crate) fn new(kind: ErrorKind, msg: &str) -> FuseConfigError {
    Self {
      kind,
      details: msg.to_string(),
    }
  }
}
impl fmt::Display for FuseConfigError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}", self.details)
  }
}
impl Error for FuseConfigError {}
impl From<std::io::Error> for FuseConfigError {
  fn from(err: std::io::Error) -> Self {
    FuseConfigError::new(
      ErrorKind::DocumentLoadFailure,
      &format!("std::io::Error {}", &err.to_string()),
    )
  }
}
impl From<xmltree::ParseError> for FuseConfigError {
  fn from(err: xmltree::ParseError) -> Self {
    FuseConfigError::new(
      ErrorKind::DocumentLoadFailure,
      &format!("xmltree::ParseError {:?}", err),
    )
  }
}
impl From<regex::Error> for FuseConfigError {
  fn from(err: regex::Error) -> Self {
    FuseConfigError::new(ErrorKind::QueryFailure, &format!("regex::Error {:?}", err))
  }
}

#[cfg(test)]
mod tests {
  use super::{ErrorKind, FuseConfigError};

  #[test]
  fn io_errors_are_load_failures() {
    let err: FuseConfigError =
      std::io::Error::new(std::io::ErrorKind::NotFound, "missing.atdf").into();

    assert_eq!(ErrorKind::DocumentLoadFailure, err.kind);
    assert!(err.details.contains("missing.atdf"));
  }

  #[test]
  fn only_compilation_errors_are_fatal() {
    assert!(ErrorKind::AmbiguousOrMissingRegion.is_fatal());
    assert!(ErrorKind::MalformedModeList.is_fatal());
    assert!(!ErrorKind::UnknownSetting.is_fatal());
    assert!(!ErrorKind::AlreadySet.is_fatal());
    assert!(!ErrorKind::InvalidValue.is_fatal());
  }
}
