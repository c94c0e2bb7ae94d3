use std::{fmt, path::PathBuf};
use tonic::Status;
use tracing::{field, Span};

pub(crate) trait Record: Sized {
  fn record_field(self, field: &'static str) -> Self;

  #[inline]
  fn record_request(self) -> Self {
    self.record_field("request")
  }

  #[inline]
  fn record_response(self) -> Self {
    self.record_field("response")
  }
}

impl<T: fmt::Debug> Record for T {
  #[inline]
  fn record_field(self, field: &'static str) -> Self {
    Span::current().record(field, &field::debug(&self));
    self
  }
}

#[inline]
pub(crate) fn record_request<T: fmt::Debug>(request: T) -> T {
  request.record_request()
}

/// Rejects empty strings for REQUIRED fields.
pub(crate) fn required(value: String, field: &'static str) -> Result<String, Status> {
  if value.is_empty() {
    Err(Status::invalid_argument(format!("{} is empty", field)))
  } else {
    Ok(value)
  }
}

/// Paths must be absolute in the root filesystem of the plugin.
pub(crate) fn optional_path(value: String, field: &'static str) -> Result<Option<PathBuf>, Status> {
  if value.is_empty() {
    return Ok(None);
  }

  match PathBuf::from(value) {
    v if !v.is_absolute() => Err(Status::invalid_argument(format!(
      "{} is not absolute",
      field
    ))),
    v => Ok(Some(v)),
  }
}

pub(crate) fn required_path(value: String, field: &'static str) -> Result<PathBuf, Status> {
  optional_path(value, field)?
    .ok_or_else(|| Status::invalid_argument(format!("{} is empty", field)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use test_case::test_case;
  use tonic::Code;

  #[test_case("", Some(Code::InvalidArgument) ; "empty")]
  #[test_case("relative/path", Some(Code::InvalidArgument) ; "relative")]
  #[test_case("/var/lib/kubelet/staging", None ; "absolute")]
  fn required_path_validation(value: &str, expected: Option<Code>) {
    let result = required_path(value.to_owned(), "Request.path");

    match expected {
      None => assert_eq!(result.unwrap(), PathBuf::from(value)),
      Some(code) => {
        let status = result.unwrap_err();
        assert_eq!(status.code(), code);
        assert!(status.message().starts_with("Request.path"));
      }
    }
  }

  #[test]
  fn optional_path_allows_empty() {
    assert_eq!(optional_path(String::new(), "Request.path").unwrap(), None);
  }
}
