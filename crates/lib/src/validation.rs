//! Field-level validation errors shared by the relay and the conversation store.

use serde::Serialize;

/// One violated field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldIssue {
    pub field: String,
    pub message: String,
}

/// Caller input that failed validation; lists every offending field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("invalid request: {}", field_list(.issues))]
pub struct ValidationError {
    pub issues: Vec<FieldIssue>,
}

impl ValidationError {
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut err = Self::default();
        err.push(field, message);
        err
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.issues.push(FieldIssue {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Names of the offending fields, in the order they were found.
    pub fn fields(&self) -> Vec<&str> {
        self.issues.iter().map(|i| i.field.as_str()).collect()
    }

    /// `Ok(value())` when no issue was recorded, otherwise `Err(self)`.
    pub fn into_result<T>(self, value: impl FnOnce() -> T) -> Result<T, ValidationError> {
        if self.is_empty() {
            Ok(value())
        } else {
            Err(self)
        }
    }
}

fn field_list(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(|i| i.field.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_lists_fields() {
        let mut err = ValidationError::single("url", "url is required");
        err.push("method", "unsupported");
        assert_eq!(err.to_string(), "invalid request: url, method");
        assert_eq!(err.fields(), vec!["url", "method"]);
    }

    #[test]
    fn empty_error_is_ok() {
        assert_eq!(ValidationError::default().into_result(|| 7), Ok(7));
        assert!(ValidationError::single("a", "b").into_result(|| ()).is_err());
    }
}
