//! Structured, non-throwing results for credential forms.

use serde::{Deserialize, Serialize};

/// Per-field validation messages returned by credential actions.
///
/// Field names mirror the backend's `fieldErrors` object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldErrors {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub general: Option<String>,
}

impl FieldErrors {
    /// Only a general (form-level) message.
    pub fn general(message: impl Into<String>) -> Self {
        Self {
            general: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Failure of an action whose success carries no data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    /// Field-level validation failures.
    #[error("validation failed")]
    Fields(FieldErrors),
    /// A single message for the whole form.
    #[error("{0}")]
    Message(String),
}

/// Shape of a backend error body. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub field_errors: Option<FieldErrors>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ErrorBody {
    /// Parse a response body; non-JSON text becomes the message.
    pub(crate) fn parse(body: &str) -> Self {
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(parsed) => parsed,
            Err(_) => {
                let text = body.trim();
                Self {
                    message: (!text.is_empty()).then(|| text.to_string()),
                    ..Default::default()
                }
            }
        }
    }

    /// `message`, then `error`, then `fallback`.
    pub(crate) fn general_message(&self, fallback: &str) -> String {
        self.message
            .clone()
            .or_else(|| self.error.clone())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| fallback.to_string())
    }

    /// Field errors win; otherwise a general message.
    pub(crate) fn into_field_errors(self, fallback: &str) -> FieldErrors {
        match self.field_errors {
            Some(fields) if !fields.is_empty() => fields,
            _ => FieldErrors::general(self.general_message(fallback)),
        }
    }

    pub(crate) fn into_action_error(self, fallback: &str) -> ActionError {
        match self.field_errors {
            Some(fields) if !fields.is_empty() => ActionError::Fields(fields),
            _ => ActionError::Message(self.general_message(fallback)),
        }
    }
}
