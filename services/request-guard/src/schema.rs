// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Request body schema validation.
//!
//! A schema is a deserializable type plus an optional [`Validate`] impl for
//! rules serde cannot express. Type errors carry the JSON path at which they
//! occurred.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

/// A single field-level problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldIssue {
    /// JSON path of the offending value, `.` for the document root
    pub path: String,
    pub message: String,
}

impl FieldIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Semantic checks run after a body deserializes.
pub trait Validate {
    fn validate(&self) -> Result<(), Vec<FieldIssue>> {
        Ok(())
    }
}

/// Deserialize `body` as `T` and run its semantic checks.
pub fn parse_json<T>(body: &[u8]) -> Result<T, Vec<FieldIssue>>
where
    T: DeserializeOwned + Validate,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(vec![FieldIssue::new(".", "request body is empty")]);
    }

    let de = &mut serde_json::Deserializer::from_slice(body);
    let value: T = serde_path_to_error::deserialize(de).map_err(|err| {
        let path = err.path().to_string();
        let message = err.into_inner().to_string();
        debug!(path = %path, message = %message, "Body failed to deserialize");
        vec![FieldIssue::new(path, message)]
    })?;

    value.validate()?;
    Ok(value)
}
