//! Response classification and error message construction.
//!
//! Every response is sorted into one [`Classification`]. Server-reported errors are folded into
//! one composite message by [`compose_error_message`]; the known server messages that need
//! remediation are recognised by [`lists_columns`] and [`enum_remediation`] and rewritten by
//! [`apply_remediation`].

use std::sync::LazyLock;

use regex::Regex;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::http::HttpResponse;

const NOT_FOUND_MARKER: &str = "Not Found";
const INVALID_ENUM_MARKER: &str = "Invalid enum value";
const LENGTH_CONSTRAINT: &str = "Value must be less than or equal to 255 characters";

static ENUM_ATTRIBUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"for attribute '(.+?)'").expect("valid regex"));
static ENUM_ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"of entity '(.+?)'").expect("valid regex"));

/// How a non-failing call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// 200, 201 or 204.
    Success,
    /// Any other status without a structured error body. The call may or may not have had an
    /// effect server-side.
    Unconfirmed { status: StatusCode },
}

impl ResponseOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, ResponseOutcome::Success)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Classification {
    Success,
    /// The body carried an `errors` list.
    Failed { messages: Vec<String> },
    /// 400/404 without a structured error body.
    ClientErrorWithoutDetails,
    Unexpected,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    errors: Vec<ErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct ErrorEntry {
    #[serde(default)]
    message: String,
}

pub(crate) fn classify(response: &HttpResponse) -> Classification {
    match response.status.as_u16() {
        200 | 201 | 204 => Classification::Success,
        status => match error_messages(response) {
            Some(messages) => Classification::Failed { messages },
            None if status == 400 || status == 404 => Classification::ClientErrorWithoutDetails,
            None => Classification::Unexpected,
        },
    }
}

/// The `errors[].message` entries of a JSON error body. Bodies that are not JSON, or have no
/// `errors` list, carry no structured error.
pub(crate) fn error_messages(response: &HttpResponse) -> Option<Vec<String>> {
    serde_json::from_slice::<ErrorBody>(&response.body)
        .ok()
        .map(|body| body.errors.into_iter().map(|e| e.message).collect())
}

/// Whatever the caller knew about the failed call, reported alongside the server's messages.
#[derive(Debug, Clone, Default)]
pub(crate) struct ErrorContext<'a> {
    pub entity: Option<&'a str>,
    pub data: Option<String>,
    pub query: Option<String>,
    pub column: Option<&'a str>,
}

impl<'a> ErrorContext<'a> {
    pub fn entity(entity: &'a str) -> Self {
        Self {
            entity: Some(entity),
            ..Default::default()
        }
    }

    pub fn with_data(mut self, data: impl serde::Serialize) -> Self {
        self.data = serde_json::to_string(&data).ok();
        self
    }

    pub fn with_query(mut self, query: impl serde::Serialize) -> Self {
        self.query = serde_json::to_string(&query).ok();
        self
    }

    pub fn with_column(mut self, column: &'a str) -> Self {
        self.column = Some(column);
        self
    }
}

pub(crate) fn compose_error_message(
    status: StatusCode,
    messages: &[String],
    context: &ErrorContext<'_>,
) -> String {
    let mut lines = vec![format!(
        "{} -> {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown")
    )];
    if let Some(data) = &context.data {
        lines.push(format!("Used data: {}", data));
    }
    if let Some(entity) = context.entity {
        lines.push(format!("Used Entity: {}", entity));
    }
    if let Some(query) = &context.query {
        lines.push(format!("Used Query: {}", query));
    }
    if let Some(column) = context.column {
        lines.push(format!("Used column: {}", column));
    }
    lines.extend(messages.iter().cloned());
    lines.join("\n")
}

/// A lookup needed to make a known server message actionable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Remediation {
    /// Append the valid columns of `entity`.
    ListColumns { entity: String },
    /// Replace the bogus length constraint with the permitted values of the enum column.
    EnumOptions { entity: String, attribute: String },
}

/// Whether the valid columns of the entity should be listed: the server reported something as
/// not found.
pub(crate) fn lists_columns(status: StatusCode, messages: &[String]) -> bool {
    status == StatusCode::NOT_FOUND || messages.iter().any(|m| m.contains(NOT_FOUND_MARKER))
}

/// The enum column an "invalid enum value" server message is about.
pub(crate) fn enum_remediation(message: &str) -> Option<Remediation> {
    if !message.contains(INVALID_ENUM_MARKER) {
        return None;
    }
    let attribute = ENUM_ATTRIBUTE.captures(message)?[1].to_string();
    let entity = ENUM_ENTITY.captures(message)?[1].to_string();
    Some(Remediation::EnumOptions { entity, attribute })
}

/// Rewrite `message` with the values looked up for `remediation`. A column without enum options
/// leaves the message as the server sent it.
pub(crate) fn apply_remediation(
    message: &str,
    remediation: &Remediation,
    values: &[String],
) -> String {
    match remediation {
        Remediation::EnumOptions { .. } if values.is_empty() => message.to_string(),
        Remediation::ListColumns { entity } => format!(
            "{}\nAvailable columns for entity '{}': {}",
            message,
            entity,
            values.join(", ")
        ),
        Remediation::EnumOptions { .. } => message.replace(
            LENGTH_CONSTRAINT,
            &format!("The enum options are: {}", values.join(", ")),
        ),
    }
}
