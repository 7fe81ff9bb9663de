//! Translation of error responses into [`Error`] variants.
//!
//! The storage service reports failures as JSON documents of the form:
//!
//! ```json
//! {
//!   "error": {
//!     "code": 404,
//!     "message": "No such object: bucket/name",
//!     "errors": [{"domain": "global", "reason": "notFound", "message": "No such object: bucket/name"}]
//!   }
//! }
//! ```
//!
//! The first entry of `errors` determines the variant. Responses that are not JSON, such as those
//! produced by proxies and load balancers, are classified by their status code alone.

use reqwest::StatusCode;
use serde::Deserialize;

use crate::error::{Error, ErrorRecord, ServiceErrorDetails};

/// Column at which failure details are wrapped.
const DETAILS_WIDTH: usize = 70;

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ErrorRecord>,
}

/// Classifies an error response by its status code, `Content-Type` header and body.
pub fn classify(status: StatusCode, content_type: Option<&str>, body: &[u8]) -> Error {
    let is_json = content_type.is_some_and(|ct| ct.starts_with("application/json"));
    if is_json {
        return classify_json(body);
    }

    let reason = status.canonical_reason().unwrap_or_default().to_owned();
    match status {
        StatusCode::NOT_FOUND => Error::NotFound { message: reason },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Authorization { message: reason },
        _ => Error::Connection {
            status: status.as_u16(),
            body: String::from_utf8_lossy(body).into_owned(),
        },
    }
}

/// Classifies a JSON error body.
pub fn classify_json(body: &[u8]) -> Error {
    let errors = serde_json::from_slice::<ErrorResponse>(body)
        .ok()
        .and_then(|response| response.error)
        .map(|error| error.errors)
        .unwrap_or_default();

    match errors.first() {
        Some(primary) => classify_record(primary, &errors, None)
            .unwrap_or_else(|| missing_fields(body)),
        None => missing_fields(body),
    }
}

/// Builds the error for the `primary` record.
///
/// Records in `errors` other than `primary` are appended to the message as failure details.
/// Returns `None` if `primary` lacks a reason or a message.
pub fn classify_record(
    primary: &ErrorRecord,
    errors: &[ErrorRecord],
    job_ref: Option<&str>,
) -> Option<Error> {
    let reason = primary.reason_str()?;
    let message = primary.message.as_deref().filter(|m| !m.is_empty())?;

    let mut message = match job_ref {
        Some(job_ref) => format!("Error processing {job_ref:?}: {message}"),
        None => message.to_owned(),
    };

    let others: Vec<&ErrorRecord> = errors.iter().filter(|e| *e != primary).collect();
    if !others.is_empty() {
        message.push_str("\nFailure details:\n");
        message.push_str(&failure_details(&others));
    }

    let error = match primary.reason_code() {
        Some(code) => code.into_error(message),
        None => {
            tracing::debug!(reason, "unmapped error reason");
            Error::Service {
                message,
                details: Box::new(ServiceErrorDetails {
                    primary: primary.clone(),
                    errors: errors.to_vec(),
                    job_ref: job_ref.map(str::to_owned),
                }),
            }
        }
    };

    Some(error)
}

fn failure_details(errors: &[&ErrorRecord]) -> String {
    let options = textwrap::Options::new(DETAILS_WIDTH)
        .initial_indent(" - ")
        .subsequent_indent("   ");

    errors
        .iter()
        .map(|error| {
            let line = [error.location.as_deref(), error.message.as_deref()]
                .into_iter()
                .flatten()
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join(": ");
            textwrap::fill(&line, &options)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn missing_fields(body: &[u8]) -> Error {
    Error::Interface {
        message: format!(
            "Error reported by server with missing error fields. Server returned: {}",
            String::from_utf8_lossy(body)
        ),
    }
}
