//! `Authorization: Bearer <token>` extraction.
//!
//! Every malformed shape is its own variant so logs can tell them apart,
//! but callers map all of them to the same 401.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BearerError {
    #[error("authorization header missing")]
    Missing,

    #[error("multiple authorization headers")]
    Multiple,

    #[error("authorization header is not visible ASCII")]
    NotAscii,

    #[error("authorization scheme is not Bearer")]
    WrongScheme,

    #[error("authorization header must be 'Bearer <token>'")]
    Malformed,
}

impl BearerError {
    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            BearerError::Missing => "missing",
            BearerError::Multiple => "multiple",
            BearerError::NotAscii => "not_ascii",
            BearerError::WrongScheme => "wrong_scheme",
            BearerError::Malformed => "malformed",
        }
    }
}

/// Extract the bearer token from request headers.
///
/// The header must appear exactly once and split on whitespace into exactly
/// two fields: a case-insensitive `Bearer` and the token.
pub fn extract_bearer(headers: &HeaderMap) -> Result<&str, BearerError> {
    let mut values = headers.get_all(AUTHORIZATION).iter();
    let value = values.next().ok_or(BearerError::Missing)?;
    if values.next().is_some() {
        return Err(BearerError::Multiple);
    }

    let value = value.to_str().map_err(|_| BearerError::NotAscii)?;
    let mut fields = value.split_whitespace();
    let (scheme, token) = match (fields.next(), fields.next(), fields.next()) {
        (Some(scheme), Some(token), None) => (scheme, token),
        (Some(scheme), None, None) if !scheme.eq_ignore_ascii_case("bearer") => {
            return Err(BearerError::WrongScheme)
        }
        _ => return Err(BearerError::Malformed),
    };

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(BearerError::WrongScheme);
    }
    Ok(token)
}
