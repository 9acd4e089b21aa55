//! # Errors
//!
//! Every failure in the multi-host layer is a [`HostError`] carried inside an
//! `anyhow::Error`, so stores, managers and backends can all use `?` and
//! callers recover the structured form with [`HostError::from_anyhow`].
//!
//! - argument-contract violations: `BadRequest`
//! - tenant-invariant violations (global rows, host reassignment, duplicate
//!   names): `Unprocessable`, with the individual messages in `errors`
//! - unresolvable roles, users or hosts: `NotFound`
//! - duplicate domains/hosts and backend constraint violations: `Conflict`
//! - use of a closed identity context: `Gone`
//!
//! With feature `json` you also get `to_json()`.

use std::fmt;

use anyhow::Error as AnyError;

/// A convenience result type for multi-host APIs.
pub type HostResult<T> = std::result::Result<T, AnyError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,    // 400
    NotFound,      // 404
    Conflict,      // 409
    Gone,          // 410
    Unprocessable, // 422
    GeneralError,  // 500
}

impl ErrorKind {
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::BadRequest => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Gone => 410,
            ErrorKind::Unprocessable => 422,
            ErrorKind::GeneralError => 500,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "BadRequest",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::Gone => "Gone",
            ErrorKind::Unprocessable => "Unprocessable",
            ErrorKind::GeneralError => "GeneralError",
        }
    }

    pub fn class_name(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "bad-request",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Gone => "gone",
            ErrorKind::Unprocessable => "unprocessable",
            ErrorKind::GeneralError => "general-error",
        }
    }
}

/// A structured error that can live inside `anyhow::Error`.
///
/// `errors` holds the human-readable validation messages for
/// `Unprocessable` failures; it is empty for every other kind.
#[derive(Debug)]
pub struct HostError {
    pub kind: ErrorKind,
    pub message: String,
    pub errors: Vec<String>,
    pub source: Option<AnyError>,
}

impl HostError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            errors: Vec::new(),
            source: None,
        }
    }

    pub fn with_errors<I, S>(mut self, errors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.errors = errors.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_source(mut self, source: AnyError) -> Self {
        self.source = Some(source);
        self
    }

    pub fn code(&self) -> u16 {
        self.kind.status_code()
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn class_name(&self) -> &'static str {
        self.kind.class_name()
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    /// Convert into `anyhow::Error` so it flows through `?`.
    pub fn into_anyhow(self) -> AnyError {
        AnyError::new(self)
    }

    /// Downcast an `anyhow::Error` to a `HostError` if possible.
    pub fn from_anyhow(err: &AnyError) -> Option<&HostError> {
        err.downcast_ref::<HostError>()
    }

    /// Kind of an arbitrary error; anything that is not a `HostError`
    /// counts as `GeneralError`.
    pub fn kind_of(err: &AnyError) -> ErrorKind {
        Self::from_anyhow(err)
            .map(|e| e.kind)
            .unwrap_or(ErrorKind::GeneralError)
    }

    /// Turn any error into a HostError:
    /// - if it's already a HostError, keep it (lossless)
    /// - otherwise wrap as GeneralError
    pub fn normalize(err: AnyError) -> HostError {
        match err.downcast::<HostError>() {
            Ok(host) => host,
            Err(other) => {
                HostError::new(ErrorKind::GeneralError, other.to_string()).with_source(other)
            }
        }
    }

    // ---- Constructors ----

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, msg)
    }
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, msg)
    }
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, msg)
    }
    pub fn gone(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Gone, msg)
    }
    pub fn general_error(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::GeneralError, msg)
    }

    /// A validation failure with a single message, mirrored into `errors`.
    pub fn unprocessable(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        Self::new(ErrorKind::Unprocessable, msg.clone()).with_errors([msg])
    }

    /// A validation failure with several messages.
    pub fn validation<I, S>(errors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let errors: Vec<String> = errors.into_iter().map(Into::into).collect();
        Self::new(ErrorKind::Unprocessable, errors.join("; ")).with_errors(errors)
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.name(), self.code(), self.message)
    }
}

impl std::error::Error for HostError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

#[cfg(feature = "json")]
impl HostError {
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;

        let mut base = json!({
            "name": self.name(),
            "message": self.message,
            "code": self.code(),
            "className": self.class_name(),
        });

        if !self.errors.is_empty() {
            base["errors"] = json!(self.errors);
        }
        base
    }
}

/// Convenience helper for "bail with HostError".
#[macro_export]
macro_rules! bail_host {
    ($ctor:ident, $msg:expr) => {
        return Err($crate::errors::HostError::$ctor($msg).into_anyhow())
    };
    ($ctor:ident, $fmt:expr, $($arg:tt)*) => {
        return Err($crate::errors::HostError::$ctor(format!($fmt, $($arg)*)).into_anyhow())
    };
}
