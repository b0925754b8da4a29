//! Error types for the captcha-aio library.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::models::Vendor;

/// Closed classification every failure is projected onto.
///
/// Vendors answer with ad hoc strings and codes; each adapter maps them onto
/// one of these kinds so callers can branch without knowing vendor wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The task is still being solved; poll again later.
    NotReady,
    /// Transport failure talking to the vendor.
    Network,
    /// API key missing, malformed, unknown, or used from a non-whitelisted IP.
    InvalidCredentials,
    /// The account has no funds left.
    InsufficientBalance,
    /// The request was rejected as malformed or incomplete.
    InvalidRequestParameters,
    /// The uploaded payload exceeds the vendor's size limit.
    ContentTooLarge,
    /// The uploaded payload has a type the vendor does not accept.
    UnsupportedContentType,
    /// The account or IP is throttled, banned, or the queue is full.
    RateLimited,
    /// Workers could not solve the captcha.
    Unsolvable,
    /// The vendor answered with something unrecognized.
    Unknown,
}

impl ErrorKind {
    /// Returns the snake_case name used in logs and FFI payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotReady => "not_ready",
            ErrorKind::Network => "network",
            ErrorKind::InvalidCredentials => "invalid_credentials",
            ErrorKind::InsufficientBalance => "insufficient_balance",
            ErrorKind::InvalidRequestParameters => "invalid_request_parameters",
            ErrorKind::ContentTooLarge => "content_too_large",
            ErrorKind::UnsupportedContentType => "unsupported_content_type",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Unsolvable => "unsolvable",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type for the captcha-aio library.
#[derive(Error, Debug)]
pub enum CaptchaError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] rquest::Error),

    /// The vendor reported a failure code
    #[error("{vendor} returned {code}: {message}")]
    Vendor {
        vendor: Vendor,
        code: String,
        kind: ErrorKind,
        message: &'static str,
    },

    /// Proxy URI could not be decomposed
    #[error("Invalid proxy URI: {0}")]
    InvalidProxy(String),

    /// Task handle is not in the format the vendor issues
    #[error("Invalid task handle: {0}")]
    InvalidTaskHandle(String),

    /// Invalid response from server
    #[error("Invalid server response: {0}")]
    InvalidResponse(String),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The caller-configured poll cap or timeout ran out
    ///
    /// `task_id` is `None` when the deadline passed before submission finished.
    #[error(
        "Task {} gave up after {polls} polls: {limit}",
        .task_id.as_deref().unwrap_or("(unsubmitted)")
    )]
    PollLimitExceeded {
        task_id: Option<String>,
        polls: u32,
        limit: PollLimit,
    },
}

/// Which [`SolveOptions`](crate::SolveOptions) limit stopped a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollLimit {
    MaxPolls(u32),
    Timeout(Duration),
}

impl fmt::Display for PollLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollLimit::MaxPolls(max) => write!(f, "poll cap of {} reached", max),
            PollLimit::Timeout(timeout) => write!(f, "timeout of {:?} reached", timeout),
        }
    }
}

impl CaptchaError {
    /// Projects the error onto the closed [`ErrorKind`] taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CaptchaError::Http(_) => ErrorKind::Network,
            CaptchaError::Vendor { kind, .. } => *kind,
            CaptchaError::InvalidProxy(_)
            | CaptchaError::InvalidTaskHandle(_)
            | CaptchaError::Io(_) => ErrorKind::InvalidRequestParameters,
            CaptchaError::InvalidResponse(_) | CaptchaError::Json(_) => ErrorKind::Unknown,
            CaptchaError::PollLimitExceeded { .. } => ErrorKind::NotReady,
        }
    }

    /// True only for a vendor saying the task is still in progress.
    ///
    /// `PollLimitExceeded` shares the `NotReady` kind but is terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CaptchaError::Vendor {
                kind: ErrorKind::NotReady,
                ..
            }
        )
    }

    /// The literal vendor code, if this error came from one.
    pub fn vendor_code(&self) -> Option<&str> {
        match self {
            CaptchaError::Vendor { code, .. } => Some(code),
            _ => None,
        }
    }
}

/// One row of a vendor's error table.
#[derive(Debug, Clone, Copy)]
pub struct VendorCode {
    pub code: &'static str,
    pub kind: ErrorKind,
    pub message: &'static str,
}

pub(crate) const UNKNOWN_MESSAGE: &str = "could not identify server error";

pub(crate) fn lookup(table: &'static [VendorCode], code: &str) -> Option<&'static VendorCode> {
    table.iter().find(|entry| entry.code == code)
}

/// Result type alias for captcha-aio operations.
pub type Result<T> = std::result::Result<T, CaptchaError>;
