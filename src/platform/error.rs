//! Errors produced by the host runtime.

use derive_more::Display;

/// Kind of a host-side failure.
///
/// Mirrors the [DOMException] names relevant to media acquisition and peer
/// connection management, so the orchestrator can map host failures onto its
/// own error surface without inspecting free-form messages.
///
/// [DOMException]: https://webidl.spec.whatwg.org/#idl-DOMException
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum ErrorKind {
    /// Requested object (device, track) cannot be found.
    #[display(fmt = "NotFoundError")]
    NotFound,

    /// Device is present but cannot deliver media (busy, hardware fault).
    #[display(fmt = "NotReadableError")]
    NotReadable,

    /// No candidate device satisfies the given constraints.
    #[display(fmt = "OverconstrainedError")]
    Overconstrained,

    /// Operation was aborted by the host.
    #[display(fmt = "AbortError")]
    Abort,

    /// Operation was blocked for security reasons.
    #[display(fmt = "SecurityError")]
    Security,

    /// User (or platform policy) denied the permission request.
    #[display(fmt = "NotAllowedError")]
    NotAllowed,

    /// Host runtime lacks the requested primitive entirely.
    #[display(fmt = "NotSupportedError")]
    NotSupported,

    /// Any other host failure.
    #[display(fmt = "Error")]
    Other,
}

/// Opaque error of the host runtime.
#[derive(Clone, Debug, Display)]
#[display(fmt = "{}: {}", kind, message)]
pub struct Error {
    /// Kind of this [`Error`].
    kind: ErrorKind,

    /// Host-provided failure description.
    message: String,
}

impl Error {
    /// Creates a new [`Error`] out of the provided [`ErrorKind`] and message.
    #[inline]
    #[must_use]
    pub fn new<M: Into<String>>(kind: ErrorKind, message: M) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Returns [`ErrorKind`] of this [`Error`].
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the host-provided failure description.
    #[inline]
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}
