//! Failure classification and user-facing descriptors for client errors.
//!
//! Every library error maps onto one [`FailureKind`]. The kind decides how the
//! front end treats it: shown immediately, retried silently, or dropped.

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FailureKind {
    /// Input rejected before any network call (empty list, malformed URL, bad format).
    Validation,
    /// Request could not be sent or came back with a non-success status.
    Transport,
    /// A streamed record could not be interpreted.
    Protocol,
    /// The server answered with an explicit `error` / `detail` payload.
    ServerReported,
    /// No terminal event arrived within the session budget.
    Timeout,
    /// The session was superseded or cancelled by the caller.
    Cancelled,
}

impl FailureKind {
    /// Whether a failure of this kind is surfaced to the user.
    ///
    /// Cancellation is the only silent terminal kind.
    #[must_use]
    pub fn is_user_visible(self) -> bool {
        !matches!(self, Self::Cancelled)
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Validation => "Input",
            Self::Transport => "Network",
            Self::Protocol => "Protocol",
            Self::ServerReported => "Server",
            Self::Timeout => "Timeout",
            Self::Cancelled => "Cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureDescriptor {
    pub kind: FailureKind,
    pub what: &'static str,
    pub fix: &'static str,
}

/// Returns the descriptor printed under a failed command.
#[must_use]
pub fn describe(kind: FailureKind) -> FailureDescriptor {
    match kind {
        FailureKind::Validation => FailureDescriptor {
            kind,
            what: "Input could not be accepted",
            fix: "Check the URLs, format and output path, then retry.",
        },
        FailureKind::Transport => FailureDescriptor {
            kind,
            what: "Backend request failed",
            fix: "Check that the backend is running (`mediathek health`) and reachable.",
        },
        FailureKind::Protocol => FailureDescriptor {
            kind,
            what: "Backend sent data that could not be read",
            fix: "Inspect logs with -v; the backend may be a different version.",
        },
        FailureKind::ServerReported => FailureDescriptor {
            kind,
            what: "Backend rejected the request",
            fix: "Read the message above; it comes straight from the backend.",
        },
        FailureKind::Timeout => FailureDescriptor {
            kind,
            what: "Backend took too long",
            fix: "Retry, or raise the timeout with --timeout-secs.",
        },
        FailureKind::Cancelled => FailureDescriptor {
            kind,
            what: "Operation cancelled",
            fix: "No action needed.",
        },
    }
}
