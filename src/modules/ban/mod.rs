//! Block-signal classification.
//!
//! Decides whether a completed response or a transport failure counts as
//! evidence that the current identity has been blocked. Classification is
//! stateless; the dispatcher owns the rotate-and-resubmit reaction.

use std::fmt;

/// Status codes the target uses to refuse a blocked client.
pub const BAN_STATUS_CODES: [u16; 3] = [403, 429, 503];

/// Evidence of a server-side block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanSignal {
    /// The response carried one of [`BAN_STATUS_CODES`].
    Status(u16),
    /// The request never completed: timeout, connection reset, DNS failure.
    /// Always treated as ban-equivalent.
    Transport,
}

impl fmt::Display for BanSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BanSignal::Status(code) => write!(f, "status {code}"),
            BanSignal::Transport => write!(f, "transport failure"),
        }
    }
}

/// Stateless ban classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct BanDetector;

impl BanDetector {
    /// Classify a completed response. `None` means pass the response through.
    pub fn classify_status(&self, status: u16) -> Option<BanSignal> {
        BAN_STATUS_CODES
            .contains(&status)
            .then_some(BanSignal::Status(status))
    }

    /// Transport-level failures are unconditionally ban-equivalent.
    pub fn classify_failure(&self) -> BanSignal {
        BanSignal::Transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_block_statuses() {
        let detector = BanDetector;
        assert_eq!(detector.classify_status(403), Some(BanSignal::Status(403)));
        assert_eq!(detector.classify_status(429), Some(BanSignal::Status(429)));
        assert_eq!(detector.classify_status(503), Some(BanSignal::Status(503)));
    }

    #[test]
    fn passes_other_statuses_through() {
        let detector = BanDetector;
        for status in [200, 201, 301, 302, 404, 410, 500, 502] {
            assert_eq!(detector.classify_status(status), None);
        }
    }

    #[test]
    fn transport_failures_always_classify() {
        assert_eq!(BanDetector.classify_failure(), BanSignal::Transport);
    }
}
