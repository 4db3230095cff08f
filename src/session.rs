use std::net::Ipv4Addr;
use crate::types::Mode;

/// Which printer the bridge is committed to, if any.
///
/// The address and serial exist only inside `Locked`, so "address present
/// iff locked" holds by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Session {
    Searching,
    Locked { address: Ipv4Addr, serial: String },
}

impl Session {
    pub fn mode(&self) -> Mode {
        match self {
            Session::Searching => Mode::Searching,
            Session::Locked { .. } => Mode::Locked,
        }
    }

    pub fn is_searching(&self) -> bool {
        matches!(self, Session::Searching)
    }

    pub fn address(&self) -> Option<Ipv4Addr> {
        match self {
            Session::Locked { address, .. } => Some(*address),
            Session::Searching => None,
        }
    }

    pub fn serial(&self) -> Option<&str> {
        match self {
            Session::Locked { serial, .. } => Some(serial),
            Session::Searching => None,
        }
    }
}

/// How a scan decides that a responder is the printer to lock on to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchPolicy {
    /// Only the printer reporting exactly this serial.
    ExactSerial(String),
    /// Whichever printer answers first.
    FirstResponder,
}

impl MatchPolicy {
    /// An empty (or blank) filter means "accept the first responder".
    pub fn from_filter(filter: &str) -> Self {
        let filter = filter.trim();
        if filter.is_empty() {
            MatchPolicy::FirstResponder
        } else {
            MatchPolicy::ExactSerial(filter.to_string())
        }
    }

    pub fn accepts(&self, serial: &str) -> bool {
        match self {
            MatchPolicy::ExactSerial(want) => want == serial,
            MatchPolicy::FirstResponder => true,
        }
    }

    /// The configured filter, empty for first-responder.
    pub fn filter(&self) -> &str {
        match self {
            MatchPolicy::ExactSerial(want) => want,
            MatchPolicy::FirstResponder => "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_filter_is_first_responder() {
        assert_eq!(MatchPolicy::from_filter(""), MatchPolicy::FirstResponder);
        assert_eq!(MatchPolicy::from_filter("   "), MatchPolicy::FirstResponder);
        assert!(MatchPolicy::FirstResponder.accepts("anything"));
    }

    #[test]
    fn exact_filter_is_case_sensitive() {
        let policy = MatchPolicy::from_filter(" X123 ");
        assert_eq!(policy.filter(), "X123");
        assert!(policy.accepts("X123"));
        assert!(!policy.accepts("x123"));
        assert!(!policy.accepts("X1234"));
    }

    #[test]
    fn locked_session_exposes_target() {
        let s = Session::Locked {
            address: Ipv4Addr::new(10, 0, 0, 5),
            serial: "X123".into(),
        };
        assert_eq!(s.mode(), Mode::Locked);
        assert_eq!(s.address(), Some(Ipv4Addr::new(10, 0, 0, 5)));
        assert_eq!(s.serial(), Some("X123"));
        assert_eq!(Session::Searching.address(), None);
    }
}
