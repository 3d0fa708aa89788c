use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of the current completion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatStatus {
    Ready,
    Submitted,
    Streaming,
    Error,
}

impl ChatStatus {
    pub fn is_loading(&self) -> bool {
        matches!(self, ChatStatus::Submitted | ChatStatus::Streaming)
    }
}

/// Single user-facing health signal covering both remote dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Online,
    Offline,
}

impl Connectivity {
    pub fn from_flags(completion_error: bool, logging_error: bool) -> Self {
        if is_offline(completion_error, logging_error) {
            Connectivity::Offline
        } else {
            Connectivity::Online
        }
    }

    pub fn is_offline(&self) -> bool {
        *self == Connectivity::Offline
    }
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connectivity::Online => f.write_str("Online"),
            Connectivity::Offline => f.write_str("Offline"),
        }
    }
}

pub fn is_offline(completion_error: bool, logging_error: bool) -> bool {
    completion_error || logging_error
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn either_failure_means_offline() {
        assert!(!is_offline(false, false));
        assert!(is_offline(true, false));
        assert!(is_offline(false, true));
        assert!(is_offline(true, true));
    }

    #[test]
    fn connectivity_follows_flags() {
        assert_eq!(Connectivity::from_flags(false, false), Connectivity::Online);
        assert_eq!(Connectivity::from_flags(false, true), Connectivity::Offline);
        assert_eq!(Connectivity::Offline.to_string(), "Offline");
    }

    #[test]
    fn loading_covers_in_flight_states() {
        assert!(ChatStatus::Submitted.is_loading());
        assert!(ChatStatus::Streaming.is_loading());
        assert!(!ChatStatus::Ready.is_loading());
        assert!(!ChatStatus::Error.is_loading());
    }
}
