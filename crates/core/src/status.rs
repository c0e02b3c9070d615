#![forbid(unsafe_code)]

/// Lifecycle of a change request. Pending is the only initial state;
/// Accepted and Rejected are terminal and no transition leaves them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeStatus {
    Pending,
    Accepted,
    Rejected,
}

impl ChangeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_storage_form() {
        for status in [
            ChangeStatus::Pending,
            ChangeStatus::Accepted,
            ChangeStatus::Rejected,
        ] {
            assert_eq!(ChangeStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ChangeStatus::parse("P"), None);
    }

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!ChangeStatus::Pending.is_terminal());
        assert!(ChangeStatus::Accepted.is_terminal());
        assert!(ChangeStatus::Rejected.is_terminal());
    }
}
