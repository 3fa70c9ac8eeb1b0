//! Broker connection state machine states.

/// State of the broker connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session. A connect attempt may start once the retry floor allows.
    #[default]
    Disconnected,
    /// Connect or subscribe in progress.
    Connecting,
    /// Connected and subscribed to the command topic; publishing allowed.
    Subscribed,
}

impl ConnectionState {
    /// Whether publishing is allowed.
    pub fn is_subscribed(self) -> bool {
        self == Self::Subscribed
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Subscribed => write!(f, "Subscribed"),
        }
    }
}
