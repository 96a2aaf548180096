use serde::{Deserialize, Serialize};

/// Alert lifecycle state (§4.8).
///
/// ```text
/// active ──ack──► acknowledged ──resolve──► resolved
///    │                                          ▲
///    └───────────────────resolve─────────────────┘
/// ```
///
/// `Suppressed` is reserved for a future rule-based mute: it is a valid
/// value but no transition in this core produces or consumes it (§9 open
/// question).
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Suppressed,
    Resolved,
}

impl AlertStatus {
    /// Whether this status counts as "resolved" for dedupe-window purposes
    /// (§3.3: "dedupe window is until resolved").
    #[must_use]
    pub const fn is_resolved(self) -> bool {
        matches!(self, Self::Resolved)
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Acknowledged => "acknowledged",
            Self::Suppressed => "suppressed",
            Self::Resolved => "resolved",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "acknowledged" => Ok(Self::Acknowledged),
            "suppressed" => Ok(Self::Suppressed),
            "resolved" => Ok(Self::Resolved),
            other => Err(format!("unknown alert status: {other}")),
        }
    }
}
