use serde::{Deserialize, Serialize};

/// Alert severity (§3.3).
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Major,
    Minor,
    Warning,
    Info,
    Clear,
}

impl Severity {
    /// Default severity when an addon's `severity_mappings` has no entry
    /// for the parsed `alert_type` (§4.3 step 2).
    #[must_use]
    pub const fn default_unmapped() -> Self {
        Self::Warning
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(Self::Critical),
            "major" => Ok(Self::Major),
            "minor" => Ok(Self::Minor),
            "warning" => Ok(Self::Warning),
            "info" => Ok(Self::Info),
            "clear" => Ok(Self::Clear),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Critical => "critical",
            Self::Major => "major",
            Self::Minor => "minor",
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Clear => "clear",
        };
        f.write_str(s)
    }
}
