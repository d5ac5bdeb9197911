use serde::Deserialize;
use serde::Serialize;

/// How the scheduler's loop is paced.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    derive_more::Display,
    derive_more::IsVariant,
    Serialize,
    Deserialize,
)]
#[serde(from = "String", into = "String")]
pub enum LoopMode {
    /// Resolved once to `DisplayRefresh` if the host has a display refresh, `FixedDelay` otherwise.
    #[default]
    #[display("auto")]
    Auto,
    /// One tick cycle per iteration, then sleep until the next deadline.
    #[display("settimeout")]
    FixedDelay,
    /// Tick cycles run from the host's per-refresh callback, catching up on missed deadlines.
    #[display("animation")]
    DisplayRefresh,
}

impl LoopMode {
    /// The tokens offered to users, one per mode.
    pub const TOKENS: [&'static str; 3] = ["auto", "settimeout", "animation"];

    /// Parses an external token. Unknown tokens fall back to `Auto`.
    pub fn from_token(token: &str) -> Self {
        match token.trim().to_lowercase().as_str() {
            "settimeout" => Self::FixedDelay,
            "animation" | "animationframe" => Self::DisplayRefresh,
            _ => Self::Auto,
        }
    }

    /// Replaces `Auto` with the concrete mode the host can support.
    pub fn resolve(self, display_refresh: bool) -> Self {
        match self {
            Self::Auto if display_refresh => Self::DisplayRefresh,
            Self::Auto => Self::FixedDelay,
            mode => mode,
        }
    }
}

impl From<&str> for LoopMode {
    fn from(value: &str) -> Self {
        Self::from_token(value)
    }
}

impl From<String> for LoopMode {
    fn from(value: String) -> Self {
        Self::from_token(&value)
    }
}

impl From<LoopMode> for String {
    fn from(value: LoopMode) -> Self {
        value.to_string()
    }
}
