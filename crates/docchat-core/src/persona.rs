//! Fixed persona catalog and per-turn chat settings

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// System persona used when no strict grounding instruction applies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Persona {
    #[default]
    Assistant,
    Eli5,
    Tutor,
    Concise,
}

impl Persona {
    /// Every persona, in display order
    pub const ALL: [Persona; 4] = [Self::Assistant, Self::Eli5, Self::Tutor, Self::Concise];

    /// The system prompt for this persona
    pub fn prompt(&self) -> &'static str {
        match self {
            Self::Assistant => "You are a helpful assistant.",
            Self::Eli5 => {
                "You are a helpful assistant that explains concepts like I am 5 years old."
            }
            Self::Tutor => {
                "You are a patient tutor. Explain step by step and check understanding \
                 with a short question at the end."
            }
            Self::Concise => "You are a precise assistant. Answer in as few words as possible.",
        }
    }

    /// Stable identifier used in config and requests
    pub fn name(&self) -> &'static str {
        match self {
            Self::Assistant => "assistant",
            Self::Eli5 => "eli5",
            Self::Tutor => "tutor",
            Self::Concise => "concise",
        }
    }
}

impl std::fmt::Display for Persona {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Persona {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "assistant" | "default" => Ok(Self::Assistant),
            "eli5" => Ok(Self::Eli5),
            "tutor" => Ok(Self::Tutor),
            "concise" => Ok(Self::Concise),
            _ => Err(ConfigError::InvalidValue {
                key: "persona".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Typed per-turn settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSettings {
    /// Persona prompt used outside strict grounding
    #[serde(default)]
    pub persona: Persona,

    /// Refuse rather than answer from general knowledge
    #[serde(default)]
    pub strict_mode: bool,
}
