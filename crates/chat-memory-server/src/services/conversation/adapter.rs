use serde::Serialize;
use tracing::warn;

use crate::services::memory::{Role, Turn};

/// Log target for role labels that had to be defaulted.
pub const ROLE_DEFAULT_TARGET: &str = "chat_memory_server::role_default";

/// Speaker label understood by the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Model,
}

impl Speaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Speaker::User => "user",
            Speaker::Model => "model",
        }
    }
}

impl From<Role> for Speaker {
    fn from(role: Role) -> Self {
        match role {
            Role::User => Speaker::User,
            Role::Assistant => Speaker::Model,
        }
    }
}

/// One context entry handed to the generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderMessage {
    pub speaker: Speaker,
    pub text: String,
}

impl ProviderMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Model,
            text: text.into(),
        }
    }
}

pub fn to_provider_format(turns: &[Turn]) -> Vec<ProviderMessage> {
    turns
        .iter()
        .map(|turn| ProviderMessage {
            speaker: turn.role.into(),
            text: turn.content.clone(),
        })
        .collect()
}

/// Parse a caller-supplied role label.
///
/// Anything other than `user` or `assistant` (case-insensitive) becomes
/// [`Role::User`] and is logged under [`ROLE_DEFAULT_TARGET`].
pub fn role_from_untrusted(raw: &str) -> Role {
    match raw.trim().to_ascii_lowercase().as_str() {
        "user" => Role::User,
        "assistant" => Role::Assistant,
        _ => {
            warn!(target: ROLE_DEFAULT_TARGET, raw_role = %raw, "Unrecognized role, defaulting to user");
            Role::User
        }
    }
}
