//! Shared types for the patchpilot engine: session settings, the path
//! containment policy, and the prompt-turn shapes handed to model clients.

use serde::{Deserialize, Serialize};

mod path_policy;
mod settings;

pub use path_policy::{PathError, PathPolicy};
pub use settings::{Settings, SettingsError, DEFAULT_IGNORE_PATTERNS};

/// Speaker of a single prompt turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn of the conversation sent to a model client.
///
/// Materialized context files are prepended as synthetic `System` turns;
/// the engine never inspects turns after handing them off.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptTurn {
    pub role: Role,
    pub text: String,
}

impl PromptTurn {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            text: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }
}
