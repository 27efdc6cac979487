use patchpilot_protocol::PromptTurn;

use crate::error::ProviderError;

/// Abstraction over the model backend. The session hands over assembled
/// prompt turns and gets back the raw reply text; transport, auth, and
/// retry policy all live behind this seam.
pub trait ModelClient {
    fn complete(&self, turns: &[PromptTurn]) -> Result<String, ProviderError>;
}
