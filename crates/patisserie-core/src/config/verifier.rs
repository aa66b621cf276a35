//! Verifier settings.

use serde::{Deserialize, Serialize};

/// Settings that change how verification reports, never what it decides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierSettings {
    /// Emit a debug event describing the first failed check.
    #[serde(default)]
    pub diagnostics: bool,
}
