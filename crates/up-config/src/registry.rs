use documented::{Documented, DocumentedFields};
use serde::{Deserialize, Serialize};

/// Credentials for an OCI registry.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, Documented, DocumentedFields)]
pub struct RegistryCredential {
    /// Registry hostname, optionally with port (e.g. "xpkg.upbound.io").
    pub host: String,

    /// Username used for basic authentication and token exchange.
    pub username: String,

    /// Password or access token.
    pub password: String,
}

impl RegistryCredential {
    /// Returns true if this entry applies to `host`, ignoring case.
    pub fn matches(&self, host: &str) -> bool {
        self.host.eq_ignore_ascii_case(host)
    }
}
