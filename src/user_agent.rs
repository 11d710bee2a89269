//! Shared User-Agent string for device and remote HTTP clients.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/lechefacil/registros";

/// Default User-Agent for all outgoing requests (identifies the tool).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("registros/{version} (herd-weight-client; +{PROJECT_UA_URL})")
}
