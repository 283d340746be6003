//! Shared User-Agent string for backend requests.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/mediathek-management/mediathek";

/// Default User-Agent for backend requests (identifies the client and version).
#[must_use]
pub(crate) fn default_client_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("mediathek/{version} (media-client; +{PROJECT_UA_URL})")
}
