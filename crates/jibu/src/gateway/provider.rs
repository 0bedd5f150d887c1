use serde::Deserialize;
use std::fmt;

/// Which upstream backend a request should use.
///
/// `Auto` is a policy, not a backend: attempt the local backend first and
/// fall back to the hosted backend only when the local attempt fails before
/// producing any content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderSelection {
    #[default]
    Local,
    Hosted,
    Auto,
}

impl ProviderSelection {
    /// Resolve the selection named in a request body.
    ///
    /// Matching is case-insensitive; anything that is not an exact backend
    /// name falls through to `Auto`, and an absent value uses the configured
    /// default.
    pub fn from_request(value: Option<&str>, default: ProviderSelection) -> Self {
        match value {
            None => default,
            Some(raw) => match raw.trim().to_lowercase().as_str() {
                "local" => ProviderSelection::Local,
                "hosted" => ProviderSelection::Hosted,
                "auto" => ProviderSelection::Auto,
                other => {
                    tracing::debug!("unknown provider '{other}', treating as auto");
                    ProviderSelection::Auto
                }
            },
        }
    }
}

impl fmt::Display for ProviderSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderSelection::Local => "local",
            ProviderSelection::Hosted => "hosted",
            ProviderSelection::Auto => "auto",
        };
        write!(f, "{name}")
    }
}
