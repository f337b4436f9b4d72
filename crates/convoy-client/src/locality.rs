//! Network locality — are we inside the production network or not?

use tracing::debug;

/// Overrides hostname detection: `prod`/`production` or `corp`.
pub const LOCALITY_ENV: &str = "CONVOY_LOCALITY";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locality {
    /// Inside the cluster network; schedulers are reachable directly.
    Production,
    /// Outside it; schedulers are reached through a tunnel host.
    Corp,
}

impl Locality {
    pub fn label(&self) -> &'static str {
        match self {
            Locality::Production => "prod",
            Locality::Corp => "corp",
        }
    }
}

pub trait LocalityProbe {
    fn locality(&self) -> Locality;
}

/// Classifies this machine by its hostname suffix.
pub struct HostnameLocality {
    production_domains: Vec<String>,
}

impl HostnameLocality {
    pub fn new(production_domains: Vec<String>) -> Self {
        Self { production_domains }
    }

    pub fn classify(&self, hostname: &str) -> Locality {
        let hostname = hostname.trim_end_matches('.').to_ascii_lowercase();
        let inside = self
            .production_domains
            .iter()
            .map(|d| d.trim_end_matches('.').to_ascii_lowercase())
            .any(|domain| !domain.is_empty() && hostname.ends_with(&domain));
        if inside {
            Locality::Production
        } else {
            Locality::Corp
        }
    }
}

impl LocalityProbe for HostnameLocality {
    fn locality(&self) -> Locality {
        if let Some(locality) = std::env::var(LOCALITY_ENV).ok().and_then(|v| parse_override(&v)) {
            debug!(locality = locality.label(), "locality forced by {LOCALITY_ENV}");
            return locality;
        }

        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_default();
        self.classify(&hostname)
    }
}

fn parse_override(value: &str) -> Option<Locality> {
    match value.trim().to_ascii_lowercase().as_str() {
        "prod" | "production" => Some(Locality::Production),
        "corp" => Some(Locality::Corp),
        _ => None,
    }
}
