use reqwest::{Client, ClientBuilder};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;
use crate::error::LabelscopeError;

/// An HTTP client that only allows requests to approved regulator domains.
#[derive(Debug, Clone)]
pub struct SandboxClient {
    client: Client,
    allowlist: HashSet<String>,
}

impl SandboxClient {
    /// Creates a new SandboxClient with the default allowlist of label publishers.
    pub fn new() -> Result<Self, LabelscopeError> {
        Self::with_timeout(Duration::from_secs(60))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, LabelscopeError> {
        let mut allowlist = HashSet::new();
        let domains = vec![
            "www.ebs.tga.gov.au",           // TGA product information
            "health-products.canada.ca",    // Health Canada drug product database
            "pdf.hres.ca",                  // Health Canada monographs
            "www.ema.europa.eu",            // EMA EPARs
            "ec.europa.eu",                 // EU community register annexes
            "dailymed.nlm.nih.gov",         // FDA SPL via DailyMed
            "public.nlm.nih.gov",           // DailyMed bulk releases
            "api.fda.gov",                  // openFDA
            "localhost",                    // local mirrors
            "127.0.0.1",
        ];

        for d in domains {
            allowlist.insert(d.to_string());
        }

        let client = ClientBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("labelscope/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LabelscopeError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, allowlist })
    }

    /// Appends an exact hostname to the allowlist.
    pub fn allow_domain(&mut self, domain: &str) {
        self.allowlist.insert(domain.to_string());
    }

    /// Validates if a URL is permitted under the current policy.
    pub fn is_allowed(&self, url: &str) -> bool {
        if let Ok(parsed) = Url::parse(url) {
            if let Some(host) = parsed.host_str() {
                // Exact host or a subdomain of an allowed host
                for allowed in &self.allowlist {
                    if host == allowed || host.ends_with(&format!(".{}", allowed)) {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// GET request builder for an allowed URL.
    pub fn get(&self, url: &str) -> Result<reqwest::RequestBuilder, LabelscopeError> {
        if !self.is_allowed(url) {
            return Err(LabelscopeError::Security(format!(
                "domain not in allowlist for URL {}",
                url
            )));
        }

        Ok(self.client.get(url))
    }
}
