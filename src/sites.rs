//! Mapping of canonical article URLs to publishers.
//!
//! The authority component is pulled out of an absolute URL with a regex,
//! stripped of user info, port and a leading `www.`, lower-cased, and
//! looked up in a domain table. Anything that does not match resolves to
//! [`Publisher::Unknown`]. No network access is involved.

use crate::models::Publisher;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use tracing::debug;

static AUTHORITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://([^/?#\s]+)").expect("valid regex")
});

const BUILTIN_DOMAINS: &[(&str, Publisher)] = &[
    ("chemanalyst.com", Publisher::ChemAnalyst),
    ("fastmarkets.com", Publisher::Fastmarkets),
    ("fas.usda.gov", Publisher::FasUsda),
    ("biodieselmagazine.com", Publisher::BiodieselMagazine),
    ("businessresearchinsights.com", Publisher::BusinessResearchInsights),
    ("globenewswire.com", Publisher::GlobeNewswire),
    ("theedgemalaysia.com", Publisher::TheEdgeMalaysia),
    ("catf.us", Publisher::CleanAirTaskForce),
    ("theloadstar.com", Publisher::TheLoadstar),
    ("transportenvironment.org", Publisher::TransportEnvironment),
    ("gminsights.com", Publisher::GlobalMarketInsights),
    ("grandviewresearch.com", Publisher::GrandViewResearch),
    ("resource-wise.com", Publisher::ResourceWise),
    ("reuters.com", Publisher::Reuters),
    ("rystadenergy.com", Publisher::RystadEnergy),
    ("ers.usda.gov", Publisher::ErsUsda),
    ("greencarcongress.com", Publisher::GreenCarCongress),
    ("waste-management-world.com", Publisher::WasteManagementWorld),
    ("ucsusa.org", Publisher::UnionOfConcernedScientists),
    ("think.ing.com", Publisher::IngThink),
    ("sciencedirect.com", Publisher::ScienceDirect),
    ("iea.org", Publisher::InternationalEnergyAgency),
    ("eia.gov", Publisher::EnergyInformationAdministration),
    ("ttnews.com", Publisher::TransportTopics),
    ("theguardian.com", Publisher::TheGuardian),
    ("nature.com", Publisher::Nature),
    ("thecounter.org", Publisher::TheCounter),
    ("cmegroup.com", Publisher::CmeGroup),
    ("energy.economictimes.indiatimes.com", Publisher::EtEnergyWorld),
    ("clariant.com", Publisher::Clariant),
    ("biofuels-news.com", Publisher::BiofuelsInternational),
    ("ourworldindata.org", Publisher::OurWorldInData),
    ("newscientist.com", Publisher::NewScientist),
    ("researchgate.net", Publisher::ResearchGate),
    ("finance.yahoo.com", Publisher::YahooFinance),
];

/// Extract the normalized domain of an absolute URL.
///
/// Returns `None` for anything that is not `scheme://authority...`.
pub fn domain_of(url: &str) -> Option<String> {
    let authority = AUTHORITY.captures(url.trim())?.get(1)?.as_str();
    let host = authority.rsplit('@').next().unwrap_or(authority);
    let host = match host.rfind(':') {
        Some(idx) if host[idx + 1..].chars().all(|c| c.is_ascii_digit()) => &host[..idx],
        _ => host,
    };
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let host = host.strip_prefix("www.").map(str::to_string).unwrap_or(host);
    (!host.is_empty()).then_some(host)
}

/// Resolves canonical URLs to publishers from a domain table.
#[derive(Debug, Clone)]
pub struct SiteIdentityResolver {
    domains: HashMap<String, Publisher>,
}

impl Default for SiteIdentityResolver {
    fn default() -> Self {
        Self::builtin()
    }
}

impl SiteIdentityResolver {
    /// The domain table shipped with the crate.
    pub fn builtin() -> Self {
        Self::from_domains(BUILTIN_DOMAINS.iter().map(|(d, p)| (d.to_string(), *p)))
    }

    /// A resolver over the given domain table. Domains are normalized the
    /// same way URLs are, so `www.` prefixes and case do not matter.
    pub fn from_domains<I>(domains: I) -> Self
    where
        I: IntoIterator<Item = (String, Publisher)>,
    {
        let domains = domains
            .into_iter()
            .map(|(domain, publisher)| (normalize(&domain), publisher))
            .collect();
        SiteIdentityResolver { domains }
    }

    /// Add or replace domain mappings.
    pub fn with_domains<I>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = (String, Publisher)>,
    {
        self.domains
            .extend(extra.into_iter().map(|(d, p)| (normalize(&d), p)));
        self
    }

    /// Publisher owning `canonical_url`, or [`Publisher::Unknown`].
    pub fn resolve(&self, canonical_url: &str) -> Publisher {
        let publisher = domain_of(canonical_url)
            .and_then(|domain| self.domains.get(&domain).copied())
            .unwrap_or(Publisher::Unknown);
        debug!(url = canonical_url, %publisher, "Resolved publisher");
        publisher
    }
}

fn normalize(domain: &str) -> String {
    let lower = domain.trim().trim_end_matches('.').to_ascii_lowercase();
    lower.strip_prefix("www.").map(str::to_string).unwrap_or(lower)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_of() {
        assert_eq!(
            domain_of("https://www.fastmarkets.com/insights/x?y=1").as_deref(),
            Some("fastmarkets.com")
        );
        assert_eq!(
            domain_of("http://user:pw@WWW.EIA.GOV:8080/todayinenergy").as_deref(),
            Some("eia.gov")
        );
        assert_eq!(
            domain_of("https://finance.yahoo.com").as_deref(),
            Some("finance.yahoo.com")
        );
        assert_eq!(domain_of("not a url"), None);
        assert_eq!(domain_of("/relative/path"), None);
        assert_eq!(domain_of("https://"), None);
    }

    #[test]
    fn test_resolve_builtin() {
        let sites = SiteIdentityResolver::builtin();
        assert_eq!(
            sites.resolve("https://www.fastmarkets.com/insights/price-up"),
            Publisher::Fastmarkets
        );
        assert_eq!(
            sites.resolve("https://www.fas.usda.gov/data/report"),
            Publisher::FasUsda
        );
        assert_eq!(
            sites.resolve("https://www.ers.usda.gov/amber-waves"),
            Publisher::ErsUsda
        );
        assert_eq!(sites.resolve("https://blog.example.org/"), Publisher::Unknown);
        assert_eq!(sites.resolve("::garbage::"), Publisher::Unknown);
    }

    #[test]
    fn test_every_known_publisher_has_a_domain() {
        for publisher in Publisher::KNOWN {
            assert!(
                BUILTIN_DOMAINS.iter().any(|(_, p)| p == publisher),
                "{publisher} has no domain"
            );
        }
    }

    #[test]
    fn test_extra_domains() {
        let sites = SiteIdentityResolver::builtin()
            .with_domains([("WWW.Reuters.co.uk".to_string(), Publisher::Reuters)]);
        assert_eq!(
            sites.resolve("https://reuters.co.uk/markets"),
            Publisher::Reuters
        );
    }
}
