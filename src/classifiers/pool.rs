//! Pool inference from the proxy's `upstream_addr` field
//!
//! When the proxy does not log the pool directly, the serving upstream has to be
//! inferred from its address. The heuristics are kept as an ordered list of rules
//! so their precedence is explicit: service name, then port, then configured
//! address lists. The first rule that matches wins.

use crate::events::PoolIdentity;
use log::{debug, warn};

/// Port conventionally mapped to the blue pool
pub const BLUE_PORT: &str = "8081";
/// Port conventionally mapped to the green pool
pub const GREEN_PORT: &str = "8082";

/// Operator-supplied addresses known to belong to each pool
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KnownAddresses {
    pub blue: Vec<String>,
    pub green: Vec<String>,
}

impl KnownAddresses {
    /// Build address lists, trimming and lower-casing entries and dropping empty ones
    pub fn new<B, G, S>(blue: B, green: G) -> Self
    where
        B: IntoIterator<Item = S>,
        G: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            blue: normalize(blue),
            green: normalize(green),
        }
    }

    /// Build address lists from comma-separated values (e.g. `BLUE_IPS`)
    pub fn from_csv(blue: &str, green: &str) -> Self {
        Self::new(blue.split(','), green.split(','))
    }
}

fn normalize<I, S>(entries: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    entries
        .into_iter()
        .map(|entry| entry.as_ref().trim().to_lowercase())
        .filter(|entry| !entry.is_empty())
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
enum Matcher {
    Contains(String),
    AnyOf(Vec<String>),
}

impl Matcher {
    fn matches(&self, addr: &str) -> bool {
        match self {
            Matcher::Contains(needle) => addr.contains(needle.as_str()),
            Matcher::AnyOf(needles) => needles.iter().any(|needle| addr.contains(needle.as_str())),
        }
    }
}

/// A single classification rule: if the address matches, it belongs to `pool`
#[derive(Debug, Clone, PartialEq)]
pub struct PoolRule {
    name: &'static str,
    matcher: Matcher,
    pool: PoolIdentity,
}

impl PoolRule {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn pool(&self) -> PoolIdentity {
        self.pool
    }

    /// `addr` must already be trimmed and lower-cased
    pub fn matches(&self, addr: &str) -> bool {
        self.matcher.matches(addr)
    }
}

/// Infers the serving pool from an upstream address
#[derive(Debug, Clone)]
pub struct PoolClassifier {
    rules: Vec<PoolRule>,
}

impl Default for PoolClassifier {
    fn default() -> Self {
        Self::new(&KnownAddresses::default())
    }
}

impl PoolClassifier {
    /// Create a classifier with the built-in rules followed by the known address lists
    pub fn new(known: &KnownAddresses) -> Self {
        let mut rules = vec![
            PoolRule {
                name: "service-name-blue",
                matcher: Matcher::Contains("blue".to_string()),
                pool: PoolIdentity::Blue,
            },
            PoolRule {
                name: "service-name-green",
                matcher: Matcher::Contains("green".to_string()),
                pool: PoolIdentity::Green,
            },
            PoolRule {
                name: "port-blue",
                matcher: Matcher::Contains(BLUE_PORT.to_string()),
                pool: PoolIdentity::Blue,
            },
            PoolRule {
                name: "port-green",
                matcher: Matcher::Contains(GREEN_PORT.to_string()),
                pool: PoolIdentity::Green,
            },
        ];

        if !known.blue.is_empty() {
            rules.push(PoolRule {
                name: "known-blue-address",
                matcher: Matcher::AnyOf(known.blue.clone()),
                pool: PoolIdentity::Blue,
            });
        }
        if !known.green.is_empty() {
            rules.push(PoolRule {
                name: "known-green-address",
                matcher: Matcher::AnyOf(known.green.clone()),
                pool: PoolIdentity::Green,
            });
        }

        Self { rules }
    }

    /// Rules in evaluation order
    pub fn rules(&self) -> &[PoolRule] {
        &self.rules
    }

    /// Classify an upstream address into a pool
    ///
    /// Absent, empty, or unrecognizable input yields `PoolIdentity::Unknown`.
    pub fn classify(&self, upstream_addr: Option<&str>) -> PoolIdentity {
        match self.classify_with_rule(upstream_addr) {
            Some(rule) => rule.pool,
            None => {
                if let Some(raw) = upstream_addr.filter(|raw| !raw.trim().is_empty()) {
                    warn!("Could not detect pool from upstream_addr: {}", raw);
                }
                PoolIdentity::Unknown
            }
        }
    }

    /// Return the first rule that matches the served address, if any
    pub fn classify_with_rule(&self, upstream_addr: Option<&str>) -> Option<&PoolRule> {
        let addr = served_address(upstream_addr?)?;
        let rule = self.rules.iter().find(|rule| rule.matches(&addr))?;
        debug!("upstream '{}' matched rule {} -> {}", addr, rule.name, rule.pool);
        Some(rule)
    }
}

/// Classify with a throwaway classifier built from `known`
pub fn classify(upstream_addr: Option<&str>, known: &KnownAddresses) -> PoolIdentity {
    PoolClassifier::new(known).classify(upstream_addr)
}

/// The address that ultimately served the request
///
/// The proxy logs every attempted upstream as a comma-separated list; the last
/// entry is the one that answered. Returns `None` for empty input.
fn served_address(raw: &str) -> Option<String> {
    let lowered = raw.to_lowercase();
    if lowered.trim().is_empty() {
        return None;
    }

    let last = lowered
        .split(',')
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .last()
        .map(str::to_string);

    Some(last.unwrap_or(lowered))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> PoolClassifier {
        PoolClassifier::default()
    }

    #[test]
    fn test_port_mapping() {
        assert_eq!(classifier().classify(Some("10.0.0.2:8081")), PoolIdentity::Blue);
        assert_eq!(classifier().classify(Some("10.0.0.3:8082")), PoolIdentity::Green);
    }

    #[test]
    fn test_last_attempt_wins() {
        assert_eq!(
            classifier().classify(Some("10.0.0.5:8082, 10.0.0.2:8081")),
            PoolIdentity::Blue
        );
        assert_eq!(
            classifier().classify(Some("app_blue:3000, app_green:3000")),
            PoolIdentity::Green
        );
    }

    #[test]
    fn test_empty_and_absent_input() {
        assert_eq!(classifier().classify(Some("")), PoolIdentity::Unknown);
        assert_eq!(classifier().classify(Some("   ")), PoolIdentity::Unknown);
        assert_eq!(classifier().classify(None), PoolIdentity::Unknown);
    }

    #[test]
    fn test_service_name() {
        assert_eq!(
            classifier().classify(Some("my-green-service:4000")),
            PoolIdentity::Green
        );
        assert_eq!(classifier().classify(Some("APP-BLUE:3000")), PoolIdentity::Blue);
    }

    #[test]
    fn test_service_name_beats_port() {
        // name rules come before port rules
        assert_eq!(classifier().classify(Some("green-host:8081")), PoolIdentity::Green);
        let c = classifier();
        let rule = c.classify_with_rule(Some("green-host:8081")).unwrap();
        assert_eq!(rule.name(), "service-name-green");
    }

    #[test]
    fn test_port_without_colon() {
        assert_eq!(classifier().classify(Some("upstream8082")), PoolIdentity::Green);
    }

    #[test]
    fn test_known_addresses() {
        let known = KnownAddresses::from_csv("172.18.0.2, 172.18.0.4", " ,172.18.0.3,");
        let classifier = PoolClassifier::new(&known);

        assert_eq!(classifier.classify(Some("172.18.0.3:3000")), PoolIdentity::Green);
        assert_eq!(
            classifier.classify(Some("172.18.0.3:3000, 172.18.0.4:3000")),
            PoolIdentity::Blue
        );
        assert_eq!(classifier.classify(Some("172.18.0.9:3000")), PoolIdentity::Unknown);
    }

    #[test]
    fn test_known_addresses_have_lowest_precedence() {
        let known = KnownAddresses::new(["10.0.0.7"], Vec::<&str>::new());
        let classifier = PoolClassifier::new(&known);
        assert_eq!(classifier.classify(Some("10.0.0.7:8082")), PoolIdentity::Green);
    }

    #[test]
    fn test_known_addresses_normalization() {
        let known = KnownAddresses::from_csv(" A.Host ,,", "");
        assert_eq!(known.blue, vec!["a.host".to_string()]);
        assert!(known.green.is_empty());
        assert_eq!(PoolClassifier::new(&known).rules().len(), 5);
    }

    #[test]
    fn test_only_separators_falls_back_to_whole_string() {
        assert_eq!(served_address(" , ,"), Some(" , ,".to_string()));
        assert_eq!(classifier().classify(Some(" , ,")), PoolIdentity::Unknown);
    }

    #[test]
    fn test_free_function() {
        let known = KnownAddresses::default();
        assert_eq!(classify(Some("10.0.0.2:8081"), &known), PoolIdentity::Blue);
        assert_eq!(classify(Some(""), &known), PoolIdentity::Unknown);
    }
}
