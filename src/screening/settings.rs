use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Default log table, prefix-relative.
pub const DEFAULT_LOG_TABLE: &str = "{db_prefix}log_screening";

/// Configuration handed to the screening library, assembled from the forum's
/// settings map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreeningSettings {
    pub log_table: String,
    pub display_stats: bool,
    pub strict: bool,
    pub verbose: bool,
    pub logging: bool,
    /// Project Honey Pot http:BL access key, when one is configured and
    /// well-formed.
    pub httpbl_key: Option<String>,
    pub httpbl_threat: u32,
    pub httpbl_maxage: u32,
    pub eu_cookie: bool,
    pub offsite_forms: bool,
    pub reverse_proxy: bool,
    pub reverse_proxy_header: String,
    pub reverse_proxy_addresses: Vec<String>,
}

impl ScreeningSettings {
    /// Assemble the settings the screening library needs from the forum's
    /// settings map.
    ///
    /// The reverse-proxy address list is `|`-separated; an empty list forces
    /// the reverse-proxy flag off. An http:BL key that does not look valid
    /// (exactly twelve lowercase ASCII letters) is dropped rather than
    /// passed on.
    pub fn from_map(settings: &HashMap<String, String>) -> Self {
        let reverse_proxy_addresses: Vec<String> = settings
            .get("screening_reverse_proxy_addresses")
            .map(|raw| {
                raw.split('|')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let reverse_proxy =
            truthy(settings, "screening_reverse_proxy") && !reverse_proxy_addresses.is_empty();

        let httpbl_key = settings
            .get("screening_httpbl_key")
            .filter(|key| is_valid_httpbl_key(key))
            .cloned();

        Self {
            log_table: DEFAULT_LOG_TABLE.to_string(),
            display_stats: truthy(settings, "screening_display_stats"),
            strict: truthy(settings, "screening_strict"),
            verbose: truthy(settings, "screening_verbose"),
            logging: truthy(settings, "screening_logging"),
            httpbl_key,
            httpbl_threat: parse_num(settings, "screening_httpbl_threat", 25),
            httpbl_maxage: parse_num(settings, "screening_httpbl_maxage", 30),
            eu_cookie: truthy(settings, "screening_eu_cookie"),
            offsite_forms: truthy(settings, "screening_offsite_forms"),
            reverse_proxy,
            reverse_proxy_header: settings
                .get("screening_reverse_proxy_header")
                .cloned()
                .unwrap_or_else(|| "X-Forwarded-For".to_string()),
            reverse_proxy_addresses,
        }
    }
}

/// Request attributes exempt from screening.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Whitelist {
    pub ip: Vec<String>,
    pub url: Vec<String>,
    pub useragent: Vec<String>,
}

/// Read the whitelist lists from the settings map.
/// Returns `None` when all three lists are empty.
pub fn read_whitelist(settings: &HashMap<String, String>) -> Option<Whitelist> {
    let ip = read_list(settings, "screening_ip_whitelist");
    let url = read_list(settings, "screening_url_whitelist");
    let useragent = read_list(settings, "screening_useragent_whitelist");

    if ip.is_empty() && url.is_empty() && useragent.is_empty() {
        return None;
    }
    Some(Whitelist { ip, url, useragent })
}

fn read_list(settings: &HashMap<String, String>, key: &str) -> Vec<String> {
    settings
        .get(key)
        .and_then(|raw| serde_json::from_str::<Vec<String>>(raw).ok())
        .map(|list| list.into_iter().filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}

fn truthy(settings: &HashMap<String, String>, key: &str) -> bool {
    settings
        .get(key)
        .map(|v| !v.is_empty() && v != "0")
        .unwrap_or(false)
}

fn parse_num(settings: &HashMap<String, String>, key: &str, default: u32) -> u32 {
    settings
        .get(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn is_valid_httpbl_key(key: &str) -> bool {
    key.len() == 12 && key.chars().all(|c| c.is_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_on_empty_map() {
        let settings = ScreeningSettings::from_map(&HashMap::new());
        assert!(!settings.logging);
        assert!(!settings.reverse_proxy);
        assert_eq!(settings.httpbl_key, None);
        assert_eq!(settings.log_table, DEFAULT_LOG_TABLE);
        assert_eq!(settings.reverse_proxy_header, "X-Forwarded-For");
    }

    #[test]
    fn test_httpbl_key_validation() {
        let good = map(&[("screening_httpbl_key", "abcdefghijkl")]);
        assert_eq!(
            ScreeningSettings::from_map(&good).httpbl_key.as_deref(),
            Some("abcdefghijkl")
        );

        for bad in ["short", "ABCDEFGHIJKL", "abcdefghijk9", "abcdefghijklm"] {
            let settings = ScreeningSettings::from_map(&map(&[("screening_httpbl_key", bad)]));
            assert_eq!(settings.httpbl_key, None, "key `{bad}` should be dropped");
        }
    }

    #[test]
    fn test_reverse_proxy_requires_addresses() {
        let enabled = map(&[
            ("screening_reverse_proxy", "1"),
            ("screening_reverse_proxy_addresses", "10.0.0.1| 10.0.0.2 "),
        ]);
        let settings = ScreeningSettings::from_map(&enabled);
        assert!(settings.reverse_proxy);
        assert_eq!(settings.reverse_proxy_addresses, vec!["10.0.0.1", "10.0.0.2"]);

        let no_addresses = map(&[("screening_reverse_proxy", "1")]);
        assert!(!ScreeningSettings::from_map(&no_addresses).reverse_proxy);
    }

    #[test]
    fn test_whitelist_none_when_empty() {
        assert_eq!(read_whitelist(&HashMap::new()), None);

        let blanks = map(&[("screening_ip_whitelist", r#"["", ""]"#)]);
        assert_eq!(read_whitelist(&blanks), None);
    }

    #[test]
    fn test_whitelist_parses_lists() {
        let settings = map(&[
            ("screening_ip_whitelist", r#"["127.0.0.1"]"#),
            ("screening_useragent_whitelist", r#"["health-check", ""]"#),
        ]);
        let whitelist = read_whitelist(&settings).unwrap();
        assert_eq!(whitelist.ip, vec!["127.0.0.1"]);
        assert!(whitelist.url.is_empty());
        assert_eq!(whitelist.useragent, vec!["health-check"]);
    }

    #[test]
    fn test_malformed_whitelist_is_ignored() {
        let settings = map(&[("screening_ip_whitelist", "not json")]);
        assert_eq!(read_whitelist(&settings), None);
    }
}
