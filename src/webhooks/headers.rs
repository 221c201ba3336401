//! Required GitHub delivery headers.

use std::collections::BTreeMap;

use crate::types::DeliveryId;

pub const DELIVERY_HEADER: &str = "X-GitHub-Delivery";
pub const EVENT_HEADER: &str = "X-GitHub-Event";
pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredHeaders {
    pub signature: String,
    pub event: String,
    pub delivery_id: DeliveryId,
}

/// Extracts the three headers every routable delivery carries.
///
/// Names match case-insensitively. Returns `None` if any is missing or blank,
/// which callers treat as a skip rather than an error.
pub fn require_headers(headers: &BTreeMap<String, String>) -> Option<RequiredHeaders> {
    Some(RequiredHeaders {
        signature: header(headers, SIGNATURE_HEADER)?,
        event: header(headers, EVENT_HEADER)?,
        delivery_id: DeliveryId::new(header(headers, DELIVERY_HEADER)?),
    })
}

fn header(headers: &BTreeMap<String, String>, name: &str) -> Option<String> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.trim())
        .filter(|v| !v.is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn all_present() {
        let found = require_headers(&headers(&[
            ("X-GitHub-Delivery", "d-1"),
            ("X-GitHub-Event", "issues"),
            ("X-Hub-Signature-256", "sha256=00"),
        ]))
        .unwrap();

        assert_eq!(found.delivery_id, DeliveryId::new("d-1"));
        assert_eq!(found.event, "issues");
        assert_eq!(found.signature, "sha256=00");
    }

    #[test]
    fn names_are_case_insensitive() {
        let found = require_headers(&headers(&[
            ("x-github-delivery", "d-1"),
            ("X-GITHUB-EVENT", "ping"),
            ("x-hub-signature-256", "sha256=00"),
        ]));
        assert!(found.is_some());
    }

    #[test]
    fn any_missing_or_blank_is_none() {
        assert_eq!(
            require_headers(&headers(&[
                ("X-GitHub-Delivery", "d-1"),
                ("X-GitHub-Event", "ping"),
            ])),
            None
        );
        assert_eq!(
            require_headers(&headers(&[
                ("X-GitHub-Delivery", " "),
                ("X-GitHub-Event", "ping"),
                ("X-Hub-Signature-256", "sha256=00"),
            ])),
            None
        );
        assert_eq!(require_headers(&BTreeMap::new()), None);
    }
}
