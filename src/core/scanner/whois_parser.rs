// src/core/scanner/whois_parser.rs

//! Turns raw WHOIS text into a [`WhoisInfo`].
//!
//! Registries disagree on key names, so every field is matched against a list of
//! aliases. Anything not recognised is ignored and absent fields stay empty.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::models::{WhoisContact, WhoisDomain, WhoisInfo};
use crate::error::ReconError;

/// Markers registries use for "this domain is not registered".
static NOT_FOUND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)^\s*(no match for|not found|no data found|no entries found|domain not found|status:\s*free|the queried object does not exist)",
    )
    .unwrap()
});

static RATE_LIMITED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(query rate limit exceeded|limit exceeded|too many requests)").unwrap()
});

#[derive(Clone, Copy)]
enum ContactRole {
    Registrar,
    Registrant,
    Administrative,
    Technical,
    Billing,
}

pub fn parse_whois(domain: &str, raw: &str) -> Result<WhoisInfo, ReconError> {
    let fail = |reason: &str| ReconError::WhoisParse {
        domain: domain.to_string(),
        reason: reason.to_string(),
    };

    if raw.trim().is_empty() {
        return Err(fail("empty response"));
    }
    if NOT_FOUND.is_match(raw) {
        return Err(fail("domain is not registered"));
    }
    if RATE_LIMITED.is_match(raw) {
        return Err(fail("server refused the query: rate limit exceeded"));
    }

    let mut info = WhoisInfo::default();
    let mut domain_info = WhoisDomain::default();
    let mut recognised = 0usize;

    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('%') || line.starts_with('#') || line.starts_with(">>>") {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();
        if value.is_empty() {
            continue;
        }

        if apply_domain_field(&mut domain_info, &key, value) {
            recognised += 1;
            continue;
        }
        if let Some((role, field)) = split_contact_key(&key) {
            let contact = contact_slot(&mut info, role).get_or_insert_with(WhoisContact::default);
            if apply_contact_field(contact, field, value) {
                recognised += 1;
            }
        }
    }

    if recognised == 0 {
        return Err(fail("no recognisable fields in response"));
    }

    if domain_info.domain.is_empty() {
        domain_info.domain = domain.to_lowercase();
    }
    if let Some((name, extension)) = domain_info.domain.clone().split_once('.') {
        domain_info.name = name.to_string();
        domain_info.extension = extension.to_string();
    }
    info.domain = Some(domain_info);

    Ok(info)
}

fn apply_domain_field(domain: &mut WhoisDomain, key: &str, value: &str) -> bool {
    match key {
        "registry domain id" | "domain id" | "roid" => set_once(&mut domain.id, value),
        "domain name" | "domain" => set_once(&mut domain.domain, &value.to_lowercase()),
        "registrar whois server" | "whois server" | "whois" => {
            set_once(&mut domain.whois_server, &value.to_lowercase())
        }
        "domain status" | "status" | "state" => {
            // "clientTransferProhibited https://icann.org/epp#..." keeps only the status word.
            let status = value.split_whitespace().next().unwrap_or(value).to_string();
            if !domain.status.contains(&status) {
                domain.status.push(status);
            }
        }
        "name server" | "nserver" | "nameserver" | "name servers" => {
            let ns = value
                .split_whitespace()
                .next()
                .unwrap_or(value)
                .trim_end_matches('.')
                .to_lowercase();
            if !domain.name_servers.contains(&ns) {
                domain.name_servers.push(ns);
            }
        }
        "dnssec" => {
            let lower = value.to_lowercase();
            domain.dnssec = lower.starts_with("signed") || lower == "yes" || lower == "active";
        }
        "creation date" | "created" | "created on" | "registered on" | "registration time" => {
            set_once(&mut domain.created_date, value)
        }
        "updated date" | "last updated" | "last-update" | "changed" | "last modified" => {
            set_once(&mut domain.updated_date, value)
        }
        "registry expiry date" | "registrar registration expiration date" | "expiration date"
        | "expiry date" | "expires" | "expires on" | "paid-till" => {
            set_once(&mut domain.expiration_date, value)
        }
        _ => return false,
    }
    true
}

/// Splits keys like "registrant organization" or "tech email" into a role and a field.
fn split_contact_key(key: &str) -> Option<(ContactRole, &str)> {
    const PREFIXES: &[(&str, ContactRole)] = &[
        ("registrant ", ContactRole::Registrant),
        ("admin ", ContactRole::Administrative),
        ("administrative ", ContactRole::Administrative),
        ("tech ", ContactRole::Technical),
        ("technical ", ContactRole::Technical),
        ("billing ", ContactRole::Billing),
        ("registrar ", ContactRole::Registrar),
    ];

    if key == "registrar" || key == "sponsoring registrar" {
        return Some((ContactRole::Registrar, "name"));
    }
    if key == "registrant" {
        return Some((ContactRole::Registrant, "name"));
    }
    PREFIXES
        .iter()
        .find_map(|(prefix, role)| key.strip_prefix(prefix).map(|field| (*role, field)))
}

fn contact_slot(info: &mut WhoisInfo, role: ContactRole) -> &mut Option<WhoisContact> {
    match role {
        ContactRole::Registrar => &mut info.registrar,
        ContactRole::Registrant => &mut info.registrant,
        ContactRole::Administrative => &mut info.administrative,
        ContactRole::Technical => &mut info.technical,
        ContactRole::Billing => &mut info.billing,
    }
}

fn apply_contact_field(contact: &mut WhoisContact, field: &str, value: &str) -> bool {
    match field {
        "id" | "iana id" => set_once(&mut contact.id, value),
        "name" => set_once(&mut contact.name, value),
        "organization" | "organisation" | "org" => set_once(&mut contact.organization, value),
        "street" | "address" => {
            if contact.street.is_empty() {
                contact.street = value.to_string();
            } else {
                contact.street.push_str(", ");
                contact.street.push_str(value);
            }
        }
        "city" => set_once(&mut contact.city, value),
        "state/province" | "province" | "state" => set_once(&mut contact.province, value),
        "postal code" | "postalcode" | "zip" => set_once(&mut contact.postal_code, value),
        "country" | "country code" => set_once(&mut contact.country, value),
        "phone" | "abuse contact phone" => set_once(&mut contact.phone, value),
        "fax" => set_once(&mut contact.fax, value),
        "email" | "abuse contact email" => set_once(&mut contact.email, &value.to_lowercase()),
        "url" | "referral url" => set_once(&mut contact.referral_url, value),
        _ => return false,
    }
    true
}

fn set_once(slot: &mut String, value: &str) {
    if slot.is_empty() {
        *slot = value.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOGLE_COM: &str = "\
   Domain Name: GOOGLE.COM
   Registry Domain ID: 2138514_DOMAIN_COM-VRSN
   Registrar WHOIS Server: whois.markmonitor.com
   Registrar URL: http://www.markmonitor.com
   Updated Date: 2019-09-09T15:39:04Z
   Creation Date: 1997-09-15T04:00:00Z
   Registry Expiry Date: 2028-09-14T04:00:00Z
   Registrar: MarkMonitor Inc.
   Registrar IANA ID: 292
   Registrar Abuse Contact Email: abusecomplaints@markmonitor.com
   Domain Status: clientDeleteProhibited https://icann.org/epp#clientDeleteProhibited
   Domain Status: serverDeleteProhibited https://icann.org/epp#serverDeleteProhibited
   Name Server: NS1.GOOGLE.COM
   Name Server: NS2.GOOGLE.COM
   DNSSEC: unsigned
Registrant Organization: Google LLC
Registrant State/Province: CA
Registrant Country: US
Registrant Email: Select Request Email Form at https://domains.markmonitor.com/whois/google.com
Tech Organization: Google LLC
>>> Last update of whois database: 2024-01-01T00:00:00Z <<<
";

    #[test]
    fn parses_registry_and_registrar_fields() {
        let info = parse_whois("google.com", GOOGLE_COM).unwrap();

        let domain = info.domain.unwrap();
        assert_eq!(domain.domain, "google.com");
        assert_eq!(domain.name, "google");
        assert_eq!(domain.extension, "com");
        assert_eq!(domain.id, "2138514_DOMAIN_COM-VRSN");
        assert_eq!(domain.whois_server, "whois.markmonitor.com");
        assert_eq!(domain.created_date, "1997-09-15T04:00:00Z");
        assert_eq!(domain.expiration_date, "2028-09-14T04:00:00Z");
        assert_eq!(
            domain.status,
            vec!["clientDeleteProhibited", "serverDeleteProhibited"]
        );
        assert_eq!(domain.name_servers, vec!["ns1.google.com", "ns2.google.com"]);
        assert!(!domain.dnssec);

        let registrar = info.registrar.unwrap();
        assert_eq!(registrar.name, "MarkMonitor Inc.");
        assert_eq!(registrar.id, "292");
        assert_eq!(registrar.referral_url, "http://www.markmonitor.com");
        assert_eq!(registrar.email, "abusecomplaints@markmonitor.com");

        let registrant = info.registrant.unwrap();
        assert_eq!(registrant.organization, "Google LLC");
        assert_eq!(registrant.province, "CA");
        assert_eq!(registrant.country, "US");

        assert_eq!(info.technical.unwrap().organization, "Google LLC");
        assert!(info.billing.is_none());
    }

    #[test]
    fn absent_fields_stay_empty() {
        let info = parse_whois("example.org", "Domain Name: EXAMPLE.ORG\n").unwrap();
        let domain = info.domain.unwrap();
        assert_eq!(domain.domain, "example.org");
        assert!(domain.created_date.is_empty());
        assert!(info.registrar.is_none());
    }

    #[test]
    fn unregistered_domain_is_an_error() {
        let err = parse_whois("nope-nope.com", "No match for \"NOPE-NOPE.COM\".\n").unwrap_err();
        assert_eq!(err.code(), "whois_parse_error");
    }

    #[test]
    fn response_without_fields_is_an_error() {
        assert!(parse_whois("example.com", "% just a banner\n\n").is_err());
        assert!(parse_whois("example.com", "").is_err());
    }
}
