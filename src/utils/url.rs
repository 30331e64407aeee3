//! URL utility functions

use crate::error::{Error, Result};
use url::{Host, Url};

/// Longest hostname a DNS name can carry
pub const MAX_HOSTNAME_LEN: usize = 253;

/// Parse URL and extract components
pub fn parse_url(url_str: &str) -> std::result::Result<Url, url::ParseError> {
    Url::parse(url_str)
}

/// Turn user input into a canonical absolute URL.
///
/// Input without a scheme is assumed to be `https://`. The result must have a
/// hostname of at most 253 characters that is an IP literal, `localhost`, or a
/// dotted name ending in a top-level domain of two or more letters.
pub fn normalize_url(input: &str) -> Result<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation("URL is empty".to_string()));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let parsed = parse_url(&candidate)
        .map_err(|e| Error::Validation(format!("'{}' is not a valid URL: {}", trimmed, e)))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::Validation(format!("unsupported scheme '{}'", parsed.scheme())));
    }

    match parsed.host() {
        None => return Err(Error::Validation(format!("'{}' has no hostname", trimmed))),
        Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) => {}
        Some(Host::Domain(domain)) => validate_domain(domain)?,
    }

    Ok(without_trailing_slash(parsed))
}

/// Drop trailing slashes from the path only; query and fragment are kept as given
fn without_trailing_slash(mut parsed: Url) -> String {
    let path = parsed.path().trim_end_matches('/').to_string();
    if !path.is_empty() {
        parsed.set_path(&path);
    }

    let serialized = parsed.to_string();
    if path.is_empty() && parsed.query().is_none() && parsed.fragment().is_none() {
        serialized.trim_end_matches('/').to_string()
    } else {
        serialized
    }
}

fn validate_domain(domain: &str) -> Result<()> {
    if domain.is_empty() {
        return Err(Error::Validation("hostname is empty".to_string()));
    }
    if domain.len() > MAX_HOSTNAME_LEN {
        return Err(Error::Validation(format!(
            "hostname is {} characters, limit is {}",
            domain.len(),
            MAX_HOSTNAME_LEN
        )));
    }
    if domain == "localhost" {
        return Ok(());
    }

    let tld = domain.trim_end_matches('.').rsplit('.').next().unwrap_or_default();
    let has_dot = domain.trim_end_matches('.').contains('.');
    if !has_dot || tld.len() < 2 || !tld.chars().all(|c| c.is_ascii_alphabetic() || c == '-') {
        return Err(Error::Validation(format!("'{}' has no top-level domain", domain)));
    }

    Ok(())
}

/// Location of the site's favicon, used by the asset-load probe
pub fn favicon_url(url_str: &str) -> Result<String> {
    let parsed = parse_url(url_str)?;
    Ok(parsed.join("/favicon.ico")?.to_string())
}

/// Host part of a URL, if any
pub fn host_of(url_str: &str) -> Option<String> {
    parse_url(url_str).ok()?.host_str().map(|h| h.to_string())
}
