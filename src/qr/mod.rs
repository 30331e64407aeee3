//! QR code sharing through an external image endpoint

use url::Url;

use crate::config::settings::QrConfig;
use crate::error::{Error, Result};

/// URL of a PNG encoding `payload`, rendered by the configured endpoint.
/// Any query already on the endpoint is replaced.
pub fn qr_image_url(config: &QrConfig, payload: &str) -> Result<String> {
    if payload.trim().is_empty() {
        return Err(Error::Validation("nothing to encode".to_string()));
    }
    if config.size == 0 {
        return Err(Error::Config("QR size must be positive".to_string()));
    }

    let mut url = Url::parse(&config.endpoint)
        .map_err(|e| Error::Config(format!("invalid QR endpoint '{}': {}", config.endpoint, e)))?;
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("size", &format!("{}x{}", config.size, config.size))
        .append_pair("data", payload)
        .finish();
    url.set_query(Some(&query));

    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qr_url_encodes_payload() {
        let url = qr_image_url(&QrConfig::default(), "https://example.com/a?b=c&d=e").unwrap();
        assert_eq!(
            url,
            "https://api.qrserver.com/v1/create-qr-code/?size=200x200&data=https%3A%2F%2Fexample.com%2Fa%3Fb%3Dc%26d%3De"
        );
    }

    #[test]
    fn test_qr_rejects_bad_input() {
        assert!(matches!(qr_image_url(&QrConfig::default(), " "), Err(Error::Validation(_))));

        let config = QrConfig { endpoint: "not a url".to_string(), size: 100 };
        assert!(matches!(qr_image_url(&config, "x"), Err(Error::Config(_))));
    }
}
