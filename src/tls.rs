use crate::ClientConfig;

/// TLS setup chosen for the HTTP transport.
#[derive(Clone)]
pub(crate) enum TlsSettings {
    /// Plain `http://` endpoint; no TLS configuration is applied.
    Plain,
    /// Platform defaults of the rustls backend.
    Default,
    /// Caller-provided rustls configuration.
    Custom(rustls::ClientConfig),
    /// Trusts only the given roots, with TLS 1.2 as the minimum version.
    RootCerts(Vec<reqwest::Certificate>),
}

impl TlsSettings {
    pub(crate) fn select(scheme: &str, config: &ClientConfig) -> Self {
        if scheme != "https" {
            return Self::Plain;
        }
        if let Some(custom) = &config.tls_config {
            return Self::Custom(custom.clone());
        }
        if !config.ca_certs.is_empty() {
            return Self::RootCerts(config.ca_certs.clone());
        }
        Self::Default
    }

    pub(crate) fn apply(self, builder: reqwest::ClientBuilder) -> reqwest::ClientBuilder {
        match self {
            Self::Plain | Self::Default => builder,
            Self::Custom(tls) => builder.use_preconfigured_tls(tls),
            Self::RootCerts(certs) => certs
                .into_iter()
                .fold(builder.tls_built_in_root_certs(false), |builder, cert| {
                    builder.add_root_certificate(cert)
                })
                .min_tls_version(reqwest::tls::Version::TLS_1_2),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::TlsSettings;
    use crate::ClientConfig;

    fn custom_tls() -> rustls::ClientConfig {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        rustls::ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .expect("ring supports the default protocol versions")
            .with_root_certificates(rustls::RootCertStore::empty())
            .with_no_client_auth()
    }

    #[test]
    fn plain_http_skips_tls() {
        let mut config = ClientConfig::new("token");
        config.tls_config = Some(custom_tls());
        assert!(matches!(
            TlsSettings::select("http", &config),
            TlsSettings::Plain
        ));
    }

    #[test]
    fn custom_config_takes_precedence() {
        let mut config = ClientConfig::new("token");
        config.tls_config = Some(custom_tls());
        assert!(matches!(
            TlsSettings::select("https", &config),
            TlsSettings::Custom(_)
        ));
    }

    fn test_ca() -> reqwest::Certificate {
        reqwest::Certificate::from_pem(include_bytes!("../tests/fixtures/test-ca.pem"))
            .expect("fixture must be a PEM certificate")
    }

    #[test]
    fn ca_certs_select_root_certs() {
        let mut config = ClientConfig::new("token");
        config.ca_certs = vec![test_ca()];
        match TlsSettings::select("https", &config) {
            TlsSettings::RootCerts(certs) => assert_eq!(certs.len(), 1),
            _ => panic!("expected root certificate settings"),
        }
    }

    #[test]
    fn custom_beats_ca_certs() {
        let mut config = ClientConfig::new("token");
        config.ca_certs = vec![test_ca()];
        config.tls_config = Some(custom_tls());
        assert!(matches!(
            TlsSettings::select("https", &config),
            TlsSettings::Custom(_)
        ));
    }

    #[test]
    fn root_certs_build_a_client() {
        let builder = TlsSettings::RootCerts(vec![test_ca()]).apply(reqwest::Client::builder());
        builder.build().expect("client with private roots must build");
    }

    #[test]
    fn https_without_overrides_uses_defaults() {
        let config = ClientConfig::new("token");
        assert!(matches!(
            TlsSettings::select("https", &config),
            TlsSettings::Default
        ));
    }
}
