//! OpenDAL Operator factory for the remote backup target

use eclipse_core::config::RemoteConfig;
use eclipse_core::{EclipseError, EclipseResult};
use opendal::Operator;
use secrecy::{ExposeSecret, SecretString};

/// Minimal WebDAV connection settings
/// (the file-level config lives in eclipse-core's RemoteConfig)
#[derive(Debug, Clone)]
pub struct WebdavConfig {
    pub endpoint: String,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub root: String,
}

/// Build an OpenDAL Operator for a WebDAV server (Nextcloud, ownCloud, Apache mod_dav, ...).
pub fn build_operator(cfg: &WebdavConfig) -> EclipseResult<Operator> {
    // opendal 0.55: builders use the consuming pattern
    let mut builder = opendal::services::Webdav::default()
        .endpoint(&cfg.endpoint)
        .root(&cfg.root);
    if let Some(username) = &cfg.username {
        builder = builder.username(username);
    }
    if let Some(password) = &cfg.password {
        builder = builder.password(password.expose_secret());
    }

    let op = Operator::new(builder)
        .map_err(|e| EclipseError::Transport(format!("creating WebDAV operator: {e}")))?
        .layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(3)
                .with_jitter(),
        )
        .finish();

    Ok(op)
}

/// Build an operator from the `[remote]` config section plus a loaded password.
///
/// If `enforce_tls` is true and the endpoint uses HTTP, this returns an error.
/// Otherwise, a warning is logged for non-HTTPS endpoints.
pub fn build_from_remote_config(
    remote: &RemoteConfig,
    password: Option<SecretString>,
) -> EclipseResult<Operator> {
    if remote.endpoint.starts_with("http://") {
        if remote.enforce_tls {
            return Err(EclipseError::Config(format!(
                "WebDAV endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
                 Use an HTTPS endpoint or set remote.enforce_tls = false for local development.",
                remote.endpoint
            )));
        }
        tracing::warn!(
            endpoint = %remote.endpoint,
            "WebDAV endpoint uses plaintext HTTP, credentials and unencrypted backups are exposed. \
             Set remote.enforce_tls = true and use HTTPS in production."
        );
    }

    build_operator(&WebdavConfig {
        endpoint: remote.endpoint.clone(),
        username: remote.username.clone(),
        password,
        root: remote.root.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_operator_valid() {
        let cfg = WebdavConfig {
            endpoint: "http://localhost:8080/webdav".to_string(),
            username: Some("alice".to_string()),
            password: Some(SecretString::from("secret")),
            root: "/eclipse".to_string(),
        };
        assert!(build_operator(&cfg).is_ok(), "operator construction should succeed");
    }

    #[test]
    fn test_http_allowed_without_enforce_tls() {
        let remote = RemoteConfig {
            endpoint: "http://localhost:8080/webdav".into(),
            enforce_tls: false,
            ..Default::default()
        };
        assert!(build_from_remote_config(&remote, None).is_ok());
    }

    #[test]
    fn test_http_rejected_with_enforce_tls() {
        let remote = RemoteConfig {
            endpoint: "http://insecure:8080/webdav".into(),
            enforce_tls: true,
            ..Default::default()
        };
        let err = build_from_remote_config(&remote, None).unwrap_err();
        assert!(
            err.to_string().contains("enforce_tls"),
            "error message should mention enforce_tls"
        );
    }

    #[test]
    fn test_https_with_enforce_tls() {
        let remote = RemoteConfig {
            endpoint: "https://dav.example.com/remote.php/webdav".into(),
            enforce_tls: true,
            ..Default::default()
        };
        assert!(build_from_remote_config(&remote, Some(SecretString::from("pw"))).is_ok());
    }
}
