//! Re-authentication redirect.

use tracing::{debug, warn};

/// Reacts to an HTTP status seen by any request or probe.
/// Only `401` does anything.
pub trait AuthRedirect: Send + Sync + 'static {
    fn redirect(&self, status: u16);
}

/// `{api_url}/auth/login?redirect_uri={web_url}/operator`
pub fn login_url(api_url: &str, web_url: &str) -> String {
    let target = format!("{}/operator", web_url.trim_end_matches('/'));
    format!(
        "{}/auth/login?redirect_uri={}",
        api_url.trim_end_matches('/'),
        urlencoding::encode(&target)
    )
}

/// Logs the login URL and hands it to a surface callback.
pub struct LoginRedirect {
    url: String,
    on_redirect: Box<dyn Fn(&str) + Send + Sync>,
}

impl LoginRedirect {
    pub fn new(
        api_url: &str,
        web_url: &str,
        on_redirect: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        Self {
            url: login_url(api_url, web_url),
            on_redirect: Box::new(on_redirect),
        }
    }

    #[allow(dead_code)]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl AuthRedirect for LoginRedirect {
    fn redirect(&self, status: u16) {
        if status != 401 {
            debug!(
                component = "redirect",
                event = "redirect.skipped",
                status,
                "Status does not require re-authentication"
            );
            return;
        }
        warn!(
            component = "redirect",
            event = "redirect.login",
            url = %self.url,
            "Session expired, re-authentication required"
        );
        (self.on_redirect)(&self.url);
    }
}
