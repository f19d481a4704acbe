// Appliance HTTP client
//
// Wraps `reqwest::Client` with Powerbrain-specific URL construction, basic
// auth and status-code classification. Endpoint groups (status reads,
// override commands) are inherent methods in separate files so this module
// stays focused on transport mechanics.

use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;

use crate::auth::BasicAuth;
use crate::error::Error;
use crate::transport::TransportConfig;

/// Raw HTTP client for a single Powerbrain appliance.
///
/// Stateless per call: no caching and no retries. Every request carries the
/// configured timeout, so no call blocks longer than that bound.
#[derive(Debug, Clone)]
pub struct ApplianceClient {
    http: reqwest::Client,
    base_url: Url,
    auth: Option<BasicAuth>,
    timeout_secs: u64,
}

impl ApplianceClient {
    /// Create a client from a `TransportConfig`.
    ///
    /// `base_url` is the appliance root, e.g. `http://192.168.1.50`.
    pub fn new(
        base_url: Url,
        auth: Option<BasicAuth>,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self {
            http,
            base_url,
            auth,
            timeout_secs: transport.timeout.as_secs(),
        })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url, auth: Option<BasicAuth>) -> Self {
        Self {
            http,
            base_url,
            auth,
            timeout_secs: crate::transport::DEFAULT_TIMEOUT.as_secs(),
        }
    }

    /// The appliance base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Whether requests carry basic-auth credentials.
    pub fn has_auth(&self) -> bool {
        self.auth.is_some()
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Build `{base}/{path}` without dropping a path prefix on the base URL.
    pub(crate) fn url(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }

    /// Build the `/cnf?cmd={cmd}&...` command URL.
    pub(crate) fn cnf_url(&self, cmd: &str, params: &[(&str, &str)]) -> Result<Url, Error> {
        let mut url = self.url("cnf")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("cmd", cmd);
            for (key, value) in params {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }

    // ── Request helpers ──────────────────────────────────────────────

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            Some(auth) => auth.apply(builder),
            None => builder,
        }
    }

    /// Send a request, mapping transport failures.
    pub(crate) async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        authenticated: bool,
    ) -> Result<reqwest::Response, Error> {
        let builder = if authenticated {
            self.authorize(builder)
        } else {
            builder
        };
        builder
            .send()
            .await
            .map_err(|e| Error::from_transport(e, self.timeout_secs))
    }

    /// GET a JSON document with auth, classifying the status code.
    pub(crate) async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!("GET {}", url);

        let resp = self.send(self.http.get(url), true).await?;
        let status = resp.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(Error::Authentication {
                status: status.as_u16(),
            });
        }

        let body = resp
            .text()
            .await
            .map_err(|e| Error::from_transport(e, self.timeout_secs))?;

        if !status.is_success() {
            return Err(Error::Protocol {
                message: format!("HTTP {status}"),
                body: truncate(&body),
            });
        }

        trace!(len = body.len(), "response body received");

        serde_json::from_str(&body).map_err(|e| Error::Protocol {
            message: e.to_string(),
            body: truncate(&body),
        })
    }

    /// Issue a `/cnf` write command via GET; non-2xx is a rejection.
    pub(crate) async fn command(
        &self,
        command: &'static str,
        params: &[(&str, &str)],
    ) -> Result<(), Error> {
        let url = self.cnf_url(command, params)?;
        debug!("GET {}", url);

        let resp = self.send(self.http.get(url), true).await?;
        ensure_accepted(command, &resp)
    }

    /// POST a JSON body to a `/cnf` command; non-2xx is a rejection.
    pub(crate) async fn post_command(
        &self,
        command: &'static str,
        params: &[(&str, &str)],
        body: &(impl serde::Serialize + Sync),
    ) -> Result<(), Error> {
        let url = self.cnf_url(command, params)?;
        debug!("POST {}", url);

        let resp = self.send(self.http.post(url).json(body), true).await?;
        ensure_accepted(command, &resp)
    }

    /// Issue a `/cnf` command without auth and without judging the status.
    pub(crate) async fn fire(
        &self,
        command: &'static str,
        params: &[(&str, &str)],
    ) -> Result<(), Error> {
        let url = self.cnf_url(command, params)?;
        debug!("GET {}", url);

        let resp = self.send(self.http.get(url), false).await?;
        trace!(status = %resp.status(), command, "best-effort command sent");
        Ok(())
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }
}

fn ensure_accepted(command: &'static str, resp: &reqwest::Response) -> Result<(), Error> {
    let status = resp.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(Error::Command {
            command,
            status: status.as_u16(),
        })
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(200).collect()
}
