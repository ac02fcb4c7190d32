use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::error::{DomwatchError, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// A token this close to expiry is renewed before use.
pub const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(5 * 60);

pub const DEFAULT_GROUP: &str = "DEFAULT_GROUP";
pub const DEFAULT_DATA_ID: &str = "domain-monitor-config";

const CONFIG_PATH: &str = "/nacos/v1/cs/configs";
const LOGIN_PATH: &str = "/nacos/v1/auth/login";

/// Where the configuration document lives in the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSettings {
    pub addr: String,
    pub namespace: Option<String>,
    pub group: String,
    pub data_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl RemoteSettings {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            namespace: None,
            group: DEFAULT_GROUP.to_string(),
            data_id: DEFAULT_DATA_ID.to_string(),
            username: None,
            password: None,
        }
    }

    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace.filter(|ns| !ns.trim().is_empty());
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn with_data_id(mut self, data_id: impl Into<String>) -> Self {
        self.data_id = data_id.into();
        self
    }

    pub fn with_credentials(mut self, username: Option<String>, password: Option<String>) -> Self {
        self.username = username.filter(|u| !u.is_empty());
        self.password = password.filter(|p| !p.is_empty());
        self
    }

    fn credentials(&self) -> Option<(&str, &str)> {
        Some((self.username.as_deref()?, self.password.as_deref()?))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr.trim_end_matches('/'), path)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    access_token: String,
    /// Seconds.
    token_ttl: u64,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

impl AccessToken {
    fn needs_refresh(&self, now: Instant) -> bool {
        now + TOKEN_REFRESH_MARGIN >= self.expires_at
    }
}

/// HTTP client for the remote configuration store.
///
/// With credentials configured it logs in for an access token, renews it
/// near expiry, and retries a rejected fetch once after logging in again.
/// Servers without a login endpoint get the credentials as query
/// parameters on every fetch instead.
#[derive(Debug)]
pub struct ConfigStoreClient {
    http: Client,
    settings: RemoteSettings,
    token: Mutex<Option<AccessToken>>,
    inline_credentials: AtomicBool,
}

impl ConfigStoreClient {
    pub fn new(settings: RemoteSettings) -> Result<Self> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("domwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            settings,
            token: Mutex::new(None),
            inline_credentials: AtomicBool::new(false),
        })
    }

    pub fn settings(&self) -> &RemoteSettings {
        &self.settings
    }

    /// Fetches the raw configuration document.
    #[instrument(skip(self), fields(data_id = %self.settings.data_id, group = %self.settings.group))]
    pub async fn fetch(&self) -> Result<String> {
        let token = self.access_token(false).await?;
        match self.fetch_with(token.as_deref()).await {
            Err(DomwatchError::Authentication(reason)) if token.is_some() => {
                warn!(reason = %reason, "Config fetch rejected, logging in again");
                let token = self.access_token(true).await?;
                self.fetch_with(token.as_deref()).await
            }
            other => other,
        }
    }

    async fn fetch_with(&self, token: Option<&str>) -> Result<String> {
        let url = self.settings.url(CONFIG_PATH);

        let mut query: Vec<(&str, &str)> = vec![
            ("dataId", self.settings.data_id.as_str()),
            ("group", self.settings.group.as_str()),
        ];
        if let Some(namespace) = self.settings.namespace.as_deref() {
            query.push(("tenant", namespace));
        }
        if let Some(token) = token {
            query.push(("accessToken", token));
        } else if self.inline_credentials.load(Ordering::Relaxed) {
            if let Some((username, password)) = self.settings.credentials() {
                query.push(("username", username));
                query.push(("password", password));
            }
        }

        debug!(url = %url, "Fetching configuration");
        let mut request = self.http.get(&url).query(&query);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(DomwatchError::Authentication(format!(
                "config store rejected request with status {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(DomwatchError::ConfigFetch(format!(
                "config store returned status {}",
                status
            )));
        }

        Ok(response.text().await?)
    }

    /// Current token, logging in first when there is none, it is close to
    /// expiry, or `force` is set. `None` when no credentials are configured
    /// or the server has no login endpoint.
    async fn access_token(&self, force: bool) -> Result<Option<String>> {
        let Some((username, password)) = self.settings.credentials() else {
            return Ok(None);
        };
        if self.inline_credentials.load(Ordering::Relaxed) {
            return Ok(None);
        }

        let mut guard = self.token.lock().await;
        if !force {
            if let Some(token) = guard.as_ref() {
                if !token.needs_refresh(Instant::now()) {
                    return Ok(Some(token.value.clone()));
                }
                debug!("Access token close to expiry, refreshing");
            }
        }

        match self.login(username, password).await? {
            Some(token) => {
                let value = token.value.clone();
                *guard = Some(token);
                Ok(Some(value))
            }
            None => {
                info!("Config store has no login endpoint, sending credentials with each request");
                self.inline_credentials.store(true, Ordering::Relaxed);
                *guard = None;
                Ok(None)
            }
        }
    }

    async fn login(&self, username: &str, password: &str) -> Result<Option<AccessToken>> {
        let url = self.settings.url(LOGIN_PATH);
        debug!(url = %url, username = %username, "Logging in to config store");

        let response = self
            .http
            .post(&url)
            .form(&[("username", username), ("password", password)])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(DomwatchError::Authentication(format!(
                "login rejected with status {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(DomwatchError::ConfigFetch(format!(
                "login failed with status {}",
                status
            )));
        }

        let body: LoginResponse = serde_json::from_str(&response.text().await?)?;
        debug!(ttl_secs = body.token_ttl, "Obtained access token");
        Ok(Some(AccessToken {
            value: body.access_token,
            expires_at: Instant::now() + Duration::from_secs(body.token_ttl),
        }))
    }
}
