//! Minimal Helix REST client
//!
//! Injects the bearer token and client id into every request. A `401` asks
//! the shared [`RefreshToken`] for a new token once and retries once.
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;

use crate::{config::RefreshToken, Error, Result};

/// The base Helix API URL.
pub const HELIX_URL: &str = "https://api.twitch.tv/helix";

struct Inner {
    http: Client,
    base_url: String,
    client_id: String,
    token: Mutex<String>,
    refresh: Mutex<Option<RefreshToken>>,
}

#[derive(Clone)]
pub struct Api {
    inner: Arc<Inner>,
}

/// Handle that does not keep the client alive
#[derive(Clone)]
pub struct WeakApi(Weak<Inner>);

impl WeakApi {
    pub fn upgrade(&self) -> Option<Api> {
        self.0.upgrade().map(|inner| Api { inner })
    }
}

fn bare(token: &str) -> String {
    token.trim_start_matches("oauth:").to_owned()
}

impl Api {
    pub fn new(client_id: impl Into<String>, token: &str) -> Result<Api> {
        Api::with_base_url(HELIX_URL, client_id, token)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        client_id: impl Into<String>,
        token: &str,
    ) -> Result<Api> {
        let http = Client::builder()
            .build()
            .map_err(|err| Error::Api(format!("Failed to build the HTTP client: {}", err)))?;
        Ok(Api {
            inner: Arc::new(Inner {
                http,
                base_url: base_url.into().trim_end_matches('/').to_owned(),
                client_id: client_id.into(),
                token: Mutex::new(bare(token)),
                refresh: Mutex::new(None),
            }),
        })
    }

    pub fn downgrade(&self) -> WeakApi {
        WeakApi(Arc::downgrade(&self.inner))
    }

    pub fn set_token(&self, token: &str) {
        *self.inner.token.lock() = bare(token);
    }

    pub fn set_refresh(&self, refresh: Option<RefreshToken>) {
        *self.inner.refresh.lock() = refresh;
    }

    #[inline]
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.inner.base_url, endpoint.trim_start_matches('/'))
    }

    pub async fn get(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<Value> {
        self.request(Method::GET, endpoint, query, None).await
    }

    pub async fn post(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
        body: &Value,
    ) -> Result<Value> {
        self.request(Method::POST, endpoint, query, Some(body)).await
    }

    pub async fn put(&self, endpoint: &str, query: &[(&str, &str)], body: &Value) -> Result<Value> {
        self.request(Method::PUT, endpoint, query, Some(body)).await
    }

    pub async fn patch(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
        body: &Value,
    ) -> Result<Value> {
        self.request(Method::PATCH, endpoint, query, Some(body)).await
    }

    pub async fn delete(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<Value> {
        self.request(Method::DELETE, endpoint, query, None).await
    }

    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let url = self.endpoint_url(endpoint);
        let mut refreshed = false;
        loop {
            let token = self.inner.token.lock().clone();
            let mut request = self
                .inner
                .http
                .request(method.clone(), &url)
                .bearer_auth(&token)
                .header("Client-ID", &self.inner.client_id)
                .query(query);
            if let Some(body) = body {
                request = request.json(body);
            }
            log::debug!("{} {}", method, url);
            let response = request.send().await.map_err(|err| Error::Api(err.to_string()))?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED && !refreshed {
                let refresh = self.inner.refresh.lock().clone();
                if let Some(refresh) = refresh {
                    log::info!("{} {} was unauthorized, refreshing token", method, url);
                    let token = refresh
                        .refresh()
                        .await
                        .map_err(|err| Error::Authentication(err.to_string()))?;
                    self.set_token(&token);
                    refreshed = true;
                    continue;
                }
            }

            let text = response.text().await.map_err(|err| Error::Api(err.to_string()))?;
            if !status.is_success() {
                return Err(Error::Api(format!("{} {} returned {}: {}", method, url, status, text)));
            }
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str(&text).map_err(|err| Error::Api(err.to_string()));
        }
    }
}
