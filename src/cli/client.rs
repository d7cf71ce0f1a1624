use std::time::Duration;

use anyhow::Context;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use url::Url;

/// Thin HTTP client for a running gateway
pub struct UqlClient {
    http: Client,
    base: Url,
    token: Option<String>,
}

impl UqlClient {
    pub fn new(server: &str, token: Option<String>) -> anyhow::Result<Self> {
        let base = Url::parse(server).with_context(|| format!("invalid server url '{}'", server))?;
        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self { http, base, token })
    }

    fn endpoint(&self, path: &str) -> anyhow::Result<Url> {
        Ok(self.base.join(path)?)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// POST /uql with one envelope or an array of them
    pub async fn call(&self, body: &Value) -> anyhow::Result<Value> {
        let request = self.authorize(self.http.post(self.endpoint("/uql")?).json(body));
        let response = request.send().await.context("request to gateway failed")?;
        Ok(response.json().await?)
    }

    /// GET /uql
    pub async fn directory(&self) -> anyhow::Result<Value> {
        let request = self.authorize(self.http.get(self.endpoint("/uql")?));
        Ok(request.send().await?.json().await?)
    }

    /// GET /health
    pub async fn health(&self) -> anyhow::Result<Value> {
        Ok(self.http.get(self.endpoint("/health")?).send().await?.json().await?)
    }
}
