use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use reqwest::Client;
use url::Url;

use crate::error::{PortalError, Result};

use super::api_client::extract_error;
use super::types::{CourseFilter, Material};

pub const MATERIALS_TABLE: &str = "materials";

/// Direct "select rows matching filters" against the hosted table API.
pub trait TableQuery: Send + Sync {
    fn select_materials(&self, filter: CourseFilter) -> BoxFuture<'_, Result<Vec<Material>>>;
}

/// PostgREST-style table endpoint of the hosted backend.
#[derive(Clone)]
pub struct RestTableQuery {
    client: Client,
    base_url: String,
    api_key: String,
}

impl RestTableQuery {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// `{base}/rest/v1/{table}?select=*&col=eq.value...`
    pub fn select_url(&self, table: &str, filter: &CourseFilter) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/rest/v1/{}", self.base_url, table))
            .map_err(|e| PortalError::Config(format!("Invalid table URL: {}", e)))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("select", "*");
            for (column, value) in filter.pairs() {
                pairs.append_pair(column, &format!("eq.{}", value));
            }
        }
        Ok(url)
    }

    pub async fn select(&self, table: &str, filter: &CourseFilter) -> Result<Vec<Material>> {
        let url = self.select_url(table, filter)?;
        let resp = self
            .client
            .get(url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| PortalError::Fallback(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| PortalError::Fallback(e.to_string()))?;
        if !status.is_success() {
            return Err(PortalError::Fallback(extract_error(&body)));
        }
        serde_json::from_str(&body).map_err(|e| PortalError::Fallback(e.to_string()))
    }
}

impl TableQuery for RestTableQuery {
    fn select_materials(&self, filter: CourseFilter) -> BoxFuture<'_, Result<Vec<Material>>> {
        async move { self.select(MATERIALS_TABLE, &filter).await }.boxed()
    }
}
