use std::collections::HashSet;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use reqwest::{header, Client, Response};
use serde::de::DeserializeOwned;

use crate::error::{PortalError, Result};

use super::types::*;

/// The portal REST endpoints the materials panel depends on.
pub trait MaterialsBackend: Send + Sync {
    fn upload_material(&self, req: UploadRequest) -> BoxFuture<'_, Result<BackendReply>>;
    fn list_materials(&self, filter: CourseFilter) -> BoxFuture<'_, Result<Vec<Material>>>;
    fn delete_material(&self, storage_path: String) -> BoxFuture<'_, Result<BackendReply>>;
    fn signed_view_url(&self, storage_path: String) -> BoxFuture<'_, Result<SignedUrlReply>>;
    fn list_courses(&self, programme: String, level: String) -> BoxFuture<'_, Result<Vec<Course>>>;
    fn fetch_bytes(&self, url: String) -> BoxFuture<'_, Result<Vec<u8>>>;
}

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ── Materials ───────────────────────────────────────────────────────

    pub async fn upload(&self, req: &UploadRequest) -> Result<BackendReply> {
        let resp = self
            .client
            .post(format!("{}/api/admin/materials", self.base_url))
            .json(req)
            .send()
            .await?;
        parse_json(resp).await
    }

    pub async fn list(&self, filter: &CourseFilter) -> Result<Vec<Material>> {
        let resp = self
            .client
            .get(format!("{}/api/materials", self.base_url))
            .header(header::CACHE_CONTROL, "no-cache")
            .query(&filter.pairs())
            .send()
            .await?;
        parse_json(resp).await
    }

    pub async fn delete(&self, storage_path: &str) -> Result<BackendReply> {
        let resp = self
            .client
            .delete(format!("{}/api/admin/materials", self.base_url))
            .json(&DeleteRequest {
                storage_path: storage_path.to_string(),
            })
            .send()
            .await?;
        parse_json(resp).await
    }

    pub async fn signed_url(&self, storage_path: &str) -> Result<SignedUrlReply> {
        let resp = self
            .client
            .post(format!("{}/api/student/materials/view", self.base_url))
            .json(&SignedUrlRequest {
                storage_path: storage_path.to_string(),
            })
            .send()
            .await?;
        parse_json(resp).await
    }

    pub async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self.client.get(url).send().await?;
        let resp = check_status(resp).await?;
        Ok(resp.bytes().await?.to_vec())
    }

    // ── Courses ─────────────────────────────────────────────────────────

    pub async fn courses(&self, programme: &str, level: &str) -> Result<Vec<Course>> {
        let resp = self
            .client
            .get(format!("{}/api/admin/courses", self.base_url))
            .query(&[("programme", programme), ("level", level)])
            .send()
            .await?;
        let data: serde_json::Value = parse_json(resp).await?;
        Ok(normalize_courses(data))
    }
}

impl MaterialsBackend for ApiClient {
    fn upload_material(&self, req: UploadRequest) -> BoxFuture<'_, Result<BackendReply>> {
        async move { self.upload(&req).await }.boxed()
    }

    fn list_materials(&self, filter: CourseFilter) -> BoxFuture<'_, Result<Vec<Material>>> {
        async move { self.list(&filter).await }.boxed()
    }

    fn delete_material(&self, storage_path: String) -> BoxFuture<'_, Result<BackendReply>> {
        async move { self.delete(&storage_path).await }.boxed()
    }

    fn signed_view_url(&self, storage_path: String) -> BoxFuture<'_, Result<SignedUrlReply>> {
        async move { self.signed_url(&storage_path).await }.boxed()
    }

    fn list_courses(&self, programme: String, level: String) -> BoxFuture<'_, Result<Vec<Course>>> {
        async move { self.courses(&programme, &level).await }.boxed()
    }

    fn fetch_bytes(&self, url: String) -> BoxFuture<'_, Result<Vec<u8>>> {
        async move { self.download(&url).await }.boxed()
    }
}

async fn check_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let message = extract_error(&body);
    Err(PortalError::Status {
        status: status.as_u16(),
        message: if message.is_empty() {
            status.canonical_reason().unwrap_or("").to_string()
        } else {
            message
        },
    })
}

async fn parse_json<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let resp = check_status(resp).await?;
    let body = resp.text().await?;
    serde_json::from_str(&body).map_err(|e| PortalError::Parse(e.to_string()))
}

pub(crate) fn extract_error(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .or_else(|| v.get("message"))?
                .as_str()
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| body.to_string())
}

/// Accepts a course array in either naming scheme, an array whose first item
/// wraps `courses`, or an object with `courses`. Drops entries missing a code
/// or title and de-duplicates by `code|title`, keeping first occurrence.
pub fn normalize_courses(data: serde_json::Value) -> Vec<Course> {
    let list = match data {
        serde_json::Value::Array(items) => match items.first() {
            Some(first) if first.get("courses").is_some() => {
                first.get("courses").cloned().unwrap_or_default()
            }
            _ => serde_json::Value::Array(items),
        },
        serde_json::Value::Object(mut obj) => obj.remove("courses").unwrap_or_default(),
        _ => serde_json::Value::Null,
    };

    let raw: Vec<RawCourse> = serde_json::from_value(list).unwrap_or_default();
    let mut seen = HashSet::new();
    raw.into_iter()
        .filter_map(|c| match (c.code, c.title) {
            (Some(code), Some(title)) if !code.is_empty() && !title.is_empty() => {
                Some(Course { code, title })
            }
            _ => None,
        })
        .filter(|c| seen.insert(format!("{}|{}", c.code, c.title)))
        .collect()
}
