use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::json;
use tracing::{debug, warn};

use nodeflow_core::error::{NodeflowError, Result};
use nodeflow_core::traits::Node;
use nodeflow_core::types::*;

use super::{json_object, wrong_call};

pub(crate) const DEFAULT_MAX_LENGTH: usize = 30_000;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; Nodeflow/0.1)";

/// Loads web pages as documents.
#[derive(Clone)]
pub struct WebLoaderNode {
    descriptor: Arc<NodeDescriptor>,
}

impl WebLoaderNode {
    pub fn new() -> Self {
        Self {
            descriptor: Arc::new(NodeDescriptor {
                name: "webLoader".into(),
                label: "Web Loader".into(),
                version: 1.0,
                category: "Document Loaders".into(),
                description: "Load content from web pages using URLs".into(),
                kind: NodeKind::Provider,
                base_classes: vec!["Document".into()],
                inputs: vec![
                    NodeParam::new("URLs (comma-separated)", "url", "string"),
                    NodeParam::new("Max Length", "maxLength", "number")
                        .optional()
                        .with_default(json!(DEFAULT_MAX_LENGTH)),
                    NodeParam::new("Verify SSL", "verifySsl", "boolean")
                        .optional()
                        .with_default(json!(true)),
                    // JSON object of extra request headers
                    NodeParam::new("Headers", "headers", "json").optional(),
                ],
                outputs: vec![NodeOutput::new("Documents", "documents", &["Document"])],
            }),
        }
    }
}

impl Default for WebLoaderNode {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_urls(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .collect()
}

/// Basic HTML tag stripping using regex.
fn strip_html_tags(html: &str) -> std::result::Result<String, regex::Error> {
    // Remove script and style blocks entirely
    let re_script = Regex::new(r"(?is)<script[^>]*>.*?</script>")?;
    let cleaned = re_script.replace_all(html, "");
    let re_style = Regex::new(r"(?is)<style[^>]*>.*?</style>")?;
    let cleaned = re_style.replace_all(&cleaned, "");

    let re_tags = Regex::new(r"<[^>]+>")?;
    let text = re_tags.replace_all(&cleaned, "");

    let text = text
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");

    let re_blank = Regex::new(r"\n\s*\n(\s*\n)+")?;
    Ok(re_blank.replace_all(&text, "\n\n").trim().to_string())
}

/// Cut `text` to at most `max` characters on a char boundary.
pub(crate) fn truncate(text: String, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text,
    }
}

/// Convert a JSON object into request headers. Entries that are not
/// valid header names or values are skipped.
fn header_map(node_id: &str, headers: &serde_json::Map<String, serde_json::Value>) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let value = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => warn!(node_id, header = %name, "Skipping invalid request header"),
        }
    }
    map
}

/// HTTP client shared by the document loaders.
pub(crate) fn http_client(node_id: &str, verify_ssl: bool, headers: HeaderMap) -> Result<reqwest::Client> {
    if !verify_ssl {
        warn!(node_id, "TLS certificate verification disabled");
    }
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent(DEFAULT_USER_AGENT)
        .default_headers(headers)
        .danger_accept_invalid_certs(!verify_ssl)
        .build()
        .map_err(|e| NodeflowError::node(node_id, format!("Failed to create HTTP client: {}", e)))
}

/// Fetch one page as a document; HTML bodies are reduced to text.
pub(crate) async fn fetch(
    client: &reqwest::Client,
    node_id: &str,
    url: &str,
    max_length: usize,
) -> Result<serde_json::Value> {
    debug!(node_id, url, "Fetching URL");

    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| NodeflowError::node(node_id, format!("Request to {} failed: {}", url, e)))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(NodeflowError::node(
            node_id,
            format!(
                "Failed to load {}: HTTP {} {}",
                url,
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            ),
        ));
    }

    let content_type = resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let body = resp
        .text()
        .await
        .map_err(|e| NodeflowError::node(node_id, format!("Failed to read response body: {}", e)))?;

    let text = if content_type.contains("html") {
        strip_html_tags(&body).map_err(|e| NodeflowError::node(node_id, e))?
    } else {
        body
    };

    Ok(json!({
        "pageContent": truncate(text, max_length),
        "metadata": {"source": url, "contentType": content_type},
    }))
}

impl Node for WebLoaderNode {
    fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    fn execute(&self, call: NodeCall, ctx: NodeContext) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let NodeCall::Provider { params } = &call else {
                return Err(wrong_call(&ctx, NodeKind::Provider, &call));
            };
            let urls = parse_urls(self.descriptor.str_value(params, "url").unwrap_or(""));
            if urls.is_empty() {
                return Err(NodeflowError::node(
                    &ctx.node_id,
                    "At least one URL must be provided",
                ));
            }
            let max_length = self
                .descriptor
                .f64_value(params, "maxLength")
                .map(|n| n as usize)
                .unwrap_or(DEFAULT_MAX_LENGTH);

            let verify_ssl = self.descriptor.bool_value(params, "verifySsl").unwrap_or(true);
            let headers = match json_object(&ctx, "headers", self.descriptor.value(params, "headers")) {
                Ok(headers) => header_map(&ctx.node_id, &headers),
                Err(e) => {
                    warn!(node_id = %ctx.node_id, error = %e, "Ignoring headers input");
                    HeaderMap::new()
                }
            };
            let client = http_client(&ctx.node_id, verify_ssl, headers)?;

            let mut documents = Vec::with_capacity(urls.len());
            for url in &urls {
                documents.push(fetch(&client, &ctx.node_id, url, max_length).await?);
            }
            debug!(node_id = %ctx.node_id, count = documents.len(), "Loaded documents");

            Ok(serde_json::Value::Array(documents))
        })
    }
}
