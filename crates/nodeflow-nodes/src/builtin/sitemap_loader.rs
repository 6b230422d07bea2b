use std::sync::Arc;

use futures::future::BoxFuture;
use regex::Regex;
use reqwest::header::HeaderMap;
use serde_json::json;
use tracing::{debug, info};

use nodeflow_core::error::{NodeflowError, Result};
use nodeflow_core::traits::Node;
use nodeflow_core::types::*;

use super::web_loader::{fetch, http_client, DEFAULT_MAX_LENGTH};
use super::wrong_call;

const DEFAULT_LIMIT: usize = 10;

/// Discovers pages through a sitemap.xml and loads each as a document.
#[derive(Clone)]
pub struct SitemapLoaderNode {
    descriptor: Arc<NodeDescriptor>,
}

impl SitemapLoaderNode {
    pub fn new() -> Self {
        Self {
            descriptor: Arc::new(NodeDescriptor {
                name: "sitemapLoader".into(),
                label: "Sitemap Loader".into(),
                version: 1.0,
                category: "Document Loaders".into(),
                description: "Load content from sitemap URLs".into(),
                kind: NodeKind::Provider,
                base_classes: vec!["Document".into()],
                inputs: vec![
                    NodeParam::new("Sitemap URL", "sitemapUrl", "string"),
                    NodeParam::new("Filter URLs (regex)", "filterUrls", "string").optional(),
                    NodeParam::new("Limit", "limit", "number")
                        .optional()
                        .with_default(json!(DEFAULT_LIMIT)),
                    NodeParam::new("Max Length", "maxLength", "number")
                        .optional()
                        .with_default(json!(DEFAULT_MAX_LENGTH)),
                ],
                outputs: vec![NodeOutput::new("Documents", "documents", &["Document"])],
            }),
        }
    }
}

impl Default for SitemapLoaderNode {
    fn default() -> Self {
        Self::new()
    }
}

/// Every `<loc>` entry in a sitemap document, in order.
fn sitemap_locations(xml: &str) -> std::result::Result<Vec<String>, regex::Error> {
    let re = Regex::new(r"(?is)<loc>\s*(.*?)\s*</loc>")?;
    Ok(re
        .captures_iter(xml)
        .map(|c| c[1].replace("&amp;", "&"))
        .filter(|u| !u.is_empty())
        .collect())
}

/// Keep URLs matching `pattern`, then cut to `limit` (0 keeps all).
fn select_urls(urls: Vec<String>, pattern: Option<&Regex>, limit: usize) -> Vec<String> {
    let matching = urls
        .into_iter()
        .filter(|u| pattern.map_or(true, |re| re.is_match(u)));
    if limit > 0 {
        matching.take(limit).collect()
    } else {
        matching.collect()
    }
}

impl SitemapLoaderNode {
    async fn load(&self, params: &ValueMap, node_id: &str) -> Result<Vec<serde_json::Value>> {
        let d = &self.descriptor;
        let sitemap_url = d
            .str_value(params, "sitemapUrl")
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| NodeflowError::node(node_id, "Sitemap URL is required"))?;
        let pattern = match d.str_value(params, "filterUrls").filter(|p| !p.trim().is_empty()) {
            Some(p) => Some(Regex::new(p).map_err(|e| {
                NodeflowError::node(node_id, format!("invalid filterUrls pattern: {}", e))
            })?),
            None => None,
        };
        let limit = d
            .f64_value(params, "limit")
            .map(|n| n.max(0.0) as usize)
            .unwrap_or(DEFAULT_LIMIT);
        let max_length = d
            .f64_value(params, "maxLength")
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_MAX_LENGTH);

        let client = http_client(node_id, true, HeaderMap::new())?;
        let resp = client
            .get(sitemap_url)
            .send()
            .await
            .map_err(|e| NodeflowError::node(node_id, format!("Request to {} failed: {}", sitemap_url, e)))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(NodeflowError::node(
                node_id,
                format!("Failed to load sitemap {}: HTTP {}", sitemap_url, status.as_u16()),
            ));
        }
        let xml = resp
            .text()
            .await
            .map_err(|e| NodeflowError::node(node_id, format!("Failed to read sitemap: {}", e)))?;

        let found = sitemap_locations(&xml).map_err(|e| NodeflowError::node(node_id, e))?;
        let total = found.len();
        let urls = select_urls(found, pattern.as_ref(), limit);
        debug!(node_id, total, selected = urls.len(), "Parsed sitemap");

        let mut documents = Vec::with_capacity(urls.len());
        for url in &urls {
            documents.push(fetch(&client, node_id, url, max_length).await?);
        }
        Ok(documents)
    }
}

impl Node for SitemapLoaderNode {
    fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    fn execute(&self, call: NodeCall, ctx: NodeContext) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let NodeCall::Provider { params } = &call else {
                return Err(wrong_call(&ctx, NodeKind::Provider, &call));
            };
            let documents = self.load(params, &ctx.node_id).await?;
            info!(node_id = %ctx.node_id, count = documents.len(), "Loaded documents from sitemap");

            Ok(serde_json::Value::Array(documents))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::context;
    use crate::builtin::test_server::serve_with;

    const SITEMAP: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://site.test/blog/one</loc></url>
  <url><LOC> https://site.test/about </LOC></url>
  <url><loc>https://site.test/blog/two?a=1&amp;b=2</loc><lastmod>2024-01-01</lastmod></url>
</urlset>"#;

    #[test]
    fn test_sitemap_locations() {
        assert_eq!(
            sitemap_locations(SITEMAP).unwrap(),
            vec![
                "https://site.test/blog/one",
                "https://site.test/about",
                "https://site.test/blog/two?a=1&b=2",
            ]
        );
        assert!(sitemap_locations("<urlset/>").unwrap().is_empty());
    }

    #[test]
    fn test_select_urls() {
        let urls = sitemap_locations(SITEMAP).unwrap();
        let blog = Regex::new("/blog/").unwrap();
        assert_eq!(select_urls(urls.clone(), Some(&blog), 10).len(), 2);
        assert_eq!(select_urls(urls.clone(), Some(&blog), 1), vec!["https://site.test/blog/one"]);
        assert_eq!(select_urls(urls.clone(), None, 0).len(), 3);
    }

    #[tokio::test]
    async fn test_loads_filtered_pages() {
        let server = serve_with(|path, base| match path {
            "/sitemap.xml" => (
                "200 OK",
                "application/xml",
                format!(
                    "<urlset><url><loc>{base}/docs/a</loc></url><url><loc>{base}/news/x</loc></url>\
                     <url><loc>{base}/docs/b</loc></url><url><loc>{base}/docs/c</loc></url></urlset>"
                ),
            ),
            "/docs/a" => ("200 OK", "text/html", "<h1>Page A</h1>".to_string()),
            "/docs/b" => ("200 OK", "text/plain", "Page B".to_string()),
            _ => ("404 Not Found", "text/plain", "missing".to_string()),
        })
        .await;

        let node = SitemapLoaderNode::new();
        let mut params = ValueMap::new();
        params.insert("sitemapUrl".into(), json!(format!("{}/sitemap.xml", server.base)));
        params.insert("filterUrls".into(), json!("/docs/"));
        params.insert("limit".into(), json!(2));

        let out = node
            .execute(NodeCall::Provider { params }, context("sitemap_0", ""))
            .await
            .unwrap();
        let docs = out.as_array().unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["pageContent"], "Page A");
        assert_eq!(docs[1]["pageContent"], "Page B");
        assert_eq!(docs[1]["metadata"]["source"], format!("{}/docs/b", server.base));
        // sitemap + two pages; /docs/c is past the limit
        assert_eq!(server.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_invalid_filter_fails_node() {
        let node = SitemapLoaderNode::new();
        let mut params = ValueMap::new();
        params.insert("sitemapUrl".into(), json!("http://127.0.0.1:9/sitemap.xml"));
        params.insert("filterUrls".into(), json!("(unclosed"));

        let err = node
            .execute(NodeCall::Provider { params }, context("sitemap_0", ""))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid filterUrls pattern"));
    }

    #[test]
    fn test_requires_sitemap_url() {
        let node = SitemapLoaderNode::new();
        let err = node.validate_inputs("sitemap_0", &ValueMap::new()).unwrap_err();
        assert!(matches!(err, NodeflowError::MissingRequiredInput { ref input, .. } if input == "sitemapUrl"));
    }
}
