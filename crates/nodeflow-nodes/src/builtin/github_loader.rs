use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use nodeflow_core::error::{NodeflowError, Result};
use nodeflow_core::traits::Node;
use nodeflow_core::types::*;

use super::web_loader::{http_client, truncate, DEFAULT_MAX_LENGTH};
use super::wrong_call;

const GITHUB_API: &str = "https://api.github.com";
const GITHUB_RAW: &str = "https://raw.githubusercontent.com";
const DEFAULT_MAX_FILES: usize = 50;

/// Loads the files of a GitHub repository as documents.
#[derive(Clone)]
pub struct GithubLoaderNode {
    descriptor: Arc<NodeDescriptor>,
    api_base: String,
    raw_base: String,
}

impl GithubLoaderNode {
    pub fn new() -> Self {
        Self::with_endpoints(GITHUB_API, GITHUB_RAW)
    }

    /// Point at another API and raw-content host, e.g. GitHub Enterprise.
    pub fn with_endpoints(api_base: &str, raw_base: &str) -> Self {
        Self {
            descriptor: Arc::new(NodeDescriptor {
                name: "githubLoader".into(),
                label: "GitHub Loader".into(),
                version: 1.0,
                category: "Document Loaders".into(),
                description: "Load files from GitHub repositories".into(),
                kind: NodeKind::Provider,
                base_classes: vec!["Document".into()],
                inputs: vec![
                    NodeParam::new("Repository URL", "repoUrl", "string"),
                    NodeParam::new("Branch", "branch", "string")
                        .optional()
                        .with_default(json!("main")),
                    // Comma-separated extensions, e.g. ".py,.md"; empty loads every file
                    NodeParam::new("File Filter", "fileFilter", "string").optional(),
                    NodeParam::new("Max Files", "maxFiles", "number")
                        .optional()
                        .with_default(json!(DEFAULT_MAX_FILES)),
                ],
                outputs: vec![NodeOutput::new("Documents", "documents", &["Document"])],
            }),
            api_base: api_base.trim_end_matches('/').to_string(),
            raw_base: raw_base.trim_end_matches('/').to_string(),
        }
    }
}

impl Default for GithubLoaderNode {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

/// `(owner, repo)` from `https://github.com/owner/repo[.git]` or `owner/repo`.
fn parse_repo_url(url: &str) -> Option<(String, String)> {
    let path = url
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_start_matches("www.")
        .trim_start_matches("github.com/")
        .trim_end_matches('/');
    let mut parts = path.split('/');
    let owner = parts.next().filter(|s| !s.is_empty())?;
    let repo = parts.next()?.trim_end_matches(".git");
    if repo.is_empty() || owner.contains(':') {
        return None;
    }
    Some((owner.to_string(), repo.to_string()))
}

/// Normalized extensions from a `.py,md` style filter.
fn parse_extensions(filter: &str) -> Vec<String> {
    filter
        .split(',')
        .map(|e| e.trim().trim_start_matches('.').to_lowercase())
        .filter(|e| !e.is_empty())
        .map(|e| format!(".{}", e))
        .collect()
}

fn wanted(path: &str, extensions: &[String]) -> bool {
    let path = path.to_lowercase();
    extensions.is_empty() || extensions.iter().any(|e| path.ends_with(e.as_str()))
}

fn api_headers(node_id: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
    if let Ok(token) = std::env::var("GITHUB_TOKEN") {
        match HeaderValue::from_str(&format!("Bearer {}", token.trim())) {
            Ok(value) => {
                headers.insert(AUTHORIZATION, value);
            }
            Err(_) => warn!(node_id, "GITHUB_TOKEN is not a valid header value; ignoring"),
        }
    }
    headers
}

impl GithubLoaderNode {
    async fn load(&self, params: &ValueMap, node_id: &str) -> Result<Vec<serde_json::Value>> {
        let d = &self.descriptor;
        let repo_url = d.str_value(params, "repoUrl").unwrap_or("").trim();
        if repo_url.is_empty() {
            return Err(NodeflowError::node(node_id, "Repository URL is required"));
        }
        let (owner, repo) = parse_repo_url(repo_url).ok_or_else(|| {
            NodeflowError::node(node_id, format!("not a GitHub repository URL: {}", repo_url))
        })?;
        let branch = d
            .str_value(params, "branch")
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .unwrap_or("main");
        let extensions = parse_extensions(d.str_value(params, "fileFilter").unwrap_or(""));
        let max_files = d
            .f64_value(params, "maxFiles")
            .map(|n| n.max(0.0) as usize)
            .unwrap_or(DEFAULT_MAX_FILES);

        let client = http_client(node_id, true, api_headers(node_id))?;
        let tree_url = format!(
            "{}/repos/{}/{}/git/trees/{}?recursive=1",
            self.api_base, owner, repo, branch
        );
        let resp = client
            .get(&tree_url)
            .send()
            .await
            .map_err(|e| NodeflowError::node(node_id, format!("Request to {} failed: {}", tree_url, e)))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(NodeflowError::node(
                node_id,
                format!(
                    "Failed to list {}/{}@{}: HTTP {}",
                    owner,
                    repo,
                    branch,
                    status.as_u16()
                ),
            ));
        }
        let tree: TreeResponse = resp
            .json()
            .await
            .map_err(|e| NodeflowError::node(node_id, format!("Invalid tree response: {}", e)))?;
        if tree.truncated {
            warn!(node_id, repo = %repo_url, "Repository tree was truncated by the API");
        }

        let paths: Vec<String> = tree
            .tree
            .into_iter()
            .filter(|e| e.kind == "blob" && wanted(&e.path, &extensions))
            .map(|e| e.path)
            .take(max_files)
            .collect();
        debug!(node_id, files = paths.len(), "Selected repository files");

        let mut documents = Vec::with_capacity(paths.len());
        for path in &paths {
            let raw_url = format!("{}/{}/{}/{}/{}", self.raw_base, owner, repo, branch, path);
            let resp = client
                .get(&raw_url)
                .send()
                .await
                .map_err(|e| NodeflowError::node(node_id, format!("Request to {} failed: {}", raw_url, e)))?;
            if !resp.status().is_success() {
                warn!(node_id, path = %path, status = resp.status().as_u16(), "Skipping unreadable file");
                continue;
            }
            let text = resp
                .text()
                .await
                .map_err(|e| NodeflowError::node(node_id, format!("Failed to read {}: {}", path, e)))?;

            documents.push(json!({
                "pageContent": truncate(text, DEFAULT_MAX_LENGTH),
                "metadata": {
                    "source": format!("https://github.com/{}/{}/blob/{}/{}", owner, repo, branch, path),
                    "path": path,
                    "branch": branch,
                    "repository": format!("{}/{}", owner, repo),
                },
            }));
        }
        Ok(documents)
    }
}

impl Node for GithubLoaderNode {
    fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    fn execute(&self, call: NodeCall, ctx: NodeContext) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let NodeCall::Provider { params } = &call else {
                return Err(wrong_call(&ctx, NodeKind::Provider, &call));
            };
            let documents = self.load(params, &ctx.node_id).await?;
            info!(node_id = %ctx.node_id, count = documents.len(), "Loaded documents from GitHub repository");

            Ok(serde_json::Value::Array(documents))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::context;
    use crate::builtin::test_server::serve_with;

    #[test]
    fn test_parse_repo_url() {
        let expected = Some(("rust-lang".to_string(), "regex".to_string()));
        assert_eq!(parse_repo_url("https://github.com/rust-lang/regex"), expected);
        assert_eq!(parse_repo_url("https://github.com/rust-lang/regex.git"), expected);
        assert_eq!(parse_repo_url("github.com/rust-lang/regex/"), expected);
        assert_eq!(parse_repo_url("rust-lang/regex"), expected);
        assert_eq!(parse_repo_url("https://github.com/rust-lang"), None);
        assert_eq!(parse_repo_url(""), None);
    }

    #[test]
    fn test_extension_filter() {
        let extensions = parse_extensions(" .py, md ,,");
        assert_eq!(extensions, vec![".py", ".md"]);
        assert!(wanted("src/app.py", &extensions));
        assert!(wanted("README.MD", &extensions));
        assert!(!wanted("Cargo.toml", &extensions));
        assert!(wanted("Cargo.toml", &[]));
    }

    #[tokio::test]
    async fn test_loads_filtered_files() {
        let server = serve_with(|path, _| match path {
            "/api/repos/acme/tools/git/trees/dev?recursive=1" => (
                "200 OK",
                "application/json",
                r#"{"tree":[
                    {"path":"src","type":"tree"},
                    {"path":"src/main.py","type":"blob"},
                    {"path":"logo.png","type":"blob"},
                    {"path":"README.md","type":"blob"},
                    {"path":"docs/guide.md","type":"blob"}
                ],"truncated":false}"#
                    .to_string(),
            ),
            "/raw/acme/tools/dev/src/main.py" => ("200 OK", "text/plain", "print('hi')".to_string()),
            "/raw/acme/tools/dev/README.md" => ("200 OK", "text/plain", "# Tools".to_string()),
            _ => ("404 Not Found", "text/plain", "missing".to_string()),
        })
        .await;

        let node = GithubLoaderNode::with_endpoints(
            &format!("{}/api", server.base),
            &format!("{}/raw/", server.base),
        );
        let mut params = ValueMap::new();
        params.insert("repoUrl".into(), json!("https://github.com/acme/tools"));
        params.insert("branch".into(), json!("dev"));
        params.insert("fileFilter".into(), json!(".py,.md"));
        params.insert("maxFiles".into(), json!(2));

        let out = node
            .execute(NodeCall::Provider { params }, context("github_0", ""))
            .await
            .unwrap();
        let docs = out.as_array().unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["pageContent"], "print('hi')");
        assert_eq!(
            docs[0]["metadata"]["source"],
            "https://github.com/acme/tools/blob/dev/src/main.py"
        );
        assert_eq!(docs[1]["metadata"]["path"], "README.md");
        assert_eq!(docs[1]["metadata"]["repository"], "acme/tools");

        let tree_request = server.requests()[0].to_lowercase();
        assert!(tree_request.contains("accept: application/vnd.github+json"));
    }

    #[tokio::test]
    async fn test_missing_branch_fails_node() {
        let server = serve_with(|_, _| ("404 Not Found", "application/json", "{}".to_string())).await;
        let node = GithubLoaderNode::with_endpoints(&server.base, &server.base);
        let mut params = ValueMap::new();
        params.insert("repoUrl".into(), json!("acme/tools"));

        let err = node
            .execute(NodeCall::Provider { params }, context("github_0", ""))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("acme/tools@main: HTTP 404"));
    }

    #[tokio::test]
    async fn test_rejects_non_repository_url() {
        let node = GithubLoaderNode::new();
        let mut params = ValueMap::new();
        params.insert("repoUrl".into(), json!("https://github.com/acme"));

        let err = node
            .execute(NodeCall::Provider { params }, context("github_0", ""))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not a GitHub repository URL"));
    }
}
