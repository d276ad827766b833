//! Notion database source.
//!
//! Lists every page of one Notion database and flattens each page's block
//! tree into plain text.
//!
//! # Requests
//!
//! - `POST /v1/databases/{id}/query`, paginated with `start_cursor` / `has_more`
//! - `GET /v1/blocks/{id}/children`, paginated, recursing into blocks with
//!   `has_children`
//!
//! # Metadata
//!
//! Page properties become metadata keyed by their lowercased property name.
//! Only `id`, `name`, `tags`, `created time` and `last modified` are kept.
//! When a database has no created/edited-time property, the page object's own
//! `created_time` / `last_edited_time` fill in.
//!
//! Pages without any text are skipped with a warning.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::config::SourceConfig;
use crate::error::{LoreError, Result};
use crate::models::{Document, DocumentMetadata};

use super::DocumentSource;

pub const NOTION_VERSION: &str = "2022-06-28";
const PAGE_SIZE: u32 = 100;
const METADATA_FILTER: &[&str] = &["id", "name", "tags", "created time", "last modified"];

pub struct NotionSource {
    client: reqwest::Client,
    base_url: String,
    token: String,
    database_id: String,
}

impl NotionSource {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(LoreError::source)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.api_token.clone(),
            database_id: config.database_id.clone(),
        })
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value> {
        let resp = request
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
            .send()
            .await
            .map_err(|e| LoreError::source(format!("Notion request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LoreError::source(format!(
                "Notion API error (HTTP {}): {}",
                status, body
            )));
        }

        resp.json()
            .await
            .map_err(|e| LoreError::MalformedDocument(format!("invalid Notion response: {}", e)))
    }

    async fn query_database(&self) -> Result<Vec<Value>> {
        let url = format!("{}/v1/databases/{}/query", self.base_url, self.database_id);
        let mut pages = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut body = json!({ "page_size": PAGE_SIZE });
            if let Some(c) = &cursor {
                body["start_cursor"] = json!(c);
            }

            let resp = self.send(self.client.post(&url).json(&body)).await?;
            let (results, next) = page_of_results(&resp)?;
            pages.extend(results);

            match next {
                Some(c) => cursor = Some(c),
                None => break,
            }
        }

        Ok(pages)
    }

    /// Flatten a block subtree into text, one line group per block.
    fn load_blocks<'a>(
        &'a self,
        block_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move {
            let url = format!("{}/v1/blocks/{}/children", self.base_url, block_id);
            let mut lines = Vec::new();
            let mut cursor: Option<String> = None;

            loop {
                let mut request = self
                    .client
                    .get(&url)
                    .query(&[("page_size", PAGE_SIZE.to_string())]);
                if let Some(c) = &cursor {
                    request = request.query(&[("start_cursor", c)]);
                }

                let resp = self.send(request).await?;
                let (blocks, next) = page_of_results(&resp)?;

                for block in &blocks {
                    let mut parts = vec![block_text(block)];
                    if block["has_children"].as_bool().unwrap_or(false) {
                        if let Some(child_id) = block["id"].as_str() {
                            parts.push(self.load_blocks(child_id).await?);
                        }
                    }
                    lines.push(parts.join("\n"));
                }

                match next {
                    Some(c) => cursor = Some(c),
                    None => break,
                }
            }

            Ok(lines.join("\n"))
        })
    }
}

#[async_trait]
impl DocumentSource for NotionSource {
    fn name(&self) -> &str {
        "notion"
    }

    async fn fetch_all(&self) -> Result<Vec<Document>> {
        let pages = self.query_database().await?;
        tracing::info!(pages = pages.len(), "queried Notion database");

        let mut documents = Vec::with_capacity(pages.len());
        for page in &pages {
            let id = page["id"]
                .as_str()
                .ok_or_else(|| LoreError::MalformedDocument("Notion page without id".into()))?;
            let content = self.load_blocks(id).await?;

            if content.trim().is_empty() {
                tracing::warn!(id, "skipping Notion page with no content");
                continue;
            }

            documents.push(page_to_document(page, content)?);
        }

        Ok(documents)
    }
}

/// Split a paginated list response into its results and the next cursor.
fn page_of_results(resp: &Value) -> Result<(Vec<Value>, Option<String>)> {
    let results = resp["results"]
        .as_array()
        .cloned()
        .ok_or_else(|| LoreError::MalformedDocument("Notion response without results".into()))?;

    let next = if resp["has_more"].as_bool().unwrap_or(false) {
        resp["next_cursor"].as_str().map(str::to_string)
    } else {
        None
    };

    Ok((results, next))
}

/// Concatenated `plain_text` of a block's rich text, if it has any.
fn block_text(block: &Value) -> String {
    let Some(kind) = block["type"].as_str() else {
        return String::new();
    };
    block[kind]["rich_text"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p["plain_text"].as_str())
                .collect::<String>()
        })
        .unwrap_or_default()
}

fn plain_text(items: &Value) -> Option<Value> {
    items
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p["plain_text"].as_str())
                .collect::<String>()
        })
        .map(Value::String)
}

/// Reduce a typed Notion property to a plain JSON value.
fn property_value(prop: &Value) -> Option<Value> {
    let kind = prop["type"].as_str()?;
    let value = &prop[kind];
    let out = match kind {
        "title" | "rich_text" => plain_text(value)?,
        "multi_select" => Value::Array(
            value
                .as_array()?
                .iter()
                .filter_map(|o| o["name"].as_str())
                .map(|n| Value::String(n.to_string()))
                .collect(),
        ),
        "select" | "status" => Value::String(value["name"].as_str()?.to_string()),
        "created_time" | "last_edited_time" | "url" => Value::String(value.as_str()?.to_string()),
        "date" => Value::String(value["start"].as_str()?.to_string()),
        "number" | "checkbox" => value.clone(),
        _ => return None,
    };
    (!out.is_null()).then_some(out)
}

/// Build a [`Document`] from a database page object and its flattened text.
pub fn page_to_document(page: &Value, content: String) -> Result<Document> {
    let id = page["id"]
        .as_str()
        .ok_or_else(|| LoreError::MalformedDocument("Notion page without id".into()))?;

    let mut map = Map::new();
    map.insert("id".into(), json!(id));

    if let Some(props) = page["properties"].as_object() {
        for (name, prop) in props {
            let key = name.to_lowercase();
            if !METADATA_FILTER.contains(&key.as_str()) || key == "id" {
                continue;
            }
            if let Some(mut value) = property_value(prop) {
                if key == "tags" && value.is_string() {
                    value = Value::Array(vec![value]);
                }
                map.insert(key, value);
            }
        }
    }

    for (key, page_field) in [
        ("created time", "created_time"),
        ("last modified", "last_edited_time"),
    ] {
        if !map.contains_key(key) {
            if let Some(ts) = page[page_field].as_str() {
                map.insert(key.into(), json!(ts));
            }
        }
    }

    let metadata: DocumentMetadata = serde_json::from_value(Value::Object(map)).map_err(|e| {
        LoreError::MalformedDocument(format!("page {}: unexpected property shape: {}", id, e))
    })?;

    Ok(Document::new(content, metadata))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_page() -> Value {
        json!({
            "id": "page-42",
            "created_time": "2024-01-01T00:00:00.000Z",
            "last_edited_time": "2024-02-01T00:00:00.000Z",
            "properties": {
                "Name": {"type": "title", "title": [
                    {"plain_text": "Session Notes "}, {"plain_text": "12"}
                ]},
                "Tags": {"type": "multi_select", "multi_select": [
                    {"name": "Session Notes"}, {"name": "Act II"}
                ]},
                "Created time": {"type": "created_time", "created_time": "2024-01-03T10:00:00.000Z"},
                "Last modified": {"type": "last_edited_time", "last_edited_time": "2024-02-05T10:00:00.000Z"},
                "Region": {"type": "select", "select": {"name": "Eastern Marches"}}
            }
        })
    }

    #[test]
    fn test_page_to_document_maps_properties() {
        let doc = page_to_document(&sample_page(), "The siege began.".into()).unwrap();
        assert_eq!(doc.id(), "page-42");
        assert_eq!(doc.content, "The siege began.");
        assert_eq!(doc.metadata.name.as_deref(), Some("Session Notes 12"));
        assert_eq!(doc.metadata.tags, vec!["Session Notes", "Act II"]);
        assert_eq!(
            doc.metadata.created_time.as_deref(),
            Some("2024-01-03T10:00:00.000Z")
        );
        assert_eq!(
            doc.metadata.last_modified.as_deref(),
            Some("2024-02-05T10:00:00.000Z")
        );
        // Not in the metadata filter.
        assert!(doc.metadata.extra.is_empty());
        assert!(doc.metadata.is_session_notes());
    }

    #[test]
    fn test_page_timestamps_fall_back_to_page_object() {
        let page = json!({
            "id": "p",
            "created_time": "2024-01-01T00:00:00.000Z",
            "last_edited_time": "2024-02-01T00:00:00.000Z",
            "properties": {}
        });
        let doc = page_to_document(&page, "x".into()).unwrap();
        assert_eq!(doc.metadata.created_time.as_deref(), Some("2024-01-01T00:00:00.000Z"));
        assert_eq!(doc.metadata.last_modified.as_deref(), Some("2024-02-01T00:00:00.000Z"));
    }

    #[test]
    fn test_page_without_id_is_malformed() {
        let err = page_to_document(&json!({"properties": {}}), "x".into()).unwrap_err();
        assert!(matches!(err, LoreError::MalformedDocument(_)));
    }

    #[test]
    fn test_select_tag_becomes_list() {
        let page = json!({
            "id": "p",
            "properties": {"Tags": {"type": "select", "select": {"name": "Session Notes"}}}
        });
        let doc = page_to_document(&page, "x".into()).unwrap();
        assert_eq!(doc.metadata.tags, vec!["Session Notes"]);
    }

    #[test]
    fn test_block_text() {
        let block = json!({
            "type": "paragraph",
            "paragraph": {"rich_text": [{"plain_text": "Veren "}, {"plain_text": "fell."}]}
        });
        assert_eq!(block_text(&block), "Veren fell.");
        assert_eq!(block_text(&json!({"type": "divider", "divider": {}})), "");
    }

    #[test]
    fn test_page_of_results_cursor() {
        let resp = json!({"results": [{"id": "a"}], "has_more": true, "next_cursor": "c2"});
        let (results, next) = page_of_results(&resp).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(next.as_deref(), Some("c2"));

        let resp = json!({"results": [], "has_more": false, "next_cursor": null});
        assert_eq!(page_of_results(&resp).unwrap().1, None);
    }

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Request line, lowercased head and body in; status and JSON body out.
    type Handler = fn(&str, &str, &str) -> (u16, Value);

    /// Serve `handler` on a local port until the test ends. Returns the base URL.
    async fn serve(handler: Handler) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(answer(stream, handler));
            }
        });
        format!("http://{}", addr)
    }

    async fn answer(mut stream: TcpStream, handler: Handler) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let head_end = loop {
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
        };

        let head = String::from_utf8_lossy(&buf[..head_end]).to_lowercase();
        let length = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        while buf.len() < head_end + length {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }

        let raw_head = String::from_utf8_lossy(&buf[..head_end]).to_string();
        let request_line = raw_head.lines().next().unwrap_or_default().to_string();
        let body = String::from_utf8_lossy(&buf[head_end..]).to_string();

        let (status, payload) = handler(&request_line, &head, &body);
        let payload = payload.to_string();
        let response = format!(
            "HTTP/1.1 {} OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            status,
            payload.len(),
            payload
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.shutdown().await.ok();
    }

    fn source_at(base_url: String) -> NotionSource {
        NotionSource::new(&SourceConfig {
            api_token: "secret".into(),
            database_id: "db1".into(),
            base_url,
            timeout_secs: 5,
        })
        .unwrap()
    }

    fn paragraph(text: &str) -> Value {
        json!({
            "id": format!("blk-{}", text.len()),
            "type": "paragraph",
            "has_children": false,
            "paragraph": {"rich_text": [{"plain_text": text}]}
        })
    }

    fn page(id: &str, name: &str) -> Value {
        json!({
            "id": id,
            "created_time": "2024-01-01T00:00:00.000Z",
            "last_edited_time": "2024-02-01T00:00:00.000Z",
            "properties": {"Name": {"type": "title", "title": [{"plain_text": name}]}}
        })
    }

    fn listing(results: Vec<Value>, next: Option<&str>) -> Value {
        json!({"results": results, "has_more": next.is_some(), "next_cursor": next})
    }

    fn campaign_workspace(request_line: &str, head: &str, body: &str) -> (u16, Value) {
        if !head.contains("notion-version: 2022-06-28") || !head.contains("bearer secret") {
            return (400, json!({"message": "missing headers"}));
        }
        let path = request_line.split_whitespace().nth(1).unwrap_or_default();

        if path == "/v1/databases/db1/query" {
            let body: Value = serde_json::from_str(body).unwrap_or_default();
            return match body["start_cursor"].as_str() {
                None => (200, listing(vec![page("p1", "Oaths")], Some("c2"))),
                Some("c2") => (
                    200,
                    listing(vec![page("p2", "Omens"), page("p3", "Blank")], None),
                ),
                Some(_) => (400, json!({"message": "bad cursor"})),
            };
        }

        let (block, query) = path
            .strip_prefix("/v1/blocks/")
            .and_then(|rest| rest.split_once("/children?"))
            .unwrap_or(("", ""));
        let cursor = query
            .split('&')
            .find_map(|kv| kv.strip_prefix("start_cursor="));

        match (block, cursor) {
            ("p1", None) => {
                let toggle = json!({
                    "id": "b1",
                    "type": "toggle",
                    "has_children": true,
                    "toggle": {"rich_text": [{"plain_text": "Oath"}]}
                });
                (
                    200,
                    listing(vec![paragraph("Veren swore an oath."), toggle], Some("bc2")),
                )
            }
            ("p1", Some("bc2")) => (200, listing(vec![paragraph("Her blade is Morningstar.")], None)),
            ("b1", None) => (200, listing(vec![paragraph("at the Sunken Keep")], None)),
            ("p2", None) => (200, listing(vec![paragraph("The Red Moon rises.")], None)),
            ("p3", None) => (200, listing(vec![], None)),
            _ => (404, json!({"message": "not found"})),
        }
    }

    #[tokio::test]
    async fn test_fetch_all_follows_cursors_and_child_blocks() {
        let source = source_at(serve(campaign_workspace).await);
        let docs = source.fetch_all().await.unwrap();

        // p3 has no text and is skipped.
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id(), "p1");
        assert_eq!(
            docs[0].content,
            "Veren swore an oath.\nOath\nat the Sunken Keep\nHer blade is Morningstar."
        );
        assert_eq!(docs[0].metadata.name.as_deref(), Some("Oaths"));
        assert_eq!(docs[1].id(), "p2");
        assert_eq!(docs[1].content, "The Red Moon rises.");
        assert_eq!(
            docs[1].metadata.last_modified.as_deref(),
            Some("2024-02-01T00:00:00.000Z")
        );
    }

    #[tokio::test]
    async fn test_error_status_is_source_unavailable() {
        fn unauthorized(_: &str, _: &str, _: &str) -> (u16, Value) {
            (401, json!({"code": "unauthorized"}))
        }
        let source = source_at(serve(unauthorized).await);
        let err = source.fetch_all().await.unwrap_err();
        assert!(matches!(err, LoreError::SourceUnavailable(_)), "{err:?}");
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_source_unavailable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let source = source_at(format!("http://{}", addr));
        let err = source.fetch_all().await.unwrap_err();
        assert!(matches!(err, LoreError::SourceUnavailable(_)), "{err:?}");
    }
}
