//! Notion REST API implementation of [`RecordStore`].
//!
//! Requests and responses are plain JSON; property values are decoded into
//! [`PropertyValue`] and encoded back from it.

use super::{PropertyMap, RecordStore};
use crate::error::{SyncError, SyncResult};
use crate::models::{
    ChildBlock, FieldSchema, PropertyKind, PropertyValue, QueryPage, RawRecord, SchemaChange,
};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_API_URL: &str = "https://api.notion.com/v1";
pub const DEFAULT_NOTION_VERSION: &str = "2022-06-28";

/// Largest page size the API accepts.
const PAGE_SIZE: u32 = 100;

/// Icon set on collections this tool creates.
const SUMMARY_ICON: &str = "🧮";

/// Connection settings for the Notion API.
#[derive(Debug, Clone)]
pub struct NotionConfig {
    pub api_url: String,
    pub token: String,
    pub notion_version: String,
    pub timeout_seconds: u64,
}

impl Default for NotionConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            token: String::new(),
            notion_version: DEFAULT_NOTION_VERSION.to_string(),
            timeout_seconds: 30,
        }
    }
}

/// Error body returned by the API on non-2xx responses.
#[derive(Debug, Deserialize)]
struct NotionErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Notion API client.
pub struct NotionClient {
    config: NotionConfig,
    http_client: reqwest::Client,
}

impl NotionClient {
    /// Create a client. Fails if the token is empty or not header-safe.
    pub fn new(config: NotionConfig) -> SyncResult<Self> {
        if config.token.trim().is_empty() {
            return Err(SyncError::config(
                "Notion token is required (pass --token or set NOTION_TOKEN)",
            ));
        }

        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.token.trim()))
            .map_err(|_| SyncError::config("Notion token contains invalid characters"))?;
        headers.insert(AUTHORIZATION, bearer);
        let version = HeaderValue::from_str(&config.notion_version)
            .map_err(|_| SyncError::config("Notion-Version contains invalid characters"))?;
        headers.insert("Notion-Version", version);

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            config,
            http_client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_url.trim_end_matches('/'), path)
    }

    /// Send a request and decode the JSON body of a successful response.
    async fn send(&self, request: reqwest::RequestBuilder) -> SyncResult<Value> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                warn!(
                    "Notion request timed out after {}s",
                    self.config.timeout_seconds
                );
            } else if e.is_connect() {
                warn!("Cannot connect to Notion at {}", self.config.api_url);
            }
            SyncError::Transport(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status.as_u16(), &body));
        }

        Ok(response.json::<Value>().await?)
    }
}

#[async_trait]
impl RecordStore for NotionClient {
    async fn list_collection_children(&self, parent_id: &str) -> SyncResult<Vec<ChildBlock>> {
        let url = self.url(&format!("blocks/{}/children", parent_id));
        let mut blocks = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut request = self
                .http_client
                .get(&url)
                .query(&[("page_size", PAGE_SIZE.to_string())]);
            if let Some(ref c) = cursor {
                request = request.query(&[("start_cursor", c.as_str())]);
            }

            let body = self.send(request).await?;
            blocks.extend(results(&body)?.iter().filter_map(decode_child_block));

            match next_cursor(&body)? {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        debug!("Listed {} child blocks of {}", blocks.len(), parent_id);
        Ok(blocks)
    }

    async fn query_collection(
        &self,
        collection_id: &str,
        cursor: Option<&str>,
    ) -> SyncResult<QueryPage> {
        let url = self.url(&format!("databases/{}/query", collection_id));
        let mut body = json!({ "page_size": PAGE_SIZE });
        if let Some(c) = cursor {
            body["start_cursor"] = json!(c);
        }

        let response = self.send(self.http_client.post(&url).json(&body)).await?;
        decode_query_page(&response)
    }

    async fn get_collection_schema(&self, collection_id: &str) -> SyncResult<FieldSchema> {
        let url = self.url(&format!("databases/{}", collection_id));
        let response = self.send(self.http_client.get(&url)).await?;
        decode_schema(&response)
    }

    async fn create_collection(
        &self,
        parent_id: &str,
        title: &str,
        schema: &FieldSchema,
    ) -> SyncResult<String> {
        let body = json!({
            "parent": { "type": "page_id", "page_id": parent_id },
            "title": [{ "type": "text", "text": { "content": title } }],
            "icon": { "type": "emoji", "emoji": SUMMARY_ICON },
            "properties": encode_schema(schema),
        });

        let response = self
            .send(self.http_client.post(self.url("databases")).json(&body))
            .await?;
        object_id(&response)
    }

    async fn update_collection_schema(
        &self,
        collection_id: &str,
        changes: &[SchemaChange],
    ) -> SyncResult<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let url = self.url(&format!("databases/{}", collection_id));
        let body = json!({ "properties": encode_schema_changes(changes) });
        self.send(self.http_client.patch(&url).json(&body)).await?;
        Ok(())
    }

    async fn create_record(
        &self,
        collection_id: &str,
        properties: &PropertyMap,
    ) -> SyncResult<String> {
        let body = json!({
            "parent": { "database_id": collection_id },
            "properties": encode_properties(properties),
        });

        let response = self
            .send(self.http_client.post(self.url("pages")).json(&body))
            .await?;
        object_id(&response)
    }

    async fn update_record(&self, record_id: &str, properties: &PropertyMap) -> SyncResult<()> {
        let url = self.url(&format!("pages/{}", record_id));
        let body = json!({ "properties": encode_properties(properties) });
        self.send(self.http_client.patch(&url).json(&body)).await?;
        Ok(())
    }
}

fn api_error(status: u16, body: &str) -> SyncError {
    match serde_json::from_str::<NotionErrorBody>(body) {
        Ok(err) => SyncError::Api {
            status,
            code: if err.code.is_empty() {
                "unknown".to_string()
            } else {
                err.code
            },
            message: err.message,
        },
        Err(_) => SyncError::Api {
            status,
            code: "unknown".to_string(),
            message: body.trim().to_string(),
        },
    }
}

fn object_id(body: &Value) -> SyncResult<String> {
    body["id"]
        .as_str()
        .map(String::from)
        .ok_or_else(|| SyncError::Protocol("response object has no id".to_string()))
}

fn results(body: &Value) -> SyncResult<&Vec<Value>> {
    body["results"]
        .as_array()
        .ok_or_else(|| SyncError::Protocol("list response has no results array".to_string()))
}

/// Continuation token of a list response, `None` once the list is exhausted.
fn next_cursor(body: &Value) -> SyncResult<Option<String>> {
    if !body["has_more"].as_bool().unwrap_or(false) {
        return Ok(None);
    }
    match body["next_cursor"].as_str() {
        Some(cursor) => Ok(Some(cursor.to_string())),
        None => Err(SyncError::Protocol(
            "has_more is set but next_cursor is missing".to_string(),
        )),
    }
}

/// Decode a `databases/{id}/query` response.
pub fn decode_query_page(body: &Value) -> SyncResult<QueryPage> {
    let records = results(body)?
        .iter()
        .map(decode_record)
        .collect::<SyncResult<Vec<_>>>()?;
    let next_cursor = next_cursor(body)?;

    Ok(QueryPage {
        records,
        has_more: next_cursor.is_some(),
        next_cursor,
    })
}

/// Decode a page object into a raw record.
pub fn decode_record(page: &Value) -> SyncResult<RawRecord> {
    let mut record = RawRecord::new(object_id(page)?);
    if let Some(properties) = page["properties"].as_object() {
        for (name, value) in properties {
            record
                .properties
                .insert(name.clone(), decode_property_value(value));
        }
    }
    Ok(record)
}

/// Decode one property value by its `type` tag.
pub fn decode_property_value(value: &Value) -> PropertyValue {
    let tag = value["type"].as_str().unwrap_or("");
    match tag {
        "title" => PropertyValue::Title(plain_text(&value["title"])),
        "rich_text" => PropertyValue::RichText(plain_text(&value["rich_text"])),
        "date" => PropertyValue::Date(value["date"]["start"].as_str().map(String::from)),
        "number" => PropertyValue::Number(value["number"].as_f64()),
        "formula" => PropertyValue::Formula(value["formula"]["number"].as_f64()),
        other => PropertyValue::Other(other.to_string()),
    }
}

/// Concatenate the plain text of a rich-text array.
fn plain_text(fragments: &Value) -> String {
    fragments
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    item["plain_text"]
                        .as_str()
                        .or_else(|| item["text"]["content"].as_str())
                })
                .collect::<String>()
        })
        .unwrap_or_default()
}

/// Decode the `properties` of a database object into a schema.
pub fn decode_schema(body: &Value) -> SyncResult<FieldSchema> {
    let properties = body["properties"]
        .as_object()
        .ok_or_else(|| SyncError::Protocol("database object has no properties".to_string()))?;

    Ok(properties
        .iter()
        .map(|(name, definition)| {
            let tag = definition["type"].as_str().unwrap_or("");
            (name.clone(), PropertyKind::from_tag(tag))
        })
        .collect())
}

/// Decode a block; only `child_database` blocks carry a title.
pub fn decode_child_block(block: &Value) -> Option<ChildBlock> {
    let id = block["id"].as_str()?.to_string();
    let block_type = block["type"].as_str().unwrap_or("").to_string();
    let title = if block_type == "child_database" {
        block["child_database"]["title"].as_str().map(String::from)
    } else {
        None
    };

    Some(ChildBlock {
        id,
        block_type,
        title,
    })
}

/// Encode a property value for a page create/update body.
pub fn encode_property_value(value: &PropertyValue) -> Value {
    match value {
        PropertyValue::Title(text) => json!({ "title": [{ "text": { "content": text } }] }),
        PropertyValue::RichText(text) => {
            json!({ "rich_text": [{ "text": { "content": text } }] })
        }
        PropertyValue::Date(Some(start)) => json!({ "date": { "start": start } }),
        PropertyValue::Date(None) => json!({ "date": null }),
        PropertyValue::Number(number) | PropertyValue::Formula(number) => {
            json!({ "number": number })
        }
        PropertyValue::Other(_) => Value::Null,
    }
}

fn encode_properties(properties: &PropertyMap) -> Value {
    let map: Map<String, Value> = properties
        .iter()
        .map(|(name, value)| (name.clone(), encode_property_value(value)))
        .collect();
    Value::Object(map)
}

/// Encode the type definition of a property.
fn encode_kind(kind: &PropertyKind) -> Value {
    match kind {
        PropertyKind::Number => json!({ "number": { "format": "number" } }),
        other => {
            let mut definition = Map::new();
            definition.insert(other.tag().to_string(), json!({}));
            Value::Object(definition)
        }
    }
}

pub fn encode_schema(schema: &FieldSchema) -> Value {
    let map: Map<String, Value> = schema
        .iter()
        .map(|(name, kind)| (name.clone(), encode_kind(kind)))
        .collect();
    Value::Object(map)
}

pub fn encode_schema_changes(changes: &[SchemaChange]) -> Value {
    let mut map = Map::new();
    for change in changes {
        match change {
            SchemaChange::Add { name, kind } | SchemaChange::Retype { name, kind } => {
                map.insert(name.clone(), encode_kind(kind));
            }
            SchemaChange::Rename { from, to } => {
                map.insert(from.clone(), json!({ "name": to }));
            }
        }
    }
    Value::Object(map)
}
