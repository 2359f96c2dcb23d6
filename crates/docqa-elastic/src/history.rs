//! Chat history stored in an Elasticsearch index.
//!
//! One document per message:
//!
//! ```json
//! { "session_id": "s1", "created_at": 1718000000000,
//!   "history": "{\"type\":\"human\",\"data\":{\"content\":\"...\"}}" }
//! ```
//!
//! The `history` field is a JSON-encoded string so the layout stays
//! readable by other tools sharing the index.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use docqa_core::config::ElasticsearchConfig;
use docqa_core::error::DocqaError;
use docqa_core::service::ChatHistoryStore;
use docqa_core::types::{Message, Role};

use crate::client::ElasticsearchClient;

#[derive(Debug, Serialize, Deserialize)]
struct StoredMessage {
    #[serde(rename = "type")]
    kind: String,
    data: StoredMessageData,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredMessageData {
    content: String,
}

/// Session-keyed chat history in Elasticsearch.
#[derive(Debug)]
pub struct ElasticsearchChatHistory {
    client: ElasticsearchClient,
    index: String,
    /// Maximum messages returned by `load`; the newest are kept.
    size: usize,
    ready: OnceCell<()>,
    /// Last timestamp handed out, keeping `created_at` strictly increasing
    /// for messages written by this process.
    last_ts: AtomicI64,
}

impl ElasticsearchChatHistory {
    pub fn new(client: ElasticsearchClient, index: &str, size: usize) -> Self {
        Self {
            client,
            index: index.to_string(),
            size,
            ready: OnceCell::new(),
            last_ts: AtomicI64::new(0),
        }
    }

    pub fn from_config(client: ElasticsearchClient, config: &ElasticsearchConfig) -> Self {
        Self::new(client, &config.chat_history_index, config.history_size)
    }

    /// Index mappings for the history index.
    pub fn mappings() -> Value {
        json!({
            "properties": {
                "session_id": { "type": "keyword" },
                "created_at": { "type": "date" },
                "history": { "type": "text" }
            }
        })
    }

    /// Create the index on first use.
    async fn ensure_index(&self) -> Result<(), DocqaError> {
        self.ready
            .get_or_try_init(|| async {
                if !self.client.index_exists(&self.index).await? {
                    self.client
                        .create_index(&self.index, &Self::mappings())
                        .await?;
                    info!(index = %self.index, "Created chat history index");
                }
                Ok::<(), DocqaError>(())
            })
            .await
            .map(|_| ())
            .map_err(|e| DocqaError::History(e.to_string()))
    }

    fn next_timestamp(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut prev = self.last_ts.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev + 1);
            match self
                .last_ts
                .compare_exchange(prev, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }
}

/// Decode one search hit into a message.
fn hit_to_message(hit: &Value) -> Result<Message, DocqaError> {
    let source = hit
        .get("_source")
        .ok_or_else(|| DocqaError::History("hit without _source".to_string()))?;
    let raw = source
        .get("history")
        .and_then(|h| h.as_str())
        .ok_or_else(|| DocqaError::History("hit without history field".to_string()))?;
    let stored: StoredMessage = serde_json::from_str(raw)
        .map_err(|e| DocqaError::History(format!("malformed history entry: {}", e)))?;
    let role = Role::parse(&stored.kind)
        .ok_or_else(|| DocqaError::History(format!("unknown message type: {}", stored.kind)))?;
    let created_at = source
        .get("created_at")
        .and_then(|v| v.as_i64())
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or_default();
    Ok(Message {
        role,
        content: stored.data.content,
        created_at,
    })
}

fn stored_kind(role: Role) -> &'static str {
    match role {
        Role::User => "human",
        Role::Assistant => "ai",
    }
}

#[async_trait]
impl ChatHistoryStore for ElasticsearchChatHistory {
    async fn load(&self, session_id: &str) -> Result<Vec<Message>, DocqaError> {
        self.ensure_index().await?;
        // Newest first so truncation drops the oldest turns.
        let body = json!({
            "size": self.size,
            "query": { "term": { "session_id": session_id } },
            "sort": [{ "created_at": { "order": "desc" } }]
        });
        let response = self
            .client
            .search(&self.index, &body)
            .await
            .map_err(|e| DocqaError::History(e.to_string()))?;

        let hits = response
            .pointer("/hits/hits")
            .and_then(|h| h.as_array())
            .ok_or_else(|| DocqaError::History("response has no hits array".to_string()))?;

        let messages = hits
            .iter()
            .rev()
            .map(hit_to_message)
            .collect::<Result<Vec<_>, _>>()?;
        debug!(session_id, messages = messages.len(), "Loaded chat history");
        Ok(messages)
    }

    async fn append(&self, session_id: &str, role: Role, content: &str) -> Result<(), DocqaError> {
        self.ensure_index().await?;
        let stored = StoredMessage {
            kind: stored_kind(role).to_string(),
            data: StoredMessageData {
                content: content.to_string(),
            },
        };
        let document = json!({
            "session_id": session_id,
            "created_at": self.next_timestamp(),
            "history": serde_json::to_string(&stored)?,
        });
        self.client
            .index_document(&self.index, &document, true)
            .await
            .map_err(|e| DocqaError::History(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::routing::{head, post};
    use axum::{Json, Router};

    /// Fake cluster: stores indexed documents and answers term queries on
    /// `session_id` sorted by `created_at` in the requested order.
    #[derive(Default)]
    struct FakeCluster {
        docs: Vec<Value>,
        created: Vec<String>,
        exists: bool,
    }

    type Shared = Arc<Mutex<FakeCluster>>;

    async fn spawn(shared: Shared) -> String {
        async fn exists(State(s): State<Shared>) -> StatusCode {
            if s.lock().unwrap().exists {
                StatusCode::OK
            } else {
                StatusCode::NOT_FOUND
            }
        }
        async fn create(State(s): State<Shared>, Path(index): Path<String>) -> Json<Value> {
            let mut s = s.lock().unwrap();
            s.exists = true;
            s.created.push(index);
            Json(json!({ "acknowledged": true }))
        }
        async fn index_doc(State(s): State<Shared>, Json(doc): Json<Value>) -> Json<Value> {
            s.lock().unwrap().docs.push(doc);
            Json(json!({ "result": "created" }))
        }
        async fn search(State(s): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
            let session = body["query"]["term"]["session_id"].as_str().unwrap().to_string();
            let mut docs: Vec<Value> = s
                .lock()
                .unwrap()
                .docs
                .iter()
                .filter(|d| d["session_id"] == session.as_str())
                .cloned()
                .collect();
            docs.sort_by_key(|d| d["created_at"].as_i64().unwrap());
            if body["sort"][0]["created_at"]["order"] == "desc" {
                docs.reverse();
            }
            let size = body["size"].as_u64().unwrap() as usize;
            let hits: Vec<Value> = docs
                .into_iter()
                .take(size)
                .map(|d| json!({ "_source": d }))
                .collect();
            Json(json!({ "hits": { "hits": hits } }))
        }

        let router = Router::new()
            .route("/{index}", head(exists).put(create))
            .route("/{index}/_doc", post(index_doc))
            .route("/{index}/_search", post(search))
            .with_state(shared);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_hit_to_message() {
        let hit = json!({ "_source": {
            "session_id": "s1",
            "created_at": 1_700_000_000_000i64,
            "history": "{\"type\":\"ai\",\"data\":{\"content\":\"hello\",\"additional_kwargs\":{}}}"
        }});
        let msg = hit_to_message(&hit).unwrap();
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.content, "hello");
        assert_eq!(msg.created_at.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_hit_to_message_rejects_unknown_type() {
        let hit = json!({ "_source": {
            "history": "{\"type\":\"system\",\"data\":{\"content\":\"x\"}}"
        }});
        assert!(matches!(hit_to_message(&hit), Err(DocqaError::History(_))));
    }

    #[test]
    fn test_timestamps_strictly_increase() {
        let history = ElasticsearchChatHistory::new(
            ElasticsearchClient::new("http://localhost:9200"),
            "h",
            10,
        );
        let a = history.next_timestamp();
        let b = history.next_timestamp();
        let c = history.next_timestamp();
        assert!(a < b && b < c);
    }

    #[tokio::test]
    async fn test_append_then_load_round_trip() {
        let shared: Shared = Arc::default();
        let url = spawn(Arc::clone(&shared)).await;
        let history = ElasticsearchChatHistory::new(
            ElasticsearchClient::new(&url),
            "workplace-app-docs-chat-history",
            1000,
        );

        assert!(history.load("s1").await.unwrap().is_empty());
        history.append_user("s1", "What is the return policy?").await.unwrap();
        history.append_assistant("s1", "30 days.").await.unwrap();
        history.append_user("s2", "other session").await.unwrap();

        let msgs = history.load("s1").await.unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, Role::User);
        assert_eq!(msgs[0].content, "What is the return policy?");
        assert_eq!(msgs[1].role, Role::Assistant);
        assert_eq!(msgs[1].content, "30 days.");

        let cluster = shared.lock().unwrap();
        assert_eq!(cluster.created, vec!["workplace-app-docs-chat-history"]);
        let stored: Value =
            serde_json::from_str(cluster.docs[0]["history"].as_str().unwrap()).unwrap();
        assert_eq!(stored["type"], "human");
    }

    #[tokio::test]
    async fn test_existing_index_not_recreated() {
        let shared: Shared = Arc::new(Mutex::new(FakeCluster {
            exists: true,
            ..FakeCluster::default()
        }));
        let url = spawn(Arc::clone(&shared)).await;
        let history = ElasticsearchChatHistory::new(ElasticsearchClient::new(&url), "h", 10);
        history.append_user("s", "q").await.unwrap();
        assert!(shared.lock().unwrap().created.is_empty());
    }

    #[tokio::test]
    async fn test_load_keeps_newest_messages_in_order() {
        let shared: Shared = Arc::default();
        let url = spawn(Arc::clone(&shared)).await;
        let history = ElasticsearchChatHistory::new(ElasticsearchClient::new(&url), "h", 2);
        for i in 0..4 {
            history.append_user("s", &format!("m{}", i)).await.unwrap();
        }
        let msgs = history.load("s").await.unwrap();
        let contents: Vec<&str> = msgs.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3"]);
    }

    #[tokio::test]
    async fn test_unreachable_cluster_is_history_error() {
        let history =
            ElasticsearchChatHistory::new(ElasticsearchClient::new("http://127.0.0.1:1"), "h", 10);
        assert!(matches!(
            history.load("s").await,
            Err(DocqaError::History(_))
        ));
    }
}
