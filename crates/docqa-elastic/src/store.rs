//! ELSER sparse-vector document store.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use docqa_core::config::ElasticsearchConfig;
use docqa_core::error::DocqaError;
use docqa_core::service::DocumentStore;
use docqa_core::types::RetrievedPassage;

use crate::client::ElasticsearchClient;

/// Field holding ELSER token weights, as written by the ingest pipeline.
const VECTOR_FIELD: &str = "vector.tokens";
/// Field holding passage text.
const TEXT_FIELD: &str = "text";

/// Document store over an index populated with ELSER expansions.
///
/// Passage count per query (`top_k`) is a property of the store, not of
/// its callers.
#[derive(Debug, Clone)]
pub struct ElasticsearchStore {
    client: ElasticsearchClient,
    index: String,
    model_id: String,
    top_k: usize,
}

impl ElasticsearchStore {
    pub fn new(client: ElasticsearchClient, index: &str, model_id: &str, top_k: usize) -> Self {
        Self {
            client,
            index: index.to_string(),
            model_id: model_id.to_string(),
            top_k,
        }
    }

    pub fn from_config(
        client: ElasticsearchClient,
        config: &ElasticsearchConfig,
    ) -> Self {
        Self::new(client, &config.index, &config.elser_model, config.top_k)
    }

    /// Search body for a `text_expansion` query.
    pub fn build_query(&self, query: &str) -> Value {
        json!({
            "size": self.top_k,
            "query": {
                "bool": {
                    "must": [{
                        "text_expansion": {
                            VECTOR_FIELD: {
                                "model_id": self.model_id,
                                "model_text": query,
                            }
                        }
                    }]
                }
            },
            "_source": [TEXT_FIELD, "metadata"],
        })
    }
}

/// Convert search hits to passages, preserving hit order.
///
/// Hits without a text field are skipped; missing metadata becomes an empty
/// map.
pub fn parse_hits(response: &Value) -> Result<Vec<RetrievedPassage>, DocqaError> {
    let hits = response
        .pointer("/hits/hits")
        .and_then(|h| h.as_array())
        .ok_or_else(|| DocqaError::Search("response has no hits array".to_string()))?;

    let passages = hits
        .iter()
        .filter_map(|hit| {
            let source = hit.get("_source")?;
            let text = source.get(TEXT_FIELD)?.as_str()?;
            let metadata = source
                .get("metadata")
                .and_then(|m| m.as_object())
                .cloned()
                .unwrap_or_default();
            Some(RetrievedPassage::new(text, metadata))
        })
        .collect();
    Ok(passages)
}

#[async_trait]
impl DocumentStore for ElasticsearchStore {
    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedPassage>, DocqaError> {
        let body = self.build_query(query);
        let response = self
            .client
            .search(&self.index, &body)
            .await
            .map_err(|e| DocqaError::Search(e.to_string()))?;
        let passages = parse_hits(&response)?;
        debug!(index = %self.index, hits = passages.len(), "Retrieved passages");
        Ok(passages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::extract::{Path, State};
    use axum::routing::post;
    use axum::{Json, Router};

    type Seen = Arc<Mutex<Vec<(String, Value)>>>;

    async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn sample_response() -> Value {
        json!({
            "took": 3,
            "hits": {
                "total": { "value": 2, "relation": "eq" },
                "hits": [
                    {
                        "_id": "1",
                        "_score": 12.5,
                        "_source": {
                            "text": "Items may be returned within 30 days.",
                            "metadata": { "name": "policy.pdf", "category": "hr" }
                        }
                    },
                    {
                        "_id": "2",
                        "_score": 4.0,
                        "_source": {
                            "text": "Laptops are refreshed every 3 years.",
                            "metadata": { "name": "it-faq.md" }
                        }
                    }
                ]
            }
        })
    }

    #[test]
    fn test_build_query_shape() {
        let store = ElasticsearchStore::new(
            ElasticsearchClient::new("http://localhost:9200"),
            "docs",
            ".elser_model_2",
            4,
        );
        let q = store.build_query("return policy");
        assert_eq!(q["size"], 4);
        let expansion = &q["query"]["bool"]["must"][0]["text_expansion"]["vector.tokens"];
        assert_eq!(expansion["model_id"], ".elser_model_2");
        assert_eq!(expansion["model_text"], "return policy");
    }

    #[test]
    fn test_parse_hits_preserves_order() {
        let passages = parse_hits(&sample_response()).unwrap();
        assert_eq!(passages.len(), 2);
        assert_eq!(passages[0].source_name(), "policy.pdf");
        assert_eq!(passages[0].metadata["category"], "hr");
        assert_eq!(passages[1].page_content, "Laptops are refreshed every 3 years.");
    }

    #[test]
    fn test_parse_hits_tolerates_missing_metadata() {
        let resp = json!({ "hits": { "hits": [
            { "_source": { "text": "bare" } },
            { "_source": { "metadata": { "name": "no-text" } } }
        ]}});
        let passages = parse_hits(&resp).unwrap();
        assert_eq!(passages.len(), 1);
        assert!(passages[0].metadata.is_empty());
    }

    #[test]
    fn test_parse_hits_rejects_malformed() {
        assert!(matches!(
            parse_hits(&json!({ "error": "boom" })),
            Err(DocqaError::Search(_))
        ));
    }

    #[tokio::test]
    async fn test_retrieve_against_fake_cluster() {
        async fn search(
            State(seen): State<Seen>,
            Path(index): Path<String>,
            Json(body): Json<Value>,
        ) -> Json<Value> {
            seen.lock().unwrap().push((index, body));
            Json(sample_response())
        }

        let seen: Seen = Arc::default();
        let router = Router::new()
            .route("/{index}/_search", post(search))
            .with_state(Arc::clone(&seen));
        let url = spawn(router).await;

        let config = ElasticsearchConfig {
            url,
            index: "workplace-app-docs".to_string(),
            ..ElasticsearchConfig::default()
        };
        let client = ElasticsearchClient::from_config(&config).unwrap();
        let store = ElasticsearchStore::from_config(client, &config);

        let passages = store.retrieve("what is the return policy").await.unwrap();
        assert_eq!(passages.len(), 2);
        assert_eq!(passages[0].source_name(), "policy.pdf");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "workplace-app-docs");
        assert_eq!(
            seen[0].1["query"]["bool"]["must"][0]["text_expansion"]["vector.tokens"]["model_text"],
            "what is the return policy"
        );
    }

    #[tokio::test]
    async fn test_retrieve_maps_failures_to_search_error() {
        let store = ElasticsearchStore::new(
            ElasticsearchClient::new("http://127.0.0.1:1"),
            "docs",
            ".elser_model_2",
            4,
        );
        assert!(matches!(
            store.retrieve("q").await,
            Err(DocqaError::Search(_))
        ));
    }
}
