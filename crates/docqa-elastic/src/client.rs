//! Minimal Elasticsearch REST client.

use std::time::Duration;

use base64::Engine;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::debug;

use docqa_core::config::ElasticsearchConfig;
use docqa_core::error::DocqaError;

#[derive(Debug, Clone)]
enum Auth {
    None,
    Basic { username: String, password: String },
    ApiKey(String),
}

/// JSON-over-HTTP client for a single Elasticsearch cluster.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct ElasticsearchClient {
    base_url: String,
    http: Client,
    auth: Auth,
}

impl ElasticsearchClient {
    /// Build a client from configuration.
    ///
    /// A cloud id takes precedence over `url`; an API key takes precedence
    /// over basic credentials.
    pub fn from_config(config: &ElasticsearchConfig) -> Result<Self, DocqaError> {
        let base_url = match config.cloud_id.as_deref() {
            Some(cloud_id) => decode_cloud_id(cloud_id)?,
            None => config.url.clone(),
        };

        let auth = match (&config.api_key, &config.username, &config.password) {
            (Some(key), _, _) => Auth::ApiKey(key.clone()),
            (None, Some(user), Some(pass)) => Auth::Basic {
                username: user.clone(),
                password: pass.clone(),
            },
            _ => Auth::None,
        };

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DocqaError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            auth,
        })
    }

    /// Client for an unauthenticated endpoint.
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: Client::new(),
            auth: Auth::None,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let builder = self.http.request(method, url);
        match &self.auth {
            Auth::None => builder,
            Auth::Basic { username, password } => builder.basic_auth(username, Some(password)),
            Auth::ApiKey(key) => builder.header("Authorization", format!("ApiKey {}", key)),
        }
    }

    /// Run a `_search` request against an index.
    pub async fn search(&self, index: &str, body: &Value) -> Result<Value, DocqaError> {
        debug!(index, "Elasticsearch search");
        let res = self
            .request(Method::POST, &format!("{}/_search", index))
            .json(body)
            .send()
            .await
            .map_err(|e| DocqaError::Http(format!("search request failed: {}", e)))?;
        json_or_error(res).await
    }

    /// Whether an index exists.
    pub async fn index_exists(&self, index: &str) -> Result<bool, DocqaError> {
        let res = self
            .request(Method::HEAD, index)
            .send()
            .await
            .map_err(|e| DocqaError::Http(format!("index check failed: {}", e)))?;
        match res.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(DocqaError::Http(format!(
                "index check for '{}' returned {}",
                index, status
            ))),
        }
    }

    /// Create an index with the given mappings.
    pub async fn create_index(&self, index: &str, mappings: &Value) -> Result<(), DocqaError> {
        let body = serde_json::json!({ "mappings": mappings });
        let res = self
            .request(Method::PUT, index)
            .json(&body)
            .send()
            .await
            .map_err(|e| DocqaError::Http(format!("create index failed: {}", e)))?;

        // Another instance may have created it first.
        if res.status() == StatusCode::BAD_REQUEST {
            let text = res.text().await.unwrap_or_default();
            if text.contains("resource_already_exists_exception") {
                return Ok(());
            }
            return Err(DocqaError::Http(format!("create index '{}': {}", index, text)));
        }
        json_or_error(res).await.map(|_| ())
    }

    /// Index a document, optionally waiting for it to become searchable.
    pub async fn index_document(
        &self,
        index: &str,
        document: &Value,
        refresh: bool,
    ) -> Result<Value, DocqaError> {
        let path = if refresh {
            format!("{}/_doc?refresh=true", index)
        } else {
            format!("{}/_doc", index)
        };
        let res = self
            .request(Method::POST, &path)
            .json(document)
            .send()
            .await
            .map_err(|e| DocqaError::Http(format!("index request failed: {}", e)))?;
        json_or_error(res).await
    }
}

async fn json_or_error(res: reqwest::Response) -> Result<Value, DocqaError> {
    let status = res.status();
    if !status.is_success() {
        let text = res.text().await.unwrap_or_default();
        return Err(DocqaError::Http(format!("{}: {}", status, text)));
    }
    res.json::<Value>()
        .await
        .map_err(|e| DocqaError::Serialization(format!("invalid Elasticsearch response: {}", e)))
}

/// Resolve an Elastic Cloud id (`name:base64(host$es_uuid$kibana_uuid)`) to
/// the deployment's Elasticsearch URL.
pub fn decode_cloud_id(cloud_id: &str) -> Result<String, DocqaError> {
    let invalid = || DocqaError::Config("invalid Elastic Cloud id".to_string());

    let encoded = cloud_id.split_once(':').map(|(_, rest)| rest).unwrap_or(cloud_id);
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|_| invalid())?;
    let decoded = String::from_utf8(decoded).map_err(|_| invalid())?;

    let mut parts = decoded.split('$');
    let host = parts.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
    let es_uuid = parts.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;

    let (host, port) = match host.rsplit_once(':') {
        Some((h, p)) => (h, p),
        None => (host, "443"),
    };
    Ok(format!("https://{}.{}:{}", es_uuid, host, port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode as AxStatus};
    use axum::routing::{head, post};
    use axum::{Json, Router};
    use serde_json::json;

    async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn encode(s: &str) -> String {
        base64::engine::general_purpose::STANDARD.encode(s)
    }

    #[test]
    fn test_decode_cloud_id() {
        let id = format!("my-deploy:{}", encode("us-central1.gcp.cloud.es.io$abc123$kib456"));
        assert_eq!(
            decode_cloud_id(&id).unwrap(),
            "https://abc123.us-central1.gcp.cloud.es.io:443"
        );
    }

    #[test]
    fn test_decode_cloud_id_with_port() {
        let id = format!("d:{}", encode("eu-west-1.aws.found.io:9243$es1$kb1"));
        assert_eq!(
            decode_cloud_id(&id).unwrap(),
            "https://es1.eu-west-1.aws.found.io:9243"
        );
    }

    #[test]
    fn test_decode_cloud_id_invalid() {
        assert!(decode_cloud_id("name:!!!not-base64").is_err());
        assert!(decode_cloud_id(&format!("n:{}", encode("hostonly"))).is_err());
    }

    #[test]
    fn test_from_config_prefers_cloud_id() {
        let config = ElasticsearchConfig {
            cloud_id: Some(format!("x:{}", encode("host.io$uuid$k"))),
            ..ElasticsearchConfig::default()
        };
        let client = ElasticsearchClient::from_config(&config).unwrap();
        assert_eq!(client.base_url(), "https://uuid.host.io:443");
    }

    #[tokio::test]
    async fn test_api_key_header_sent() {
        async fn echo_auth(headers: HeaderMap) -> Json<serde_json::Value> {
            let auth = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();
            Json(json!({ "auth": auth }))
        }
        let url = spawn(Router::new().route("/{index}/_search", post(echo_auth))).await;
        let config = ElasticsearchConfig {
            url,
            api_key: Some("c2VjcmV0".to_string()),
            username: Some("elastic".to_string()),
            password: Some("pw".to_string()),
            ..ElasticsearchConfig::default()
        };
        let client = ElasticsearchClient::from_config(&config).unwrap();
        let res = client.search("docs", &json!({})).await.unwrap();
        assert_eq!(res["auth"], "ApiKey c2VjcmV0");
    }

    #[tokio::test]
    async fn test_error_status_is_http_error() {
        async fn fail() -> (AxStatus, &'static str) {
            (AxStatus::SERVICE_UNAVAILABLE, "cluster unavailable")
        }
        let url = spawn(Router::new().route("/{index}/_search", post(fail))).await;
        let client = ElasticsearchClient::new(&url);
        let err = client.search("docs", &json!({})).await.unwrap_err();
        assert!(matches!(err, DocqaError::Http(_)));
        assert!(err.to_string().contains("cluster unavailable"));
    }

    #[tokio::test]
    async fn test_index_exists() {
        async fn found() -> AxStatus {
            AxStatus::OK
        }
        async fn missing() -> AxStatus {
            AxStatus::NOT_FOUND
        }
        let url = spawn(
            Router::new()
                .route("/present", head(found))
                .route("/absent", head(missing)),
        )
        .await;
        let client = ElasticsearchClient::new(&url);
        assert!(client.index_exists("present").await.unwrap());
        assert!(!client.index_exists("absent").await.unwrap());
    }

    #[tokio::test]
    async fn test_unreachable_cluster() {
        let client = ElasticsearchClient::new("http://127.0.0.1:1");
        let err = client.search("docs", &json!({})).await.unwrap_err();
        assert!(matches!(err, DocqaError::Http(_)));
    }
}
