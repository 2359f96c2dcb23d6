mod cli;

use std::sync::Arc;

use clap::Parser;

use docqa_api::{start_server, AppState};
use docqa_chat::QaOrchestrator;
use docqa_core::config::{DocqaConfig, HistoryBackend};
use docqa_core::mock::InMemoryChatHistory;
use docqa_core::service::{ChatHistoryStore, DocumentStore, LanguageModel};
use docqa_elastic::{ElasticsearchChatHistory, ElasticsearchClient, ElasticsearchStore};
use docqa_llm::{OpenAiChatModel, PromptRenderer};
use docqa_storage::{Database, SqliteChatHistory};

use cli::{expand_home, CliArgs};

/// Build the chat history store selected by configuration.
fn history_store(
    config: &DocqaConfig,
    es_client: &ElasticsearchClient,
) -> Result<Arc<dyn ChatHistoryStore>, Box<dyn std::error::Error>> {
    let store: Arc<dyn ChatHistoryStore> = match config.history.backend {
        HistoryBackend::Elasticsearch => {
            tracing::info!(
                index = %config.elasticsearch.chat_history_index,
                "Chat history in Elasticsearch"
            );
            Arc::new(ElasticsearchChatHistory::from_config(
                es_client.clone(),
                &config.elasticsearch,
            ))
        }
        HistoryBackend::Sqlite => {
            let path = expand_home(&config.history.sqlite_path);
            let db = Database::new(&path)?;
            tracing::info!(path = %path.display(), "Chat history in SQLite");
            Arc::new(SqliteChatHistory::new(Arc::new(db)))
        }
        HistoryBackend::Memory => {
            tracing::warn!("Chat history in memory; it is lost on restart");
            Arc::new(InMemoryChatHistory::new())
        }
    };
    Ok(store)
}

fn prompt_renderer(config: &DocqaConfig) -> Result<PromptRenderer, Box<dyn std::error::Error>> {
    match config.prompts.template_dir.as_deref() {
        Some(dir) => {
            let dir = expand_home(dir);
            tracing::info!(dir = %dir.display(), "Loading prompt templates");
            Ok(PromptRenderer::from_dir(&dir)?)
        }
        None => Ok(PromptRenderer::new()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config: file, then environment, then flags.
    let config_file = args.resolve_config_path();
    let (mut config, load_error) = match DocqaConfig::load(&config_file) {
        Ok(config) => (config, None),
        Err(e) => (DocqaConfig::default(), Some(e)),
    };
    config.apply_env_overrides()?;
    args.apply(&mut config);

    // Tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .init();

    tracing::info!("Starting docqa v{}", env!("CARGO_PKG_VERSION"));
    match load_error {
        None => tracing::info!(path = %config_file.display(), "Configuration loaded"),
        Some(e) => tracing::warn!(
            path = %config_file.display(),
            error = %e,
            "Failed to load config; using defaults"
        ),
    }

    // Collaborators.
    let es_client = ElasticsearchClient::from_config(&config.elasticsearch)?;
    tracing::info!(
        url = %es_client.base_url(),
        index = %config.elasticsearch.index,
        model = %config.elasticsearch.elser_model,
        "Elasticsearch document store"
    );
    let documents: Arc<dyn DocumentStore> = Arc::new(ElasticsearchStore::from_config(
        es_client.clone(),
        &config.elasticsearch,
    ));
    let history = history_store(&config, &es_client)?;

    let llm = OpenAiChatModel::from_config(&config.llm)?;
    if config.llm.api_key.is_none() {
        tracing::warn!(base_url = %config.llm.base_url, "No LLM API key configured");
    }
    tracing::info!(model = %llm.model(), "Language model ready");
    let llm: Arc<dyn LanguageModel> = Arc::new(llm);

    let prompts = Arc::new(prompt_renderer(&config)?);

    let orchestrator = QaOrchestrator::new(documents, history, llm, prompts);
    let state = AppState::new(config, orchestrator);

    // === API server ===

    if let Err(e) = start_server(state).await {
        tracing::error!(error = %e, "API server stopped");
        return Err(e.into());
    }
    Ok(())
}
