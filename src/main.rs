use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use integrated_rag::cache::QueryCache;
use integrated_rag::core::config::{AppPaths, ConfigService};
use integrated_rag::llm::{Embedder, LlmProvider, OpenAiCompatibleProvider};
use integrated_rag::logging;
use integrated_rag::pipeline::{Collaborators, RagPipeline, TracingLogger};
use integrated_rag::rag::{ElasticsearchStore, InternalSearch};
use integrated_rag::tools::build_providers;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let query = env::args().skip(1).collect::<Vec<_>>().join(" ");
    if query.trim().is_empty() {
        eprintln!("usage: integrated-rag \"<question>\"");
        std::process::exit(2);
    }

    let paths = Arc::new(AppPaths::new());
    let config_service = ConfigService::new(paths.clone());
    let config = config_service
        .load_pipeline_config()
        .context("Failed to load pipeline config")?;
    logging::init(&config.logging, &paths);
    tracing::info!(
        config_path = %config_service.config_path().display(),
        "configuration loaded"
    );

    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .user_agent(concat!("integrated-rag/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    let llm = Arc::new(OpenAiCompatibleProvider::new(&config.llm, client.clone()));

    let internal: Option<Arc<dyn InternalSearch>> =
        config.internal_search.elasticsearch.clone().map(|es| {
            let embedder: Option<Arc<dyn Embedder>> = config
                .llm
                .embedding_model
                .as_ref()
                .map(|_| llm.clone() as Arc<dyn Embedder>);
            Arc::new(ElasticsearchStore::new(es, client.clone(), embedder)) as Arc<dyn InternalSearch>
        });
    if internal.is_none() {
        tracing::warn!("No internal store configured; answering from web search only");
    }

    let collaborators = Collaborators {
        llm: llm as Arc<dyn LlmProvider>,
        internal,
        providers: build_providers(&config.external_search, client),
    };

    let pipeline = RagPipeline::new(
        &config,
        collaborators,
        Arc::new(QueryCache::from_config(&config.cache)),
        Arc::new(TracingLogger),
    )
    .context("Failed to build pipeline graph")?;

    let response = pipeline.run_query(&query, &[]).await;
    println!(
        "{}",
        serde_json::to_string_pretty(&response).context("Failed to serialise response")?
    );

    Ok(())
}
