//! Stdio line-delimited tool server exposing `naive_search`/`hi_search`
//! (spec §4.6/§9), grounded on the teacher's `StdioMCPClient` framing for the
//! read-line/dispatch/write-line loop, adapted from a client driving a
//! subprocess into a server reading requests from its own stdin.

use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use hirag::config::Config;
use hirag::llm::openai::OpenAiCompatibleClient;
use hirag::orchestrator::Orchestrator;
use hirag::processing::Chunker;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Config::default();
    config.validate().map_err(|e| anyhow::anyhow!(e))?;

    let provider = hirag::config::ProviderConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;
    let chat: Arc<dyn hirag::llm::ChatClient> = Arc::new(OpenAiCompatibleClient::new(
        provider.base_url.clone(),
        provider.api_key.clone(),
        provider.embedding_model.clone(),
        config.storage.embedding_dimension,
    ));
    let embedder: Arc<dyn hirag::llm::EmbeddingClient> = Arc::new(OpenAiCompatibleClient::new(
        provider.base_url.clone(),
        provider.api_key.clone(),
        provider.embedding_model.clone(),
        config.storage.embedding_dimension,
    ));

    let tokenizer = Arc::new(hirag::processing::PerCharTokenizer);
    let summarizer = Arc::new(hirag::summarizer::Summarizer::new(
        chat.clone(),
        provider.chat_model.clone(),
        tokenizer,
        4000,
        config.retry.clone(),
    ));
    let graph_store = Arc::new(hirag::graph::GraphStore::load_or_new(
        &config.storage.graph_blob_path,
        summarizer.clone(),
    )?);
    let vector_store = hirag::storage::VectorStore::connect(
        &config.storage.vector_db_path,
        config.storage.embedding_dimension,
        embedder,
        config.retry.clone(),
    )
    .await?;
    let extractor = hirag::extractor::EntityExtractor::new(
        chat,
        provider.chat_model.clone(),
        summarizer,
        config.retry.clone(),
        config.concurrency.clone(),
        config.max_gleaning,
    );
    let chunker = Chunker::with_default_tokenizer(config.chunking.chunk_size, config.chunking.chunk_overlap);

    let orchestrator = Orchestrator::new(chunker, vector_store, graph_store, extractor, config);

    run_stdio_loop(orchestrator).await
}

/// Reads one JSON request per line from stdin (`{"tool": "naive_search" | "hi_search", "query": "..."}`),
/// dispatches it, and writes one JSON response line to stdout.
async fn run_stdio_loop(orchestrator: Orchestrator) -> Result<()> {
    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();
    let stdout = std::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let request: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                write_line(&stdout, &json!({ "error": format!("invalid request: {e}") }))?;
                continue;
            }
        };

        let tool = request.get("tool").and_then(Value::as_str).unwrap_or_default();
        let query = request.get("query").and_then(Value::as_str).unwrap_or_default();
        let topk = request.get("topk").and_then(Value::as_u64).unwrap_or(10) as usize;

        tracing::info!(tool, query, "handling request");
        let response = match tool {
            "naive_search" => naive_search(&orchestrator, query, topk).await,
            "hi_search" => hi_search(&orchestrator, query, topk).await,
            other => json!({ "error": format!("unknown tool: {other}") }),
        };
        tracing::info!(tool, "request complete");

        write_line(&stdout, &response)?;
    }

    Ok(())
}

fn write_line(mut stdout: &std::io::Stdout, value: &Value) -> Result<()> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    stdout.write_all(line.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

/// `naive_search` (spec §4.6/P6): empty query short-circuits before any
/// provider call.
async fn naive_search(orchestrator: &Orchestrator, query: &str, topk: usize) -> Value {
    if query.trim().is_empty() {
        return json!("Error: Query cannot be empty");
    }
    match orchestrator.query_chunks(query, topk).await {
        Ok(hits) => {
            let rows: Vec<Value> = hits
                .iter()
                .map(|h| json!({ "text": h.get_str("text"), "distance": h.distance }))
                .collect();
            json!(rows)
        }
        Err(e) => json!({ "error": e.to_string() }),
    }
}

/// `hi_search` (spec §4.6/§5): `query_all` under a 100s timeout, converted
/// into a human-readable string on expiry (mirrors the original's
/// `asyncio.TimeoutError` handling in `server.py`).
async fn hi_search(orchestrator: &Orchestrator, query: &str, topk: usize) -> Value {
    if query.trim().is_empty() {
        return json!("Error: Query cannot be empty");
    }
    match orchestrator.query_all(query, topk).await {
        Ok(result) => result,
        Err(e) => json!(format!("Error: request timed out or failed: {e}")),
    }
}
