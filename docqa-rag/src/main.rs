use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, bail};
use docqa_rag::{
    AnswerSynthesizer, EmbeddingProvider, ExtractiveSynthesizer, HashingEmbedder, PipelineConfig,
    SessionPipeline, Upload,
};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Overwrite `field` with the parsed value of environment variable `name`, if set.
fn env_override<T: FromStr>(name: &str, field: &mut T) -> anyhow::Result<()>
where
    T::Err: std::fmt::Display,
{
    if let Ok(raw) = std::env::var(name) {
        *field = raw.parse().map_err(|e| anyhow::anyhow!("invalid {name}={raw}: {e}"))?;
    }
    Ok(())
}

fn load_config() -> anyhow::Result<PipelineConfig> {
    let mut config = match std::env::var("DOCQA_CONFIG") {
        Ok(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config file {path}"))?;
            serde_json::from_str(&raw).with_context(|| format!("invalid config file {path}"))?
        }
        Err(_) => PipelineConfig::default(),
    };

    env_override("DOCQA_CHUNK_MAX_LENGTH", &mut config.chunk_max_length)?;
    env_override("DOCQA_CHUNK_OVERLAP", &mut config.chunk_overlap)?;
    env_override("DOCQA_RETRIEVAL_K", &mut config.retrieval_k)?;
    env_override("DOCQA_MAX_DOCUMENTS", &mut config.max_documents_per_session)?;
    env_override("DOCQA_MAX_DOCUMENT_BYTES", &mut config.max_document_size_bytes)?;
    env_override("DOCQA_RELEVANCE_THRESHOLD", &mut config.relevance_threshold)?;
    env_override("DOCQA_RETRY_ATTEMPTS", &mut config.ingestion_retry_attempts)?;
    env_override("DOCQA_BACKOFF_BASE_MS", &mut config.ingestion_backoff_base_ms)?;
    env_override("DOCQA_MAX_BACKOFF_MS", &mut config.max_backoff_ms)?;
    env_override("DOCQA_EMBEDDING_BATCH_SIZE", &mut config.embedding_batch_size)?;

    config.validate()?;
    Ok(config)
}

#[cfg(feature = "openai")]
fn providers() -> anyhow::Result<(Arc<dyn EmbeddingProvider>, Arc<dyn AnswerSynthesizer>)> {
    use docqa_rag::{OpenAIChatSynthesizer, OpenAIEmbeddingProvider};

    if std::env::var("OPENAI_API_KEY").is_ok() {
        return Ok((
            Arc::new(OpenAIEmbeddingProvider::from_env()?),
            Arc::new(OpenAIChatSynthesizer::from_env()?),
        ));
    }
    Ok((Arc::new(HashingEmbedder::default()), Arc::new(ExtractiveSynthesizer::default())))
}

#[cfg(not(feature = "openai"))]
fn providers() -> anyhow::Result<(Arc<dyn EmbeddingProvider>, Arc<dyn AnswerSynthesizer>)> {
    Ok((Arc::new(HashingEmbedder::default()), Arc::new(ExtractiveSynthesizer::default())))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        bail!("usage: docqa <file>... (questions are read from stdin, one per line)");
    }

    let config = load_config()?;
    let (embedder, synthesizer) = providers()?;
    let pipeline = SessionPipeline::builder()
        .config(config)
        .embedding_provider(embedder)
        .synthesizer(synthesizer)
        .build()?;

    let uploads = paths
        .iter()
        .map(|path| {
            let content = std::fs::read(path).with_context(|| format!("failed to read {path}"))?;
            let filename = std::path::Path::new(path)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.clone());
            Ok(Upload::new(filename, content))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let session = pipeline.create_session().await;
    let report = pipeline.ingest(&session, uploads).await?;
    println!(
        "Indexed {} chunks from {} document(s). Ask a question (Ctrl-D to quit).",
        report.chunk_count,
        report.documents.len()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        match pipeline.query(&session, question).await {
            Ok(answer) => {
                println!("\n{}", answer.text);
                for source in &answer.sources {
                    println!("  source: {}", source.name);
                }
                println!();
            }
            Err(e) => eprintln!("error: {e}"),
        }
    }

    pipeline.close_session(&session).await?;
    Ok(())
}
