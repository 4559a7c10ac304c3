//! Backends for the core [`EmbeddingProvider`] trait.
//!
//! `[embedding] provider` picks one:
//!
//! | Value | Backend |
//! |-------|---------|
//! | `disabled` | [`DisabledProvider`], every call fails |
//! | `openai` | [`OpenAIProvider`], `POST /v1/embeddings` |
//! | `ollama` | [`OllamaProvider`], `POST {url}/api/embed` |
//! | `local` | `LocalProvider`, a fastembed model loaded on first use |
//!
//! Remote calls go through one retry loop: 429 and 5xx responses and
//! connection failures are retried after 1s, 2s, 4s ... (capped at 32s)
//! up to `max_retries` times; other 4xx responses fail at once.
//!
//! ```rust,no_run
//! # use chunkscan::config::EmbeddingConfig;
//! # use chunkscan::embedding::create_provider;
//! let provider = create_provider(&EmbeddingConfig::default()).unwrap();
//! assert_eq!(provider.model_name(), "disabled");
//! ```

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

pub use chunkscan_core::embedding::EmbeddingProvider;

use crate::config::EmbeddingConfig;

const OPENAI_URL: &str = "https://api.openai.com/v1/embeddings";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// Stands in when no provider is configured; ingestion and scans fail
/// with a pointer to the config.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled; set [embedding] provider in the config")
    }
}

fn http_client(config: &EmbeddingConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

/// POST `body` to `url`, retrying 429/5xx and network errors with
/// exponential backoff, and return the parsed JSON response.
async fn post_json_with_retry(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    max_retries: u32,
    label: &str,
) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tracing::debug!(attempt, ?delay, "{} embedding retry", label);
            tokio::time::sleep(delay).await;
        }

        let mut request = client.post(url).json(body);
        if let Some(key) = bearer {
            request = request.bearer_auth(key);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                let transient = status == reqwest::StatusCode::TOO_MANY_REQUESTS
                    || status.is_server_error();
                let detail = response.text().await.unwrap_or_default();
                let err = anyhow::anyhow!("{} returned {}: {}", label, status, detail);
                if !transient {
                    return Err(err);
                }
                tracing::warn!(%status, attempt, "{} request failed, will retry", label);
                last_err = Some(err);
            }
            Err(e) => {
                tracing::warn!(attempt, error = %e, "{} unreachable, will retry", label);
                last_err = Some(anyhow::Error::new(e).context(format!("{} at {}", label, url)));
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| anyhow::anyhow!("{} gave no response", label))
        .context(format!("{} embedding failed after {} retries", label, max_retries)))
}

/// Numbers as `f32`; a non-numeric entry fails the whole vector.
fn json_to_vec(values: &[serde_json::Value]) -> Option<Vec<f32>> {
    values.iter().map(|v| v.as_f64().map(|f| f as f32)).collect()
}

/// `(model, dims)` for a remote provider; both must be configured since
/// the service cannot be asked for its dimensionality up front.
fn remote_model(config: &EmbeddingConfig) -> Result<(String, usize)> {
    match (&config.model, config.dims) {
        (Some(model), Some(dims)) if dims > 0 => Ok((model.clone(), dims)),
        _ => bail!(
            "provider '{}' needs both embedding.model and embedding.dims",
            config.provider
        ),
    }
}

/// OpenAI embeddings. `OPENAI_API_KEY` is read when constructed but only
/// required once something is embedded, so store-only commands work
/// without it.
pub struct OpenAIProvider {
    model: String,
    dims: usize,
    api_key: Option<String>,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model, dims) = remote_model(config)?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());

        Ok(Self {
            model,
            dims,
            api_key,
            max_retries: config.max_retries,
            client: http_client(config)?,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let Some(api_key) = self.api_key.as_deref() else {
            bail!("OPENAI_API_KEY environment variable not set");
        };
        let json = post_json_with_retry(
            &self.client,
            OPENAI_URL,
            Some(api_key),
            &embed_body(&self.model, texts),
            self.max_retries,
            "OpenAI",
        )
        .await?;
        parse_openai_response(&json)
    }
}

/// Request body shared by both remote APIs.
fn embed_body(model: &str, texts: &[String]) -> serde_json::Value {
    serde_json::json!({ "model": model, "input": texts })
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let Some(data) = json["data"].as_array() else {
        bail!("OpenAI response has no `data` array");
    };

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let Some(vector) = item["embedding"].as_array().and_then(|e| json_to_vec(e)) else {
            bail!("OpenAI response item {} has no numeric `embedding`", position);
        };
        let index = item["index"].as_u64().map_or(position, |i| i as usize);
        indexed.push((index, vector));
    }

    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

/// Ollama's `/api/embed`, at `embedding.url` or `http://localhost:11434`.
pub struct OllamaProvider {
    model: String,
    dims: usize,
    url: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model, dims) = remote_model(config)?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| OLLAMA_DEFAULT_URL.to_string());

        Ok(Self {
            model,
            dims,
            url: url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            client: http_client(config)?,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let json = post_json_with_retry(
            &self.client,
            &format!("{}/api/embed", self.url),
            None,
            &embed_body(&self.model, texts),
            self.max_retries,
            "Ollama",
        )
        .await?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let Some(embeddings) = json["embeddings"].as_array() else {
        bail!("Ollama response has no `embeddings` array");
    };
    embeddings
        .iter()
        .enumerate()
        .map(|(i, e)| match e.as_array().and_then(|v| json_to_vec(v)) {
            Some(vector) => Ok(vector),
            None => bail!("Ollama embedding {} is not a numeric array", i),
        })
        .collect()
}

/// Local model used when `embedding.model` is unset. Multilingual, since
/// ingested documents are not assumed to be English.
pub const DEFAULT_LOCAL_MODEL: &str = "paraphrase-multilingual-minilm-l12-v2";

/// Config name and output width of each supported local model.
const LOCAL_MODELS: &[(&str, usize)] = &[
    ("paraphrase-multilingual-minilm-l12-v2", 384),
    ("paraphrase-multilingual-mpnet-base-v2", 768),
    ("multilingual-e5-small", 384),
    ("multilingual-e5-base", 768),
    ("multilingual-e5-large", 1024),
    ("all-minilm-l6-v2", 384),
    ("all-minilm-l12-v2", 384),
    ("bge-small-en-v1.5", 384),
    ("bge-base-en-v1.5", 768),
    ("bge-large-en-v1.5", 1024),
];

/// Resolve the local model name and its dimensionality. An explicit
/// `embedding.dims` wins over the table.
pub fn resolve_local_model(config: &EmbeddingConfig) -> Result<(String, usize)> {
    let name = config.model.as_deref().unwrap_or(DEFAULT_LOCAL_MODEL);
    let Some(&(_, width)) = LOCAL_MODELS.iter().find(|(n, _)| *n == name) else {
        let known: Vec<&str> = LOCAL_MODELS.iter().map(|(n, _)| *n).collect();
        bail!(
            "unknown local embedding model '{}'; expected one of: {}",
            name,
            known.join(", ")
        );
    };
    Ok((name.to_string(), config.dims.unwrap_or(width)))
}

#[cfg(feature = "local-embeddings-fastembed")]
fn fastembed_model(name: &str) -> Option<fastembed::EmbeddingModel> {
    use fastembed::EmbeddingModel as M;
    Some(match name {
        "paraphrase-multilingual-minilm-l12-v2" => M::ParaphraseMLMiniLML12V2,
        "paraphrase-multilingual-mpnet-base-v2" => M::ParaphraseMLMpnetBaseV2,
        "multilingual-e5-small" => M::MultilingualE5Small,
        "multilingual-e5-base" => M::MultilingualE5Base,
        "multilingual-e5-large" => M::MultilingualE5Large,
        "all-minilm-l6-v2" => M::AllMiniLML6V2,
        "all-minilm-l12-v2" => M::AllMiniLML12V2,
        "bge-small-en-v1.5" => M::BGESmallENV15,
        "bge-base-en-v1.5" => M::BGEBaseENV15,
        "bge-large-en-v1.5" => M::BGELargeENV15,
        _ => return None,
    })
}

/// In-process embedding provider backed by fastembed.
///
/// Models are downloaded from Hugging Face on first use and cached; after
/// that, embedding runs offline. The loaded model is shared by every
/// call on this provider.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalProvider {
    model_name: String,
    dims: usize,
    model: fastembed::EmbeddingModel,
    batch_size: usize,
    loaded: std::sync::Arc<std::sync::Mutex<Option<fastembed::TextEmbedding>>>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model_name, dims) = resolve_local_model(config)?;
        let Some(model) = fastembed_model(&model_name) else {
            bail!("local model '{}' is not available in this build", model_name);
        };
        Ok(Self {
            model_name,
            dims,
            model,
            batch_size: config.batch_size,
            loaded: Default::default(),
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let texts = texts.to_vec();
        let loaded = self.loaded.clone();
        let model = self.model.clone();
        let batch_size = self.batch_size;

        tokio::task::spawn_blocking(move || {
            let mut guard = loaded
                .lock()
                .map_err(|_| anyhow::anyhow!("local embedding model lock poisoned"))?;
            if guard.is_none() {
                tracing::info!(?model, "loading local embedding model");
                let options = fastembed::InitOptions::new(model).with_show_download_progress(true);
                match fastembed::TextEmbedding::try_new(options) {
                    Ok(loaded_model) => *guard = Some(loaded_model),
                    Err(e) => bail!("loading local embedding model: {}", e),
                }
            }
            let Some(session) = guard.as_mut() else {
                bail!("local embedding model unavailable");
            };
            session
                .embed(texts, Some(batch_size))
                .map_err(|e| anyhow::anyhow!("local embedding: {}", e))
        })
        .await?
    }
}

/// Build the provider named by `config.provider`.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    let provider: Box<dyn EmbeddingProvider> = match config.provider.as_str() {
        "disabled" => Box::new(DisabledProvider),
        "openai" => Box::new(OpenAIProvider::new(config)?),
        "ollama" => Box::new(OllamaProvider::new(config)?),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Box::new(LocalProvider::new(config)?),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("the local provider needs the `local-embeddings-fastembed` feature"),
        other => bail!("unknown embedding provider '{}'", other),
    };
    tracing::debug!(
        provider = %config.provider,
        model = provider.model_name(),
        dims = provider.dims(),
        "embedding provider ready"
    );
    Ok(provider)
}
