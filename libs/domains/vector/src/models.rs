use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{VectorError, VectorResult};

/// Chunk ids double as vector record ids in every backend.
pub type ChunkId = Uuid;

// ===== Payload keys =====

pub const PAYLOAD_CLIENT_ID: &str = "client_id";
pub const PAYLOAD_KNOWLEDGE_BASE_ID: &str = "knowledge_base_id";
pub const PAYLOAD_DOCUMENT_ID: &str = "document_id";
pub const PAYLOAD_CHUNK_INDEX: &str = "chunk_index";
pub const PAYLOAD_MODEL: &str = "model";
pub const PAYLOAD_TOKEN_COUNT: &str = "token_count";

/// A content-bearing fragment of an ingested document.
///
/// Chunks are produced by ingestion and never mutated afterwards. The owning
/// knowledge base and client are carried so the vector payload can be scoped
/// without a lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub document_id: Uuid,
    pub knowledge_base_id: Uuid,
    pub client_id: Uuid,
    /// Zero-based position within the document
    pub index: u32,
    pub content: String,
    pub token_count: Option<u32>,
}

impl Chunk {
    pub fn new(
        id: ChunkId,
        document_id: Uuid,
        knowledge_base_id: Uuid,
        client_id: Uuid,
        index: u32,
        content: impl Into<String>,
    ) -> VectorResult<Self> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(VectorError::Validation(format!(
                "chunk {} has blank content",
                id
            )));
        }

        Ok(Self {
            id,
            document_id,
            knowledge_base_id,
            client_id,
            index,
            content,
            token_count: None,
        })
    }

    pub fn with_token_count(mut self, token_count: u32) -> Self {
        self.token_count = Some(token_count);
        self
    }

    /// Namespace holding this chunk's vector
    pub fn namespace(&self) -> String {
        namespace_for_knowledge_base(self.knowledge_base_id)
    }
}

// ===== Payload =====

/// Scalar metadata value stored alongside a vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl PayloadValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PayloadValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PayloadValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Convert from JSON. Null, arrays and objects have no scalar form.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(PayloadValue::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(PayloadValue::Integer)
                .or_else(|| n.as_f64().map(PayloadValue::Float)),
            serde_json::Value::String(s) => Some(PayloadValue::Text(s.clone())),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            PayloadValue::Bool(b) => serde_json::Value::Bool(*b),
            PayloadValue::Integer(i) => serde_json::Value::from(*i),
            PayloadValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            PayloadValue::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl fmt::Display for PayloadValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadValue::Bool(b) => write!(f, "{}", b),
            PayloadValue::Integer(i) => write!(f, "{}", i),
            PayloadValue::Float(x) => write!(f, "{}", x),
            PayloadValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for PayloadValue {
    fn from(value: &str) -> Self {
        PayloadValue::Text(value.to_string())
    }
}

impl From<String> for PayloadValue {
    fn from(value: String) -> Self {
        PayloadValue::Text(value)
    }
}

impl From<Uuid> for PayloadValue {
    fn from(value: Uuid) -> Self {
        PayloadValue::Text(value.to_string())
    }
}

impl From<i64> for PayloadValue {
    fn from(value: i64) -> Self {
        PayloadValue::Integer(value)
    }
}

impl From<u32> for PayloadValue {
    fn from(value: u32) -> Self {
        PayloadValue::Integer(i64::from(value))
    }
}

impl From<f64> for PayloadValue {
    fn from(value: f64) -> Self {
        PayloadValue::Float(value)
    }
}

impl From<bool> for PayloadValue {
    fn from(value: bool) -> Self {
        PayloadValue::Bool(value)
    }
}

/// Key/value metadata of a vector record. Ordered so that serialized payloads are stable.
pub type Payload = BTreeMap<String, PayloadValue>;

pub fn payload_to_json(payload: &Payload) -> serde_json::Value {
    serde_json::Value::Object(
        payload
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

/// Non-scalar JSON members are dropped.
pub fn payload_from_json(value: &serde_json::Value) -> Payload {
    match value {
        serde_json::Value::Object(map) => map
            .iter()
            .filter_map(|(k, v)| PayloadValue::from_json(v).map(|v| (k.clone(), v)))
            .collect(),
        _ => Payload::new(),
    }
}

// ===== Records =====

/// An (id, vector, payload) triple as stored in a similarity index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: ChunkId,
    pub vector: Vec<f32>,
    pub payload: Payload,
}

impl VectorRecord {
    pub fn new(id: ChunkId, vector: Vec<f32>) -> Self {
        Self {
            id,
            vector,
            payload: Payload::new(),
        }
    }

    pub fn with_payload(mut self, key: impl Into<String>, value: impl Into<PayloadValue>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Record for a chunk with the standard scoping payload
    pub fn for_chunk(chunk: &Chunk, vector: Vec<f32>, model: &str) -> Self {
        let record = Self::new(chunk.id, vector)
            .with_payload(PAYLOAD_CLIENT_ID, chunk.client_id)
            .with_payload(PAYLOAD_KNOWLEDGE_BASE_ID, chunk.knowledge_base_id)
            .with_payload(PAYLOAD_DOCUMENT_ID, chunk.document_id)
            .with_payload(PAYLOAD_CHUNK_INDEX, chunk.index)
            .with_payload(PAYLOAD_MODEL, model);

        match chunk.token_count {
            Some(tokens) => record.with_payload(PAYLOAD_TOKEN_COUNT, tokens),
            None => record,
        }
    }
}

/// A query hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub id: ChunkId,
    /// `1 - cosine distance`; higher is more similar
    pub score: f32,
    pub payload: Payload,
}

/// Outcome of an upsert batch. Skipped ids were logged and left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertReport {
    pub upserted: usize,
    pub skipped: Vec<ChunkId>,
}

impl UpsertReport {
    pub fn merge(&mut self, other: UpsertReport) {
        self.upserted += other.upserted;
        self.skipped.extend(other.skipped);
    }
}

// ===== Namespaces =====

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceInfo {
    pub name: String,
    pub dimension: u32,
}

const MAX_NAMESPACE_LEN: usize = 63;

/// Namespace of a knowledge base: `kb_<uuid without hyphens>`
pub fn namespace_for_knowledge_base(knowledge_base_id: Uuid) -> String {
    format!("kb_{}", knowledge_base_id.simple())
}

/// Namespaces become table keys and Qdrant collection names, so they are
/// limited to ASCII letters, digits, `_` and `-`.
pub fn validate_namespace(namespace: &str) -> VectorResult<()> {
    if namespace.is_empty() {
        return Err(VectorError::Validation(
            "namespace must not be empty".to_string(),
        ));
    }
    if namespace.len() > MAX_NAMESPACE_LEN {
        return Err(VectorError::Validation(format!(
            "namespace '{}' exceeds {} characters",
            namespace, MAX_NAMESPACE_LEN
        )));
    }
    if !namespace
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(VectorError::Validation(format!(
            "namespace '{}' contains characters outside [A-Za-z0-9_-]",
            namespace
        )));
    }
    Ok(())
}

pub(crate) fn validate_dimension(dimension: u32) -> VectorResult<()> {
    if dimension == 0 {
        return Err(VectorError::Validation(
            "dimension must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

// ===== Query filter =====

/// Optional scoping hints for a query.
///
/// The namespace passed to `query` always bounds the search. Inside it, a
/// knowledge-base filter takes precedence over a tenant filter; with neither
/// the query is unfiltered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFilter {
    pub knowledge_base_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
}

/// The single payload constraint a [`QueryFilter`] resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterScope {
    KnowledgeBase(Uuid),
    Client(Uuid),
}

impl QueryFilter {
    pub fn knowledge_base(knowledge_base_id: Uuid) -> Self {
        Self {
            knowledge_base_id: Some(knowledge_base_id),
            client_id: None,
        }
    }

    pub fn client(client_id: Uuid) -> Self {
        Self {
            knowledge_base_id: None,
            client_id: Some(client_id),
        }
    }

    pub fn scope(&self) -> Option<FilterScope> {
        match (self.knowledge_base_id, self.client_id) {
            (Some(kb), _) => Some(FilterScope::KnowledgeBase(kb)),
            (None, Some(client)) => Some(FilterScope::Client(client)),
            (None, None) => None,
        }
    }
}

impl FilterScope {
    pub fn payload_key(&self) -> &'static str {
        match self {
            FilterScope::KnowledgeBase(_) => PAYLOAD_KNOWLEDGE_BASE_ID,
            FilterScope::Client(_) => PAYLOAD_CLIENT_ID,
        }
    }

    pub fn value(&self) -> String {
        match self {
            FilterScope::KnowledgeBase(id) | FilterScope::Client(id) => id.to_string(),
        }
    }

    pub fn matches(&self, payload: &Payload) -> bool {
        payload
            .get(self.payload_key())
            .and_then(PayloadValue::as_str)
            .is_some_and(|v| v.eq_ignore_ascii_case(&self.value()))
    }
}

// ===== Backend references =====

/// Which similarity-index implementation holds a vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    Memory,
    Pgvector,
    Qdrant,
}

impl IndexBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexBackend::Memory => "memory",
            IndexBackend::Pgvector => "pgvector",
            IndexBackend::Qdrant => "qdrant",
        }
    }
}

impl fmt::Display for IndexBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexBackend {
    type Err = VectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(IndexBackend::Memory),
            "pgvector" | "postgres" | "postgresql" => Ok(IndexBackend::Pgvector),
            "qdrant" => Ok(IndexBackend::Qdrant),
            other => Err(VectorError::Validation(format!(
                "unknown index backend '{}'",
                other
            ))),
        }
    }
}

/// Pointer from a chunk to its vector in one backend. At most one per (chunk, backend).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorRef {
    pub chunk_id: ChunkId,
    pub backend: IndexBackend,
    /// Namespace (table partition or collection) holding the vector
    pub index_name: String,
    /// Backend-native vector identifier
    pub vector_id: String,
    pub updated_at: DateTime<Utc>,
}

impl VectorRef {
    pub fn new(chunk_id: ChunkId, backend: IndexBackend, index_name: impl Into<String>) -> Self {
        Self {
            chunk_id,
            backend,
            index_name: index_name.into(),
            vector_id: chunk_id.to_string(),
            updated_at: Utc::now(),
        }
    }
}

// ===== Embedding models =====

/// Embedding models with known output dimensions
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EmbeddingModel {
    /// text-embedding-3-small (1536 dimensions)
    #[default]
    TextEmbedding3Small,
    /// text-embedding-3-large (3072 dimensions)
    TextEmbedding3Large,
    /// text-embedding-ada-002 (1536 dimensions, legacy)
    TextEmbeddingAda002,
    /// Any other model served by an OpenAI-compatible endpoint
    Custom { name: String, dimension: u32 },
}

impl EmbeddingModel {
    /// Resolve a model name; unknown names need an explicit dimension.
    pub fn from_name(name: &str, dimension: Option<u32>) -> VectorResult<Self> {
        let known = match name {
            "text-embedding-3-small" => Some(EmbeddingModel::TextEmbedding3Small),
            "text-embedding-3-large" => Some(EmbeddingModel::TextEmbedding3Large),
            "text-embedding-ada-002" => Some(EmbeddingModel::TextEmbeddingAda002),
            _ => None,
        };

        match (known, dimension) {
            (Some(model), _) => Ok(model),
            (None, Some(dimension)) => {
                validate_dimension(dimension)?;
                Ok(EmbeddingModel::Custom {
                    name: name.to_string(),
                    dimension,
                })
            }
            (None, None) => Err(VectorError::Config(format!(
                "unknown embedding model '{}' requires an explicit dimension",
                name
            ))),
        }
    }

    pub fn dimension(&self) -> u32 {
        match self {
            EmbeddingModel::TextEmbedding3Small => 1536,
            EmbeddingModel::TextEmbedding3Large => 3072,
            EmbeddingModel::TextEmbeddingAda002 => 1536,
            EmbeddingModel::Custom { dimension, .. } => *dimension,
        }
    }

    pub fn model_name(&self) -> &str {
        match self {
            EmbeddingModel::TextEmbedding3Small => "text-embedding-3-small",
            EmbeddingModel::TextEmbedding3Large => "text-embedding-3-large",
            EmbeddingModel::TextEmbeddingAda002 => "text-embedding-ada-002",
            EmbeddingModel::Custom { name, .. } => name,
        }
    }

    /// Whether the model accepts a `dimensions` request parameter
    pub fn supports_shortening(&self) -> bool {
        matches!(
            self,
            EmbeddingModel::TextEmbedding3Small | EmbeddingModel::TextEmbedding3Large
        )
    }
}
