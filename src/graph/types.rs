//! Core types for the knowledge graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Structured key/value payload carried by a node (`content`, `metadata`).
pub type Payload = Map<String, Value>;

/// Evidence tag for edges produced by the similarity scan.
pub const SEMANTIC_SIMILARITY: &str = "semantic_similarity";

/// Content-addressed node identifier.
///
/// Derived from the SHA-256 of the canonical JSON encoding of
/// `{"concept": .., "content": ..}`, so identical input always maps to the
/// same id regardless of map insertion order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Derive the id for a concept/content pair.
    pub fn derive(concept: &str, content: &Payload) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"{\"concept\":");
        hasher.update(Value::String(concept.to_string()).to_string().as_bytes());
        hasher.update(b",\"content\":");
        hasher.update(canonical_json(&Value::Object(content.clone())).as_bytes());
        hasher.update(b"}");
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Wrap an id read back from storage.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Serialize a JSON value with object keys in sorted order at every depth.
pub fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| {
                    format!(
                        "{}:{}",
                        Value::String(k.clone()),
                        canonical_json(&map[k.as_str()])
                    )
                })
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        scalar => scalar.to_string(),
    }
}

/// Render a value the way conflict detection compares it: bare strings
/// without quotes, everything else as canonical JSON.
pub fn value_repr(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => canonical_json(other),
    }
}

/// Kind of knowledge a node carries.
///
/// Unknown caller tags are coerced to `General`; the raw tag is kept in the
/// node's metadata under `original_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeType {
    General,
    Insight,
    ConversationPattern,
    UserPreference,
    Research,
}

impl KnowledgeType {
    /// Parse a known tag.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_lowercase().as_str() {
            "general" => Some(Self::General),
            "insight" => Some(Self::Insight),
            "conversation_pattern" => Some(Self::ConversationPattern),
            "user_preference" => Some(Self::UserPreference),
            "research" => Some(Self::Research),
            _ => None,
        }
    }

    /// Parse any tag, coercing unknown values to `General`.
    pub fn parse_lenient(tag: &str) -> Self {
        Self::parse(tag).unwrap_or(Self::General)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Insight => "insight",
            Self::ConversationPattern => "conversation_pattern",
            Self::UserPreference => "user_preference",
            Self::Research => "research",
        }
    }
}

impl Default for KnowledgeType {
    fn default() -> Self {
        Self::General
    }
}

impl std::fmt::Display for KnowledgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Clamp a confidence into [0, 1], mapping NaN to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// A single stored knowledge fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeNode {
    pub id: NodeId,
    /// Short label
    pub concept: String,
    /// Structured payload, opaque to the store
    pub content: Payload,
    /// Always within [0, 1]
    pub confidence: f64,
    pub knowledge_type: KnowledgeType,
    pub usage_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub metadata: Payload,
}

impl KnowledgeNode {
    /// Create a node with default confidence 1.0 and type `General`.
    pub fn new(concept: impl Into<String>, content: Payload) -> Self {
        let concept = concept.into();
        let now = Utc::now();
        Self {
            id: NodeId::derive(&concept, &content),
            concept,
            content,
            confidence: 1.0,
            knowledge_type: KnowledgeType::General,
            usage_count: 0,
            created_at: now,
            last_accessed_at: now,
            metadata: Payload::new(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = clamp_unit(confidence);
        self
    }

    pub fn with_type(mut self, knowledge_type: KnowledgeType) -> Self {
        self.knowledge_type = knowledge_type;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_timestamps(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self.last_accessed_at = at;
        self
    }

    /// Replace the content and re-derive the id.
    pub fn set_content(&mut self, content: Payload) {
        self.content = content;
        self.id = NodeId::derive(&self.concept, &self.content);
    }

    /// Text used for similarity scoring: keys and scalar leaves in sorted
    /// key order.
    pub fn content_text(&self) -> String {
        let mut words = Vec::new();
        collect_text(&Value::Object(self.content.clone()), &mut words);
        words.join(" ")
    }

    /// Insight description, if this node carries one.
    pub fn description(&self) -> Option<&str> {
        self.content.get("description").and_then(Value::as_str)
    }

    /// Source node ids recorded in `metadata.sources`.
    pub fn sources(&self) -> Vec<NodeId> {
        self.metadata
            .get("sources")
            .and_then(Value::as_array)
            .map(|ids| {
                ids.iter()
                    .filter_map(Value::as_str)
                    .map(NodeId::from_raw)
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn collect_text(value: &Value, words: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                words.push(key.clone());
                collect_text(&map[key.as_str()], words);
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_text(item, words)),
        Value::String(s) => words.push(s.clone()),
        Value::Null => {}
        scalar => words.push(scalar.to_string()),
    }
}

/// Caller-supplied knowledge record, as accepted by the facade.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeInput {
    pub concept: String,
    #[serde(default)]
    pub content: Payload,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(rename = "type", default)]
    pub knowledge_type: String,
    #[serde(default)]
    pub metadata: Payload,
}

fn default_confidence() -> f64 {
    0.5
}

impl KnowledgeInput {
    pub fn new(concept: impl Into<String>, content: Payload) -> Self {
        Self {
            concept: concept.into(),
            content,
            confidence: default_confidence(),
            knowledge_type: KnowledgeType::General.to_string(),
            metadata: Payload::new(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_type(mut self, tag: impl Into<String>) -> Self {
        self.knowledge_type = tag.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Build the node this input describes, stamped at `now`.
    pub fn into_node(self, now: DateTime<Utc>) -> KnowledgeNode {
        let parsed = KnowledgeType::parse(&self.knowledge_type);
        let coerced = parsed.is_none() && !self.knowledge_type.trim().is_empty();
        if coerced {
            tracing::debug!(
                tag = %self.knowledge_type,
                "unknown knowledge type coerced to general"
            );
        }
        let knowledge_type = parsed.unwrap_or_default();

        let mut node = KnowledgeNode::new(self.concept, self.content)
            .with_confidence(self.confidence)
            .with_type(knowledge_type)
            .with_timestamps(now);
        node.metadata = self.metadata;
        if coerced {
            node.metadata
                .insert("original_type".to_string(), Value::String(self.knowledge_type));
        }
        node
    }
}

/// Similarity bucket for an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    Equivalent,
    StronglyRelated,
    Related,
    WeaklyRelated,
}

impl ConnectionType {
    /// Bucket a similarity score. Callers decide whether the score clears
    /// the connection threshold; anything under 0.4 is `WeaklyRelated`.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            Self::Equivalent
        } else if score >= 0.6 {
            Self::StronglyRelated
        } else if score >= 0.4 {
            Self::Related
        } else {
            Self::WeaklyRelated
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equivalent => "equivalent",
            Self::StronglyRelated => "strongly_related",
            Self::Related => "related",
            Self::WeaklyRelated => "weakly_related",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "equivalent" => Self::Equivalent,
            "strongly_related" => Self::StronglyRelated,
            "related" => Self::Related,
            _ => Self::WeaklyRelated,
        }
    }
}

impl std::fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered pair identifying an edge.
pub type EdgeKey = (NodeId, NodeId);

/// Directed, weighted relationship between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEdge {
    pub source: NodeId,
    pub target: NodeId,
    pub connection_type: ConnectionType,
    pub strength: f64,
    /// Provenance tag
    pub evidence: String,
    pub created_at: DateTime<Utc>,
    pub last_reinforced_at: DateTime<Utc>,
}

impl KnowledgeEdge {
    /// Create a similarity edge with the bucket implied by `strength`.
    pub fn similarity(source: NodeId, target: NodeId, strength: f64, at: DateTime<Utc>) -> Self {
        let strength = clamp_unit(strength);
        Self {
            source,
            target,
            connection_type: ConnectionType::from_score(strength),
            strength,
            evidence: SEMANTIC_SIMILARITY.to_string(),
            created_at: at,
            last_reinforced_at: at,
        }
    }

    pub fn key(&self) -> EdgeKey {
        (self.source.clone(), self.target.clone())
    }

    /// Re-score an existing edge in place.
    pub fn reinforce(&mut self, strength: f64, at: DateTime<Utc>) {
        self.strength = clamp_unit(strength);
        self.connection_type = ConnectionType::from_score(self.strength);
        self.last_reinforced_at = at;
    }

    /// The endpoint opposite `id`, if `id` is one of them.
    pub fn other(&self, id: &NodeId) -> Option<&NodeId> {
        if &self.source == id {
            Some(&self.target)
        } else if &self.target == id {
            Some(&self.source)
        } else {
            None
        }
    }
}
