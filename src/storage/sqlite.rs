//! SQLite-backed knowledge store.

use crate::error::{Error, Result};
use crate::evolution::{ForgettingEvent, LearningParameters, MemoryUsageRecord};
use crate::graph::{ConnectionType, KnowledgeEdge, KnowledgeNode, KnowledgeType, NodeId, Payload};
use crate::storage::schema::{initialize_schema, is_initialized};
use crate::storage::{KnowledgeStore, StoreSnapshot, WriteBatch};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// SQLite-backed knowledge store.
pub struct SqliteKnowledgeStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteKnowledgeStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;

        if !is_initialized(&conn) {
            initialize_schema(&conn)?;
        } else {
            conn.pragma_update(None, "foreign_keys", "ON")?;
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| Error::Internal(format!("Failed to lock connection: {}", e)))?;
        f(&mut conn).map_err(|e| Error::Storage(e.to_string()))
    }

    // ==================== Writes ====================

    fn upsert_node(tx: &Transaction<'_>, node: &KnowledgeNode) -> rusqlite::Result<()> {
        tx.execute(
            "INSERT INTO nodes (
                id, concept, content, confidence, usage_count,
                last_accessed, created_at, knowledge_type, metadata
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                concept = excluded.concept,
                content = excluded.content,
                confidence = excluded.confidence,
                usage_count = excluded.usage_count,
                last_accessed = excluded.last_accessed,
                knowledge_type = excluded.knowledge_type,
                metadata = excluded.metadata",
            params![
                node.id.as_str(),
                node.concept,
                to_json_text(&node.content)?,
                node.confidence,
                node.usage_count as i64,
                node.last_accessed_at.to_rfc3339(),
                node.created_at.to_rfc3339(),
                node.knowledge_type.as_str(),
                to_json_text(&node.metadata)?,
            ],
        )?;
        Ok(())
    }

    fn upsert_edge(tx: &Transaction<'_>, edge: &KnowledgeEdge) -> rusqlite::Result<()> {
        tx.execute(
            "INSERT INTO edges (
                source_id, target_id, connection_type, strength, evidence,
                created_at, last_reinforced
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(source_id, target_id) DO UPDATE SET
                connection_type = excluded.connection_type,
                strength = excluded.strength,
                evidence = excluded.evidence,
                last_reinforced = excluded.last_reinforced",
            params![
                edge.source.as_str(),
                edge.target.as_str(),
                edge.connection_type.as_str(),
                edge.strength,
                edge.evidence,
                edge.created_at.to_rfc3339(),
                edge.last_reinforced_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn upsert_usage(tx: &Transaction<'_>, record: &MemoryUsageRecord) -> rusqlite::Result<()> {
        tx.execute(
            "INSERT INTO memory_usage (
                node_id, access_count, last_access, importance_score, retention_priority
            ) VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(node_id) DO UPDATE SET
                access_count = excluded.access_count,
                last_access = excluded.last_access,
                importance_score = excluded.importance_score,
                retention_priority = excluded.retention_priority",
            params![
                record.node_id.as_str(),
                record.access_count as i64,
                record.last_access.to_rfc3339(),
                record.importance_score,
                record.retention_priority,
            ],
        )?;
        Ok(())
    }

    fn upsert_forgetting_event(tx: &Transaction<'_>, event: &ForgettingEvent) -> rusqlite::Result<()> {
        let snapshot = serde_json::to_string(&event.recovery_snapshot)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        tx.execute(
            "INSERT INTO forgetting_events (node_id, forgotten_at, reason, recovery_snapshot)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(node_id, forgotten_at) DO UPDATE SET
                reason = excluded.reason,
                recovery_snapshot = excluded.recovery_snapshot",
            params![
                event.node_id.as_str(),
                event.forgotten_at.to_rfc3339(),
                event.reason,
                snapshot,
            ],
        )?;
        Ok(())
    }

    fn upsert_parameters(tx: &Transaction<'_>, params: &LearningParameters) -> rusqlite::Result<()> {
        tx.execute(
            "INSERT INTO learning_parameters (
                id, learning_rate, confidence_threshold, connection_threshold,
                forgetting_rate, updated_at
            ) VALUES (1, ?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                learning_rate = excluded.learning_rate,
                confidence_threshold = excluded.confidence_threshold,
                connection_threshold = excluded.connection_threshold,
                forgetting_rate = excluded.forgetting_rate,
                updated_at = excluded.updated_at",
            params![
                params.learning_rate,
                params.confidence_threshold,
                params.connection_threshold,
                params.forgetting_rate,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    // ==================== Reads ====================

    fn row_to_node(row: &rusqlite::Row) -> rusqlite::Result<KnowledgeNode> {
        let id: String = row.get(0)?;
        let content: String = row.get(2)?;
        let usage_count: i64 = row.get(4)?;
        let knowledge_type: String = row.get(7)?;
        let metadata: String = row.get(8)?;

        Ok(KnowledgeNode {
            id: NodeId::from_raw(id),
            concept: row.get(1)?,
            content: from_json_text(2, &content)?,
            confidence: row.get(3)?,
            knowledge_type: KnowledgeType::parse_lenient(&knowledge_type),
            usage_count: usage_count.max(0) as u64,
            last_accessed_at: parse_datetime(5, row.get(5)?)?,
            created_at: parse_datetime(6, row.get(6)?)?,
            metadata: from_json_text(8, &metadata)?,
        })
    }

    fn row_to_edge(row: &rusqlite::Row) -> rusqlite::Result<KnowledgeEdge> {
        let source: String = row.get(0)?;
        let target: String = row.get(1)?;
        let connection_type: String = row.get(2)?;

        Ok(KnowledgeEdge {
            source: NodeId::from_raw(source),
            target: NodeId::from_raw(target),
            connection_type: ConnectionType::parse(&connection_type),
            strength: row.get(3)?,
            evidence: row.get(4)?,
            created_at: parse_datetime(5, row.get(5)?)?,
            last_reinforced_at: parse_datetime(6, row.get(6)?)?,
        })
    }

    fn row_to_usage(row: &rusqlite::Row) -> rusqlite::Result<MemoryUsageRecord> {
        let node_id: String = row.get(0)?;
        let access_count: i64 = row.get(1)?;

        Ok(MemoryUsageRecord {
            node_id: NodeId::from_raw(node_id),
            access_count: access_count.max(0) as u64,
            last_access: parse_datetime(2, row.get(2)?)?,
            importance_score: row.get(3)?,
            retention_priority: row.get(4)?,
        })
    }
}

impl KnowledgeStore for SqliteKnowledgeStore {
    fn load_snapshot(&self) -> Result<StoreSnapshot> {
        self.with_conn(|conn| {
            let nodes = {
                let mut stmt = conn.prepare(
                    "SELECT id, concept, content, confidence, usage_count,
                            last_accessed, created_at, knowledge_type, metadata
                     FROM nodes ORDER BY id",
                )?;
                let rows = stmt.query_map([], Self::row_to_node)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };

            let edges = {
                let mut stmt = conn.prepare(
                    "SELECT source_id, target_id, connection_type, strength, evidence,
                            created_at, last_reinforced
                     FROM edges ORDER BY source_id, target_id",
                )?;
                let rows = stmt.query_map([], Self::row_to_edge)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };

            let usage = {
                let mut stmt = conn.prepare(
                    "SELECT node_id, access_count, last_access, importance_score, retention_priority
                     FROM memory_usage ORDER BY node_id",
                )?;
                let rows = stmt.query_map([], Self::row_to_usage)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };

            let parameters = conn
                .query_row(
                    "SELECT learning_rate, confidence_threshold, connection_threshold, forgetting_rate
                     FROM learning_parameters WHERE id = 1",
                    [],
                    |row| {
                        Ok(LearningParameters {
                            learning_rate: row.get(0)?,
                            confidence_threshold: row.get(1)?,
                            connection_threshold: row.get(2)?,
                            forgetting_rate: row.get(3)?,
                        })
                    },
                )
                .optional()?;

            Ok(StoreSnapshot {
                nodes,
                edges,
                usage,
                parameters,
            })
        })
    }

    fn commit(&self, batch: &WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.with_conn(|conn| {
            let tx = conn.transaction()?;

            // Nodes first so edge foreign keys resolve.
            for node in &batch.nodes {
                Self::upsert_node(&tx, node)?;
            }
            for (source, target) in &batch.removed_edges {
                tx.execute(
                    "DELETE FROM edges WHERE source_id = ?1 AND target_id = ?2",
                    params![source.as_str(), target.as_str()],
                )?;
            }
            for edge in &batch.edges {
                Self::upsert_edge(&tx, edge)?;
            }
            for record in &batch.usage {
                Self::upsert_usage(&tx, record)?;
            }
            for event in &batch.forgetting_events {
                Self::upsert_forgetting_event(&tx, event)?;
            }
            if let Some(params) = &batch.parameters {
                Self::upsert_parameters(&tx, params)?;
            }

            tx.commit()
        })
    }

    fn forgetting_events(&self, node_id: &NodeId) -> Result<Vec<ForgettingEvent>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT forgotten_at, reason, recovery_snapshot
                 FROM forgetting_events WHERE node_id = ?1
                 ORDER BY forgotten_at ASC",
            )?;
            let rows = stmt.query_map(params![node_id.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })?;

        let mut events = Vec::with_capacity(rows.len());
        for (forgotten_at, reason, snapshot) in rows {
            events.push(ForgettingEvent {
                node_id: node_id.clone(),
                forgotten_at: parse_datetime(0, forgotten_at)?,
                reason,
                recovery_snapshot: serde_json::from_str(&snapshot)?,
            });
        }
        // RFC 3339 text sorts lexically only within one offset
        events.sort_by_key(|e| e.forgotten_at);
        Ok(events)
    }
}

fn to_json_text(payload: &Payload) -> rusqlite::Result<String> {
    serde_json::to_string(payload).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

fn from_json_text(column: usize, text: &str) -> rusqlite::Result<Payload> {
    serde_json::from_str(text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e)))
}

fn parse_datetime(column: usize, s: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evolution::ARCHIVED_PRIORITY;
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn node(concept: &str, text: &str) -> KnowledgeNode {
        let content = json!({ "text": text }).as_object().cloned().unwrap();
        KnowledgeNode::new(concept, content)
            .with_confidence(0.8)
            .with_metadata("source", "test")
    }

    #[test]
    fn test_commit_and_load_node() {
        let store = SqliteKnowledgeStore::in_memory().unwrap();
        let n = node("rust", "ownership and borrowing");

        store.commit(&WriteBatch::new().with_node(n.clone())).unwrap();
        let snapshot = store.load_snapshot().unwrap();

        assert_eq!(snapshot.nodes.len(), 1);
        let loaded = &snapshot.nodes[0];
        assert_eq!(loaded.id, n.id);
        assert_eq!(loaded.content, n.content);
        assert_eq!(loaded.metadata, n.metadata);
        assert_eq!(loaded.created_at, n.created_at);
        assert!(snapshot.parameters.is_none());
    }

    #[test]
    fn test_upsert_keeps_created_at() {
        let store = SqliteKnowledgeStore::in_memory().unwrap();
        let n = node("rust", "ownership");
        store.commit(&WriteBatch::new().with_node(n.clone())).unwrap();

        let mut later = n.clone();
        later.created_at = n.created_at + Duration::days(1);
        later.usage_count = 5;
        store.commit(&WriteBatch::new().with_node(later)).unwrap();

        let snapshot = store.load_snapshot().unwrap();
        assert_eq!(snapshot.nodes.len(), 1);
        assert_eq!(snapshot.nodes[0].usage_count, 5);
        assert_eq!(snapshot.nodes[0].created_at, n.created_at);
    }

    #[test]
    fn test_edges_and_removals() {
        let store = SqliteKnowledgeStore::in_memory().unwrap();
        let a = node("a", "x");
        let b = node("b", "y");
        let edge = KnowledgeEdge::similarity(a.id.clone(), b.id.clone(), 0.5, Utc::now());

        let mut batch = WriteBatch::new().with_node(a.clone()).with_node(b.clone());
        batch.edges.push(edge.clone());
        store.commit(&batch).unwrap();

        let snapshot = store.load_snapshot().unwrap();
        assert_eq!(snapshot.edges, vec![edge.clone()]);

        let mut removal = WriteBatch::new();
        removal.removed_edges.push(edge.key());
        store.commit(&removal).unwrap();
        assert!(store.load_snapshot().unwrap().edges.is_empty());
    }

    #[test]
    fn test_failed_batch_is_rolled_back() {
        let store = SqliteKnowledgeStore::in_memory().unwrap();
        let a = node("a", "x");
        let ghost = NodeId::from_raw("missing");

        let mut batch = WriteBatch::new().with_node(a.clone());
        batch
            .edges
            .push(KnowledgeEdge::similarity(a.id.clone(), ghost, 0.5, Utc::now()));

        let err = store.commit(&batch).unwrap_err();
        assert!(err.is_storage());
        assert!(store.load_snapshot().unwrap().nodes.is_empty());
    }

    #[test]
    fn test_usage_parameters_and_events() {
        let store = SqliteKnowledgeStore::in_memory().unwrap();
        let now = Utc::now();
        let id = NodeId::from_raw("n");
        let record = MemoryUsageRecord::new(id.clone(), 0.4, 1, now);
        let mut archived = record.clone();
        archived.retention_priority = ARCHIVED_PRIORITY;

        let params = LearningParameters {
            learning_rate: 0.2,
            ..LearningParameters::default()
        };
        let first = ForgettingEvent {
            node_id: id.clone(),
            forgotten_at: now,
            reason: "first".into(),
            recovery_snapshot: record.clone(),
        };
        let second = ForgettingEvent {
            forgotten_at: now + Duration::hours(1),
            reason: "second".into(),
            ..first.clone()
        };

        store
            .commit(
                &WriteBatch::new()
                    .with_usage(archived.clone())
                    .with_forgetting_event(second.clone())
                    .with_forgetting_event(first.clone())
                    .with_parameters(params),
            )
            .unwrap();

        let snapshot = store.load_snapshot().unwrap();
        assert_eq!(snapshot.usage, vec![archived]);
        assert_eq!(snapshot.parameters, Some(params));

        let events = store.forgetting_events(&id).unwrap();
        assert_eq!(events, vec![first, second]);
        assert!(store
            .forgetting_events(&NodeId::from_raw("other"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_reopen_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knowledge.db");
        let n = node("persisted", "survives restarts");

        {
            let store = SqliteKnowledgeStore::open(&path).unwrap();
            store.commit(&WriteBatch::new().with_node(n.clone())).unwrap();
        }

        let store = SqliteKnowledgeStore::open(&path).unwrap();
        let snapshot = store.load_snapshot().unwrap();
        assert_eq!(snapshot.nodes.len(), 1);
        assert_eq!(snapshot.nodes[0].id, n.id);
    }
}
