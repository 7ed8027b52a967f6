//! SQLite-based graph store implementation.
//!
//! Nodes and edges live in plain tables. Similarity is computed in Rust over
//! all stored question embeddings, which is fine for a corpus of a few
//! thousand Q&A pairs.

use super::{
    check_query_width, rank_hits, Body, GraphStats, GraphStore, Question, QuestionRecord,
    VectorHit, QUESTION_VECTOR_INDEX, SIMILARITY_METRIC,
};
use crate::error::{Result, SvarError};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS questions (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    text TEXT NOT NULL,
    date TEXT,
    embedding BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS bodies (
    id TEXT PRIMARY KEY,
    text TEXT,
    text_link TEXT,
    date TEXT
);

CREATE TABLE IF NOT EXISTS tags (
    word TEXT PRIMARY KEY
);

CREATE TABLE IF NOT EXISTS topics (
    name TEXT PRIMARY KEY
);

-- One body per question.
CREATE TABLE IF NOT EXISTS has_body (
    question_id TEXT PRIMARY KEY REFERENCES questions(id),
    body_id TEXT NOT NULL REFERENCES bodies(id)
);

CREATE TABLE IF NOT EXISTS has_tag (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    body_id TEXT NOT NULL REFERENCES bodies(id),
    tag_word TEXT NOT NULL REFERENCES tags(word)
);

CREATE INDEX IF NOT EXISTS idx_has_tag_word ON has_tag(tag_word);
CREATE INDEX IF NOT EXISTS idx_has_tag_body ON has_tag(body_id);

CREATE TABLE IF NOT EXISTS has_topic (
    question_id TEXT PRIMARY KEY REFERENCES questions(id),
    topic_name TEXT NOT NULL REFERENCES topics(name)
);

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

const DIMENSIONS_KEY: &str = "embedding_dimensions";

/// SQLite-based graph store.
pub struct SqliteGraphStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteGraphStore {
    /// Open (or create) a SQLite graph store.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrent performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Initialized SQLite graph store at {:?}", path);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory SQLite graph store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a query on the blocking pool so async workers stay free.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|e| {
                SvarError::StoreUnavailable(format!("Failed to acquire lock: {}", e))
            })?;
            f(&conn)
        })
        .await
        .map_err(|e| SvarError::StoreUnavailable(format!("Store task failed: {}", e)))?
    }

    /// Serialize embedding to bytes.
    fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Deserialize embedding from bytes.
    fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| {
                let arr: [u8; 4] = chunk.try_into().unwrap_or_default();
                f32::from_le_bytes(arr)
            })
            .collect()
    }

    fn row_to_body(row: &rusqlite::Row<'_>) -> rusqlite::Result<Body> {
        Ok(Body {
            id: row.get(0)?,
            text: row.get(1)?,
            text_link: row.get(2)?,
            date: row.get(3)?,
        })
    }
}

fn exists(conn: &Connection, sql: &str, key: &str) -> rusqlite::Result<bool> {
    conn.query_row(sql, params![key], |_| Ok(()))
        .optional()
        .map(|r| r.is_some())
}

fn stored_dimensions(conn: &Connection) -> Result<Option<usize>> {
    let stored: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = ?1",
            params![DIMENSIONS_KEY],
            |row| row.get(0),
        )
        .optional()?;
    Ok(stored.and_then(|v| v.parse::<usize>().ok()))
}

fn write_question(conn: &Connection, question: &Question) -> Result<()> {
    let dims = question.embedding.len();
    match stored_dimensions(conn)? {
        Some(expected) if expected != dims => {
            return Err(SvarError::InvalidInput(format!(
                "Question {} has {} dimensions, index uses {}",
                question.id, dims, expected
            )));
        }
        Some(_) => {}
        None => {
            conn.execute(
                "INSERT INTO meta (key, value) VALUES (?1, ?2)",
                params![DIMENSIONS_KEY, dims.to_string()],
            )?;
        }
    }

    if exists(conn, "SELECT 1 FROM questions WHERE id = ?1", &question.id)? {
        return Err(SvarError::InvalidInput(format!(
            "Question {} already exists",
            question.id
        )));
    }

    conn.execute(
        "INSERT INTO questions (id, text, date, embedding) VALUES (?1, ?2, ?3, ?4)",
        params![
            question.id,
            question.text,
            question.date,
            SqliteGraphStore::embedding_to_bytes(&question.embedding),
        ],
    )?;
    Ok(())
}

fn write_body(conn: &Connection, body: &Body) -> Result<()> {
    if exists(conn, "SELECT 1 FROM bodies WHERE id = ?1", &body.id)? {
        return Err(SvarError::InvalidInput(format!("Body {} already exists", body.id)));
    }
    conn.execute(
        "INSERT INTO bodies (id, text, text_link, date) VALUES (?1, ?2, ?3, ?4)",
        params![body.id, body.text, body.text_link, body.date],
    )?;
    Ok(())
}

fn write_body_link(conn: &Connection, question_id: &str, body_id: &str) -> Result<()> {
    if !exists(conn, "SELECT 1 FROM questions WHERE id = ?1", question_id)? {
        return Err(SvarError::InvalidInput(format!("Unknown question: {}", question_id)));
    }
    if !exists(conn, "SELECT 1 FROM bodies WHERE id = ?1", body_id)? {
        return Err(SvarError::InvalidInput(format!("Unknown body: {}", body_id)));
    }
    if exists(conn, "SELECT 1 FROM has_body WHERE question_id = ?1", question_id)? {
        return Err(SvarError::InvalidInput(format!(
            "Question {} already has a body",
            question_id
        )));
    }
    conn.execute(
        "INSERT INTO has_body (question_id, body_id) VALUES (?1, ?2)",
        params![question_id, body_id],
    )?;
    Ok(())
}

fn upsert_tag(conn: &Connection, word: &str) -> Result<()> {
    conn.execute("INSERT OR IGNORE INTO tags (word) VALUES (?1)", params![word])?;
    Ok(())
}

fn write_tag_link(conn: &Connection, body_id: &str, word: &str) -> Result<()> {
    if !exists(conn, "SELECT 1 FROM bodies WHERE id = ?1", body_id)? {
        return Err(SvarError::InvalidInput(format!("Unknown body: {}", body_id)));
    }
    if !exists(conn, "SELECT 1 FROM tags WHERE word = ?1", word)? {
        return Err(SvarError::InvalidInput(format!("Unknown tag: {}", word)));
    }
    conn.execute(
        "INSERT INTO has_tag (body_id, tag_word) VALUES (?1, ?2)",
        params![body_id, word],
    )?;
    Ok(())
}

fn upsert_topic(conn: &Connection, name: &str) -> Result<()> {
    conn.execute("INSERT OR IGNORE INTO topics (name) VALUES (?1)", params![name])?;
    Ok(())
}

fn write_topic_link(conn: &Connection, question_id: &str, name: &str) -> Result<()> {
    if !exists(conn, "SELECT 1 FROM questions WHERE id = ?1", question_id)? {
        return Err(SvarError::InvalidInput(format!("Unknown question: {}", question_id)));
    }
    if !exists(conn, "SELECT 1 FROM topics WHERE name = ?1", name)? {
        return Err(SvarError::InvalidInput(format!("Unknown topic: {}", name)));
    }
    conn.execute(
        "INSERT OR REPLACE INTO has_topic (question_id, topic_name) VALUES (?1, ?2)",
        params![question_id, name],
    )?;
    Ok(())
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    #[instrument(skip(self, query))]
    async fn vector_search(&self, index: &str, query: &[f32], top_k: usize) -> Result<Vec<VectorHit>> {
        if index != QUESTION_VECTOR_INDEX {
            return Err(SvarError::InvalidInput(format!("Unknown vector index: {}", index)));
        }

        let query = query.to_vec();
        let hits = self
            .with_conn(move |conn| {
                check_query_width(stored_dimensions(conn)?, &query)?;

                let mut stmt =
                    conn.prepare("SELECT id, text, embedding FROM questions ORDER BY seq")?;

                let rows = stmt.query_map([], |row| {
                    let embedding: Vec<u8> = row.get(2)?;
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, embedding))
                })?;

                let mut hits = Vec::new();
                for row in rows {
                    let (id, text, bytes) = row?;
                    let embedding = Self::bytes_to_embedding(&bytes);
                    hits.push(VectorHit {
                        question_id: id,
                        question_text: text,
                        score: SIMILARITY_METRIC.score(&query, &embedding),
                    });
                }
                Ok(hits)
            })
            .await?;

        let hits = rank_hits(hits, top_k);
        debug!("Vector search returned {} questions", hits.len());
        Ok(hits)
    }

    #[instrument(skip(self))]
    async fn body_for_question(&self, question_id: &str) -> Result<Option<Body>> {
        let question_id = question_id.to_string();
        self.with_conn(move |conn| {
            let body = conn
                .query_row(
                    r#"
                    SELECT b.id, b.text, b.text_link, b.date
                    FROM has_body hb JOIN bodies b ON b.id = hb.body_id
                    WHERE hb.question_id = ?1
                    "#,
                    params![question_id],
                    Self::row_to_body,
                )
                .optional()?;
            Ok(body)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn tags_for_body(&self, body_id: &str) -> Result<Vec<String>> {
        let body_id = body_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT tag_word FROM has_tag WHERE body_id = ?1 ORDER BY tag_word",
            )?;
            let tags = stmt
                .query_map(params![body_id], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(tags)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn bodies_with_tag(&self, tag: &str) -> Result<Vec<Body>> {
        let tag = tag.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT b.id, b.text, b.text_link, b.date
                FROM has_tag ht JOIN bodies b ON b.id = ht.body_id
                WHERE ht.tag_word = ?1
                ORDER BY ht.seq
                "#,
            )?;
            let bodies = stmt
                .query_map(params![tag], Self::row_to_body)?
                .collect::<rusqlite::Result<Vec<Body>>>()?;
            Ok(bodies)
        })
        .await
    }

    async fn topic_for_question(&self, question_id: &str) -> Result<Option<String>> {
        let question_id = question_id.to_string();
        self.with_conn(move |conn| {
            let topic = conn
                .query_row(
                    "SELECT topic_name FROM has_topic WHERE question_id = ?1",
                    params![question_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(topic)
        })
        .await
    }

    async fn question_count(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM questions", [], |row| row.get(0))?;
            Ok(count as usize)
        })
        .await
    }

    async fn stats(&self) -> Result<GraphStats> {
        self.with_conn(|conn| {
            let count = |table: &str| -> rusqlite::Result<usize> {
                let n: i64 =
                    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
                Ok(n as usize)
            };
            Ok(GraphStats {
                questions: count("questions")?,
                bodies: count("bodies")?,
                tags: count("tags")?,
                topics: count("topics")?,
                tag_edges: count("has_tag")?,
            })
        })
        .await
    }

    async fn index_dimensions(&self) -> Result<Option<usize>> {
        self.with_conn(|conn| stored_dimensions(conn)).await
    }

    #[instrument(skip(self, question), fields(id = %question.id))]
    async fn insert_question(&self, question: &Question) -> Result<()> {
        let question = question.clone();
        self.with_conn(move |conn| write_question(conn, &question)).await
    }

    async fn insert_body(&self, body: &Body) -> Result<()> {
        let body = body.clone();
        self.with_conn(move |conn| write_body(conn, &body)).await
    }

    async fn link_body(&self, question_id: &str, body_id: &str) -> Result<()> {
        let (question_id, body_id) = (question_id.to_string(), body_id.to_string());
        self.with_conn(move |conn| write_body_link(conn, &question_id, &body_id))
            .await
    }

    async fn get_or_create_tag(&self, word: &str) -> Result<String> {
        let word = word.to_string();
        self.with_conn(move |conn| {
            upsert_tag(conn, &word)?;
            Ok(word)
        })
        .await
    }

    async fn link_tag(&self, body_id: &str, word: &str) -> Result<()> {
        let (body_id, word) = (body_id.to_string(), word.to_string());
        self.with_conn(move |conn| write_tag_link(conn, &body_id, &word))
            .await
    }

    async fn get_or_create_topic(&self, name: &str) -> Result<String> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            upsert_topic(conn, &name)?;
            Ok(name)
        })
        .await
    }

    async fn link_topic(&self, question_id: &str, name: &str) -> Result<()> {
        let (question_id, name) = (question_id.to_string(), name.to_string());
        self.with_conn(move |conn| write_topic_link(conn, &question_id, &name))
            .await
    }

    #[instrument(skip(self, record), fields(id = %record.question.id))]
    async fn insert_record(&self, record: &QuestionRecord) -> Result<()> {
        let record = record.clone();
        self.with_conn(move |conn| {
            // Dropping the transaction without commit rolls every write back.
            let tx = conn.unchecked_transaction()?;
            let question_id = &record.question.id;
            let body_id = &record.body.id;

            write_question(&tx, &record.question)?;
            write_body(&tx, &record.body)?;
            write_body_link(&tx, question_id, body_id)?;

            if let Some(topic) = &record.topic {
                upsert_topic(&tx, topic)?;
                write_topic_link(&tx, question_id, topic)?;
            }
            for tag in &record.tags {
                upsert_tag(&tx, tag)?;
                write_tag_link(&tx, body_id, tag)?;
            }

            tx.commit()?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> SqliteGraphStore {
        let store = SqliteGraphStore::in_memory().unwrap();

        for (id, embedding) in [("q1", vec![1.0, 0.0, 0.0]), ("q2", vec![0.6, 0.8, 0.0])] {
            store
                .insert_question(&Question {
                    id: id.to_string(),
                    text: format!("Question {}", id),
                    date: Some("2024-01-01".to_string()),
                    embedding,
                })
                .await
                .unwrap();
        }

        for id in ["b1", "b2"] {
            store
                .insert_body(&Body {
                    id: id.to_string(),
                    text: None,
                    text_link: Some(format!("https://example.com/{}", id)),
                    date: None,
                })
                .await
                .unwrap();
        }

        store.link_body("q1", "b1").await.unwrap();
        store.link_body("q2", "b2").await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_sqlite_graph_store() {
        let store = seeded().await;

        let hits = store
            .vector_search(QUESTION_VECTOR_INDEX, &[1.0, 0.0, 0.0], 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].question_id, "q1");
        assert!((hits[0].score - 1.0).abs() < 0.001);
        assert!((hits[1].score - 0.6).abs() < 0.001);

        let body = store.body_for_question("q2").await.unwrap().unwrap();
        assert_eq!(body.text_link.as_deref(), Some("https://example.com/b2"));

        assert_eq!(store.question_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_tag_edges_and_topics() {
        let store = seeded().await;

        store.get_or_create_tag("Fasting").await.unwrap();
        store.get_or_create_tag("Fasting").await.unwrap();
        store.get_or_create_tag("Salt").await.unwrap();
        store.link_tag("b1", "Fasting").await.unwrap();
        store.link_tag("b1", "Fasting").await.unwrap();
        store.link_tag("b1", "Salt").await.unwrap();
        store.link_tag("b2", "Salt").await.unwrap();

        assert_eq!(
            store.tags_for_body("b1").await.unwrap(),
            vec!["Fasting".to_string(), "Salt".to_string()]
        );

        let salted: Vec<_> = store
            .bodies_with_tag("Salt")
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.id)
            .collect();
        assert_eq!(salted, vec!["b1".to_string(), "b2".to_string()]);
        assert_eq!(store.bodies_with_tag("Fasting").await.unwrap().len(), 2);

        store.get_or_create_topic("Diet").await.unwrap();
        store.link_topic("q1", "Diet").await.unwrap();
        assert_eq!(store.topic_for_question("q1").await.unwrap(), Some("Diet".to_string()));
        assert_eq!(store.topic_for_question("q2").await.unwrap(), None);

        let stats = store.stats().await.unwrap();
        assert_eq!(
            stats,
            GraphStats {
                questions: 2,
                bodies: 2,
                tags: 2,
                topics: 1,
                tag_edges: 4,
            }
        );
    }

    #[tokio::test]
    async fn test_rejects_invalid_writes() {
        let store = seeded().await;

        let wrong_dims = Question {
            id: "q3".to_string(),
            text: "Too short".to_string(),
            date: None,
            embedding: vec![1.0],
        };
        assert!(store.insert_question(&wrong_dims).await.is_err());
        assert!(store.link_body("q1", "b2").await.is_err());
        assert!(store.link_tag("b1", "Unknown").await.is_err());
        assert!(store.link_body("missing", "b1").await.is_err());
    }

    #[tokio::test]
    async fn test_search_rejects_query_of_other_width() {
        let store = seeded().await;
        assert_eq!(store.index_dimensions().await.unwrap(), Some(3));

        let err = store
            .vector_search(QUESTION_VECTOR_INDEX, &[1.0, 0.0], 2)
            .await
            .unwrap_err();
        assert!(matches!(err, SvarError::Embedding(_)));
    }

    fn record(qid: &str, bid: &str) -> QuestionRecord {
        QuestionRecord {
            question: Question {
                id: qid.to_string(),
                text: format!("Question {}", qid),
                date: None,
                embedding: vec![0.0, 0.0, 1.0],
            },
            body: Body {
                id: bid.to_string(),
                text: Some("Inline answer".to_string()),
                text_link: None,
                date: None,
            },
            topic: Some("Diet".to_string()),
            tags: vec!["Salt".to_string()],
        }
    }

    #[tokio::test]
    async fn test_insert_record_commits_whole_record() {
        let store = seeded().await;
        store.insert_record(&record("q3", "b3")).await.unwrap();

        let body = store.body_for_question("q3").await.unwrap().unwrap();
        assert_eq!(body.id, "b3");
        assert_eq!(store.tags_for_body("b3").await.unwrap(), vec!["Salt".to_string()]);
        assert_eq!(store.topic_for_question("q3").await.unwrap(), Some("Diet".to_string()));
    }

    #[tokio::test]
    async fn test_failed_record_rolls_back() {
        let store = seeded().await;

        // "b1" exists, so the body write fails after the question row went in.
        assert!(store.insert_record(&record("q3", "b1")).await.is_err());

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.questions, 2);
        assert_eq!(stats.topics, 0);
        assert_eq!(stats.tags, 0);
        assert_eq!(store.body_for_question("q3").await.unwrap(), None);

        // The store is still writable afterwards.
        store.insert_record(&record("q3", "b3")).await.unwrap();
        assert_eq!(store.question_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_persists_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("graph.db");

        {
            let store = SqliteGraphStore::new(&path).unwrap();
            store
                .insert_question(&Question {
                    id: "q1".to_string(),
                    text: "Is salt ok?".to_string(),
                    date: None,
                    embedding: vec![0.5, 0.5],
                })
                .await
                .unwrap();
        }

        let reopened = SqliteGraphStore::new(&path).unwrap();
        assert_eq!(reopened.question_count().await.unwrap(), 1);
    }
}
