//! Shared helpers for tweetload integration tests
//!
//! Database tests start a throwaway PostgreSQL container and create the entity
//! tables in it. They need Docker and are ignored by default:
//!
//! ```bash
//! cargo test -p tweetload-ingest -- --ignored --nocapture
//! ```

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tracing::info;
use tweetload_common::catalog::EntityTable;
use tweetload_ingest::extract::Row;
use tweetload_ingest::rowfile::{RowFileName, RowFileWriter, RowFormat};

/// Entity tables as the loader expects them: same column order, natural keys
/// as primary keys, no foreign keys.
pub const SCHEMA: &str = r#"
CREATE TABLE users (
    id BIGINT PRIMARY KEY,
    screen_name TEXT,
    name TEXT,
    description TEXT,
    verified BOOLEAN,
    protected BOOLEAN,
    followers_count INTEGER,
    friends_count INTEGER,
    statuses_count INTEGER,
    created_at TEXT,
    location TEXT,
    url TEXT
);

CREATE TABLE places (
    id TEXT PRIMARY KEY,
    full_name TEXT,
    country TEXT,
    country_code TEXT,
    place_type TEXT
);

CREATE TABLE hashtags (
    id BIGINT PRIMARY KEY,
    tag TEXT NOT NULL
);

CREATE TABLE tweets (
    id BIGINT PRIMARY KEY,
    created_at TEXT,
    text TEXT,
    display_text_from INTEGER,
    display_text_to INTEGER,
    lang TEXT,
    user_id BIGINT,
    source TEXT,
    in_reply_to_status_id BIGINT,
    quoted_status_id BIGINT,
    retweeted_status_id BIGINT,
    place_id TEXT,
    retweet_count INTEGER,
    favorite_count INTEGER,
    possibly_sensitive BOOLEAN
);

CREATE TABLE tweet_hashtag (
    tweet_id BIGINT NOT NULL,
    hashtag_id BIGINT NOT NULL,
    PRIMARY KEY (tweet_id, hashtag_id)
);

CREATE TABLE tweet_urls (
    tweet_id BIGINT NOT NULL,
    url TEXT NOT NULL,
    expanded_url TEXT,
    display_url TEXT,
    unwound_url TEXT,
    PRIMARY KEY (tweet_id, url)
);

CREATE TABLE tweet_user_mentions (
    tweet_id BIGINT NOT NULL,
    mentioned_user_id BIGINT NOT NULL,
    mentioned_screen_name TEXT,
    mentioned_name TEXT,
    PRIMARY KEY (tweet_id, mentioned_user_id)
);

CREATE TABLE tweet_media (
    tweet_id BIGINT NOT NULL,
    media_id BIGINT NOT NULL,
    media_type TEXT,
    media_url TEXT,
    media_url_https TEXT,
    display_url TEXT,
    expanded_url TEXT,
    PRIMARY KEY (tweet_id, media_id)
);
"#;

/// PostgreSQL container with the entity tables created
pub struct TestPostgres {
    _container: ContainerAsync<Postgres>,
    pool: PgPool,
    connection_string: String,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        info!("Starting PostgreSQL test container...");

        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container
            .get_host()
            .await
            .context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;

        let connection_string = format!("postgresql://postgres:postgres@{host}:{port}/postgres");

        let pool = PgPoolOptions::new()
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&connection_string)
            .await
            .context("Failed to connect to PostgreSQL")?;

        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .context("Failed to create schema")?;

        Ok(Self {
            _container: container,
            pool,
            connection_string,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    pub async fn count(&self, table: EntityTable) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table.name()))
            .fetch_one(&self.pool)
            .await
            .unwrap_or(-1)
    }
}

/// Initialize tracing for tests
pub fn init_test_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,tweetload_ingest=debug,sqlx=warn,testcontainers=info")
        }))
        .with_test_writer()
        .try_init();
}

/// Write `rows` as the row file of (`table`, `worker_id`) in `dir`.
pub fn write_row_file(dir: &Path, table: EntityTable, worker_id: usize, rows: &[Row]) -> PathBuf {
    let mut writer =
        RowFileWriter::create(dir, RowFileName::new(table, worker_id), RowFormat::default())
            .expect("create row file");
    writer.write_rows(rows).expect("write rows");
    writer.finish().expect("finish row file")
}

/// Write newline-delimited JSON documents to `path`, gzip-compressed when the
/// name ends in `.gz`.
pub fn write_documents(path: &Path, documents: &[serde_json::Value]) {
    use std::io::Write;

    let mut body = String::new();
    for doc in documents {
        body.push_str(&doc.to_string());
        body.push('\n');
    }

    if path.extension().is_some_and(|ext| ext == "gz") {
        let file = std::fs::File::create(path).expect("create input file");
        let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        encoder.write_all(body.as_bytes()).expect("write input file");
        encoder.finish().expect("finish gzip stream");
    } else {
        std::fs::write(path, body).expect("write input file");
    }
}

/// A small corpus exercising every table, references and a duplicate tweet
pub fn sample_documents() -> Vec<serde_json::Value> {
    use serde_json::json;

    vec![
        json!({
            "id": 1001,
            "created_at": "Wed Oct 10 20:19:24 +0000 2018",
            "full_text": "Loading tweets with #rust and #DataEngineering https://t.co/a",
            "display_text_range": [0, 60],
            "lang": "en",
            "user": {"id": 1, "screen_name": "alice", "name": "Alice", "verified": true, "followers_count": 10},
            "place": {"id": "p1", "full_name": "Lisbon, Portugal", "country": "Portugal", "country_code": "PT", "place_type": "city"},
            "entities": {
                "hashtags": [{"text": "rust"}, {"text": "DataEngineering"}],
                "urls": [{"url": "https://t.co/a", "expanded_url": "https://example.com/a", "display_url": "example.com/a"}],
                "user_mentions": [{"id": 2, "screen_name": "bob", "name": "Bob"}, {"id": 3, "screen_name": "carol", "name": "Carol"}]
            },
            "extended_entities": {"media": [{"id": 555, "type": "photo", "media_url": "http://img/555.jpg"}]},
            "retweet_count": 4,
            "favorite_count": 9,
            "possibly_sensitive": false
        }),
        json!({
            "id_str": "1002",
            "text": "RT @alice: Loading tweets",
            "user": {"id_str": "2", "screen_name": "bob", "name": "Bob"},
            "entities": {"hashtags": [{"text": "rust"}]},
            "retweeted_status": {
                "id": 1001,
                "text": "Loading tweets with #rust",
                "user": {"id": 1, "screen_name": "alice", "name": "Alice"}
            }
        }),
        json!({
            "id": 1003,
            "text": "quoting something we never saw",
            "user": {"id": 4, "screen_name": "dave"},
            "quoted_status_id": 999,
            "in_reply_to_status_id": 998
        }),
        json!({"text": "no identifier, contributes nothing"}),
    ]
}
