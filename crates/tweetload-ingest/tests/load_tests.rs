//! Database tests for the bulk loader, scheduler and integrity reporter
//!
//! These tests require Docker to be running. Run with:
//!
//! ```bash
//! cargo test -p tweetload-ingest --test load_tests -- --ignored --nocapture
//! ```

mod common;

use std::sync::Arc;

use common::{init_test_tracing, sample_documents, write_documents, write_row_file, TestPostgres};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tweetload_common::catalog::{EntityTable, RELATIONSHIPS};
use tweetload_common::IngestError;
use tweetload_ingest::extract::{Field, Row};
use tweetload_ingest::integrity::IntegrityReporter;
use tweetload_ingest::loader::{Derivation, MergeTask, PgTableLoader, TableLoader};
use tweetload_ingest::rowfile::{RowFormat, TableFiles};
use tweetload_ingest::scheduler::{MergePlan, MergeScheduler};
use tweetload_ingest::{Pipeline, PipelineConfig};

fn user_row(id: i64, screen_name: &str) -> Row {
    let mut fields = vec![Field::Int(id), Field::Text(screen_name.to_string())];
    fields.resize(EntityTable::Users.descriptor().column_count(), Field::Null);
    Row::new(fields)
}

fn mention_row(tweet_id: i64, user_id: i64, screen_name: &str) -> Row {
    Row::new(vec![
        Field::Int(tweet_id),
        Field::Int(user_id),
        Field::Text(screen_name.to_string()),
        Field::Text(format!("{screen_name} name")),
    ])
}

fn loader(pg: &TestPostgres) -> PgTableLoader {
    PgTableLoader::new(pg.pool().clone(), RowFormat::default()).relaxed_durability(true)
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_loading_twice_is_idempotent() {
    init_test_tracing();
    let pg = TestPostgres::start().await.expect("Failed to start PostgreSQL");
    let dir = TempDir::new().unwrap();

    // Duplicate keys across and within files are tolerated
    let first = write_row_file(dir.path(), EntityTable::Users, 0, &[user_row(1, "a"), user_row(2, "b")]);
    let second = write_row_file(dir.path(), EntityTable::Users, 1, &[user_row(2, "b"), user_row(3, "c"), user_row(3, "c")]);
    let task = MergeTask::new(EntityTable::Users, vec![first, second]);

    let report = loader(&pg).load(&task).await.unwrap();
    assert_eq!(report.staged_rows, 5);
    assert_eq!(report.inserted_rows, 3);
    assert_eq!(pg.count(EntityTable::Users).await, 3);

    let again = loader(&pg).load(&task).await.unwrap();
    assert_eq!(again.staged_rows, 5);
    assert_eq!(again.inserted_rows, 0);
    assert_eq!(pg.count(EntityTable::Users).await, 3);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_mentions_derive_missing_authors() {
    init_test_tracing();
    let pg = TestPostgres::start().await.expect("Failed to start PostgreSQL");
    let dir = TempDir::new().unwrap();

    // Accounts A and B exist as full authors; C is only ever mentioned
    let users = write_row_file(dir.path(), EntityTable::Users, 0, &[user_row(1, "A"), user_row(2, "B")]);
    loader(&pg)
        .load(&MergeTask::new(EntityTable::Users, vec![users]))
        .await
        .unwrap();

    let mentions: Vec<Row> = (0..10)
        .map(|i| {
            let (id, name) = [(1, "A"), (2, "B"), (3, "C")][i % 3];
            mention_row(100 + i as i64, id, name)
        })
        .collect();
    let file = write_row_file(dir.path(), EntityTable::TweetMentions, 0, &mentions);
    let task = MergeTask::new(EntityTable::TweetMentions, vec![file])
        .with_derivation(Derivation::MissingAuthorsFromMentions);

    let report = loader(&pg).load(&task).await.unwrap();
    assert_eq!(report.staged_rows, 10);
    assert_eq!(report.inserted_rows, 10);
    assert_eq!(report.derived_rows, 1);

    assert_eq!(pg.count(EntityTable::Users).await, 3);
    let (screen_name, name): (Option<String>, Option<String>) =
        sqlx::query_as("SELECT screen_name, name FROM users WHERE id = 3")
            .fetch_one(pg.pool())
            .await
            .unwrap();
    assert_eq!(screen_name.as_deref(), Some("C"));
    assert_eq!(name.as_deref(), Some("C name"));

    let relationship = RELATIONSHIPS
        .iter()
        .find(|r| r.child == EntityTable::TweetMentions && r.parent == EntityTable::Users)
        .unwrap();
    let missing = IntegrityReporter::new(pg.pool().clone())
        .dangling_count(relationship)
        .await
        .unwrap();
    assert_eq!(missing, 0);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_failed_load_leaves_table_untouched() {
    init_test_tracing();
    let pg = TestPostgres::start().await.expect("Failed to start PostgreSQL");
    let dir = TempDir::new().unwrap();

    let good = write_row_file(dir.path(), EntityTable::Users, 0, &[user_row(1, "a")]);
    loader(&pg)
        .load(&MergeTask::new(EntityTable::Users, vec![good.clone()]))
        .await
        .unwrap();

    // Second file stages fine, third cannot be parsed as BIGINT
    let more = write_row_file(dir.path(), EntityTable::Users, 1, &[user_row(2, "b")]);
    let broken = dir.path().join("users__worker2.tsv");
    std::fs::write(&broken, "not-a-number\tx\t\t\t\t\t\t\t\t\t\t\n").unwrap();

    let err = loader(&pg)
        .load(&MergeTask::new(EntityTable::Users, vec![more, broken]))
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("COPY failed"));
    assert_eq!(pg.count(EntityTable::Users).await, 1);

    // The connection went back to the pool in a usable state
    let ok = loader(&pg)
        .load(&MergeTask::new(EntityTable::Users, vec![good]))
        .await
        .unwrap();
    assert_eq!(ok.inserted_rows, 0);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_failing_tier_stops_later_tiers() {
    init_test_tracing();
    let pg = TestPostgres::start().await.expect("Failed to start PostgreSQL");
    let dir = TempDir::new().unwrap();

    let mut files = TableFiles::new();
    let broken = dir.path().join("places__worker0.tsv");
    std::fs::write(&broken, "p1\tonly two columns\n").unwrap();
    files.add(EntityTable::Places, broken);
    files.add(
        EntityTable::Users,
        write_row_file(dir.path(), EntityTable::Users, 0, &[user_row(1, "a")]),
    );
    let mut tweet = vec![Field::Int(10)];
    tweet.resize(EntityTable::Tweets.descriptor().column_count(), Field::Null);
    files.add(
        EntityTable::Tweets,
        write_row_file(dir.path(), EntityTable::Tweets, 0, &[Row::new(tweet)]),
    );

    let scheduler = MergeScheduler::new(Arc::new(loader(&pg)), 4);
    let err = scheduler.run(&MergePlan::standard(&files)).await.unwrap_err();
    assert!(matches!(err, IngestError::MergeFailed { tier: 1, ref table, .. } if table == "places"));
    assert_eq!(pg.count(EntityTable::Tweets).await, 0);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_full_pipeline_run_and_rerun() {
    init_test_tracing();
    let pg = TestPostgres::start().await.expect("Failed to start PostgreSQL");
    let data = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let docs = sample_documents();
    write_documents(&data.path().join("a.jsonl"), &docs[..2]);
    write_documents(&data.path().join("b.jsonl.gz"), &docs[2..]);

    let mut config = PipelineConfig::default();
    config.database.url = pg.connection_string().to_string();
    config.data_dir = data.path().to_path_buf();
    config.work_dir = work.path().to_path_buf();
    config.workers = 2;
    config.round_size = Some(1);

    let pipeline = Pipeline::new(config, CancellationToken::new());
    let outcome = pipeline.run(pg.pool()).await.unwrap();
    assert_eq!(outcome.rounds.len(), 2);

    let report = &outcome.report;
    assert_eq!(report.count_for("tweets"), Some(3));
    assert_eq!(report.count_for("hashtags"), Some(2));
    assert_eq!(report.count_for("tweet_hashtag"), Some(3));
    assert_eq!(report.count_for("places"), Some(1));
    // alice, bob, dave, plus carol derived from a mention
    assert_eq!(report.count_for("users"), Some(4));
    assert_eq!(report.missing_for("tweet_user_mentions.mentioned_user_id -> users"), Some(0));
    assert_eq!(report.missing_for("tweets.quoted_status_id -> tweets"), Some(1));
    assert_eq!(report.missing_for("tweets.in_reply_to_status_id -> tweets"), Some(1));
    assert_eq!(report.tweets_without_author, 0);

    // Row files are removed once loaded
    assert!(tweetload_ingest::rowfile::discover_row_files(&work.path().join("round-0001"))
        .unwrap()
        .is_empty());

    let rerun = pipeline.run(pg.pool()).await.unwrap();
    assert_eq!(rerun.report.count_for("tweets"), Some(3));
    assert!(rerun.report.loads.iter().all(|l| l.inserted_rows == 0));
}
