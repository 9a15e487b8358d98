//! Declared parent/child relationships between entity tables
//!
//! None of these are enforced when rows are written. They exist so the
//! integrity audit knows which references to count.

use super::EntityTable;

/// `child.column` references `parent.parent_column`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relationship {
    pub child: EntityTable,
    pub column: &'static str,
    pub parent: EntityTable,
    pub parent_column: &'static str,
}

impl Relationship {
    const fn new(child: EntityTable, column: &'static str, parent: EntityTable) -> Self {
        Self {
            child,
            column,
            parent,
            parent_column: "id",
        }
    }

    /// Stable label used in reports, e.g. `tweets.user_id -> users`
    pub fn label(&self) -> String {
        format!("{}.{} -> {}", self.child, self.column, self.parent)
    }
}

pub const RELATIONSHIPS: &[Relationship] = &[
    Relationship::new(EntityTable::Tweets, "user_id", EntityTable::Users),
    Relationship::new(EntityTable::Tweets, "place_id", EntityTable::Places),
    Relationship::new(EntityTable::Tweets, "in_reply_to_status_id", EntityTable::Tweets),
    Relationship::new(EntityTable::Tweets, "quoted_status_id", EntityTable::Tweets),
    Relationship::new(EntityTable::Tweets, "retweeted_status_id", EntityTable::Tweets),
    Relationship::new(EntityTable::TweetHashtags, "tweet_id", EntityTable::Tweets),
    Relationship::new(EntityTable::TweetHashtags, "hashtag_id", EntityTable::Hashtags),
    Relationship::new(EntityTable::TweetUrls, "tweet_id", EntityTable::Tweets),
    Relationship::new(EntityTable::TweetMentions, "tweet_id", EntityTable::Tweets),
    Relationship::new(EntityTable::TweetMentions, "mentioned_user_id", EntityTable::Users),
    Relationship::new(EntityTable::TweetMedia, "tweet_id", EntityTable::Tweets),
];
