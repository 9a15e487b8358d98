//! Entity table catalogue
//!
//! The fixed set of tables the pipeline writes, with the column order every row
//! file follows, the natural key each merge is keyed on, and the dependency tier
//! that decides when a table may be merged.

pub mod relationships;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{IngestError, Result};

pub use relationships::{Relationship, RELATIONSHIPS};

/// Dependency level in the merge plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// No inter-table dependency (authors, locations, tags)
    Independent,
    /// Primary entities, referencing tier-1 identifiers
    Primary,
    /// Child entities, referencing primary entities
    Dependent,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Independent, Tier::Primary, Tier::Dependent];

    /// Numeric level, 1 through 3
    pub fn level(self) -> u8 {
        match self {
            Tier::Independent => 1,
            Tier::Primary => 2,
            Tier::Dependent => 3,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tier {}", self.level())
    }
}

/// Shape of one entity table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableDescriptor {
    pub name: &'static str,
    /// Column order shared by row files, staging tables and merge statements
    pub columns: &'static [&'static str],
    /// Natural key used for conflict-ignored merges
    pub key: &'static [&'static str],
    pub tier: Tier,
}

impl TableDescriptor {
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Position of a column in the row layout
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| *c == column)
    }

    /// Comma-separated column list for SQL statements
    pub fn column_list(&self) -> String {
        self.columns.join(", ")
    }

    /// Comma-separated natural key for SQL statements
    pub fn key_list(&self) -> String {
        self.key.join(", ")
    }
}

/// The entity tables produced by extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityTable {
    Users,
    Places,
    Hashtags,
    Tweets,
    TweetHashtags,
    TweetUrls,
    TweetMentions,
    TweetMedia,
}

const USERS: TableDescriptor = TableDescriptor {
    name: "users",
    columns: &[
        "id",
        "screen_name",
        "name",
        "description",
        "verified",
        "protected",
        "followers_count",
        "friends_count",
        "statuses_count",
        "created_at",
        "location",
        "url",
    ],
    key: &["id"],
    tier: Tier::Independent,
};

const PLACES: TableDescriptor = TableDescriptor {
    name: "places",
    columns: &["id", "full_name", "country", "country_code", "place_type"],
    key: &["id"],
    tier: Tier::Independent,
};

const HASHTAGS: TableDescriptor = TableDescriptor {
    name: "hashtags",
    columns: &["id", "tag"],
    key: &["id"],
    tier: Tier::Independent,
};

const TWEETS: TableDescriptor = TableDescriptor {
    name: "tweets",
    columns: &[
        "id",
        "created_at",
        "text",
        "display_text_from",
        "display_text_to",
        "lang",
        "user_id",
        "source",
        "in_reply_to_status_id",
        "quoted_status_id",
        "retweeted_status_id",
        "place_id",
        "retweet_count",
        "favorite_count",
        "possibly_sensitive",
    ],
    key: &["id"],
    tier: Tier::Primary,
};

const TWEET_HASHTAGS: TableDescriptor = TableDescriptor {
    name: "tweet_hashtag",
    columns: &["tweet_id", "hashtag_id"],
    key: &["tweet_id", "hashtag_id"],
    tier: Tier::Dependent,
};

const TWEET_URLS: TableDescriptor = TableDescriptor {
    name: "tweet_urls",
    columns: &["tweet_id", "url", "expanded_url", "display_url", "unwound_url"],
    key: &["tweet_id", "url"],
    tier: Tier::Dependent,
};

const TWEET_MENTIONS: TableDescriptor = TableDescriptor {
    name: "tweet_user_mentions",
    columns: &[
        "tweet_id",
        "mentioned_user_id",
        "mentioned_screen_name",
        "mentioned_name",
    ],
    key: &["tweet_id", "mentioned_user_id"],
    tier: Tier::Dependent,
};

const TWEET_MEDIA: TableDescriptor = TableDescriptor {
    name: "tweet_media",
    columns: &[
        "tweet_id",
        "media_id",
        "media_type",
        "media_url",
        "media_url_https",
        "display_url",
        "expanded_url",
    ],
    key: &["tweet_id", "media_id"],
    tier: Tier::Dependent,
};

impl EntityTable {
    pub const COUNT: usize = 8;

    /// Every table, in merge order
    pub const ALL: [EntityTable; Self::COUNT] = [
        EntityTable::Users,
        EntityTable::Places,
        EntityTable::Hashtags,
        EntityTable::Tweets,
        EntityTable::TweetHashtags,
        EntityTable::TweetUrls,
        EntityTable::TweetMentions,
        EntityTable::TweetMedia,
    ];

    pub fn descriptor(self) -> &'static TableDescriptor {
        match self {
            EntityTable::Users => &USERS,
            EntityTable::Places => &PLACES,
            EntityTable::Hashtags => &HASHTAGS,
            EntityTable::Tweets => &TWEETS,
            EntityTable::TweetHashtags => &TWEET_HASHTAGS,
            EntityTable::TweetUrls => &TWEET_URLS,
            EntityTable::TweetMentions => &TWEET_MENTIONS,
            EntityTable::TweetMedia => &TWEET_MEDIA,
        }
    }

    pub fn name(self) -> &'static str {
        self.descriptor().name
    }

    pub fn tier(self) -> Tier {
        self.descriptor().tier
    }

    /// Dense index in `0..COUNT`, for per-table arrays
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| IngestError::UnknownTable(name.to_string()))
    }

    pub fn tables_in_tier(tier: Tier) -> impl Iterator<Item = EntityTable> {
        Self::ALL.into_iter().filter(move |t| t.tier() == tier)
    }
}

impl fmt::Display for EntityTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for EntityTable {
    type Err = IngestError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_index_matches_position_in_all() {
        for (i, table) in EntityTable::ALL.iter().enumerate() {
            assert_eq!(table.index(), i);
        }
    }

    #[test]
    fn test_names_round_trip() {
        for table in EntityTable::ALL {
            assert_eq!(EntityTable::from_name(table.name()).unwrap(), table);
        }
        assert!(matches!(
            EntityTable::from_name("retweets"),
            Err(IngestError::UnknownTable(_))
        ));
    }

    #[test]
    fn test_tiers() {
        let tier1: Vec<_> = EntityTable::tables_in_tier(Tier::Independent).collect();
        assert_eq!(
            tier1,
            vec![EntityTable::Users, EntityTable::Places, EntityTable::Hashtags]
        );
        let tier2: Vec<_> = EntityTable::tables_in_tier(Tier::Primary).collect();
        assert_eq!(tier2, vec![EntityTable::Tweets]);
        assert_eq!(EntityTable::tables_in_tier(Tier::Dependent).count(), 4);
    }

    #[test]
    fn test_keys_are_columns() {
        for table in EntityTable::ALL {
            let d = table.descriptor();
            for key in d.key {
                assert!(d.column_index(key).is_some(), "{}.{} missing", d.name, key);
            }
        }
    }

    #[test]
    fn test_column_counts() {
        assert_eq!(EntityTable::Users.descriptor().column_count(), 12);
        assert_eq!(EntityTable::Tweets.descriptor().column_count(), 15);
        assert_eq!(EntityTable::TweetMedia.descriptor().column_count(), 7);
        assert_eq!(EntityTable::TweetUrls.descriptor().key_list(), "tweet_id, url");
    }
}
