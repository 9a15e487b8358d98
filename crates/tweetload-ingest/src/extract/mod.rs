//! Document extraction
//!
//! Flattens one decoded tweet (and the retweeted or quoted tweets embedded in
//! it) into rows for every entity table. Extraction is a pure function of the
//! document: it never fails, and a document without a usable identifier simply
//! contributes nothing.

pub mod rows;

use serde_json::{Map, Value};
use tweetload_common::catalog::EntityTable;
use tweetload_common::hashing::tag_id;

use crate::sanitize::{sanitize_str, sanitize_value};

pub use rows::{Field, Row, RowSet};

/// Embedded documents, visited in this order.
const REFERENCE_KEYS: [&str; 2] = ["retweeted_status", "quoted_status"];

/// Default recursion bound: a retweet of a quote tweet is two levels deep.
pub const DEFAULT_MAX_REFERENCE_DEPTH: usize = 2;

type Object = Map<String, Value>;

/// Extracts entity rows from decoded documents
#[derive(Debug, Clone, Copy)]
pub struct Extractor {
    max_reference_depth: usize,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REFERENCE_DEPTH)
    }
}

impl Extractor {
    pub fn new(max_reference_depth: usize) -> Self {
        Self {
            max_reference_depth,
        }
    }

    /// Extract every row a document contributes, referenced documents included.
    pub fn extract(&self, document: &Value) -> RowSet {
        let mut rows = RowSet::new();
        self.extract_into(document, 0, &mut rows);
        rows
    }

    fn extract_into(&self, document: &Value, depth: usize, out: &mut RowSet) {
        let Some(doc) = document.as_object() else {
            return;
        };
        let Some(tweet_id) = id_of(doc) else {
            return;
        };

        let user_id = extract_user(doc, out);
        let place_id = extract_place(doc, out);
        out.push(EntityTable::Tweets, tweet_row(doc, tweet_id, user_id, place_id));

        extract_hashtags(doc, tweet_id, out);
        extract_urls(doc, tweet_id, out);
        extract_mentions(doc, tweet_id, out);
        extract_media(doc, tweet_id, out);

        if depth < self.max_reference_depth {
            for key in REFERENCE_KEYS {
                if let Some(referenced) = doc.get(key) {
                    self.extract_into(referenced, depth + 1, out);
                }
            }
        }
    }
}

fn extract_user(doc: &Object, out: &mut RowSet) -> Option<i64> {
    let user = doc.get("user")?.as_object()?;
    let user_id = id_of(user)?;

    out.push(
        EntityTable::Users,
        Row::new(vec![
            Field::Int(user_id),
            text(user, "screen_name"),
            text(user, "name"),
            text(user, "description"),
            boolean(user, "verified"),
            boolean(user, "protected"),
            integer(user, "followers_count"),
            integer(user, "friends_count"),
            integer(user, "statuses_count"),
            text(user, "created_at"),
            text(user, "location"),
            text(user, "url"),
        ]),
    );

    Some(user_id)
}

fn extract_place(doc: &Object, out: &mut RowSet) -> Option<String> {
    let place = doc.get("place")?.as_object()?;
    let place_id = sanitize_value(place.get("id"));
    if place_id.is_empty() {
        return None;
    }

    out.push(
        EntityTable::Places,
        Row::new(vec![
            Field::Text(place_id.clone()),
            text(place, "full_name"),
            text(place, "country"),
            text(place, "country_code"),
            text(place, "place_type"),
        ]),
    );

    Some(place_id)
}

fn tweet_row(doc: &Object, tweet_id: i64, user_id: Option<i64>, place_id: Option<String>) -> Row {
    let (display_from, display_to) = display_text_range(doc);

    let quoted_status_id = as_id(doc.get("quoted_status_id"))
        .or_else(|| as_id(doc.get("quoted_status_id_str")))
        .or_else(|| embedded_id(doc, "quoted_status"));

    Row::new(vec![
        Field::Int(tweet_id),
        text(doc, "created_at"),
        Field::Text(sanitize_str(full_text(doc))),
        display_from.into(),
        display_to.into(),
        text(doc, "lang"),
        user_id.into(),
        text(doc, "source"),
        as_id(doc.get("in_reply_to_status_id"))
            .or_else(|| as_id(doc.get("in_reply_to_status_id_str")))
            .into(),
        quoted_status_id.into(),
        embedded_id(doc, "retweeted_status").into(),
        place_id.map_or(Field::Null, Field::Text),
        integer(doc, "retweet_count"),
        integer(doc, "favorite_count"),
        boolean(doc, "possibly_sensitive"),
    ])
}

/// Untruncated text if the document carries it, else the short form.
fn full_text(doc: &Object) -> &str {
    let candidates = [
        doc.get("full_text"),
        doc.get("extended_tweet").and_then(|e| e.get("full_text")),
        doc.get("text"),
    ];
    candidates
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .find(|s| !s.is_empty())
        .unwrap_or("")
}

fn display_text_range(doc: &Object) -> (Option<i64>, Option<i64>) {
    match doc.get("display_text_range").and_then(Value::as_array) {
        Some(range) if range.len() >= 2 => match (range[0].as_i64(), range[1].as_i64()) {
            (Some(from), Some(to)) => (Some(from), Some(to)),
            _ => (None, None),
        },
        _ => (None, None),
    }
}

fn extract_hashtags(doc: &Object, tweet_id: i64, out: &mut RowSet) {
    for hashtag in entity_list(doc, "entities", "hashtags") {
        let Some(raw) = hashtag
            .get("text")
            .or_else(|| hashtag.get("tag"))
            .and_then(Value::as_str)
        else {
            continue;
        };
        let tag = sanitize_str(raw).trim().to_string();
        if tag.is_empty() {
            continue;
        }

        let hashtag_id = tag_id(&tag);
        out.push(
            EntityTable::Hashtags,
            Row::new(vec![Field::Int(hashtag_id), Field::Text(tag)]),
        );
        out.push(
            EntityTable::TweetHashtags,
            Row::new(vec![Field::Int(tweet_id), Field::Int(hashtag_id)]),
        );
    }
}

fn extract_urls(doc: &Object, tweet_id: i64, out: &mut RowSet) {
    for url in entity_list(doc, "entities", "urls") {
        let Some(url) = url.as_object() else {
            continue;
        };
        let short = sanitize_value(url.get("url"));
        if short.is_empty() {
            continue;
        }

        let expanded = sanitize_value(url.get("expanded_url"));
        let mut unwound = sanitize_value(url.get("unwound_url"));
        if unwound.is_empty() {
            unwound = expanded.clone();
        }

        out.push(
            EntityTable::TweetUrls,
            Row::new(vec![
                Field::Int(tweet_id),
                Field::Text(short),
                Field::Text(expanded),
                text(url, "display_url"),
                Field::Text(unwound),
            ]),
        );
    }
}

fn extract_mentions(doc: &Object, tweet_id: i64, out: &mut RowSet) {
    for mention in entity_list(doc, "entities", "user_mentions") {
        let Some(mention) = mention.as_object() else {
            continue;
        };
        let Some(user_id) = id_of(mention) else {
            continue;
        };

        out.push(
            EntityTable::TweetMentions,
            Row::new(vec![
                Field::Int(tweet_id),
                Field::Int(user_id),
                text(mention, "screen_name"),
                text(mention, "name"),
            ]),
        );
    }
}

fn extract_media(doc: &Object, tweet_id: i64, out: &mut RowSet) {
    let mut media = entity_list(doc, "extended_entities", "media");
    if media.is_empty() {
        media = entity_list(doc, "entities", "media");
    }

    for item in media {
        let Some(item) = item.as_object() else {
            continue;
        };
        let Some(media_id) = id_of(item) else {
            continue;
        };

        out.push(
            EntityTable::TweetMedia,
            Row::new(vec![
                Field::Int(tweet_id),
                Field::Int(media_id),
                text(item, "type"),
                text(item, "media_url"),
                text(item, "media_url_https"),
                text(item, "display_url"),
                text(item, "expanded_url"),
            ]),
        );
    }
}

/// `doc[section][list]` as a slice, empty when any step is missing.
fn entity_list<'a>(doc: &'a Object, section: &str, list: &str) -> &'a [Value] {
    doc.get(section)
        .and_then(|s| s.get(list))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Identifier from `id`, falling back to `id_str`.
fn id_of(obj: &Object) -> Option<i64> {
    as_id(obj.get("id")).or_else(|| as_id(obj.get("id_str")))
}

fn embedded_id(doc: &Object, key: &str) -> Option<i64> {
    doc.get(key).and_then(Value::as_object).and_then(id_of)
}

/// Accepts JSON integers and numeric strings that fit a signed 64-bit column.
fn as_id(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().and_then(|u| i64::try_from(u).ok())),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text(obj: &Object, key: &str) -> Field {
    Field::Text(sanitize_value(obj.get(key)))
}

fn integer(obj: &Object, key: &str) -> Field {
    obj.get(key).and_then(Value::as_i64).into()
}

fn boolean(obj: &Object, key: &str) -> Field {
    obj.get(key).and_then(Value::as_bool).into()
}
