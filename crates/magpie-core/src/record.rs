//! Domain models for ingested submissions.
//!
//! A [`CandidateRef`] is what the archive search yields: an identifier plus
//! the timestamp the archive observed. It is ephemeral and never persisted.
//! A [`Record`] is the authoritative, typed representation of one submission
//! as resolved from the gateway, and is the unit of persistence.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;

/// A candidate item emitted by the archive search.
///
/// Only the identifier matters for resolution; `observed_utc` drives
/// nothing downstream but is useful for diagnostics when the archive
/// and the gateway disagree about a submission's age.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRef {
    /// Bare item identifier (no service prefix).
    pub id: String,
    /// Creation timestamp as reported by the archive.
    pub observed_utc: i64,
}

/// The authoritative, persisted representation of one submission.
///
/// Fields are fixed and typed; required fields are validated at construction
/// time via [`Record::from_json`], so a malformed upstream payload fails fast
/// with [`AppError::MissingField`] instead of a late lookup error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Item identifier, unique within a collection. Immutable once stored.
    pub id: String,
    /// Name of the collection this submission belongs to.
    pub collection: String,
    /// Author account name.
    pub author: String,
    /// Whether the author holds a premium account.
    pub author_premium: bool,
    /// Submission title.
    pub title: String,
    /// Submission body text. `"[removed]"` / `"[deleted]"` when taken down.
    pub selftext: String,
    pub ups: i64,
    pub downs: i64,
    pub num_comments: i64,
    pub total_awards_received: i64,
    pub view_count: i64,
    /// Collection subscriber count at fetch time.
    pub subreddit_subscribers: i64,
    /// Fraction of votes that are upvotes, `ups / (ups + downs)`.
    pub upvote_ratio: f64,
    /// True if the submission has been removed or deleted upstream.
    pub removed: bool,
    /// Creation timestamp in the service's local clock. Immutable once stored.
    pub created: i64,
    /// Creation timestamp in UTC. Immutable once stored.
    pub created_utc: i64,
    pub permalink: String,
    pub url: String,
}

impl Default for Record {
    fn default() -> Self {
        Self {
            id: String::new(),
            collection: String::new(),
            author: String::new(),
            author_premium: false,
            title: String::new(),
            selftext: String::new(),
            ups: 0,
            downs: 0,
            num_comments: 0,
            total_awards_received: 0,
            view_count: 0,
            subreddit_subscribers: 0,
            // A neutral ratio, matching the payload default
            upvote_ratio: 1.0,
            removed: false,
            created: 0,
            created_utc: 0,
            permalink: String::new(),
            url: String::new(),
        }
    }
}

impl Record {
    /// Builds a `Record` from a gateway JSON payload.
    ///
    /// `id` and `created_utc` are required; all counters default to zero and
    /// text fields to empty when absent, since the gateway omits fields on
    /// older submissions.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::MissingField`] if a required field is absent or
    /// has the wrong type.
    pub fn from_json(collection: &str, data: &Value) -> Result<Self, AppError> {
        let id = data
            .get("id")
            .and_then(Value::as_str)
            .ok_or(AppError::MissingField("id"))?
            .to_string();

        let created_utc = data
            .get("created_utc")
            .and_then(as_epoch)
            .ok_or(AppError::MissingField("created_utc"))?;

        // `created` mirrors `created_utc` when the local-clock variant is absent.
        let created = data.get("created").and_then(as_epoch).unwrap_or(created_utc);

        let selftext = str_field(data, "selftext");
        let removed = data
            .get("removed_by_category")
            .map(|v| !v.is_null())
            .unwrap_or(false)
            || selftext == "[removed]"
            || selftext == "[deleted]";

        Ok(Self {
            id,
            collection: collection.to_string(),
            author: str_field(data, "author"),
            author_premium: data
                .get("author_premium")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            title: str_field(data, "title"),
            selftext,
            ups: int_field(data, "ups"),
            downs: int_field(data, "downs"),
            num_comments: int_field(data, "num_comments"),
            total_awards_received: int_field(data, "total_awards_received"),
            view_count: int_field(data, "view_count"),
            subreddit_subscribers: int_field(data, "subreddit_subscribers"),
            upvote_ratio: data
                .get("upvote_ratio")
                .and_then(Value::as_f64)
                .unwrap_or(1.0),
            removed,
            created,
            created_utc,
            permalink: str_field(data, "permalink"),
            url: str_field(data, "url"),
        })
    }

    /// Total interactions (up plus down votes), derived from the vote ratio.
    ///
    /// With `ratio = ups / (ups + downs)` the total is `ups / ratio`.
    /// Returns `ups` when the ratio is zero or non-finite.
    pub fn interactions(&self) -> f64 {
        if self.upvote_ratio > 0.0 && self.upvote_ratio.is_finite() {
            self.ups as f64 / self.upvote_ratio
        } else {
            self.ups as f64
        }
    }

    /// Net score (ups minus downs), derived from the vote ratio.
    ///
    /// `downs = ups/ratio - ups`, so `score = 2*ups - ups/ratio`.
    pub fn score(&self) -> f64 {
        2.0 * self.ups as f64 - self.interactions()
    }
}

/// Timestamps arrive as floats from some endpoints and integers from others.
fn as_epoch(v: &Value) -> Option<i64> {
    v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))
}

fn str_field(data: &Value, key: &str) -> String {
    data.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn int_field(data: &Value, key: &str) -> i64 {
    data.get(key).and_then(Value::as_i64).unwrap_or(0)
}
