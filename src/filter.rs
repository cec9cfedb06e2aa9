// src/filter.rs
//! Query filter construction from raw trigger inputs.
//!
//! Everything here is pure: the same inputs always produce a structurally equal
//! filter, and the only failure is a `ValidationError` for a missing required
//! field or an unparseable date.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Search constraints sent to the provider. `None` means unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_phrase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_users: Option<Vec<String>>,
    /// Reply/mention targets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_users: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_replies: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_retweets: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_likes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StreamMode {
    #[default]
    Search,
    FromUsers,
    Mentions,
    Hashtags,
    Advanced,
}

/// Optional fields of the advanced stream mode, as typed by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvancedInputs {
    pub include_phrase: Option<String>,
    pub from_users: Option<String>,
    pub to_users: Option<String>,
    pub language: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub min_replies: Option<u64>,
    pub min_retweets: Option<u64>,
    pub min_likes: Option<u64>,
    pub top: Option<bool>,
}

/// Raw stream-mode inputs. Only the field(s) of the selected mode are read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawInputs {
    pub search_terms: Option<String>,
    pub usernames: Option<String>,
    pub mention_users: Option<String>,
    pub hashtags: Option<String>,
    pub advanced: AdvancedInputs,
}

/// Build the filter for a stream-mode activation.
///
/// Phrases are copied verbatim; only the required-field check looks at the
/// trimmed text.
///
/// Mentions mode searches for the phrase `@a OR @b` rather than using a real
/// mention constraint, so it also matches posts that merely contain the text.
/// That loss of precision is kept as-is.
///
/// In advanced mode numeric and boolean fields are only copied when truthy: a
/// minimum of `0` or `top = false` is the same as leaving the field out.
pub fn build(mode: StreamMode, raw: &RawInputs) -> Result<QueryFilter, ValidationError> {
    let mut filter = QueryFilter::default();

    match mode {
        StreamMode::Search => {
            required(raw.search_terms.as_deref(), "search terms")?;
            filter.include_phrase = raw.search_terms.clone();
        }
        StreamMode::FromUsers => {
            let users = required_list(raw.usernames.as_deref(), "usernames")?;
            filter.from_users = Some(users);
        }
        StreamMode::Mentions => {
            let users = required_list(raw.mention_users.as_deref(), "mention users")?;
            filter.include_phrase = Some(or_terms(&users, '@'));
        }
        StreamMode::Hashtags => {
            let tags = required_list(raw.hashtags.as_deref(), "hashtags")?;
            filter.include_phrase = Some(or_terms(&tags, '#'));
        }
        StreamMode::Advanced => {
            let adv = &raw.advanced;
            filter.include_phrase = adv
                .include_phrase
                .clone()
                .filter(|p| !p.trim().is_empty());
            filter.from_users = present(adv.from_users.as_deref())
                .map(split_list)
                .filter(|l| !l.is_empty());
            filter.to_users = present(adv.to_users.as_deref())
                .map(split_list)
                .filter(|l| !l.is_empty());
            filter.language = present(adv.language.as_deref()).map(str::to_string);
            filter.start_date = present(adv.start_date.as_deref())
                .map(|s| parse_date("start date", s))
                .transpose()?;
            filter.end_date = present(adv.end_date.as_deref())
                .map(|s| parse_date("end date", s))
                .transpose()?;
            filter.min_replies = adv.min_replies.filter(|n| *n > 0);
            filter.min_retweets = adv.min_retweets.filter(|n| *n > 0);
            filter.min_likes = adv.min_likes.filter(|n| *n > 0);
            filter.top = adv.top.filter(|t| *t);
        }
    }

    Ok(filter)
}

/// What the poll trigger watches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PollMode {
    #[default]
    NewTweets,
    Mentions,
    Timeline,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollInputs {
    pub search_query: Option<String>,
    pub username: Option<String>,
}

/// Resolved fetch target of a poll activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollTarget {
    Search(QueryFilter),
    Timeline { username: String },
}

pub fn build_poll_target(mode: PollMode, raw: &PollInputs) -> Result<PollTarget, ValidationError> {
    match mode {
        PollMode::NewTweets => {
            required(raw.search_query.as_deref(), "search query")?;
            Ok(PollTarget::Search(QueryFilter {
                include_phrase: raw.search_query.clone(),
                ..QueryFilter::default()
            }))
        }
        PollMode::Mentions => {
            let user = required(raw.username.as_deref(), "username")?;
            Ok(PollTarget::Search(QueryFilter {
                include_phrase: Some(format!("@{user}")),
                ..QueryFilter::default()
            }))
        }
        PollMode::Timeline => {
            let user = required(raw.username.as_deref(), "username")?;
            Ok(PollTarget::Timeline {
                username: user.to_string(),
            })
        }
    }
}

fn present(v: Option<&str>) -> Option<&str> {
    v.map(str::trim).filter(|s| !s.is_empty())
}

fn required<'a>(v: Option<&'a str>, field: &'static str) -> Result<&'a str, ValidationError> {
    present(v).ok_or(ValidationError::MissingField(field))
}

fn required_list(v: Option<&str>, field: &'static str) -> Result<Vec<String>, ValidationError> {
    let list = split_list(required(v, field)?);
    if list.is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(list)
}

/// Comma-separated list, trimmed, empty entries dropped, order kept.
fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn or_terms(items: &[String], prefix: char) -> String {
    items
        .iter()
        .map(|i| format!("{prefix}{i}"))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// ISO-8601 timestamp; a missing offset means UTC, a bare date means midnight UTC.
fn parse_date(field: &'static str, s: &str) -> Result<DateTime<Utc>, ValidationError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|n| n.and_utc())
        .ok_or_else(|| ValidationError::InvalidDate {
            field,
            value: s.to_string(),
        })
}
