//! Flattening of raw status messages into [`StatusRow`]s.
//!
//! A message carrying a retweet marker is skipped outright. For everything
//! else, each of the 16 fields is pulled by exact path; a missing key is an
//! extraction failure naming the full dotted path so the failed message can
//! be diagnosed from the log line alone.

use serde_json::Value;
use thiserror::Error;

use crate::row::StatusRow;

/// Errors that can occur while flattening a raw message.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("missing field `{0}` in status message")]
    MissingField(&'static str),

    #[error("field `{path}` has unexpected type: {value}")]
    WrongType { path: &'static str, value: Value },
}

/// Outcome of flattening one message.
#[derive(Debug)]
pub enum Extraction {
    /// The message is a retweet; nothing downstream wants it.
    Retweet,
    /// The flattened row, ready for the landing bucket.
    Row(StatusRow),
}

/// Flatten a decoded status message.
///
/// The retweet check runs before any field lookup: retweets routinely lack
/// the extended text body, and they must come out as a skip, not as a
/// missing-field error.
pub fn extract(message: &Value) -> Result<Extraction, ExtractError> {
    if message.get("retweeted_status").is_some() {
        return Ok(Extraction::Retweet);
    }

    let row = StatusRow {
        tweet_id: int_at(message, "id")?,
        tweet_created_at: string_at(message, "created_at")?,
        text: string_at(message, "extended_tweet.full_text")?,
        source: string_at(message, "source")?,
        user_id: int_at(message, "user.id")?,
        user_name: string_at(message, "user.name")?,
        user_location: nullable_string_at(message, "user.location")?,
        user_followers_count: int_at(message, "user.followers_count")?,
        user_friends_count: int_at(message, "user.friends_count")?,
        user_listed_count: int_at(message, "user.listed_count")?,
        user_favourites_count: int_at(message, "user.favourites_count")?,
        user_statuses_count: int_at(message, "user.statuses_count")?,
        profile_created_at: string_at(message, "user.created_at")?,
        reply_count: int_at(message, "reply_count")?,
        retweet_count: int_at(message, "retweet_count")?,
        favorite_count: int_at(message, "favorite_count")?,
    };

    Ok(Extraction::Row(row))
}

/// Walk a dotted path through nested objects.
fn lookup<'a>(message: &'a Value, path: &'static str) -> Result<&'a Value, ExtractError> {
    let mut current = message;
    for segment in path.split('.') {
        current = current
            .get(segment)
            .ok_or(ExtractError::MissingField(path))?;
    }
    Ok(current)
}

fn int_at(message: &Value, path: &'static str) -> Result<i64, ExtractError> {
    let value = lookup(message, path)?;
    value.as_i64().ok_or_else(|| ExtractError::WrongType {
        path,
        value: value.clone(),
    })
}

fn string_at(message: &Value, path: &'static str) -> Result<String, ExtractError> {
    let value = lookup(message, path)?;
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ExtractError::WrongType {
            path,
            value: value.clone(),
        })
}

/// Like [`string_at`], but JSON null is a legal value. The key itself must
/// still be present.
fn nullable_string_at(
    message: &Value,
    path: &'static str,
) -> Result<Option<String>, ExtractError> {
    let value = lookup(message, path)?;
    if value.is_null() {
        return Ok(None);
    }
    value
        .as_str()
        .map(|s| Some(s.to_string()))
        .ok_or_else(|| ExtractError::WrongType {
            path,
            value: value.clone(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::COLUMN_COUNT;
    use serde_json::json;

    fn sample_message() -> Value {
        json!({
            "id": 123,
            "created_at": "2021-01-01",
            "extended_tweet": { "full_text": "Check http://x.com now! 😀" },
            "source": "<a href=\"x\">Twitter Web App</a>",
            "user": {
                "id": 77,
                "name": "someone",
                "location": "Pune",
                "followers_count": 10,
                "friends_count": 20,
                "listed_count": 1,
                "favourites_count": 2,
                "statuses_count": 300,
                "created_at": "2015-06-01"
            },
            "reply_count": 0,
            "retweet_count": 4,
            "favorite_count": 9
        })
    }

    #[test]
    fn test_extracts_all_fields_in_order() {
        let row = match extract(&sample_message()).unwrap() {
            Extraction::Row(row) => row,
            Extraction::Retweet => panic!("not a retweet"),
        };

        let record = row.to_record();
        assert_eq!(record.len(), COLUMN_COUNT);
        assert_eq!(row.tweet_id, 123);
        assert_eq!(row.text, "Check http://x.com now! 😀");
        assert_eq!(row.user_location.as_deref(), Some("Pune"));
        assert_eq!(row.favorite_count, 9);
        assert_eq!(row.object_key(), "td123@2021-01-01.csv");
    }

    #[test]
    fn test_retweet_is_a_skip_not_an_error() {
        // Retweets often lack extended_tweet entirely; the marker check
        // must short-circuit before any field lookup.
        let message = json!({
            "id": 5,
            "retweeted_status": { "id": 1 }
        });
        assert!(matches!(extract(&message), Ok(Extraction::Retweet)));
    }

    #[test]
    fn test_missing_field_names_the_full_path() {
        let mut message = sample_message();
        message["user"]
            .as_object_mut()
            .unwrap()
            .remove("followers_count");

        match extract(&message) {
            Err(ExtractError::MissingField(path)) => {
                assert_eq!(path, "user.followers_count");
            }
            other => panic!("expected MissingField, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_extended_text_fails() {
        let mut message = sample_message();
        message.as_object_mut().unwrap().remove("extended_tweet");
        assert!(matches!(
            extract(&message),
            Err(ExtractError::MissingField("extended_tweet.full_text"))
        ));
    }

    #[test]
    fn test_null_location_is_accepted() {
        let mut message = sample_message();
        message["user"]["location"] = Value::Null;
        let row = match extract(&message).unwrap() {
            Extraction::Row(row) => row,
            Extraction::Retweet => panic!("not a retweet"),
        };
        assert_eq!(row.user_location, None);
    }

    #[test]
    fn test_wrong_type_is_reported() {
        let mut message = sample_message();
        message["user"]["followers_count"] = json!("ten");
        assert!(matches!(
            extract(&message),
            Err(ExtractError::WrongType { path: "user.followers_count", .. })
        ));
    }
}
