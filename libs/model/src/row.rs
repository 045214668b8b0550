//! The flattened status row and its CSV record form.

use csv::StringRecord;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of columns in the warehouse table.
pub const COLUMN_COUNT: usize = 16;

/// Warehouse column names, in table order.
///
/// The order here is the order everywhere: extraction, the landing CSV, the
/// cleaned consolidated file, and the warehouse DDL all follow it.
pub const COLUMNS: [&str; COLUMN_COUNT] = [
    "tweet_id",
    "tweet_created_at",
    "text",
    "source",
    "user_id",
    "user_name",
    "user_location",
    "user_followers_count",
    "user_friends_count",
    "user_listed_count",
    "user_favourites_count",
    "user_statuses_count",
    "profile_created_at",
    "reply_count",
    "retweet_count",
    "favorite_count",
];

/// Errors that can occur converting between rows and CSV records.
#[derive(Debug, Error)]
pub enum RowError {
    #[error("expected {COLUMN_COUNT} fields, got {0}")]
    WrongArity(usize),

    #[error("field `{column}` is not an integer: {value:?}")]
    BadInteger { column: &'static str, value: String },
}

/// One accepted status message, flattened to the warehouse schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRow {
    pub tweet_id: i64,
    pub tweet_created_at: String,
    pub text: String,
    pub source: String,
    pub user_id: i64,
    pub user_name: String,
    /// JSON null in the source profile; empty in the CSV form.
    pub user_location: Option<String>,
    pub user_followers_count: i64,
    pub user_friends_count: i64,
    pub user_listed_count: i64,
    pub user_favourites_count: i64,
    pub user_statuses_count: i64,
    pub profile_created_at: String,
    pub reply_count: i64,
    pub retweet_count: i64,
    pub favorite_count: i64,
}

impl StatusRow {
    /// Landing object name for this row: `td<id>@<created_at>.csv`.
    ///
    /// id + created_at is the natural dedup key; redelivery of the same
    /// message overwrites the same object.
    pub fn object_key(&self) -> String {
        format!("td{}@{}.csv", self.tweet_id, self.tweet_created_at)
    }

    /// The row as an ordered list of field values, one per column.
    pub fn to_record(&self) -> Vec<String> {
        vec![
            self.tweet_id.to_string(),
            self.tweet_created_at.clone(),
            self.text.clone(),
            self.source.clone(),
            self.user_id.to_string(),
            self.user_name.clone(),
            self.user_location.clone().unwrap_or_default(),
            self.user_followers_count.to_string(),
            self.user_friends_count.to_string(),
            self.user_listed_count.to_string(),
            self.user_favourites_count.to_string(),
            self.user_statuses_count.to_string(),
            self.profile_created_at.clone(),
            self.reply_count.to_string(),
            self.retweet_count.to_string(),
            self.favorite_count.to_string(),
        ]
    }

    /// Rebuild a row from a positional CSV record.
    pub fn from_record(record: &StringRecord) -> Result<Self, RowError> {
        if record.len() != COLUMN_COUNT {
            return Err(RowError::WrongArity(record.len()));
        }

        let location = record[6].trim();

        Ok(Self {
            tweet_id: parse_int(&record[0], COLUMNS[0])?,
            tweet_created_at: record[1].to_string(),
            text: record[2].to_string(),
            source: record[3].to_string(),
            user_id: parse_int(&record[4], COLUMNS[4])?,
            user_name: record[5].to_string(),
            user_location: if location.is_empty() {
                None
            } else {
                Some(location.to_string())
            },
            user_followers_count: parse_int(&record[7], COLUMNS[7])?,
            user_friends_count: parse_int(&record[8], COLUMNS[8])?,
            user_listed_count: parse_int(&record[9], COLUMNS[9])?,
            user_favourites_count: parse_int(&record[10], COLUMNS[10])?,
            user_statuses_count: parse_int(&record[11], COLUMNS[11])?,
            profile_created_at: record[12].to_string(),
            reply_count: parse_int(&record[13], COLUMNS[13])?,
            retweet_count: parse_int(&record[14], COLUMNS[14])?,
            favorite_count: parse_int(&record[15], COLUMNS[15])?,
        })
    }
}

fn parse_int(value: &str, column: &'static str) -> Result<i64, RowError> {
    value.trim().parse().map_err(|_| RowError::BadInteger {
        column,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row() -> StatusRow {
        StatusRow {
            tweet_id: 123,
            tweet_created_at: "2021-01-01".to_string(),
            text: "Check http://x.com now! 😀".to_string(),
            source: r#"<a href="x">Twitter Web App</a>"#.to_string(),
            user_id: 77,
            user_name: "someone".to_string(),
            user_location: Some("Pune".to_string()),
            user_followers_count: 10,
            user_friends_count: 20,
            user_listed_count: 1,
            user_favourites_count: 2,
            user_statuses_count: 300,
            profile_created_at: "2015-06-01".to_string(),
            reply_count: 0,
            retweet_count: 4,
            favorite_count: 9,
        }
    }

    #[test]
    fn test_object_key_format() {
        assert_eq!(sample_row().object_key(), "td123@2021-01-01.csv");
    }

    #[test]
    fn test_record_has_all_columns_in_order() {
        let record = sample_row().to_record();
        assert_eq!(record.len(), COLUMN_COUNT);
        assert_eq!(record[0], "123");
        assert_eq!(record[1], "2021-01-01");
        assert_eq!(record[3], r#"<a href="x">Twitter Web App</a>"#);
        assert_eq!(record[15], "9");
    }

    #[test]
    fn test_record_round_trip() {
        let row = sample_row();
        let record = StringRecord::from(row.to_record());
        let back = StatusRow::from_record(&record).unwrap();
        assert_eq!(back, row);
    }

    #[test]
    fn test_empty_location_round_trips_to_none() {
        let mut row = sample_row();
        row.user_location = None;
        let record = StringRecord::from(row.to_record());
        assert_eq!(record[6].to_string(), "");
        let back = StatusRow::from_record(&record).unwrap();
        assert_eq!(back.user_location, None);
    }

    #[test]
    fn test_wrong_arity_is_rejected() {
        let record = StringRecord::from(vec!["1", "2", "3"]);
        assert!(matches!(
            StatusRow::from_record(&record),
            Err(RowError::WrongArity(3))
        ));
    }

    #[test]
    fn test_bad_integer_names_the_column() {
        let mut fields = sample_row().to_record();
        fields[7] = "lots".to_string();
        let record = StringRecord::from(fields);
        match StatusRow::from_record(&record) {
            Err(RowError::BadInteger { column, .. }) => {
                assert_eq!(column, "user_followers_count");
            }
            other => panic!("expected BadInteger, got {other:?}"),
        }
    }
}
