use crate::errors::AppError;
use crate::models::{ActivitySuggestion, User, Visit};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::{env, path::Path, path::PathBuf};
use tokio::fs;
use tracing::{debug, error, warn};

pub const CURRENT_USER_KEY: &str = "currentUser";

/// A record type persisted as one JSON array blob under a fixed key.
pub trait Record: Serialize + DeserializeOwned {
    const KEY: &'static str;
    /// Fields holding dates as text, rehydrated on load.
    const DATE_FIELDS: &'static [&'static str];
}

impl Record for User {
    const KEY: &'static str = "users";
    const DATE_FIELDS: &'static [&'static str] = &["joinedAt"];
}

impl Record for Visit {
    const KEY: &'static str = "visits";
    const DATE_FIELDS: &'static [&'static str] = &["startDate", "endDate"];
}

impl Record for ActivitySuggestion {
    const KEY: &'static str = "suggestions";
    const DATE_FIELDS: &'static [&'static str] = &["createdAt", "suggestedDate"];
}

/// Data directory from `APP_DATA_DIR`, falling back to `data/`.
pub fn resolve_data_dir() -> PathBuf {
    env::var_os("APP_DATA_DIR")
        .filter(|path| !path.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("data"))
}

/// Key-value blob store: each key is a JSON file inside `dir`.
#[derive(Debug, Clone)]
pub struct Storage {
    dir: PathBuf,
}

impl Storage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    async fn read_blob(&self, key: &str) -> Option<Value> {
        let path = self.blob_path(key);
        match fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(value) => Some(value),
                Err(err) => {
                    warn!("ignoring malformed blob {}: {err}", path.display());
                    None
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => {
                error!("failed to read blob {}: {err}", path.display());
                None
            }
        }
    }

    /// Raw records stored under `key`. Anything unreadable yields an empty list.
    pub async fn load(&self, key: &str) -> Vec<Value> {
        match self.read_blob(key).await {
            Some(Value::Array(records)) => records,
            Some(Value::Null) | None => Vec::new(),
            Some(_) => {
                warn!("blob {key} is not an array, treating as empty");
                Vec::new()
            }
        }
    }

    pub async fn load_records<R: Record>(&self) -> Vec<R> {
        let raw = self.load(R::KEY).await;
        let total = raw.len();
        let records: Vec<R> = raw
            .into_iter()
            .filter_map(|value| decode(R::KEY, value, R::DATE_FIELDS))
            .collect();
        debug!("loaded {} of {total} records from {}", records.len(), R::KEY);
        records
    }

    /// Overwrites the whole blob under `key`.
    pub async fn save<R: Serialize>(&self, key: &str, records: &[R]) -> Result<(), AppError> {
        let payload = serde_json::to_vec_pretty(records)?;
        fs::write(self.blob_path(key), payload).await?;
        Ok(())
    }

    pub async fn save_records<R: Record>(&self, records: &[R]) -> Result<(), AppError> {
        self.save(R::KEY, records).await
    }

    pub async fn load_current_user(&self) -> Option<User> {
        match self.read_blob(CURRENT_USER_KEY).await {
            Some(Value::Null) | None => None,
            Some(value) => decode(CURRENT_USER_KEY, value, User::DATE_FIELDS),
        }
    }

    /// Writes the current-user blob, or removes it when `user` is `None`.
    pub async fn save_current_user(&self, user: Option<&User>) -> Result<(), AppError> {
        let path = self.blob_path(CURRENT_USER_KEY);
        match user {
            Some(user) => {
                let payload = serde_json::to_vec_pretty(user)?;
                fs::write(path, payload).await?;
            }
            None => match fs::remove_file(path).await {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            },
        }
        Ok(())
    }
}

fn decode<R: DeserializeOwned>(key: &str, mut value: Value, date_fields: &[&str]) -> Option<R> {
    normalize_dates(&mut value, date_fields);
    match serde_json::from_value(value) {
        Ok(record) => Some(record),
        Err(err) => {
            warn!("skipping malformed record in {key}: {err}");
            None
        }
    }
}

/// Rewrites each named date field to canonical RFC 3339 text.
///
/// Absent fields are left alone; `null` and unparseable values are removed
/// so optional dates come back as absent rather than invalid.
pub fn normalize_dates(record: &mut Value, fields: &[&str]) {
    let Some(object) = record.as_object_mut() else {
        return;
    };

    for field in fields {
        let parsed = match object.get(*field) {
            None => continue,
            Some(Value::Null) => None,
            Some(Value::String(text)) => parse_date_text(text),
            Some(Value::Number(millis)) => millis
                .as_i64()
                .and_then(DateTime::<Utc>::from_timestamp_millis),
            Some(other) => {
                warn!("date field {field} has unexpected shape: {other}");
                None
            }
        };

        match parsed {
            Some(date) => {
                object.insert((*field).to_string(), Value::String(date.to_rfc3339()));
            }
            None => {
                if let Some(Value::String(text)) = object.get(*field) {
                    warn!("dropping unparseable date in {field}: {text:?}");
                }
                object.remove(*field);
            }
        }
    }
}

pub fn parse_date_text(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(text) {
        return Some(date.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
