//! Dataset records as held in the catalog and persisted in the metadata store.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::Fields;

pub const FIELD_PATH: &str = "cf:path";
pub const FIELD_POLICY: &str = "cf:policy";
pub const FIELD_MODE: &str = "cf:mode";
pub const FIELD_RETENTION: &str = "cf:retention";

/// Directory name prefix marking a dataset under the repository root.
pub const SOURCE_PREFIX: &str = "source=";

/// Retention policy of a dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    /// Files older than `retention` days are actioned.
    Age,
    /// The dataset is trimmed down to `retention` gigabytes.
    Size,
    /// Persisted record without a matching directory.
    IntegrityError,
}

impl Policy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Policy::Age => "age",
            Policy::Size => "size",
            Policy::IntegrityError => "integrity_error",
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Policy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "age" => Ok(Policy::Age),
            "size" => Ok(Policy::Size),
            "integrity_error" => Ok(Policy::IntegrityError),
            other => Err(format!("unknown policy '{other}'")),
        }
    }
}

/// What happens to files selected by the retention policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Keep,
    Archive,
    Delete,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Keep => "keep",
            Mode::Archive => "archive",
            Mode::Delete => "delete",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keep" => Ok(Mode::Keep),
            "archive" => Ok(Mode::Archive),
            "delete" => Ok(Mode::Delete),
            other => Err(format!("unknown mode '{other}'")),
        }
    }
}

/// A persisted row that cannot be turned into a [`DatasetRecord`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MalformedEntry {
    #[error("record '{key}' is missing field {field}")]
    MissingField { key: String, field: &'static str },

    #[error("record '{key}' has invalid {field}: {reason}")]
    InvalidField {
        key: String,
        field: &'static str,
        reason: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatasetRecord {
    pub id: String,
    pub path: String,
    pub policy: Policy,
    pub mode: Mode,
    /// Days for [`Policy::Age`], gigabytes for [`Policy::Size`].
    pub retention: Option<u64>,
}

impl DatasetRecord {
    /// A dataset seen on the filesystem with no persisted record yet.
    pub fn discovered(id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            policy: Policy::Size,
            mode: Mode::Keep,
            retention: None,
        }
    }

    /// Decode a persisted row.
    pub fn from_fields(key: &str, fields: &Fields) -> Result<Self, MalformedEntry> {
        let required = |field: &'static str| {
            fields
                .get(field)
                .ok_or_else(|| MalformedEntry::MissingField {
                    key: key.to_string(),
                    field,
                })
        };
        let invalid = |field: &'static str, reason: String| MalformedEntry::InvalidField {
            key: key.to_string(),
            field,
            reason,
        };

        let path = required(FIELD_PATH)?.clone();
        let policy = required(FIELD_POLICY)?
            .parse::<Policy>()
            .map_err(|e| invalid(FIELD_POLICY, e))?;
        let mode = match fields.get(FIELD_MODE) {
            Some(raw) => raw.parse::<Mode>().map_err(|e| invalid(FIELD_MODE, e))?,
            None => Mode::Keep,
        };
        let retention = match fields.get(FIELD_RETENTION) {
            Some(raw) if !raw.is_empty() => Some(
                raw.parse::<u64>()
                    .map_err(|e| invalid(FIELD_RETENTION, e.to_string()))?,
            ),
            _ => None,
        };

        Ok(Self {
            id: key.to_string(),
            path,
            policy,
            mode,
            retention,
        })
    }

    /// Encode for the metadata store; the retention is stringified.
    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert(FIELD_PATH.to_string(), self.path.clone());
        fields.insert(FIELD_POLICY.to_string(), self.policy.to_string());
        fields.insert(FIELD_MODE.to_string(), self.mode.to_string());
        if let Some(retention) = self.retention {
            fields.insert(FIELD_RETENTION.to_string(), retention.to_string());
        }
        fields
    }

    pub fn into_integrity_error(self) -> Self {
        Self {
            policy: Policy::IntegrityError,
            ..self
        }
    }

    pub fn to_entry(&self) -> DatasetEntry {
        let (max_age_days, max_size_gigabytes) = match self.policy {
            Policy::Age => (self.retention, None),
            Policy::Size => (None, self.retention),
            Policy::IntegrityError => (None, None),
        };
        DatasetEntry {
            id: self.id.clone(),
            path: self.path.clone(),
            policy: self.policy,
            mode: self.mode,
            max_age_days,
            max_size_gigabytes,
        }
    }
}

/// Catalog entry as handed to API callers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetEntry {
    pub id: String,
    pub path: String,
    pub policy: Policy,
    pub mode: Mode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age_days: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size_gigabytes: Option<u64>,
}

/// Operator mutation of one dataset. Every field is optional.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<Policy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age_days: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size_gigabytes: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_from_fields_complete_record() {
        let record = DatasetRecord::from_fields(
            "netflow",
            &fields(&[
                (FIELD_PATH, "/repo/source=netflow"),
                (FIELD_POLICY, "age"),
                (FIELD_MODE, "archive"),
                (FIELD_RETENTION, "30"),
            ]),
        )
        .unwrap();

        assert_eq!(record.id, "netflow");
        assert_eq!(record.policy, Policy::Age);
        assert_eq!(record.mode, Mode::Archive);
        assert_eq!(record.retention, Some(30));
    }

    #[test]
    fn test_from_fields_defaults_mode_to_keep() {
        let record = DatasetRecord::from_fields(
            "a",
            &fields(&[(FIELD_PATH, "/repo/source=a"), (FIELD_POLICY, "size")]),
        )
        .unwrap();

        assert_eq!(record.mode, Mode::Keep);
        assert_eq!(record.retention, None);
    }

    #[test]
    fn test_from_fields_rejects_missing_path() {
        let err = DatasetRecord::from_fields("a", &fields(&[(FIELD_POLICY, "size")])).unwrap_err();
        assert_eq!(
            err,
            MalformedEntry::MissingField {
                key: "a".to_string(),
                field: FIELD_PATH
            }
        );
    }

    #[test]
    fn test_from_fields_rejects_bad_retention() {
        let err = DatasetRecord::from_fields(
            "a",
            &fields(&[
                (FIELD_PATH, "/p"),
                (FIELD_POLICY, "size"),
                (FIELD_RETENTION, "lots"),
            ]),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            MalformedEntry::InvalidField {
                field: FIELD_RETENTION,
                ..
            }
        ));
    }

    #[test]
    fn test_fields_round_trip() {
        let record = DatasetRecord {
            id: "x".to_string(),
            path: "/repo/source=x".to_string(),
            policy: Policy::Size,
            mode: Mode::Delete,
            retention: Some(12),
        };
        let fields = record.to_fields();
        assert_eq!(fields.get(FIELD_RETENTION).map(String::as_str), Some("12"));
        assert_eq!(DatasetRecord::from_fields("x", &fields).unwrap(), record);
    }

    #[test]
    fn test_entry_carries_one_numeric_field() {
        let mut record = DatasetRecord::discovered("x", "/repo/source=x");
        record.policy = Policy::Age;
        record.retention = Some(7);

        let entry = record.to_entry();
        assert_eq!(entry.max_age_days, Some(7));
        assert_eq!(entry.max_size_gigabytes, None);

        let entry = record.into_integrity_error().to_entry();
        assert_eq!(entry.max_age_days, None);
        assert_eq!(entry.max_size_gigabytes, None);
    }

    #[test]
    fn test_entry_wire_shape() {
        let mut record = DatasetRecord::discovered("x", "/repo/source=x");
        record.retention = Some(5);

        let json = serde_json::to_value(record.to_entry()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": "x",
                "path": "/repo/source=x",
                "policy": "size",
                "mode": "keep",
                "max_size_gigabytes": 5
            })
        );
    }

    #[test]
    fn test_integrity_error_wire_name() {
        let json = serde_json::to_string(&Policy::IntegrityError).unwrap();
        assert_eq!(json, "\"integrity_error\"");
        assert_eq!("integrity_error".parse::<Policy>(), Ok(Policy::IntegrityError));
    }
}
