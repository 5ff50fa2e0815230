use common::dataset::{DatasetRecord, DatasetUpdate, Policy};

use crate::error::CatalogError;

fn violation(message: impl Into<String>) -> CatalogError {
    CatalogError::SchemaViolation(message.into())
}

/// Dataset ids are limited to `[A-Za-z0-9_-]+`.
pub fn validate_id(id: &str) -> Result<(), CatalogError> {
    if !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        Ok(())
    } else {
        Err(violation(format!("invalid dataset id '{id}'")))
    }
}

/// Resolve the policy and threshold an update asks for.
///
/// A policy switch must carry the numeric field of the new policy; the
/// field of the other policy is dropped.
fn resolve_policy(
    update: &DatasetUpdate,
    current: Option<Policy>,
) -> Result<Option<(Policy, u64)>, CatalogError> {
    let requested = update.policy.or(match (update.max_age_days, update.max_size_gigabytes) {
        (None, None) => None,
        _ => current,
    });

    match requested {
        None => Ok(None),
        Some(Policy::Age) => update
            .max_age_days
            .map(|days| Some((Policy::Age, days)))
            .ok_or_else(|| violation("policy 'age' requires max_age_days")),
        Some(Policy::Size) => update
            .max_size_gigabytes
            .map(|gigabytes| Some((Policy::Size, gigabytes)))
            .ok_or_else(|| violation("policy 'size' requires max_size_gigabytes")),
        Some(Policy::IntegrityError) => Err(violation(
            "integrity_error is assigned by reconciliation and cannot be requested",
        )),
    }
}

/// Apply an operator update to an existing record, or build a new one when
/// `existing` is `None`.
pub fn apply_update(
    id: &str,
    existing: Option<&DatasetRecord>,
    update: &DatasetUpdate,
) -> Result<DatasetRecord, CatalogError> {
    validate_id(id)?;

    match existing {
        Some(record) => {
            let mut next = record.clone();
            match resolve_policy(update, Some(record.policy))? {
                Some((policy, threshold)) => {
                    next.policy = policy;
                    next.retention = Some(threshold);
                }
                None if record.policy == Policy::IntegrityError => {
                    return Err(violation(format!(
                        "dataset '{id}' is flagged integrity_error; an update must set a policy"
                    )));
                }
                None => {}
            }
            if let Some(mode) = update.mode {
                next.mode = mode;
            }
            if let Some(path) = &update.path {
                if path.is_empty() {
                    return Err(violation("path cannot be empty"));
                }
                next.path = path.clone();
            }
            Ok(next)
        }
        None => {
            let path = update
                .path
                .clone()
                .filter(|p| !p.is_empty())
                .ok_or_else(|| violation("creating a dataset requires path"))?;
            let mode = update
                .mode
                .ok_or_else(|| violation("creating a dataset requires mode"))?;
            if update.policy.is_none() {
                return Err(violation("creating a dataset requires policy"));
            }
            let (policy, threshold) = resolve_policy(update, None)?
                .ok_or_else(|| violation("creating a dataset requires policy"))?;
            Ok(DatasetRecord {
                id: id.to_string(),
                path,
                policy,
                mode,
                retention: Some(threshold),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::dataset::Mode;

    fn existing() -> DatasetRecord {
        DatasetRecord {
            id: "netflow".to_string(),
            path: "/repo/source=netflow".to_string(),
            policy: Policy::Size,
            mode: Mode::Keep,
            retention: Some(10),
        }
    }

    #[test]
    fn test_policy_switch_requires_matching_field() {
        let update = DatasetUpdate {
            policy: Some(Policy::Age),
            max_size_gigabytes: Some(5),
            ..Default::default()
        };
        let err = apply_update("netflow", Some(&existing()), &update).unwrap_err();
        assert!(matches!(err, CatalogError::SchemaViolation(_)));
    }

    #[test]
    fn test_policy_switch_replaces_threshold() {
        let update = DatasetUpdate {
            policy: Some(Policy::Age),
            max_age_days: Some(7),
            max_size_gigabytes: Some(99),
            ..Default::default()
        };
        let record = apply_update("netflow", Some(&existing()), &update).unwrap();
        assert_eq!(record.policy, Policy::Age);
        assert_eq!(record.retention, Some(7));
        assert_eq!(record.to_entry().max_size_gigabytes, None);
    }

    #[test]
    fn test_mode_only_update_keeps_policy() {
        let update = DatasetUpdate {
            mode: Some(Mode::Archive),
            ..Default::default()
        };
        let record = apply_update("netflow", Some(&existing()), &update).unwrap();
        assert_eq!(record.mode, Mode::Archive);
        assert_eq!(record.policy, Policy::Size);
        assert_eq!(record.retention, Some(10));
    }

    #[test]
    fn test_threshold_without_policy_applies_to_current_policy() {
        let update = DatasetUpdate {
            max_size_gigabytes: Some(20),
            ..Default::default()
        };
        let record = apply_update("netflow", Some(&existing()), &update).unwrap();
        assert_eq!(record.retention, Some(20));

        let update = DatasetUpdate {
            max_age_days: Some(3),
            ..Default::default()
        };
        assert!(apply_update("netflow", Some(&existing()), &update).is_err());
    }

    #[test]
    fn test_integrity_error_record_needs_policy() {
        let flagged = existing().into_integrity_error();
        let update = DatasetUpdate {
            mode: Some(Mode::Delete),
            ..Default::default()
        };
        assert!(apply_update("netflow", Some(&flagged), &update).is_err());

        let update = DatasetUpdate {
            policy: Some(Policy::Size),
            max_size_gigabytes: Some(1),
            ..Default::default()
        };
        let record = apply_update("netflow", Some(&flagged), &update).unwrap();
        assert_eq!(record.policy, Policy::Size);
    }

    #[test]
    fn test_integrity_error_cannot_be_requested() {
        let update = DatasetUpdate {
            policy: Some(Policy::IntegrityError),
            ..Default::default()
        };
        assert!(apply_update("netflow", Some(&existing()), &update).is_err());
    }

    #[test]
    fn test_create_requires_all_fields() {
        let mut update = DatasetUpdate {
            path: Some("/repo/source=new".to_string()),
            policy: Some(Policy::Size),
            mode: Some(Mode::Delete),
            ..Default::default()
        };
        assert!(apply_update("new", None, &update).is_err());

        update.max_size_gigabytes = Some(2);
        let record = apply_update("new", None, &update).unwrap();
        assert_eq!(record.id, "new");
        assert_eq!(record.retention, Some(2));

        update.mode = None;
        assert!(apply_update("new", None, &update).is_err());
    }

    #[test]
    fn test_invalid_ids() {
        assert!(validate_id("net-flow_2").is_ok());
        assert!(validate_id("").is_err());
        assert!(validate_id("a/b").is_err());
        assert!(validate_id("source=a").is_err());
    }
}
