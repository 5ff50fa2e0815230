//! Mapping between dataset file paths and archive object keys.
//!
//! A file under `.../source=netflow/year=2024/month=01/day=02/hour=03/part-1`
//! is archived as `<container>/netflow/netflow-2024-01-02-03-part-1`. The
//! key keeps enough of the partition layout to rebuild the canonical path on
//! restore.

use common::store::{basename, join};
use thiserror::Error;

/// Positional fields encoded in front of the original file name.
pub const PARTITION_FIELDS: [&str; 5] = ["source", "year", "month", "day", "hour"];

/// One archived object and the filesystem path it restores to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveManifestEntry {
    pub key: String,
    pub path: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    #[error(
        "Archived name '{name}' does not carry source, year, month, day, hour and a file name"
    )]
    MalformedName { name: String },
}

/// Values of the `name=value` directory components of `path`, outermost first.
pub fn date_fragments(path: &str) -> Vec<&str> {
    let Some((dirs, _)) = path.trim_end_matches('/').rsplit_once('/') else {
        return Vec::new();
    };
    dirs.split('/')
        .filter_map(|component| component.split_once('='))
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
        .collect()
}

/// Object key a file is archived under.
pub fn archive_key(container: &str, path: &str) -> String {
    let container = container.trim_matches('/');
    let name = basename(path);
    let fragments = date_fragments(path);
    match fragments.first() {
        Some(first) => format!("{container}/{first}/{}-{name}", fragments.join("-")),
        None => format!("{container}/{name}"),
    }
}

/// Split an archived key into the five partition values and the original
/// file name.
///
/// The folder a key sits in names its source, which lets sources that
/// contain `-` decode correctly. Keys without that folder fall back to
/// splitting on the first five dashes.
pub fn decode_archive_name(key: &str) -> Result<([&str; 5], &str), ManifestError> {
    let name = basename(key);
    let malformed = || ManifestError::MalformedName {
        name: name.to_string(),
    };

    let folder = key
        .trim_end_matches('/')
        .rsplit_once('/')
        .map(|(dir, _)| basename(dir))
        .filter(|folder| !folder.is_empty());

    let prefixed = folder.and_then(|f| {
        name.strip_prefix(f)
            .and_then(|rest| rest.strip_prefix('-'))
            .map(|rest| (f, rest))
    });
    let (source, rest) = match prefixed {
        Some(split) => split,
        None => name.split_once('-').ok_or_else(malformed)?,
    };

    let mut parts = rest.splitn(5, '-');
    let mut fields = [source, "", "", "", ""];
    for field in fields.iter_mut().skip(1) {
        *field = parts.next().ok_or_else(malformed)?;
    }
    let file_name = parts.next().ok_or_else(malformed)?;

    if fields.iter().any(|f| f.is_empty()) || file_name.is_empty() {
        return Err(malformed());
    }
    Ok((fields, file_name))
}

/// Whether `restore` can rebuild a path from `key`.
pub fn is_restorable(key: &str) -> bool {
    decode_archive_name(key).is_ok()
}

/// Canonical dataset path for an archived key, rooted at `restore_root`.
pub fn restore_path(restore_root: &str, key: &str) -> Result<String, ManifestError> {
    let (fields, file_name) = decode_archive_name(key)?;
    let mut path = restore_root.trim_end_matches('/').to_string();
    for (name, value) in PARTITION_FIELDS.iter().zip(fields) {
        path = join(&path, &format!("{name}={value}"));
    }
    Ok(join(&path, file_name))
}

impl ArchiveManifestEntry {
    pub fn for_key(restore_root: &str, key: impl Into<String>) -> Result<Self, ManifestError> {
        let key = key.into();
        let path = restore_path(restore_root, &key)?;
        Ok(Self { key, path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CANONICAL: &str = "/repo/source=netflow/year=2024/month=01/day=02/hour=03/part-0001.avro";

    #[test]
    fn test_date_fragments() {
        assert_eq!(
            date_fragments(CANONICAL),
            vec!["netflow", "2024", "01", "02", "03"]
        );
        assert!(date_fragments("/tmp/spark/app.log").is_empty());
        assert!(date_fragments("file").is_empty());
    }

    #[test]
    fn test_archive_key() {
        assert_eq!(
            archive_key("archive", CANONICAL),
            "archive/netflow/netflow-2024-01-02-03-part-0001.avro"
        );
        assert_eq!(archive_key("/archive/", "/tmp/plain.log"), "archive/plain.log");
    }

    #[test]
    fn test_restore_path_inverts_archive_key() {
        let key = archive_key("archive", CANONICAL);
        assert_eq!(restore_path("/repo", &key).unwrap(), CANONICAL);
    }

    #[test]
    fn test_dashed_source_round_trips() {
        let path = "/repo/source=net-flow/year=2024/month=01/day=02/hour=03/part-7";
        let key = archive_key("archive", path);
        assert_eq!(key, "archive/net-flow/net-flow-2024-01-02-03-part-7");
        assert_eq!(restore_path("/repo/", &key).unwrap(), path);
    }

    #[test]
    fn test_decode_without_folder() {
        let (fields, name) = decode_archive_name("netflow-2024-01-02-03-x-y").unwrap();
        assert_eq!(fields, ["netflow", "2024", "01", "02", "03"]);
        assert_eq!(name, "x-y");
    }

    #[test]
    fn test_partial_partition_layout_is_not_restorable() {
        let canonical = archive_key("archive", CANONICAL);
        assert!(is_restorable(&canonical));

        let partial = archive_key("archive", "/repo/source=netflow/year=2024/part-1");
        assert_eq!(partial, "archive/netflow/netflow-2024-part-1");
        assert!(!is_restorable(&partial));
        assert!(!is_restorable(&archive_key("archive", "/tmp/app.log")));
    }

    #[test]
    fn test_malformed_names_rejected() {
        for key in [
            "archive/plain.log",
            "archive/netflow/netflow-2024-01-02-03",
            "archive/netflow/netflow-2024-01-02-03-",
            "archive/netflow/netflow-2024--02-03-file",
            "archive/netflow/netflow-2024-01-02",
        ] {
            assert!(
                ArchiveManifestEntry::for_key("/repo", key).is_err(),
                "{key} should be rejected"
            );
        }
    }
}
