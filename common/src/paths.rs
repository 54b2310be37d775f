//! Path composition for local paths and `s3://` object-store URIs.

use crate::{ConfigError, Result};

pub const S3_SCHEME: &str = "s3://";

pub fn is_s3_path(path: &str) -> bool {
    path.starts_with(S3_SCHEME)
}

/// A parsed `s3://bucket/key` location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Location {
    pub bucket: String,
    pub key: String,
}

impl S3Location {
    pub fn parse(path: &str) -> Option<Self> {
        let rest = path.strip_prefix(S3_SCHEME)?;
        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        Some(Self {
            bucket: bucket.to_string(),
            key: key.trim_start_matches('/').to_string(),
        })
    }

    pub fn uri(&self) -> String {
        format!("{S3_SCHEME}{}/{}", self.bucket, self.key)
    }
}

/// Joins path components into a single location.
///
/// Leading and trailing separators on inner components are collapsed, a leading
/// `/` on the first component is kept, and any component may be an `s3://` URI:
/// the result is then rooted in that bucket. Two URIs naming different buckets
/// cannot be combined.
pub fn join_paths<'a, I>(components: I) -> Result<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut bucket: Option<String> = None;
    let mut absolute = false;
    let mut first = true;
    let mut segments: Vec<String> = Vec::new();

    for component in components {
        if component.is_empty() {
            continue;
        }

        let path = match S3Location::parse(component) {
            Some(location) => {
                match &bucket {
                    Some(existing) if *existing != location.bucket => {
                        return Err(ConfigError::BucketMismatch {
                            left: existing.clone(),
                            right: location.bucket,
                        });
                    }
                    _ => bucket = Some(location.bucket),
                }
                location.key
            }
            None => {
                if first && component.starts_with('/') {
                    absolute = true;
                }
                component.to_string()
            }
        };
        first = false;

        let trimmed = path.trim_matches('/');
        if !trimmed.is_empty() {
            segments.push(trimmed.to_string());
        }
    }

    let joined = segments.join("/");
    Ok(match bucket {
        Some(bucket) => format!("{S3_SCHEME}{bucket}/{joined}"),
        None if absolute => format!("/{joined}"),
        None => joined,
    })
}

/// Renders the `{table}` placeholder of a location or query template.
pub fn format_table(template: &str, table: &str) -> String {
    template.replace("{table}", table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_local_components() {
        assert_eq!(join_paths(["/first"]).unwrap(), "/first");
        assert_eq!(join_paths(["/first", "/2nd"]).unwrap(), "/first/2nd");
        assert_eq!(join_paths(["first", "/2nd/"]).unwrap(), "first/2nd");
        assert_eq!(join_paths(["", "/first"]).unwrap(), "/first");
        assert_eq!(join_paths(Vec::<&str>::new()).unwrap(), "");
    }

    #[test]
    fn optional_root_is_skipped() {
        let root: Option<&str> = None;
        let joined = join_paths(root.into_iter().chain(["backups/{table}"])).unwrap();
        assert_eq!(joined, "backups/{table}");
    }

    #[test]
    fn s3_root_with_local_child() {
        let joined = join_paths(["s3://sample-bucket/root-path/", "/public.store/"]).unwrap();
        assert_eq!(joined, "s3://sample-bucket/root-path/public.store");
    }

    #[test]
    fn local_root_with_s3_child() {
        let joined = join_paths(["root-path/", "s3://sample-bucket/public.store/"]).unwrap();
        assert_eq!(joined, "s3://sample-bucket/root-path/public.store");
    }

    #[test]
    fn s3_root_with_s3_child_in_same_bucket() {
        let joined =
            join_paths(["s3://sample-bucket/root-path/", "s3://sample-bucket/public.store/"])
                .unwrap();
        assert_eq!(joined, "s3://sample-bucket/root-path/public.store");
    }

    #[test]
    fn different_buckets_are_rejected() {
        let err = join_paths(["s3://one/root", "s3://two/public.store"]).unwrap_err();
        assert!(matches!(err, ConfigError::BucketMismatch { .. }));
    }

    #[test]
    fn parses_s3_location() {
        let location = S3Location::parse("s3://bucket/a/b.csv").unwrap();
        assert_eq!(location.bucket, "bucket");
        assert_eq!(location.key, "a/b.csv");
        assert_eq!(location.uri(), "s3://bucket/a/b.csv");
        assert!(S3Location::parse("/tmp/a").is_none());
    }
}
