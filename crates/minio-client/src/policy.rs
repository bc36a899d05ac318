//! Canned bucket access policies
//!
//! MinIO stores bucket policies as S3 policy documents. The controller only
//! ever applies one of two anonymous-access documents, and compares
//! statements (not raw JSON) against what the server reports, since MinIO
//! normalizes documents on write.

use crate::error::MinIOError;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;

const POLICY_VERSION: &str = "2012-10-17";
const EFFECT_ALLOW: &str = "Allow";

/// Anonymous-access policy applied to a bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CannedPolicy {
    /// Anonymous list and download
    ReadOnly,
    /// Anonymous list, download, upload and delete
    ReadWrite,
}

impl CannedPolicy {
    /// Full policy document for `bucket`
    pub fn document(self, bucket: &str) -> BucketAccessPolicy {
        let bucket_resource = format!("arn:aws:s3:::{}", bucket);
        let object_resource = format!("arn:aws:s3:::{}/*", bucket);

        let (bucket_actions, object_actions): (&[&str], &[&str]) = match self {
            CannedPolicy::ReadOnly => (
                &["s3:GetBucketLocation", "s3:ListBucket"],
                &["s3:GetObject"],
            ),
            CannedPolicy::ReadWrite => (
                &[
                    "s3:GetBucketLocation",
                    "s3:ListBucket",
                    "s3:ListBucketMultipartUploads",
                ],
                &[
                    "s3:AbortMultipartUpload",
                    "s3:DeleteObject",
                    "s3:GetObject",
                    "s3:ListMultipartUploadParts",
                    "s3:PutObject",
                ],
            ),
        };

        BucketAccessPolicy {
            version: POLICY_VERSION.to_string(),
            statements: vec![
                Statement::allow_anonymous(bucket_actions, bucket_resource),
                Statement::allow_anonymous(object_actions, object_resource),
            ],
        }
    }

    /// Whether `current` (as returned by the server) already grants exactly
    /// this policy. Missing or unparsable documents never match.
    pub fn is_applied(self, bucket: &str, current: Option<&str>) -> bool {
        let Some(current) = current else {
            return false;
        };
        match BucketAccessPolicy::parse(current) {
            Ok(current) => current.same_statements(&self.document(bucket)),
            Err(_) => false,
        }
    }
}

/// S3 bucket policy document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketAccessPolicy {
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "Statement", default)]
    pub statements: Vec<Statement>,
}

impl BucketAccessPolicy {
    pub fn parse(document: &str) -> Result<Self, MinIOError> {
        Ok(serde_json::from_str(document)?)
    }

    pub fn to_json(&self) -> Result<String, MinIOError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Order-insensitive statement comparison
    pub fn same_statements(&self, other: &BucketAccessPolicy) -> bool {
        let mut ours = self.statements.clone();
        let mut theirs = other.statements.clone();
        ours.sort();
        theirs.sort();
        ours == theirs
    }
}

/// A single policy statement. `Sid` and `Condition` are ignored.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Statement {
    #[serde(rename = "Effect")]
    pub effect: String,
    #[serde(rename = "Principal", deserialize_with = "principal")]
    pub principal: Principal,
    #[serde(rename = "Action", deserialize_with = "one_or_many")]
    pub actions: BTreeSet<String>,
    #[serde(rename = "Resource", deserialize_with = "one_or_many")]
    pub resources: BTreeSet<String>,
}

impl Statement {
    fn allow_anonymous(actions: &[&str], resource: String) -> Self {
        Self {
            effect: EFFECT_ALLOW.to_string(),
            principal: Principal {
                aws: BTreeSet::from(["*".to_string()]),
            },
            actions: actions.iter().map(|a| a.to_string()).collect(),
            resources: BTreeSet::from([resource]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Principal {
    #[serde(rename = "AWS", deserialize_with = "one_or_many")]
    pub aws: BTreeSet<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => BTreeSet::from([value]),
        OneOrMany::Many(values) => values.into_iter().collect(),
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPrincipal {
    Wildcard(String),
    Map(Principal),
}

// "Principal": "*" is shorthand for {"AWS": ["*"]}
fn principal<'de, D>(deserializer: D) -> Result<Principal, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match RawPrincipal::deserialize(deserializer)? {
        RawPrincipal::Wildcard(value) => Principal {
            aws: BTreeSet::from([value]),
        },
        RawPrincipal::Map(principal) => principal,
    })
}
