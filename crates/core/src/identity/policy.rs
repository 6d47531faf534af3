//! Trust and permission policy documents for the delivery role.

use serde::{Deserialize, Serialize};

/// Policy language version.
pub const POLICY_VERSION: &str = "2012-10-17";

/// Service principal allowed to assume the delivery role.
pub const DELIVERY_SERVICE_PRINCIPAL: &str = "firehose.amazonaws.com";

/// Inline policy granting write access to the sink bucket.
pub const BUCKET_POLICY_NAME: &str = "delivery_bucket_access";

/// Inline policy granting read access to the upstream stream.
pub const STREAM_POLICY_NAME: &str = "delivery_stream_read";

const BUCKET_ACTIONS: &[&str] = &[
    "s3:AbortMultipartUpload",
    "s3:GetBucketLocation",
    "s3:GetObject",
    "s3:ListBucket",
    "s3:ListBucketMultipartUploads",
    "s3:PutObject",
];

const STREAM_ACTIONS: &[&str] = &[
    "kinesis:DescribeStream",
    "kinesis:GetShardIterator",
    "kinesis:GetRecords",
];

/// Statement effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

/// Principal of a trust statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Principal {
    pub service: String,
}

/// A single policy statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    pub effect: Effect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<Principal>,
    pub action: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Vec<String>>,
}

/// A policy document as accepted by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub statement: Vec<Statement>,
}

impl PolicyDocument {
    fn new(statement: Statement) -> Self {
        Self {
            version: POLICY_VERSION.to_string(),
            statement: vec![statement],
        }
    }

    /// Serialize to the JSON form sent over the wire.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Trust policy letting only the delivery service assume the role.
pub fn trust_policy() -> PolicyDocument {
    PolicyDocument::new(Statement {
        sid: None,
        effect: Effect::Allow,
        principal: Some(Principal {
            service: DELIVERY_SERVICE_PRINCIPAL.to_string(),
        }),
        action: vec!["sts:AssumeRole".to_string()],
        resource: None,
    })
}

/// Write access to one bucket: the bucket itself and the objects under it.
pub fn bucket_access_policy(bucket_arn: &str) -> PolicyDocument {
    let bucket_arn = bucket_arn.trim_end_matches('/');
    PolicyDocument::new(Statement {
        sid: None,
        effect: Effect::Allow,
        principal: None,
        action: strings(BUCKET_ACTIONS),
        resource: Some(vec![bucket_arn.to_string(), format!("{}/*", bucket_arn)]),
    })
}

/// Read/iterate access to a single upstream stream.
pub fn stream_read_policy(stream_arn: &str) -> PolicyDocument {
    PolicyDocument::new(Statement {
        sid: None,
        effect: Effect::Allow,
        principal: None,
        action: strings(STREAM_ACTIONS),
        resource: Some(vec![stream_arn.to_string()]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trust_policy_json() {
        let json = trust_policy().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["Version"], "2012-10-17");
        let stmt = &value["Statement"][0];
        assert_eq!(stmt["Effect"], "Allow");
        assert_eq!(stmt["Principal"]["Service"], "firehose.amazonaws.com");
        assert_eq!(stmt["Action"][0], "sts:AssumeRole");
        assert!(stmt.get("Resource").is_none());
    }

    #[test]
    fn test_bucket_policy_scoped_to_bucket() {
        let doc = bucket_access_policy("arn:aws:s3:::raw-data");
        let stmt = &doc.statement[0];
        assert_eq!(
            stmt.resource,
            Some(vec![
                "arn:aws:s3:::raw-data".to_string(),
                "arn:aws:s3:::raw-data/*".to_string()
            ])
        );
        assert!(stmt.action.contains(&"s3:PutObject".to_string()));
        assert!(stmt.action.iter().all(|a| a.starts_with("s3:")));
        assert!(!stmt.action.iter().any(|a| a.contains('*')));
    }

    #[test]
    fn test_bucket_policy_trailing_slash() {
        let doc = bucket_access_policy("arn:aws:s3:::raw-data/");
        assert_eq!(
            doc.statement[0].resource.as_ref().unwrap()[1],
            "arn:aws:s3:::raw-data/*"
        );
    }

    #[test]
    fn test_stream_policy_read_only() {
        let doc = stream_read_policy("arn:aws:kinesis:us-east-2:1:stream/in");
        let stmt = &doc.statement[0];
        assert_eq!(
            stmt.resource,
            Some(vec!["arn:aws:kinesis:us-east-2:1:stream/in".to_string()])
        );
        assert_eq!(stmt.action.len(), 3);
        assert!(!stmt.action.iter().any(|a| a.contains("Put")));
    }

    #[test]
    fn test_document_roundtrip() {
        let doc = stream_read_policy("arn:aws:kinesis:us-east-2:1:stream/in");
        let parsed: PolicyDocument = serde_json::from_str(&doc.to_json().unwrap()).unwrap();
        assert_eq!(parsed, doc);
    }
}
