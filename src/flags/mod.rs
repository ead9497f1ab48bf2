//! Feature-flag operations.
//!
//! [`FlagService`] is the interface downstream consumers (usage audits, the
//! archiving engine) program against; [`FlagClient`] is the HTTP implementation.

mod client;

use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiResult;

pub use client::{FlagClient, FlagClientBuilder, HEALTH_PROBE_PATH};

/// A feature flag as returned by the management API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlag {
    pub key: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Variation type, e.g. "boolean" or "multivariate".
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub temporary: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub creation_date: Option<i64>,
    #[serde(default)]
    pub maintainer_id: Option<String>,
}

/// One page of flags for a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagList {
    #[serde(default)]
    pub items: Vec<FeatureFlag>,
    #[serde(default)]
    pub total_count: Option<u64>,
}

/// Evaluation activity of a flag in one environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagActivity {
    New,
    Active,
    Inactive,
    Launched,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagStatus {
    pub name: FlagActivity,
    /// ISO 8601 time of the last evaluation, absent if never requested.
    #[serde(default)]
    pub last_requested: Option<String>,
    #[serde(default)]
    pub default: Option<Value>,
}

impl FlagStatus {
    /// No evaluations recorded recently.
    pub fn is_unused(&self) -> bool {
        matches!(self.name, FlagActivity::Inactive | FlagActivity::New)
    }
}

/// Flag operations against the remote management service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FlagService: Send + Sync {
    async fn list_flags(&self, project: &str) -> ApiResult<FlagList>;

    async fn get_flag(&self, project: &str, key: &str) -> ApiResult<FeatureFlag>;

    /// Marks a flag archived and returns its updated representation.
    async fn archive_flag(&self, project: &str, key: &str) -> ApiResult<FeatureFlag>;

    /// Reverses [`archive_flag`](Self::archive_flag).
    async fn restore_flag(&self, project: &str, key: &str) -> ApiResult<FeatureFlag>;

    async fn get_flag_status(
        &self,
        project: &str,
        environment: &str,
        key: &str,
    ) -> ApiResult<FlagStatus>;
}

/// Per-key outcome of [`archive_flags`].
#[derive(Debug, Default)]
pub struct ArchiveSummary {
    pub archived: Vec<FeatureFlag>,
    pub failed: Vec<(String, crate::error::RequestError)>,
}

/// Archives each key in turn. One failure does not stop the rest.
pub async fn archive_flags<S>(service: &S, project: &str, keys: &[String]) -> ArchiveSummary
where
    S: FlagService + ?Sized,
{
    let mut summary = ArchiveSummary::default();

    for key in keys {
        match service.archive_flag(project, key).await {
            Ok(flag) => {
                info!("Archived flag {}/{}", project, key);
                summary.archived.push(flag);
            }
            Err(e) => {
                warn!("Failed to archive flag {}/{}: {}", project, key, e);
                summary.failed.push((key.clone(), e));
            }
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, RequestError};
    use mockall::predicate::eq;

    fn flag(key: &str, archived: bool) -> FeatureFlag {
        FeatureFlag {
            key: key.to_string(),
            name: key.to_string(),
            description: None,
            kind: Some("boolean".into()),
            archived,
            temporary: true,
            tags: vec![],
            creation_date: None,
            maintainer_id: None,
        }
    }

    #[test]
    fn test_flag_deserializes_with_defaults() {
        let flag: FeatureFlag = serde_json::from_str(
            r#"{"key": "new-checkout", "name": "New checkout", "tags": ["web"], "creationDate": 1700000000000, "_links": {}}"#,
        )
        .unwrap();

        assert_eq!(flag.key, "new-checkout");
        assert_eq!(flag.tags, vec!["web"]);
        assert_eq!(flag.creation_date, Some(1_700_000_000_000));
        assert!(!flag.archived);
        assert!(flag.description.is_none());
    }

    #[test]
    fn test_flag_status_activity() {
        let status: FlagStatus =
            serde_json::from_str(r#"{"name": "inactive", "lastRequested": null}"#).unwrap();
        assert_eq!(status.name, FlagActivity::Inactive);
        assert!(status.is_unused());

        let status: FlagStatus = serde_json::from_str(r#"{"name": "retired"}"#).unwrap();
        assert_eq!(status.name, FlagActivity::Unknown);
        assert!(!status.is_unused());
    }

    #[tokio::test]
    async fn test_archive_flags_continues_after_failure() {
        let mut service = MockFlagService::new();
        service
            .expect_archive_flag()
            .with(eq("web"), eq("old-banner"))
            .times(1)
            .returning(|_, key| Ok(flag(key, true)));
        service
            .expect_archive_flag()
            .with(eq("web"), eq("missing"))
            .times(1)
            .returning(|_, _| Err(RequestError::client(Some(404), "Not found")));
        service
            .expect_archive_flag()
            .with(eq("web"), eq("old-footer"))
            .times(1)
            .returning(|_, key| Ok(flag(key, true)));

        let keys = vec![
            "old-banner".to_string(),
            "missing".to_string(),
            "old-footer".to_string(),
        ];
        let summary = archive_flags(&service, "web", &keys).await;

        assert_eq!(summary.archived.len(), 2);
        assert!(summary.archived.iter().all(|f| f.archived));
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, "missing");
        assert_eq!(summary.failed[0].1.kind(), ErrorKind::ClientError);
    }
}
