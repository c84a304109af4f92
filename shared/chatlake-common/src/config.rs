//! Configuration for ChatLake sinks
//!
//! Identifies the remote dataset, how to authenticate against it, and the
//! two behavioural switches of the sink: strict error propagation and
//! passive schema handling.

use anyhow::{Context, Result};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use url::Url;

/// Public BigQuery REST endpoint
pub const DEFAULT_API_ENDPOINT: &str = "https://bigquery.googleapis.com";

/// GCE/GKE metadata server token endpoint
pub const DEFAULT_METADATA_ENDPOINT: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// How requests to the remote store are authenticated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "token", rename_all = "snake_case")]
pub enum Credentials {
    /// Pre-issued OAuth2 access token
    AccessToken(String),
    /// Fetch and refresh tokens from the instance metadata server
    MetadataServer,
    /// No authorization header (local emulators)
    Anonymous,
}

impl Credentials {
    fn parse(kind: Option<&str>, token: Option<String>) -> Result<Self> {
        match (kind.map(str::to_ascii_lowercase).as_deref(), token) {
            (Some("anonymous"), _) => Ok(Credentials::Anonymous),
            (Some("metadata") | Some("metadata_server"), _) => Ok(Credentials::MetadataServer),
            (Some("token") | Some("access_token"), None) => {
                anyhow::bail!("access token credentials selected but no token was provided")
            }
            (Some("token") | Some("access_token") | None, Some(token)) => {
                Ok(Credentials::AccessToken(token))
            }
            (None, None) => Ok(Credentials::MetadataServer),
            (Some(other), _) => anyhow::bail!("Unknown credentials type: {}", other),
        }
    }
}

/// Whether failures that leave the dataset usable are returned to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Log and continue
    #[default]
    Swallow,
    /// Return the error to the caller
    Propagate,
}

impl ErrorPolicy {
    pub fn from_throw_exceptions(throw_exceptions: bool) -> Self {
        if throw_exceptions {
            ErrorPolicy::Propagate
        } else {
            ErrorPolicy::Swallow
        }
    }

    pub fn is_strict(self) -> bool {
        self == ErrorPolicy::Propagate
    }

    /// Apply the policy to an already-logged error
    pub fn settle<E>(self, error: E) -> std::result::Result<(), E> {
        match self {
            ErrorPolicy::Propagate => Err(error),
            ErrorPolicy::Swallow => Ok(()),
        }
    }
}

/// Whether the sink reconciles the remote schema before writing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SchemaMode {
    /// Reconcile the declared topology once per process before the first write
    #[default]
    Managed,
    /// Trust the remote schema as-is
    Passive,
}

impl SchemaMode {
    pub fn from_passive_schema(passive_schema: bool) -> Self {
        if passive_schema {
            SchemaMode::Passive
        } else {
            SchemaMode::Managed
        }
    }
}

/// Behavioural options of a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SinkOptions {
    pub error_policy: ErrorPolicy,
    pub schema_mode: SchemaMode,
}

impl SinkOptions {
    pub fn strict() -> Self {
        Self {
            error_policy: ErrorPolicy::Propagate,
            schema_mode: SchemaMode::Managed,
        }
    }

    pub fn with_error_policy(mut self, error_policy: ErrorPolicy) -> Self {
        self.error_policy = error_policy;
        self
    }

    pub fn with_schema_mode(mut self, schema_mode: SchemaMode) -> Self {
        self.schema_mode = schema_mode;
        self
    }
}

/// ChatLake sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatLakeConfig {
    /// Project owning the dataset
    pub project_id: String,
    /// Dataset holding the analytics tables
    pub dataset: String,
    /// Request authentication
    pub credentials: Credentials,
    /// REST endpoint root (overridable for emulators)
    pub api_endpoint: String,
    /// Token endpoint used with [`Credentials::MetadataServer`]
    pub metadata_endpoint: String,
    /// Per-request timeout
    pub request_timeout_secs: u64,
    /// Propagate schema-update and insert failures instead of logging them
    pub throw_exceptions: bool,
    /// Skip topology reconciliation entirely
    pub passive_schema: bool,
    /// Offset used to render local dates of rows, in minutes east of UTC
    pub time_zone_offset_minutes: i32,
    /// Sink instance ID
    pub instance_id: String,
}

impl ChatLakeConfig {
    /// Minimal configuration for a dataset, all other settings at defaults
    pub fn new(project_id: impl Into<String>, dataset: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            dataset: dataset.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a properties map
    ///
    /// Properties:
    /// - chatlake_project_id, chatlake_dataset (required)
    /// - chatlake_credentials (token | metadata | anonymous), chatlake_access_token
    /// - chatlake_api_endpoint, chatlake_metadata_endpoint
    /// - chatlake_request_timeout_secs
    /// - chatlake_throw_exceptions, chatlake_passive_schema
    /// - chatlake_time_zone_offset_minutes
    pub fn from_properties(props: &HashMap<String, String>) -> Result<Self> {
        Self::from_lookup(|key| props.get(&key.to_ascii_lowercase()).cloned())
    }

    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - CHATLAKE_PROJECT_ID, CHATLAKE_DATASET (required)
    /// - CHATLAKE_CREDENTIALS (token | metadata | anonymous), CHATLAKE_ACCESS_TOKEN
    /// - CHATLAKE_API_ENDPOINT, CHATLAKE_METADATA_ENDPOINT
    /// - CHATLAKE_REQUEST_TIMEOUT_SECS
    /// - CHATLAKE_THROW_EXCEPTIONS, CHATLAKE_PASSIVE_SCHEMA
    /// - CHATLAKE_TIME_ZONE_OFFSET_MINUTES
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let project_id = lookup("CHATLAKE_PROJECT_ID")
            .context("CHATLAKE_PROJECT_ID is required")?;
        let dataset = lookup("CHATLAKE_DATASET").context("CHATLAKE_DATASET is required")?;

        let credentials = Credentials::parse(
            lookup("CHATLAKE_CREDENTIALS").as_deref(),
            lookup("CHATLAKE_ACCESS_TOKEN"),
        )?;

        let api_endpoint = lookup("CHATLAKE_API_ENDPOINT").unwrap_or(defaults.api_endpoint);
        let metadata_endpoint =
            lookup("CHATLAKE_METADATA_ENDPOINT").unwrap_or(defaults.metadata_endpoint);
        let request_timeout_secs = lookup("CHATLAKE_REQUEST_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.request_timeout_secs);
        let throw_exceptions = lookup("CHATLAKE_THROW_EXCEPTIONS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(false);
        let passive_schema = lookup("CHATLAKE_PASSIVE_SCHEMA")
            .and_then(|v| v.parse().ok())
            .unwrap_or(false);
        let time_zone_offset_minutes = lookup("CHATLAKE_TIME_ZONE_OFFSET_MINUTES")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let instance_id = lookup("CHATLAKE_INSTANCE_ID").unwrap_or(defaults.instance_id);

        let config = Self {
            project_id,
            dataset,
            credentials,
            api_endpoint,
            metadata_endpoint,
            request_timeout_secs,
            throw_exceptions,
            passive_schema,
            time_zone_offset_minutes,
            instance_id,
        };
        config.validate()?;
        Ok(config)
    }

    /// Sink options derived from the switches
    pub fn sink_options(&self) -> SinkOptions {
        SinkOptions {
            error_policy: ErrorPolicy::from_throw_exceptions(self.throw_exceptions),
            schema_mode: SchemaMode::from_passive_schema(self.passive_schema),
        }
    }

    /// Fixed offset used to render local dates
    pub fn time_zone(&self) -> Result<FixedOffset> {
        self.time_zone_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .with_context(|| {
                format!(
                    "Invalid time zone offset: {} minutes",
                    self.time_zone_offset_minutes
                )
            })
    }

    /// Base URL of the dataset's tables collection
    pub fn tables_url(&self) -> String {
        format!(
            "{}/bigquery/v2/projects/{}/datasets/{}/tables",
            self.api_endpoint.trim_end_matches('/'),
            self.project_id,
            self.dataset
        )
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.api_endpoint)
            .with_context(|| format!("Invalid API endpoint: {}", self.api_endpoint))?;

        if self.credentials == Credentials::MetadataServer {
            Url::parse(&self.metadata_endpoint).with_context(|| {
                format!("Invalid metadata endpoint: {}", self.metadata_endpoint)
            })?;
        }

        if self.project_id.is_empty() {
            return Err(anyhow::anyhow!("Project ID cannot be empty"));
        }
        if self.dataset.is_empty() {
            return Err(anyhow::anyhow!("Dataset cannot be empty"));
        }
        if self.request_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Request timeout must be greater than 0"));
        }
        if let Credentials::AccessToken(token) = &self.credentials {
            if token.is_empty() {
                return Err(anyhow::anyhow!("Access token cannot be empty"));
            }
        }
        self.time_zone()?;

        Ok(())
    }
}

impl Default for ChatLakeConfig {
    fn default() -> Self {
        Self {
            project_id: "chatlake-local".to_string(),
            dataset: "analytics".to_string(),
            credentials: Credentials::MetadataServer,
            api_endpoint: DEFAULT_API_ENDPOINT.to_string(),
            metadata_endpoint: DEFAULT_METADATA_ENDPOINT.to_string(),
            request_timeout_secs: 30,
            throw_exceptions: false,
            passive_schema: false,
            time_zone_offset_minutes: 0,
            instance_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_config_validation() {
        let config = ChatLakeConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_timeout() {
        let mut config = ChatLakeConfig::default();
        config.request_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_endpoint() {
        let mut config = ChatLakeConfig::default();
        config.api_endpoint = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tables_url() {
        let mut config = ChatLakeConfig::new("proj", "bots");
        config.api_endpoint = "http://localhost:9050/".to_string();
        assert_eq!(
            config.tables_url(),
            "http://localhost:9050/bigquery/v2/projects/proj/datasets/bots/tables"
        );
    }

    #[test]
    fn test_from_properties() {
        let config = ChatLakeConfig::from_properties(&props(&[
            ("chatlake_project_id", "proj"),
            ("chatlake_dataset", "bots"),
            ("chatlake_access_token", "ya29.token"),
            ("chatlake_throw_exceptions", "true"),
            ("chatlake_time_zone_offset_minutes", "120"),
        ]))
        .unwrap();

        assert_eq!(config.project_id, "proj");
        assert_eq!(config.dataset, "bots");
        assert_eq!(
            config.credentials,
            Credentials::AccessToken("ya29.token".to_string())
        );
        assert!(!config.passive_schema);
        assert_eq!(config.sink_options(), SinkOptions::strict());
        assert_eq!(config.time_zone().unwrap().local_minus_utc(), 7200);
    }

    #[test]
    fn test_out_of_range_time_zone_offset_rejected() {
        let result = ChatLakeConfig::from_properties(&props(&[
            ("chatlake_project_id", "proj"),
            ("chatlake_dataset", "bots"),
            ("chatlake_credentials", "anonymous"),
            ("chatlake_time_zone_offset_minutes", "40000000"),
        ]));
        assert!(result.is_err());

        let mut config = ChatLakeConfig::new("proj", "bots");
        config.time_zone_offset_minutes = i32::MIN;
        assert!(config.time_zone().is_err());
        config.time_zone_offset_minutes = 24 * 60;
        assert!(config.time_zone().is_err());
    }

    #[test]
    fn test_from_properties_requires_dataset() {
        let result = ChatLakeConfig::from_properties(&props(&[("chatlake_project_id", "proj")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_credentials_parsing() {
        assert_eq!(
            Credentials::parse(None, None).unwrap(),
            Credentials::MetadataServer
        );
        assert_eq!(
            Credentials::parse(Some("anonymous"), Some("ignored".to_string())).unwrap(),
            Credentials::Anonymous
        );
        assert!(Credentials::parse(Some("token"), None).is_err());
        assert!(Credentials::parse(Some("kerberos"), None).is_err());
    }

    #[test]
    fn test_error_policy_settle() {
        assert!(ErrorPolicy::Swallow.settle("boom").is_ok());
        assert_eq!(ErrorPolicy::Propagate.settle("boom"), Err("boom"));
        assert_eq!(ErrorPolicy::default(), ErrorPolicy::Swallow);
        assert_eq!(SchemaMode::default(), SchemaMode::Managed);
    }

    #[test]
    fn test_passive_schema_option() {
        let mut config = ChatLakeConfig::default();
        config.passive_schema = true;
        assert_eq!(config.sink_options().schema_mode, SchemaMode::Passive);
        assert_eq!(config.sink_options().error_policy, ErrorPolicy::Swallow);
    }
}
