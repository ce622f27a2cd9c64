//! SDK configuration loading.

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_sqs::config::Credentials;

/// Region used when none is configured.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Connection settings shared by the SNS and SQS clients.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AwsSettings {
    /// AWS region
    pub region: String,
    /// Custom endpoint URL (LocalStack, VPC endpoint)
    pub endpoint: Option<String>,
    /// Use the static `test`/`test` credentials LocalStack accepts
    pub use_localstack: bool,
}

impl AwsSettings {
    /// Settings for `region`, default endpoint and credential chain.
    #[must_use]
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            endpoint: None,
            use_localstack: false,
        }
    }

    /// Send every request to `endpoint`.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Toggle LocalStack credentials.
    #[must_use]
    pub const fn with_localstack(mut self, use_localstack: bool) -> Self {
        self.use_localstack = use_localstack;
        self
    }
}

impl Default for AwsSettings {
    fn default() -> Self {
        Self::new(DEFAULT_REGION)
    }
}

/// Load an [`SdkConfig`] from `settings`.
///
/// Without LocalStack, credentials come from the SDK's default provider chain
/// (environment, profile, instance metadata).
pub async fn load_sdk_config(settings: &AwsSettings) -> SdkConfig {
    let mut loader =
        aws_config::defaults(BehaviorVersion::latest()).region(Region::new(settings.region.clone()));

    if let Some(endpoint) = &settings.endpoint {
        loader = loader.endpoint_url(endpoint);
    }

    if settings.use_localstack {
        loader = loader.credentials_provider(Credentials::new("test", "test", None, None, "localstack"));
    }

    let config = loader.load().await;
    tracing::debug!(
        region = %settings.region,
        endpoint = settings.endpoint.as_deref().unwrap_or("default"),
        use_localstack = settings.use_localstack,
        "Loaded AWS SDK configuration"
    );
    config
}
