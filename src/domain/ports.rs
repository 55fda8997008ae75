use crate::domain::model::EntityRecord;
use crate::utils::error::Result;
use async_trait::async_trait;

/// Lookup service for corporate ownership records.
///
/// Implementations own their caching, rate limiting and retries; callers only
/// ever see a record or a terminal error.
#[async_trait]
pub trait RegistryGateway: Send + Sync {
    async fn get_entity(&self, normalized_id: &str) -> Result<EntityRecord>;
}

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    fn root_id(&self) -> &str;
    fn max_depth(&self) -> usize;
    fn threshold_pct(&self) -> f64;
    fn output_path(&self) -> &str;
    fn public_register_url(&self) -> Option<&str>;
}

/// One assessment run: resolve the ownership tree, assess beneficial owners,
/// publish the report.
#[async_trait]
pub trait Pipeline: Send + Sync {
    type Resolved: Send;
    type Assessed: Send;

    async fn resolve(&self) -> Result<Self::Resolved>;
    async fn assess(&self, resolved: Self::Resolved) -> Result<Self::Assessed>;
    async fn publish(&self, assessed: Self::Assessed) -> Result<String>;
}
