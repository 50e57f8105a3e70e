use async_trait::async_trait;

/// Key/value cache backing the runtime memory and application code.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    /// `ttl_secs == 0` stores without expiry.
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> anyhow::Result<()>;
    async fn delete(&self, key: &str) -> anyhow::Result<bool>;
    async fn has(&self, key: &str) -> anyhow::Result<bool>;
    async fn ping(&self) -> anyhow::Result<()>;
}
