//! Per-operation deadlines for resource handlers

use std::future::Future;
use std::time::Duration;

use crate::provider::{ProviderError, ProviderResult};

/// Deadlines for each lifecycle operation of a resource type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub create: Duration,
    pub read: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create: Duration::from_secs(30 * 60),
            read: Duration::from_secs(5 * 60),
            update: Duration::from_secs(30 * 60),
            delete: Duration::from_secs(30 * 60),
        }
    }
}

impl Timeouts {
    /// Same deadline for create, update and delete; reads stay at five minutes
    pub fn uniform(minutes: u64) -> Self {
        let d = Duration::from_secs(minutes * 60);
        Self {
            create: d,
            read: Duration::from_secs(5 * 60),
            update: d,
            delete: d,
        }
    }

    pub fn with_read(mut self, read: Duration) -> Self {
        self.read = read;
        self
    }
}

/// Run `operation` with a deadline, mapping expiry to a timeout error
pub async fn with_timeout<T, F>(limit: Duration, operation: &str, future: F) -> ProviderResult<T>
where
    F: Future<Output = ProviderResult<T>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::timeout(format!(
            "{} did not complete within {:?}",
            operation, limit
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderErrorKind;

    #[test]
    fn uniform_keeps_short_reads() {
        let t = Timeouts::uniform(60);
        assert_eq!(t.create, Duration::from_secs(3600));
        assert_eq!(t.delete, Duration::from_secs(3600));
        assert_eq!(t.read, Duration::from_secs(300));
    }

    #[tokio::test]
    async fn expired_operation_is_a_timeout_error() {
        let result: ProviderResult<()> = with_timeout(Duration::from_millis(10), "create", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        let err = result.unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Timeout);
        assert!(err.message.starts_with("create did not complete"));
    }

    #[tokio::test]
    async fn finished_operation_passes_through() {
        let result = with_timeout(Duration::from_secs(1), "read", async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }
}
