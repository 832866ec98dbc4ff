use async_trait::async_trait;

/// Fire-and-forget delivery of monitoring payloads to external channels.
///
/// Implementations log delivery failures; they are never fatal to the core.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn push(&self, payload: serde_json::Value);
}

/// Notifier that drops every payload. Used when no endpoints are configured.
#[derive(Debug, Default)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn push(&self, _payload: serde_json::Value) {}
}
