//! Domain types and trait seams for the orchestration core.

mod alert;
mod batch;
mod call;
mod error;
mod health;
mod notification;
mod provider;
mod storage;

pub use alert::{Alert, AlertId, AlertLevel};
pub use batch::{BatchId, BatchReport, BatchStatus, SynchronizationStatus};
pub use call::{CallFailure, CallOutcome, CallSpec, CallSuccess, PromptTemplate, QualityFlag};
pub use error::SwarmError;
pub use health::{HealthSnapshot, ProviderHealth};
pub use notification::{Notifier, NullNotifier};
pub use provider::{LlmProvider, ProviderKey, ProviderSet};
pub use storage::{BatchQualityRecord, BatchQualityStats, CallRecord, ResultStore};

#[cfg(test)]
pub use notification::MockNotifier;
#[cfg(test)]
pub use provider::mock;
