pub mod admission;
pub mod coordinator;
pub mod executor;
pub mod llm;
pub mod logging;
pub mod monitor;
pub mod notification;
pub mod prober;
pub mod registry;
pub mod storage;
