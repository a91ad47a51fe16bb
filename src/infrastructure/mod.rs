pub mod metrics;
pub mod queue;
pub mod storage;
