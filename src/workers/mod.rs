pub mod converter;

pub use converter::{ConverterWorker, WorkerState, WorkerSummary};
