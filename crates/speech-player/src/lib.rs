pub mod buffer;
pub mod config;
pub mod device;
pub mod error;
pub mod process;
pub mod queue;
pub mod resample;
pub mod service;
pub mod sink;
pub mod worker;

pub use config::OutputConfig;
pub use error::{EnqueueError, StartError};
pub use service::SpeechQueue;
pub use sink::{OpenSink, OutputSink};
