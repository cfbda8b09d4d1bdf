pub mod file;
pub mod traits;

pub use file::FileSink;
pub use traits::{LogSink, SinkError};
