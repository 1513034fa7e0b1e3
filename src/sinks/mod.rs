//! Terminal sinks: where formatted bytes leave the pipeline.

pub mod console;
pub mod file;
pub mod memory;
pub mod rotating;

pub use console::{ConsoleSink, ConsoleTarget};
pub use file::FileSink;
pub use memory::MemorySink;
pub use rotating::{Compression, RotatingFileSink};
