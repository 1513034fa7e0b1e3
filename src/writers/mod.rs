//! Writer decorators: each wraps an inner writer and adds one behavior.

pub mod r#async;
pub mod batch;
pub mod buffered;
pub mod critical;
pub mod encrypted;
pub mod filtered;
pub mod formatted;

pub use batch::{BatchConfig, BatchWriter};
pub use buffered::BufferedWriter;
pub use critical::{CriticalConfig, CriticalWriter};
pub use encrypted::{Cipher, EncryptedWriter};
pub use filtered::FilteredWriter;
pub use formatted::FormattedWriter;
pub use r#async::{AsyncConfig, AsyncWriter, OverflowPolicy};
