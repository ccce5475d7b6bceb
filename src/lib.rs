//! `io::Write` adapter that turns plain log lines into JSON records.
//!
//! Every write becomes one `{"message": ..., <field>: ...}` line forwarded
//! to an underlying sink. Extra fields are computed per write by
//! [`FieldProvider`]s registered through [`WriterOption`]s.
//!
//! ```
//! use std::io::Write;
//! use structured_log_writer::{StructuredWriter, WriterOption};
//!
//! let mut writer = StructuredWriter::new(Vec::<u8>::new(), [WriterOption::timestamp()]);
//! writer.write_all(b"some log msg\n").unwrap();
//!
//! let line: serde_json::Value = serde_json::from_slice(writer.get_ref()).unwrap();
//! assert_eq!(line["message"], "some log msg");
//! assert!(line["timestamp"].is_i64());
//! ```

pub mod error;
pub mod field;
pub mod option;
pub mod providers;
pub mod record;
pub mod writer;

#[cfg(feature = "subscriber")]
pub mod init;

pub use error::{BoxError, FieldError, WriteError};
pub use field::{FieldInput, FieldProvider, FieldRegistry, SourceLocation, MESSAGE_KEY};
pub use option::{StructuredWriterBuilder, WriterOption};
pub use providers::{CallSite, FieldFn, Timestamp, CALL_SITE_FIELD, TIMESTAMP_FIELD};
pub use writer::{SharedWriter, StructuredWriter};
