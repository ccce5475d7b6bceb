use std::fmt;
use std::path::Path;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use crate::error::{BoxError, FieldError};
use crate::field::{FieldInput, FieldProvider};

/// Field name used by [`Timestamp`].
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Field name used by [`CallSite`].
pub const CALL_SITE_FIELD: &str = "callsite";

/// Wall-clock time of the write, in nanoseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timestamp;

impl FieldProvider for Timestamp {
    fn provide(&self, _input: &FieldInput<'_>) -> Result<Value, FieldError> {
        Utc::now()
            .timestamp_nanos_opt()
            .map(Value::from)
            .ok_or_else(|| FieldError::failed("current time does not fit in a nanosecond timestamp"))
    }
}

/// `"<file name>:<line>"` of the code that invoked the write.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallSite;

impl FieldProvider for CallSite {
    fn provide(&self, input: &FieldInput<'_>) -> Result<Value, FieldError> {
        let caller = input.caller();
        Ok(Value::String(format_call_site(caller.file(), caller.line())))
    }
}

/// Format a location as `"<base file name>:<line>"`.
pub fn format_call_site(file: &str, line: u32) -> String {
    let base = Path::new(file)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(file);
    format!("{}:{}", base, line)
}

/// Provider backed by a closure over the raw write bytes.
pub struct FieldFn<F> {
    f: F,
}

impl<F> FieldFn<F> {
    pub fn new(f: F) -> Self {
        FieldFn { f }
    }
}

impl<F> fmt::Debug for FieldFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldFn").finish_non_exhaustive()
    }
}

impl<F, T, E> FieldProvider for FieldFn<F>
where
    F: Fn(&[u8]) -> Result<T, E> + Send + Sync,
    T: Serialize,
    E: Into<BoxError>,
{
    fn provide(&self, input: &FieldInput<'_>) -> Result<Value, FieldError> {
        let value = (self.f)(input.data()).map_err(FieldError::failed)?;
        Ok(serde_json::to_value(value)?)
    }
}
