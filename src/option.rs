use std::fmt;

use serde::Serialize;

use crate::error::BoxError;
use crate::field::{FieldProvider, FieldRegistry};
use crate::providers::{CallSite, FieldFn, Timestamp, CALL_SITE_FIELD, TIMESTAMP_FIELD};
use crate::writer::StructuredWriter;

/// One unit of construction-time configuration for a [`StructuredWriter`].
///
/// Options are applied in the order they are supplied, so a later option
/// registering the same field name replaces an earlier one.
pub struct WriterOption {
    apply: Box<dyn FnOnce(&mut FieldRegistry) + Send>,
}

impl WriterOption {
    /// Arbitrary setup step run against the registry.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(&mut FieldRegistry) + Send + 'static,
    {
        WriterOption { apply: Box::new(f) }
    }

    /// Register `provider` under `name`.
    pub fn field<P>(name: impl Into<String>, provider: P) -> Self
    where
        P: FieldProvider + 'static,
    {
        let name = name.into();
        Self::new(move |registry| registry.register(name, provider))
    }

    /// Register a closure over the raw write bytes under `name`.
    ///
    /// If the closure returns an error the write fails with that error and
    /// nothing is written.
    pub fn field_fn<F, T, E>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&[u8]) -> Result<T, E> + Send + Sync + 'static,
        T: Serialize + 'static,
        E: Into<BoxError> + 'static,
    {
        Self::field(name, FieldFn::new(f))
    }

    /// Add a `"timestamp"` field in nanoseconds since the Unix epoch.
    pub fn timestamp() -> Self {
        Self::field(TIMESTAMP_FIELD, Timestamp)
    }

    /// Add a `"callsite"` field holding `"<file>:<line>"` of the write call.
    pub fn call_site() -> Self {
        Self::field(CALL_SITE_FIELD, CallSite)
    }

    pub(crate) fn apply(self, registry: &mut FieldRegistry) {
        (self.apply)(registry)
    }
}

impl fmt::Debug for WriterOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriterOption").finish_non_exhaustive()
    }
}

/// Builder for [`StructuredWriter`]. The registry is frozen by [`build`](Self::build).
#[derive(Debug)]
pub struct StructuredWriterBuilder<W> {
    sink: W,
    fields: FieldRegistry,
}

impl<W> StructuredWriterBuilder<W> {
    /// Start with an empty field set around `sink`.
    pub fn new(sink: W) -> Self {
        StructuredWriterBuilder {
            sink,
            fields: FieldRegistry::new(),
        }
    }

    /// Apply a single [`WriterOption`] immediately.
    pub fn option(mut self, option: WriterOption) -> Self {
        option.apply(&mut self.fields);
        self
    }

    /// Apply `options` in iteration order.
    pub fn options<I>(self, options: I) -> Self
    where
        I: IntoIterator<Item = WriterOption>,
    {
        options.into_iter().fold(self, Self::option)
    }

    /// Register `provider` under `name`. See [`FieldRegistry::register`].
    pub fn field<P>(mut self, name: impl Into<String>, provider: P) -> Self
    where
        P: FieldProvider + 'static,
    {
        self.fields.register(name, provider);
        self
    }

    /// Register a closure over the raw write bytes under `name`.
    pub fn field_fn<F, T, E>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&[u8]) -> Result<T, E> + Send + Sync + 'static,
        T: Serialize + 'static,
        E: Into<BoxError> + 'static,
    {
        self.option(WriterOption::field_fn(name, f))
    }

    /// See [`WriterOption::timestamp`].
    pub fn timestamp(self) -> Self {
        self.option(WriterOption::timestamp())
    }

    /// See [`WriterOption::call_site`].
    pub fn call_site(self) -> Self {
        self.option(WriterOption::call_site())
    }

    /// Freeze the registry and return the writer.
    pub fn build(self) -> StructuredWriter<W> {
        StructuredWriter::from_parts(self.sink, self.fields)
    }
}
