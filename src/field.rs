use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::{FieldError, WriteError};

/// Key that always holds the parsed message in a write record.
pub const MESSAGE_KEY: &str = "message";

/// Source file and line of the code that issued a write.
///
/// Usually captured with `#[track_caller]`, or taken from a `tracing`
/// event's metadata when the writer sits behind a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    file: Cow<'static, str>,
    line: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<Cow<'static, str>>, line: u32) -> Self {
        SourceLocation {
            file: file.into(),
            line,
        }
    }

    /// Location of the caller of the enclosing `#[track_caller]` chain.
    #[track_caller]
    pub fn caller() -> Self {
        Location::caller().into()
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn line(&self) -> u32 {
        self.line
    }
}

impl From<&'static Location<'static>> for SourceLocation {
    fn from(location: &'static Location<'static>) -> Self {
        SourceLocation::new(location.file(), location.line())
    }
}

/// Everything a [`FieldProvider`] may look at for a single write.
#[derive(Debug, Clone, Copy)]
pub struct FieldInput<'a> {
    data: &'a [u8],
    caller: &'a SourceLocation,
}

impl<'a> FieldInput<'a> {
    pub fn new(data: &'a [u8], caller: &'a SourceLocation) -> Self {
        FieldInput { data, caller }
    }

    /// Raw bytes handed to the write call, before trimming or parsing.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Source location that invoked the write.
    pub fn caller(&self) -> &'a SourceLocation {
        self.caller
    }
}

/// Computes the value of one named field for every write.
///
/// Implementations are called synchronously on the writing thread and
/// should be quick. They may be invoked from several threads at once when
/// the writer is shared, hence the `Send + Sync` bound.
pub trait FieldProvider: Send + Sync {
    /// Produce the field value for a single write.
    ///
    /// **Returns**
    /// - `Ok(value)` to attach `value` under the registered name.
    /// - `Err(..)` to abort the write. Nothing is forwarded to the sink.
    fn provide(&self, input: &FieldInput<'_>) -> Result<Value, FieldError>;
}

/// Mapping from field name to provider.
///
/// Only mutated while a writer is being configured.
#[derive(Clone, Default)]
pub struct FieldRegistry {
    providers: HashMap<String, Arc<dyn FieldProvider>>,
}

impl FieldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `provider` to `name`, replacing any earlier provider with the
    /// same name.
    ///
    /// **Parameters**
    /// - `name`: key the provider's value is written under.
    /// - `provider`: [`FieldProvider`] evaluated on every write.
    ///
    /// The reserved [`MESSAGE_KEY`] cannot be registered; such providers are
    /// dropped with a warning so the parsed message is never shadowed.
    pub fn register<P>(&mut self, name: impl Into<String>, provider: P)
    where
        P: FieldProvider + 'static,
    {
        self.register_shared(name, Arc::new(provider));
    }

    /// Same as [`register`](Self::register) for an already shared provider.
    pub fn register_shared(&mut self, name: impl Into<String>, provider: Arc<dyn FieldProvider>) {
        let name = name.into();
        if name == MESSAGE_KEY {
            tracing::warn!(field = %name, "ignoring provider registered under reserved field name");
            return;
        }

        if self.providers.insert(name.clone(), provider).is_some() {
            tracing::debug!(field = %name, "replaced existing field provider");
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Registered field names in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    /// Evaluate every provider, stopping at the first failure.
    pub(crate) fn evaluate(&self, input: &FieldInput<'_>) -> Result<Map<String, Value>, WriteError> {
        let mut fields = Map::new();
        for (name, provider) in &self.providers {
            let value = provider
                .provide(input)
                .map_err(|e| WriteError::from_field(name, e))?;
            fields.insert(name.clone(), value);
        }
        Ok(fields)
    }
}

impl fmt::Debug for FieldRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.providers.keys()).finish()
    }
}
