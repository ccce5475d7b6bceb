use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{Layer, Registry};

use crate::writer::StructuredWriter;

/// Settings for the global subscriber installed by [`init_tracing_with_config`].
///
/// **Fields**
/// - `level`: most verbose level that reaches the writer.
/// - `with_level`: prefix each message with its level.
/// - `with_target`: prefix each message with the event target.
///
/// Timestamps and ANSI colors are never emitted by the formatter; add a
/// [`WriterOption::timestamp`](crate::option::WriterOption::timestamp) to the
/// writer instead.
#[derive(Clone, Debug)]
pub struct SubscriberConfig {
    pub level: LevelFilter,
    pub with_level: bool,
    pub with_target: bool,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            with_level: false,
            with_target: false,
        }
    }
}

/// Install a global `tracing` subscriber whose formatted events are written
/// through `writer`, one structured record per event.
///
/// **Parameters**
/// - `writer`: [`StructuredWriter`] over a sink usable as `&W: Write`.
/// - `config`: [`SubscriberConfig`] controlling level and message prefix.
///
/// **Effects**
///
/// Installs a [`Registry`] with a `fmt` layer as the global default
/// subscriber. Each event's source file and line become the call-site seen
/// by a [`WriterOption::call_site`](crate::option::WriterOption::call_site)
/// field.
///
/// **Errors**
///
/// Returns [`TryInitError`] if a global subscriber was already set.
pub fn init_tracing_with_config<W>(
    writer: StructuredWriter<W>,
    config: SubscriberConfig,
) -> Result<(), TryInitError>
where
    StructuredWriter<W>: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .without_time()
        .with_ansi(false)
        .with_level(config.with_level)
        .with_target(config.with_target)
        .with_filter(config.level);

    Registry::default().with(fmt_layer).try_init()
}

/// Same as [`init_tracing_with_config`] with [`SubscriberConfig::default`].
///
/// This is the structured counterpart of pointing a process-wide logger at
/// a new output.
pub fn init_tracing<W>(writer: StructuredWriter<W>) -> Result<(), TryInitError>
where
    StructuredWriter<W>: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    init_tracing_with_config(writer, SubscriberConfig::default())
}
