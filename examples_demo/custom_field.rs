use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use structured_log_writer::{BoxError, StructuredWriter};

fn main() -> io::Result<()> {
    let counter = Arc::new(AtomicU64::new(0));
    let seq = Arc::clone(&counter);

    let mut writer = StructuredWriter::builder(io::stdout())
        .timestamp()
        .field_fn("seq", move |_: &[u8]| {
            Ok::<_, BoxError>(seq.fetch_add(1, Ordering::Relaxed))
        })
        .field_fn("bytes", |data: &[u8]| Ok::<_, BoxError>(data.len()))
        .build();

    writer.write_all(b"plain text line\n")?;
    writer.write_all(br#"{"name":"metric-name","value":99.9}"#)?;
    writeln!(io::stderr(), "wrote {} records", counter.load(Ordering::Relaxed))?;
    Ok(())
}
