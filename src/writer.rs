use std::fmt;
use std::io::{self, Write};

use crate::error::WriteError;
use crate::field::{FieldInput, FieldRegistry, SourceLocation};
use crate::option::{StructuredWriterBuilder, WriterOption};
use crate::record::{parse_message, WriteRecord};

/// Wraps every write in a JSON object and forwards it to an underlying sink.
///
/// Each write produces one line of the form
/// `{"message":<parsed or trimmed input>,<field>:<value>,...}\n`. If the
/// input is a JSON object it is embedded as-is, otherwise it is used as
/// trimmed text. Field providers registered at construction time are
/// evaluated against the raw input on every write.
///
/// Through `io::Write`, each call to `write`, `write_all` or `write_fmt`
/// (and so each `write!`/`writeln!`) is one record, and the call-site is the
/// line of that call. A record is handed to the sink in one `write`; a sink
/// that accepts only part of it yields an `ErrorKind::WriteZero` error.
///
/// The writer adds no locking of its own. To share it between threads
/// either use [`shared`](Self::shared) when `&W: Write` (e.g. `Stdout`,
/// `File`), or wrap the whole writer in a `Mutex`.
#[derive(Debug)]
pub struct StructuredWriter<W> {
    sink: W,
    fields: FieldRegistry,
}

impl<W> StructuredWriter<W> {
    /// Create a writer around `sink`, applying `options` in order.
    ///
    /// **Parameters**
    /// - `sink`: destination of the serialized records.
    /// - `options`: [`WriterOption`]s; later ones win on a name clash.
    pub fn new<I>(sink: W, options: I) -> Self
    where
        I: IntoIterator<Item = WriterOption>,
    {
        StructuredWriterBuilder::new(sink).options(options).build()
    }

    /// Start a [`StructuredWriterBuilder`] around `sink`.
    pub fn builder(sink: W) -> StructuredWriterBuilder<W> {
        StructuredWriterBuilder::new(sink)
    }

    pub(crate) fn from_parts(sink: W, fields: FieldRegistry) -> Self {
        StructuredWriter { sink, fields }
    }

    /// Field providers evaluated on every write.
    pub fn fields(&self) -> &FieldRegistry {
        &self.fields
    }

    /// Borrow the underlying sink.
    pub fn get_ref(&self) -> &W {
        &self.sink
    }

    /// Mutably borrow the underlying sink. Bytes written through it bypass
    /// the JSON wrapping.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.sink
    }

    /// Unwrap the writer, returning the underlying sink.
    pub fn into_inner(self) -> W {
        self.sink
    }

    /// Shared handle that writes through `&W`, usable from many threads.
    pub fn shared(&self) -> SharedWriter<'_, W> {
        SharedWriter {
            writer: self,
            caller: None,
        }
    }

    /// Build the serialized line for `data` without writing it anywhere.
    #[track_caller]
    pub fn encode(&self, data: &[u8]) -> Result<Vec<u8>, WriteError> {
        self.encode_at(data, &SourceLocation::caller())
    }

    /// Like [`encode`](Self::encode) with an explicit call-site.
    pub fn encode_at(&self, data: &[u8], caller: &SourceLocation) -> Result<Vec<u8>, WriteError> {
        let message = parse_message(data);
        let fields = self.fields.evaluate(&FieldInput::new(data, caller))?;
        Ok(WriteRecord::new(message, fields).to_line()?)
    }
}

impl<W: Write> StructuredWriter<W> {
    /// Encode `data` and hand it to the sink with exactly one `write` call.
    ///
    /// **Returns**
    /// - whatever byte count the sink's `write` reports, unmodified.
    /// - `Err(..)` if a field provider or serialization failed, in which
    ///   case the sink was not called, or the sink's own error.
    #[track_caller]
    pub fn write_record(&mut self, data: &[u8]) -> Result<usize, WriteError> {
        self.write_record_at(data, &SourceLocation::caller())
    }

    /// Like [`write_record`](Self::write_record) with an explicit call-site.
    pub fn write_record_at(
        &mut self,
        data: &[u8],
        caller: &SourceLocation,
    ) -> Result<usize, WriteError> {
        let line = self.encode_at(data, caller)?;
        Ok(self.sink.write(&line)?)
    }

    fn emit(&mut self, data: &[u8], caller: &SourceLocation) -> io::Result<()> {
        let line = self.encode_at(data, caller)?;
        forward(&mut self.sink, &line)
    }
}

/// Hand a whole record to `sink` in a single `write`.
fn forward<S: Write>(sink: &mut S, line: &[u8]) -> io::Result<()> {
    let n = sink.write(line)?;
    if n < line.len() {
        return Err(io::Error::new(
            io::ErrorKind::WriteZero,
            format!("sink accepted {} of {} record bytes", n, line.len()),
        ));
    }
    Ok(())
}

// `io::Write` requires the returned count to be at most `buf.len()`, so the
// consumed input length is reported instead of the record length.
impl<W: Write> Write for StructuredWriter<W> {
    #[track_caller]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.emit(buf, &SourceLocation::caller())?;
        Ok(buf.len())
    }

    #[track_caller]
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.emit(buf, &SourceLocation::caller())
    }

    #[track_caller]
    fn write_fmt(&mut self, args: fmt::Arguments<'_>) -> io::Result<()> {
        let caller = SourceLocation::caller();
        self.emit(args.to_string().as_bytes(), &caller)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}

/// Writes through a shared [`StructuredWriter`] whose sink supports `&W: Write`.
///
/// Created by [`StructuredWriter::shared`], or per event by the
/// `tracing_subscriber` integration, in which case the event's file and line
/// are used as the call-site.
#[derive(Debug)]
pub struct SharedWriter<'a, W> {
    writer: &'a StructuredWriter<W>,
    caller: Option<SourceLocation>,
}

impl<'a, W> SharedWriter<'a, W>
where
    &'a W: Write,
{
    fn emit(&self, data: &[u8], caller: &SourceLocation) -> io::Result<()> {
        let caller = self.caller.as_ref().unwrap_or(caller);
        let writer: &'a StructuredWriter<W> = self.writer;
        let line = writer.encode_at(data, caller)?;
        let mut sink: &'a W = &writer.sink;
        forward(&mut sink, &line)
    }
}

impl<'a, W> Write for SharedWriter<'a, W>
where
    &'a W: Write,
{
    #[track_caller]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.emit(buf, &SourceLocation::caller())?;
        Ok(buf.len())
    }

    #[track_caller]
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.emit(buf, &SourceLocation::caller())
    }

    #[track_caller]
    fn write_fmt(&mut self, args: fmt::Arguments<'_>) -> io::Result<()> {
        let caller = SourceLocation::caller();
        self.emit(args.to_string().as_bytes(), &caller)
    }

    fn flush(&mut self) -> io::Result<()> {
        let writer: &'a StructuredWriter<W> = self.writer;
        let mut sink: &'a W = &writer.sink;
        sink.flush()
    }
}

#[cfg(feature = "subscriber")]
impl<'a, W: 'a> tracing_subscriber::fmt::MakeWriter<'a> for StructuredWriter<W>
where
    &'a W: Write,
{
    type Writer = SharedWriter<'a, W>;

    fn make_writer(&'a self) -> Self::Writer {
        self.shared()
    }

    fn make_writer_for(&'a self, meta: &tracing::Metadata<'_>) -> Self::Writer {
        let caller = meta
            .file()
            .zip(meta.line())
            .map(|(file, line)| SourceLocation::new(file.to_owned(), line));
        SharedWriter {
            writer: self,
            caller,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    fn parse_line(buf: &[u8]) -> Value {
        assert_eq!(buf.last(), Some(&b'\n'), "record must end with a newline");
        serde_json::from_slice(buf).expect("valid json")
    }

    /// Counts calls to `write`, rejecting all of them while `fail` is set.
    #[derive(Default)]
    struct RecordingSink {
        calls: usize,
        fail: bool,
        buf: Vec<u8>,
    }

    impl Write for RecordingSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.calls += 1;
            if self.fail {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"));
            }
            self.buf.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn plain_text_is_trimmed() {
        let mut w = StructuredWriter::new(Vec::<u8>::new(), []);

        let n = w.write_record(b"some log msg\n").unwrap();

        assert_eq!(n, w.get_ref().len());
        assert_eq!(w.get_ref().as_slice(), b"{\"message\":\"some log msg\"}\n");
    }

    #[test]
    fn json_object_input_is_nested() {
        let mut w = StructuredWriter::new(Vec::<u8>::new(), []);

        w.write_record(br#"{"name":"metric-name","value":99.9}"#).unwrap();

        assert_eq!(
            parse_line(w.get_ref()),
            json!({"message": {"name": "metric-name", "value": 99.9}})
        );
    }

    #[test]
    fn custom_field_sees_original_bytes() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let fail = Arc::new(AtomicBool::new(false));

        let seen_in = Arc::clone(&seen);
        let fail_in = Arc::clone(&fail);
        let mut w = StructuredWriter::new(
            RecordingSink::default(),
            [WriterOption::field_fn("new-field", move |data: &[u8]| {
                *seen_in.lock().unwrap() = data.to_vec();
                if fail_in.load(Ordering::SeqCst) {
                    Err("some-error")
                } else {
                    Ok(99)
                }
            })],
        );

        w.write_record(b"  some log msg\n").unwrap();
        assert_eq!(seen.lock().unwrap().as_slice(), b"  some log msg\n");
        assert_eq!(
            parse_line(&w.get_ref().buf),
            json!({"message": "some log msg", "new-field": 99})
        );

        fail.store(true, Ordering::SeqCst);
        let err = w.write_record(b"some log msg").unwrap_err();
        assert!(matches!(err, WriteError::Provider { ref field, .. } if field == "new-field"));
        assert_eq!(w.get_ref().calls, 1, "failed write must not reach the sink");
    }

    #[test]
    fn serialization_failure_writes_nothing() {
        let mut w = StructuredWriter::new(
            RecordingSink::default(),
            [WriterOption::field_fn("bad", |_: &[u8]| {
                let mut map = std::collections::HashMap::new();
                map.insert((1, 2), "not a string key");
                Ok::<_, BoxError>(map)
            })],
        );

        let err = w.write_record(b"msg").unwrap_err();
        assert!(matches!(err, WriteError::Serialize(_)));
        assert_eq!(w.get_ref().calls, 0);
    }

    #[test]
    fn sink_error_is_returned_verbatim() {
        let mut w = StructuredWriter::new(
            RecordingSink {
                fail: true,
                ..Default::default()
            },
            [],
        );

        match w.write_record(b"msg") {
            Err(WriteError::Sink(e)) => {
                assert_eq!(e.kind(), io::ErrorKind::BrokenPipe);
                assert_eq!(e.to_string(), "sink closed");
            }
            other => panic!("expected sink error, got {:?}", other),
        }

        let err = w.write(b"msg").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(w.get_ref().calls, 2);
    }

    #[test]
    fn one_sink_call_per_write() {
        let mut w = StructuredWriter::new(RecordingSink::default(), [WriterOption::timestamp()]);

        w.write_record(b"first\n").unwrap();
        w.write_record(b"second\n").unwrap();

        assert_eq!(w.get_ref().calls, 2);
        let text = String::from_utf8(w.get_ref().buf.clone()).unwrap();
        let messages: Vec<_> = text
            .lines()
            .map(|line| serde_json::from_str::<Value>(line).unwrap()["message"].clone())
            .collect();
        assert_eq!(messages, vec![json!("first"), json!("second")]);
    }

    #[test]
    fn writer_stays_usable_after_failure() {
        let fail = Arc::new(AtomicBool::new(true));
        let fail_in = Arc::clone(&fail);
        let mut w = StructuredWriter::new(
            Vec::<u8>::new(),
            [WriterOption::field_fn("gate", move |_: &[u8]| {
                if fail_in.load(Ordering::SeqCst) {
                    Err("closed")
                } else {
                    Ok(true)
                }
            })],
        );

        assert!(w.write_record(b"dropped").is_err());
        assert!(w.get_ref().is_empty());

        fail.store(false, Ordering::SeqCst);
        w.write_record(b"kept").unwrap();
        assert_eq!(parse_line(w.get_ref()), json!({"message": "kept", "gate": true}));
    }

    #[test]
    fn last_registration_wins() {
        let mut w = StructuredWriter::new(
            Vec::<u8>::new(),
            [
                WriterOption::field_fn("env", |_: &[u8]| Ok::<_, BoxError>("first")),
                WriterOption::field_fn("env", |_: &[u8]| Ok::<_, BoxError>("second")),
            ],
        );

        w.write_record(b"msg").unwrap();
        assert_eq!(parse_line(w.get_ref())["env"], "second");
    }

    #[test]
    fn message_cannot_be_shadowed() {
        let mut w = StructuredWriter::new(
            Vec::<u8>::new(),
            [WriterOption::field_fn("message", |_: &[u8]| Ok::<_, BoxError>("shadow"))],
        );

        w.write_record(b"real message\n").unwrap();
        assert_eq!(parse_line(w.get_ref()), json!({"message": "real message"}));
    }

    #[test]
    fn call_site_points_at_write_record() {
        let mut w = StructuredWriter::new(Vec::<u8>::new(), [WriterOption::call_site()]);

        let expected = format!("writer.rs:{}", line!() + 1);
        w.write_record(b"some log msg").unwrap();

        assert_eq!(parse_line(w.get_ref())["callsite"], Value::String(expected));
    }

    #[test]
    fn call_site_points_at_io_write_calls() {
        let mut w = StructuredWriter::new(Vec::<u8>::new(), [WriterOption::call_site()]);

        let expected = format!("writer.rs:{}", line!() + 1);
        let n = w.write(b"some log msg\n").unwrap();
        assert_eq!(n, b"some log msg\n".len());
        assert_eq!(parse_line(w.get_ref())["callsite"], Value::String(expected));

        w.get_mut().clear();
        let expected = format!("writer.rs:{}", line!() + 1);
        w.write_all(b"x\n").unwrap();
        assert_eq!(parse_line(w.get_ref()), json!({"message": "x", "callsite": expected}));

        w.get_mut().clear();
        let expected = format!("writer.rs:{}", line!() + 1);
        writeln!(w, "hi {}", 42).unwrap();
        assert_eq!(parse_line(w.get_ref()), json!({"message": "hi 42", "callsite": expected}));
    }

    #[test]
    fn explicit_call_site_is_used() {
        let mut w = StructuredWriter::new(Vec::<u8>::new(), [WriterOption::call_site()]);

        let here = SourceLocation::new("src/jobs/retry.rs", 88);
        w.write_record_at(b"msg", &here).unwrap();

        assert_eq!(parse_line(w.get_ref())["callsite"], "retry.rs:88");
    }

    #[test]
    fn short_sink_write_is_an_error_after_one_call() {
        /// Accepts at most five bytes per call.
        #[derive(Default)]
        struct Trickle {
            calls: usize,
            buf: Vec<u8>,
        }

        impl Write for Trickle {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.calls += 1;
                let n = buf.len().min(5);
                self.buf.extend_from_slice(&buf[..n]);
                Ok(n)
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut w = StructuredWriter::new(Trickle::default(), []);

        let err = w.write(b"hello\n").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
        assert_eq!(w.get_ref().calls, 1);

        assert_eq!(w.write_record(b"hello\n").unwrap(), 5);
        assert_eq!(w.get_ref().calls, 2);
    }

    #[test]
    fn formatted_write_is_one_record() {
        let mut w = StructuredWriter::new(RecordingSink::default(), []);

        write!(w, "user {} logged in from {}", 42, "10.0.0.1").unwrap();

        assert_eq!(w.get_ref().calls, 1);
        assert_eq!(
            parse_line(&w.get_ref().buf),
            json!({"message": "user 42 logged in from 10.0.0.1"})
        );
    }

    #[test]
    fn shared_writer_writes_from_many_threads() {
        #[derive(Default)]
        struct SharedSink(Mutex<Vec<u8>>);

        impl Write for &SharedSink {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let w = StructuredWriter::new(
            SharedSink::default(),
            [WriterOption::timestamp(), WriterOption::call_site()],
        );

        let expected_site = format!("writer.rs:{}", line!() + 5);
        std::thread::scope(|scope| {
            for i in 0..4 {
                let mut out = w.shared();
                scope.spawn(move || {
                    writeln!(out, "worker {}", i).unwrap();
                });
            }
        });

        let buf = w.into_inner().0.into_inner().unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut messages: Vec<String> = text
            .lines()
            .map(|line| {
                let value: Value = serde_json::from_str(line).unwrap();
                assert!(value["timestamp"].is_i64());
                assert_eq!(value["callsite"], Value::String(expected_site.clone()));
                value["message"].as_str().unwrap().to_string()
            })
            .collect();
        messages.sort();
        assert_eq!(messages, vec!["worker 0", "worker 1", "worker 2", "worker 3"]);
    }

    #[test]
    fn encode_does_not_touch_sink() {
        let w = StructuredWriter::new(RecordingSink::default(), []);
        let line = w.encode(b"hello\n").unwrap();
        assert_eq!(line, b"{\"message\":\"hello\"}\n");
        assert_eq!(w.get_ref().calls, 0);
    }
}
