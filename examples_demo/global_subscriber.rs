use std::io;

use tracing::{error, info};

use structured_log_writer::init::{init_tracing_with_config, SubscriberConfig};
use structured_log_writer::{StructuredWriter, WriterOption};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // `&Stdout` implements `Write`, so the writer can be shared by the
    // subscriber without an extra lock.
    let writer = StructuredWriter::new(
        io::stdout(),
        [WriterOption::timestamp(), WriterOption::call_site()],
    );

    let config = SubscriberConfig {
        with_level: true,
        ..SubscriberConfig::default()
    };
    init_tracing_with_config(writer, config)?;

    info!("Some helpful tracing");
    error!(order_id = 123, "order failed");
    Ok(())
}
