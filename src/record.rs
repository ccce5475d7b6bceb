use serde::Serialize;
use serde_json::{Map, Value};

/// Transient object built for a single write.
///
/// `message` is always serialized first, followed by the provider fields.
#[derive(Debug, Clone, Serialize)]
pub struct WriteRecord {
    pub message: Value,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl WriteRecord {
    pub fn new(message: Value, fields: Map<String, Value>) -> Self {
        WriteRecord { message, fields }
    }

    /// Serialize as a single JSON line terminated by `\n`.
    pub fn to_line(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }
}

/// Turn raw write bytes into the `message` value.
///
/// A JSON object is kept as-is. Anything else is treated as text and
/// trimmed of surrounding whitespace.
pub fn parse_message(data: &[u8]) -> Value {
    match serde_json::from_slice::<Map<String, Value>>(data) {
        Ok(object) => Value::Object(object),
        // Not a JSON object, fall back to plain text.
        Err(_) => Value::String(String::from_utf8_lossy(data).trim().to_string()),
    }
}
