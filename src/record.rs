use serde_json::Value;

use crate::error::ParseError;

pub const DEFAULT_FIELD: &str = "artist";

/// Extracts the identifier field from one JSON line.
#[derive(Debug, Clone)]
pub struct RecordParser {
    field: String,
}

impl Default for RecordParser {
    fn default() -> Self {
        RecordParser::new(DEFAULT_FIELD)
    }
}

impl RecordParser {
    pub fn new(field: impl Into<String>) -> Self {
        RecordParser {
            field: field.into(),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// The returned identifier is taken verbatim, no normalization.
    pub fn parse(&self, line: &str) -> Result<String, ParseError> {
        let record: Value = serde_json::from_str(line)?;
        let object = record.as_object().ok_or(ParseError::NotAnObject)?;
        match object.get(&self.field) {
            Some(Value::String(identifier)) => Ok(identifier.clone()),
            Some(_) => Err(ParseError::WrongType(self.field.clone())),
            None => Err(ParseError::MissingField(self.field.clone())),
        }
    }
}
