//! Field registry: the fixed set of fields this plugin can extract, plus the
//! host-style `name[arg]` request notation used to address them.

use crate::error::{JevtError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Identifier of an extractable field, as exchanged with the host.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldId {
    /// `jevt.value`: a string leaf addressed by a `/`-separated path.
    Value = 0,
    /// `jevt.json`: the whole event, pretty-printed.
    Json = 1,
}

impl FieldId {
    pub fn from_u32(id: u32) -> Option<Self> {
        match id {
            0 => Some(FieldId::Value),
            1 => Some(FieldId::Json),
            _ => None,
        }
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn descriptor(self) -> &'static FieldDescriptor {
        &FIELDS[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.descriptor().name
    }
}

impl TryFrom<u32> for FieldId {
    type Error = JevtError;

    fn try_from(id: u32) -> Result<Self> {
        FieldId::from_u32(id).ok_or(JevtError::UnknownField(id))
    }
}

/// Static description of one field, serialized for host discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldDescriptor {
    #[serde(rename = "type")]
    pub field_type: &'static str,
    pub id: u32,
    pub name: &'static str,
    pub desc: &'static str,
    /// Argument notation, `None` for fields that take no argument.
    #[serde(skip)]
    pub arg_syntax: Option<&'static str>,
}

static FIELDS: [FieldDescriptor; 2] = [
    FieldDescriptor {
        field_type: "string",
        id: FieldId::Value as u32,
        name: "jevt.value",
        desc: "allows to extract a value from a JSON-encoded input. Syntax is jevt.value[/x/y/z], where x,y and z are levels in the JSON hierarchy.",
        arg_syntax: Some("[/x/y/z]"),
    },
    FieldDescriptor {
        field_type: "string",
        id: FieldId::Json as u32,
        name: "jevt.json",
        desc: "the full json message as a text string.",
        arg_syntax: None,
    },
];

/// All extractable fields, in registration order.
pub fn list_fields() -> &'static [FieldDescriptor] {
    &FIELDS
}

/// Look up a field by its external name (e.g. `jevt.value`).
pub fn find_field(name: &str) -> Option<&'static FieldDescriptor> {
    FIELDS.iter().find(|f| f.name == name)
}

/// The field schema as a JSON array, in the shape plugin hosts expect.
pub fn fields_json() -> Result<String> {
    Ok(serde_json::to_string(&FIELDS)?)
}

static FIELD_SPEC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z0-9_.]+)(?:\[(.*)\])?$").expect("field request regex is valid")
});

/// A field plus its optional argument, e.g. `jevt.value[/user/name]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRequest {
    pub field: FieldId,
    pub arg: Option<String>,
}

impl FieldRequest {
    pub fn new(field: FieldId, arg: Option<String>) -> Self {
        FieldRequest { field, arg }
    }

    pub fn arg(&self) -> Option<&str> {
        self.arg.as_deref()
    }
}

impl FromStr for FieldRequest {
    type Err = JevtError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |message: &str| JevtError::InvalidFieldSpec {
            spec: s.to_string(),
            message: message.to_string(),
        };

        let caps = FIELD_SPEC_RE
            .captures(s.trim())
            .ok_or_else(|| invalid("expected <name> or <name>[<arg>]"))?;

        let name = &caps[1];
        let descriptor = find_field(name).ok_or_else(|| invalid("no such field"))?;
        let field = FieldId::try_from(descriptor.id)?;

        let arg = caps.get(2).map(|m| m.as_str().to_string());
        Ok(FieldRequest { field, arg })
    }
}

impl fmt::Display for FieldRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.arg {
            Some(arg) => write!(f, "{}[{}]", self.field.name(), arg),
            None => write!(f, "{}", self.field.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_registry_has_two_fields_in_order() {
        let fields = list_fields();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].name, "jevt.value");
        assert_eq!(fields[0].id, 0);
        assert_eq!(fields[1].name, "jevt.json");
        assert_eq!(fields[1].id, 1);
        assert!(fields.iter().all(|f| f.field_type == "string"));
    }

    #[test]
    fn test_field_id_conversion() {
        assert_eq!(FieldId::from_u32(0), Some(FieldId::Value));
        assert_eq!(FieldId::from_u32(1), Some(FieldId::Json));
        assert_eq!(FieldId::from_u32(2), None);
        assert!(matches!(
            FieldId::try_from(7),
            Err(JevtError::UnknownField(7))
        ));
        assert_eq!(FieldId::Json.name(), "jevt.json");
    }

    #[test]
    fn test_fields_json_schema() {
        let json = fields_json().unwrap();
        let parsed: Value = serde_json::from_str(&json).unwrap();
        let arr = parsed.as_array().unwrap();

        assert_eq!(arr.len(), 2);
        assert_eq!(arr[0]["type"], "string");
        assert_eq!(arr[0]["id"], 0);
        assert_eq!(arr[0]["name"], "jevt.value");
        assert!(arr[0]["desc"].as_str().unwrap().contains("jevt.value[/x/y/z]"));
        assert_eq!(arr[1]["name"], "jevt.json");
        // Argument notation is documentation only, not part of the schema
        assert!(arr[0].get("arg_syntax").is_none());
    }

    #[test]
    fn test_parse_field_request() {
        let req: FieldRequest = "jevt.value[/a/b/c]".parse().unwrap();
        assert_eq!(req.field, FieldId::Value);
        assert_eq!(req.arg(), Some("/a/b/c"));

        let req: FieldRequest = "jevt.json".parse().unwrap();
        assert_eq!(req.field, FieldId::Json);
        assert_eq!(req.arg(), None);

        let req: FieldRequest = "jevt.value[]".parse().unwrap();
        assert_eq!(req.arg(), Some(""));
    }

    #[test]
    fn test_parse_field_request_errors() {
        assert!(matches!(
            "jevt.nope".parse::<FieldRequest>(),
            Err(JevtError::InvalidFieldSpec { .. })
        ));
        assert!(matches!(
            "jevt.value[/a".parse::<FieldRequest>(),
            Err(JevtError::InvalidFieldSpec { .. })
        ));
    }

    #[test]
    fn test_field_request_display() {
        let req = FieldRequest::new(FieldId::Value, Some("/x/y".to_string()));
        assert_eq!(req.to_string(), "jevt.value[/x/y]");
        assert_eq!(FieldRequest::new(FieldId::Json, None).to_string(), "jevt.json");
    }
}
