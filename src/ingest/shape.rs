//! Normalization of incoming items into [`Record`].
//!
//! Devices report readings with English field names (`code`, `weight`,
//! `date`, `time`), Spanish ones (`codigo`, `peso`, `fecha`, `hora`) or a mix
//! of both. Each field is resolved on its own, short-form key first, and
//! everything after this module sees only the canonical [`Record`].

use serde_json::{Map, Value};

use crate::record::{Record, Turno, sanitize_peso};

/// One record field and the two names it may arrive under.
#[derive(Debug, Clone, Copy)]
struct FieldNames {
    short: &'static str,
    long: &'static str,
}

const CODIGO: FieldNames = FieldNames { short: "code", long: "codigo" };
const PESO: FieldNames = FieldNames { short: "weight", long: "peso" };
const FECHA: FieldNames = FieldNames { short: "date", long: "fecha" };
const HORA: FieldNames = FieldNames { short: "time", long: "hora" };

impl FieldNames {
    /// First non-null value, short-form key before long-form key.
    fn lookup(self, object: &Map<String, Value>) -> Option<&Value> {
        [self.short, self.long]
            .into_iter()
            .filter_map(|key| object.get(key))
            .find(|value| !value.is_null())
    }
}

/// Maps one parsed JSON item to a record; `None` for non-objects.
///
/// Missing strings become empty, a missing or non-numeric weight becomes 0,
/// and `raw` is always the compact serialization of the item.
#[must_use]
pub fn normalize(item: &Value) -> Option<Record> {
    let object = item.as_object()?;

    Some(Record {
        id: object.get("id").and_then(id_value),
        codigo: string_value(CODIGO.lookup(object)),
        peso: sanitize_peso(number_value(PESO.lookup(object))),
        fecha: string_value(FECHA.lookup(object)),
        hora: string_value(HORA.lookup(object)),
        turno: Turno::parse(&string_value(object.get("turno"))),
        raw: item.to_string(),
    })
}

fn string_value(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn number_value(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().replace(',', ".").parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn id_value(value: &Value) -> Option<String> {
    let id = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!id.is_empty()).then_some(id)
}
