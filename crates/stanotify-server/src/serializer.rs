//! Rendering entities into notification payloads.

use bytes::Bytes;
use serde_json::{Map, Value};

use stanotify_proto::{Entity, Projection};

use crate::error::SerializeError;

/// Key carrying the entity identifier in JSON payloads.
pub const ID_KEY: &str = "@iot.id";

/// Renders an entity under an optional field projection.
pub trait EntitySerializer: Send + Sync {
    /// Serialize `entity`, restricted to `projection` when given.
    fn serialize(
        &self,
        entity: &Entity,
        projection: Option<&Projection>,
    ) -> Result<Bytes, SerializeError>;
}

/// Serializes entities as flat JSON objects.
///
/// The identifier is written as `@iot.id`; with a projection it is kept only
/// when `id` is selected.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl JsonSerializer {
    /// Create a JSON serializer.
    pub fn new() -> Self {
        Self
    }
}

impl EntitySerializer for JsonSerializer {
    fn serialize(
        &self,
        entity: &Entity,
        projection: Option<&Projection>,
    ) -> Result<Bytes, SerializeError> {
        let mut object = Map::new();

        if projection.map_or(true, |p| p.contains("id")) {
            object.insert(ID_KEY.to_string(), id_value(&entity.id));
        }
        for (name, value) in &entity.properties {
            if projection.map_or(true, |p| p.contains(name)) {
                object.insert(name.clone(), value.clone());
            }
        }

        let bytes = serde_json::to_vec(&Value::Object(object)).map_err(|e| SerializeError::Encode {
            id: entity.id.clone(),
            reason: e.to_string(),
        })?;
        Ok(Bytes::from(bytes))
    }
}

/// Numeric ids are written as JSON numbers, everything else as strings.
fn id_value(id: &str) -> Value {
    match id.parse::<i64>() {
        Ok(n) => Value::from(n),
        Err(_) => Value::from(id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn observation() -> Entity {
        Entity::new("7")
            .with_property("result", 21.5)
            .with_property("phenomenonTime", "2024-01-01T00:00:00Z")
            .with_property("parameters", json!({ "a": 1 }))
    }

    fn decode(bytes: &Bytes) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[test]
    fn test_full_entity() {
        let bytes = JsonSerializer::new().serialize(&observation(), None).unwrap();
        assert_eq!(
            decode(&bytes),
            json!({
                "@iot.id": 7,
                "result": 21.5,
                "phenomenonTime": "2024-01-01T00:00:00Z",
                "parameters": { "a": 1 }
            })
        );
    }

    #[test]
    fn test_projection() {
        let projection = Projection::new(["result", "phenomenonTime"]);
        let bytes = JsonSerializer::new()
            .serialize(&observation(), Some(&projection))
            .unwrap();
        assert_eq!(
            decode(&bytes),
            json!({ "result": 21.5, "phenomenonTime": "2024-01-01T00:00:00Z" })
        );

        let with_id = Projection::new(["id"]);
        let bytes = JsonSerializer::new()
            .serialize(&observation(), Some(&with_id))
            .unwrap();
        assert_eq!(decode(&bytes), json!({ "@iot.id": 7 }));
    }

    #[test]
    fn test_string_id() {
        let bytes = JsonSerializer::new()
            .serialize(&Entity::new("abc"), None)
            .unwrap();
        assert_eq!(decode(&bytes), json!({ "@iot.id": "abc" }));
    }
}
