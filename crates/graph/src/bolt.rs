//! `serde_json::Value` <-> `neo4rs::BoltType` conversion. `neo4rs` has no
//! blanket `serde` bridge, so every entity property map is converted by
//! hand before it crosses into a query parameter — the same shape as
//! hand-rolled bridges real `neo4rs` consumers write, since Cypher has no
//! way to parameterize a JSON value directly.

use neo4rs::BoltType;

pub fn json_to_bolt(value: &serde_json::Value) -> BoltType {
    match value {
        serde_json::Value::Null => BoltType::Null(neo4rs::BoltNull),
        serde_json::Value::Bool(b) => BoltType::Boolean(neo4rs::BoltBoolean::new(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                BoltType::Integer(neo4rs::BoltInteger::new(i))
            } else {
                BoltType::Float(neo4rs::BoltFloat::new(n.as_f64().unwrap_or_default()))
            }
        }
        serde_json::Value::String(s) => BoltType::String(neo4rs::BoltString::new(s)),
        serde_json::Value::Array(items) => {
            let list: Vec<BoltType> = items.iter().map(json_to_bolt).collect();
            BoltType::List(neo4rs::BoltList::from(list))
        }
        serde_json::Value::Object(map) => {
            let mut bolt_map = neo4rs::BoltMap::new();
            for (key, val) in map {
                bolt_map.put(neo4rs::BoltString::new(key), json_to_bolt(val));
            }
            BoltType::Map(bolt_map)
        }
    }
}
