//! Write the [`QueryOutput`] as JSON
//! It wraps the result with the query which produced it and prints it on
//! STDOUT.

use super::Writer;
use crate::{application::Args, models::QueryOutput};
use log::error;
use serde_json::value::Value;
use serde_json::Map;

/// A writer to print query results as JSON.
pub struct JsonWriter {
    /// The OID queried, if any
    oid: Option<String>,
    /// The name of the query
    query: String,
}

impl Writer for JsonWriter {
    /// Create a new JsonWriter
    fn new(argv: &Args) -> Self {
        Self {
            oid: argv.oid.clone(),
            query: format!("{:?}", argv.query).to_lowercase(),
        }
    }

    /// Formats the result
    fn render(&self, output: &QueryOutput) -> String {
        let mut map = Map::new();
        map.insert("query".to_string(), Value::String(self.query.clone()));
        map.insert(
            "oid".to_string(),
            self.oid.clone().map_or(Value::Null, Value::String),
        );

        let result = match serde_json::to_value(output) {
            Ok(v) => v,
            Err(e) => {
                error!("Unable to serialize the result: {}", e);
                Value::Null
            }
        };
        map.insert("result".to_string(), result);
        format!("{:#}", Value::Object(map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NvtRefs;

    #[test]
    fn references_are_wrapped_with_the_query() {
        let writer = JsonWriter {
            oid: Some("1.2.3".to_string()),
            query: "refs".to_string(),
        };
        let output = QueryOutput::Refs(NvtRefs {
            cve: vec!["".to_string()],
            bid: vec!["".to_string()],
            xref: vec!["URL:http://example.org/".to_string()],
        });
        let value: Value = serde_json::from_str(&writer.render(&output)).unwrap();
        assert_eq!(value["oid"], "1.2.3");
        assert_eq!(value["query"], "refs");
        assert_eq!(value["result"]["cve"][0], "");
        assert_eq!(value["result"]["xref"][0], "URL:http://example.org/");
    }

    #[test]
    fn missing_scalar_is_null() {
        let writer = JsonWriter {
            oid: None,
            query: "version".to_string(),
        };
        let value: Value = serde_json::from_str(&writer.render(&QueryOutput::Scalar(None))).unwrap();
        assert!(value["oid"].is_null());
        assert!(value["result"].is_null());
    }
}
