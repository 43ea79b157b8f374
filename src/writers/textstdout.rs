//! Write the [`QueryOutput`] to standard output
//! It is the default writer, it presents the result as text, one entry
//! per line, sorted by key.

use super::Writer;
use crate::{application::Args, models::QueryOutput};

/// A writer to print query results in the terminal.
pub struct TextStdoutWriter {
    /// The OID queried, if any
    oid: Option<String>,
}

impl Writer for TextStdoutWriter {
    /// Create a new TextStdoutWriter
    fn new(argv: &Args) -> Self {
        Self {
            oid: argv.oid.clone(),
        }
    }

    /// Formats the result
    fn render(&self, output: &QueryOutput) -> String {
        let mut lines: Vec<String> = Vec::new();
        if let Some(oid) = &self.oid {
            lines.push(format!("----------{}----------", oid));
        }

        match output {
            QueryOutput::Map(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                for key in keys {
                    // Tag values may span several lines
                    lines.push(format!("{}: {}", key, map[key].replace('\n', "\n    ")));
                }
            }
            QueryOutput::Params(params) => {
                let mut names: Vec<&String> = params.keys().collect();
                names.sort();
                for name in names {
                    let param = &params[name];
                    lines.push(format!(
                        "{} [{}] default={:?} ({})",
                        param.name, param.param_type, param.default, param.description
                    ));
                }
            }
            QueryOutput::Refs(refs) => {
                lines.push(format!("cve: {}", refs.cve.join(", ")));
                lines.push(format!("bid: {}", refs.bid.join(", ")));
                lines.push(format!("xref: {}", refs.xref.join(", ")));
            }
            QueryOutput::List(items) => lines.extend(items.iter().cloned()),
            QueryOutput::Scalar(value) => {
                lines.push(value.clone().unwrap_or_else(|| "(not set)".to_string()))
            }
        }
        lines.join("\n")
    }
}
