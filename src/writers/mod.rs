//! Writing query results
//!
//! Once a query has been answered by the cache, it's up to a writer to
//! present the [`QueryOutput`]. It provides a common interface, so the
//! application does not depend on the output format.

pub mod json;
pub mod textstdout;

use crate::{application::Args, models::QueryOutput};

/// A trait to have a common interface between writers.
pub trait Writer {
    /// Create a new writer
    /// The whole argv is given, a writer picks what it needs.
    fn new(argv: &Args) -> Self
    where
        Self: Sized;

    /// Formats the output of a query.
    fn render(&self, output: &QueryOutput) -> String;

    /// Write the output of a query on STDOUT
    fn write(&self, output: &QueryOutput) {
        println!("{}", self.render(output));
    }
}
