//! Built-in finding parsers
//!
//! | Parser | Module | Recognises |
//! |--------|--------|------------|
//! | Structured | [`structured`] | Embedded JSON reports (ESLint style) |
//! | Line | [`fallback`] | `path:line:col:` style text output |

mod fallback;
mod structured;

pub use fallback::LineParser;
pub use structured::StructuredParser;

use super::FindingParser;

/// Create the default parser chain, most specific first.
pub fn create_default_parsers() -> Vec<Box<dyn FindingParser>> {
    vec![Box::new(StructuredParser::new()), Box::new(LineParser::new())]
}
