//! iCalendar serialization (RFC 5545).
//!
//! - Escape: parameter value quoting
//! - Fold: content line folding at 75 octets
//! - Serializer: full document serialization

mod escape;
mod fold;
mod serializer;

pub use escape::escape_param_value;
pub use fold::fold_line;
pub use serializer::{serialize, serialize_component, serialize_property};
