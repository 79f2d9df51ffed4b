pub mod parser;
pub mod types;

pub use parser::{header_line, parse_column, parse_header, serialize_column};
pub use types::{Column, Constraint, DataType, FIELD_SEP, MAGIC_PREFIX, NONE_LITERAL};
