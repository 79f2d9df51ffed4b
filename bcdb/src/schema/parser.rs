use super::types::{Column, Constraint, DataType, FIELD_SEP, MAGIC_PREFIX, NONE_LITERAL};
use crate::error::{BcdbError, Result};
use std::path::Path;

/// Serialize a column to its header form: `name TYPE CONSTRAINT FROM`.
pub fn serialize_column(column: &Column) -> String {
    format!(
        "{} {} {} {}",
        column.name(),
        column.data_type(),
        column.constraint().map(|c| c.as_str()).unwrap_or(NONE_LITERAL),
        column.reference().unwrap_or(NONE_LITERAL),
    )
}

/// Parse one column descriptor. The referenced table is not checked here.
pub fn parse_column(text: &str) -> Result<Column> {
    let parts: Vec<&str> = text.split_whitespace().collect();
    if parts.len() != 4 {
        return Err(BcdbError::Validation(format!(
            "invalid syntax for attribute: not 4 parts/columns, {}",
            parts.len()
        )));
    }

    let data_type: DataType = parts[1].parse()?;
    let constraint = match parts[2] {
        NONE_LITERAL => None,
        other => Some(other.parse::<Constraint>()?),
    };
    let column = Column::new(parts[0], data_type).with_constraint(constraint);
    let column = match parts[3] {
        NONE_LITERAL => column,
        table => column.references(table),
    };
    column.validate()?;
    Ok(column)
}

/// Build the first line of a table file (without the trailing newline).
pub fn header_line(columns: &[Column]) -> String {
    let defs: Vec<String> = columns.iter().map(serialize_column).collect();
    format!("{MAGIC_PREFIX} {}", defs.join(FIELD_SEP))
}

/// Parse the first line of a table file, binding every column to `table`.
pub fn parse_header(line: &str, table: &Path) -> Result<Vec<Column>> {
    let line = line.trim_end_matches(['\n', '\r']);
    if line.is_empty() {
        return Err(BcdbError::Corrupt("empty".into()));
    }
    let body = line
        .strip_prefix(MAGIC_PREFIX)
        .and_then(|rest| rest.strip_prefix(' '))
        .ok_or_else(|| BcdbError::Corrupt(format!("doesn't start with {MAGIC_PREFIX}")))?;

    body.split(FIELD_SEP)
        .map(|def| -> Result<Column> {
            let mut column = parse_column(def)?;
            column.bind(table);
            Ok(column)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_column() {
        let col = Column::new("thename", DataType::String)
            .unique()
            .references("theothername");
        assert_eq!(serialize_column(&col), "thename STRING UNIQUE theothername");

        let col = Column::new("thename", DataType::Boolean);
        assert_eq!(serialize_column(&col), "thename BOOLEAN None None");
    }

    #[test]
    fn test_parse_column() {
        assert_eq!(
            parse_column("thename STRING UNIQUE theothername").unwrap(),
            Column::new("thename", DataType::String)
                .unique()
                .references("theothername")
        );
        assert_eq!(
            parse_column("  thename BOOLEAN None None\n").unwrap(),
            Column::new("thename", DataType::Boolean)
        );
    }

    #[test]
    fn test_parse_column_bad() {
        assert!(parse_column("hello STRING").is_err());
        assert!(parse_column("hello STRING None None None").is_err());
        assert!(parse_column("hello TEXT None None").is_err());
        assert!(parse_column("hello STRING PRIMARY None").is_err());
    }

    #[test]
    fn test_column_round_trip() {
        let columns = [
            Column::new("a", DataType::Boolean),
            Column::new("b", DataType::Integer).unique(),
            Column::new("c", DataType::Float).references("other"),
            Column::new("d", DataType::String).unique().references("users"),
        ];
        for col in &columns {
            assert_eq!(&parse_column(&serialize_column(col)).unwrap(), col);
        }
    }

    #[test]
    fn test_header_round_trip() {
        let columns = vec![
            Column::new("id", DataType::Integer).unique(),
            Column::new("name", DataType::String),
        ];
        let line = header_line(&columns);
        assert_eq!(line, "BCDB id INTEGER UNIQUE None;;name STRING None None");

        let parsed = parse_header(&format!("{line}\n"), Path::new("/db/people")).unwrap();
        assert_eq!(parsed, columns);
        assert!(parsed
            .iter()
            .all(|c| c.table() == Some(Path::new("/db/people"))));
    }

    #[test]
    fn test_parse_header_bad() {
        let err = parse_header("", Path::new("t")).unwrap_err();
        assert!(err.to_string().contains("empty"));
        let err = parse_header("Hello, World!", Path::new("t")).unwrap_err();
        assert!(err.to_string().contains("doesn't start with BCDB"));
    }
}
