use crate::error::{BcdbError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Separator between row fields and between column descriptors.
pub const FIELD_SEP: &str = ";;";

/// Every table file starts with these bytes.
pub const MAGIC_PREFIX: &str = "BCDB";

/// Literal used in the header for an absent constraint or reference.
pub const NONE_LITERAL: &str = "None";

/// Column type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Boolean,
    Integer,
    Float,
    String,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Boolean => "BOOLEAN",
            DataType::Integer => "INTEGER",
            DataType::Float => "FLOAT",
            DataType::String => "STRING",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = BcdbError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "BOOLEAN" => Ok(DataType::Boolean),
            "INTEGER" => Ok(DataType::Integer),
            "FLOAT" => Ok(DataType::Float),
            "STRING" => Ok(DataType::String),
            other => Err(BcdbError::Validation(format!(
                "unknown attribute type '{other}'"
            ))),
        }
    }
}

/// Per-column requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Constraint {
    Unique,
}

impl Constraint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Constraint::Unique => "UNIQUE",
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Constraint {
    type Err = BcdbError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "UNIQUE" => Ok(Constraint::Unique),
            other => Err(BcdbError::Validation(format!(
                "unknown attribute requirement '{other}'"
            ))),
        }
    }
}

/// Definition of a single column in a table.
///
/// Built with [`Column::new`] and the `unique` / `references` builders. The
/// owning table is attached once the column belongs to a table file and is
/// ignored by equality.
#[derive(Debug, Clone)]
pub struct Column {
    name: String,
    data_type: DataType,
    constraint: Option<Constraint>,
    reference: Option<String>,
    table: Option<PathBuf>,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Column {
            name: name.into(),
            data_type,
            constraint: None,
            reference: None,
            table: None,
        }
    }

    /// Require every value in this column to be distinct.
    pub fn unique(mut self) -> Self {
        self.constraint = Some(Constraint::Unique);
        self
    }

    pub fn with_constraint(mut self, constraint: Option<Constraint>) -> Self {
        self.constraint = constraint;
        self
    }

    /// Require values to already exist in the same-named column of `table`.
    pub fn references(mut self, table: impl Into<String>) -> Self {
        self.reference = Some(table.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn constraint(&self) -> Option<Constraint> {
        self.constraint
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    /// File of the table this column belongs to, if bound.
    pub fn table(&self) -> Option<&Path> {
        self.table.as_deref()
    }

    pub(crate) fn bind(&mut self, table: &Path) {
        if self.table.is_none() {
            self.table = Some(table.to_path_buf());
        }
    }

    /// Check that the column can be written to a header line.
    pub fn validate(&self) -> Result<()> {
        check_token("attribute name", &self.name)?;
        if let Some(reference) = &self.reference {
            check_token("attribute from", reference)?;
            check_table_name("attribute from", reference)?;
        }
        Ok(())
    }

    /// Resolve the referenced table file.
    ///
    /// Needs both a reference and an owning table. The referenced table must
    /// be a different, existing file in the owner's directory.
    pub fn check_from(&self) -> Result<PathBuf> {
        let reference = self.reference.as_deref().ok_or_else(|| {
            BcdbError::Validation(format!(
                "invalid attribute {}: doesn't have a from table",
                self.name
            ))
        })?;
        let owner = self.table.as_deref().ok_or_else(|| {
            BcdbError::Validation(format!(
                "invalid attribute {}: doesn't belong to a table",
                self.name
            ))
        })?;
        resolve_reference(owner, reference)
    }
}

impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.data_type == other.data_type
            && self.constraint == other.constraint
            && self.reference == other.reference
    }
}

impl Eq for Column {}

/// Locate the sibling table `reference` next to `owner`.
pub(crate) fn resolve_reference(owner: &Path, reference: &str) -> Result<PathBuf> {
    check_table_name("attribute from", reference)?;
    let owner_name = owner.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    if reference == owner_name {
        return Err(BcdbError::Constraint(format!(
            "invalid attribute from: from cannot be this table ({reference})"
        )));
    }
    let file = owner
        .parent()
        .map(|dir| dir.join(reference))
        .unwrap_or_else(|| PathBuf::from(reference));
    if !file.exists() {
        return Err(BcdbError::NotFound(format!(
            "invalid attribute from: table '{reference}' doesn't exist"
        )));
    }
    Ok(file)
}

/// Table names are non-empty ASCII letters and digits, so they never
/// leave the database directory.
pub(crate) fn check_table_name(what: &str, name: &str) -> Result<()> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(BcdbError::Validation(format!("invalid {what}: '{name}'")));
    }
    Ok(())
}

fn check_token(what: &str, token: &str) -> Result<()> {
    if token.is_empty() {
        return Err(BcdbError::Validation(format!("invalid {what}: empty")));
    }
    if token.contains(FIELD_SEP) {
        return Err(BcdbError::Validation(format!(
            "invalid {what} '{token}': string contains separator"
        )));
    }
    if token.chars().any(char::is_whitespace) {
        return Err(BcdbError::Validation(format!(
            "invalid {what} '{token}': contains whitespace"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_type_names() {
        for ty in [DataType::Boolean, DataType::Integer, DataType::Float, DataType::String] {
            assert_eq!(ty.as_str().parse::<DataType>().unwrap(), ty);
        }
        assert!("boolean".parse::<DataType>().is_err());
        assert!("DATE".parse::<DataType>().is_err());
    }

    #[test]
    fn test_validate_rejects_separator_and_whitespace() {
        assert!(Column::new("helloworld", DataType::Integer).validate().is_ok());
        assert!(Column::new(";;", DataType::Boolean).validate().is_err());
        assert!(Column::new("two words", DataType::Boolean).validate().is_err());
        assert!(Column::new("", DataType::Boolean).validate().is_err());
        assert!(Column::new("a", DataType::String)
            .references("other table")
            .validate()
            .is_err());
        assert!(Column::new("a", DataType::String)
            .unique()
            .references("othertable")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_reference_must_be_a_table_name() {
        for bad in ["../other", "/etc/passwd", "sub/t1", "t1.bak"] {
            let err = Column::new("a", DataType::Integer)
                .references(bad)
                .validate()
                .unwrap_err();
            assert!(err.to_string().contains("invalid attribute from"));
        }
        assert!(crate::schema::parser::parse_column("a INTEGER None ../other").is_err());

        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("db")).unwrap();
        std::fs::write(tmp.path().join("outside"), "BCDB a INTEGER None None\n").unwrap();
        let owner = tmp.path().join("db").join("t1");
        assert!(matches!(
            resolve_reference(&owner, "../outside"),
            Err(BcdbError::Validation(_))
        ));
    }

    #[test]
    fn test_equality_ignores_owner() {
        let mut bound = Column::new("a", DataType::Float).unique();
        bound.bind(Path::new("/tmp/t1"));
        assert_eq!(bound, Column::new("a", DataType::Float).unique());
        assert_ne!(bound, Column::new("a", DataType::Float));
    }

    #[test]
    fn test_check_from_requires_reference_and_owner() {
        let err = Column::new("attr", DataType::Integer).check_from().unwrap_err();
        assert!(err.to_string().contains("doesn't have a from table"));

        let err = Column::new("attr", DataType::Integer)
            .references("t1")
            .check_from()
            .unwrap_err();
        assert!(err.to_string().contains("doesn't belong to a table"));
    }

    #[test]
    fn test_check_from_resolution() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("t1"), "BCDB attr INTEGER None None\n").unwrap();

        let mut col = Column::new("attr", DataType::Integer).references("t1");
        col.bind(&tmp.path().join("t2"));
        assert_eq!(col.check_from().unwrap(), tmp.path().join("t1"));

        let mut own = Column::new("attr", DataType::Integer).references("t1");
        own.bind(&tmp.path().join("t1"));
        assert!(matches!(own.check_from(), Err(BcdbError::Constraint(_))));

        let mut missing = Column::new("attr", DataType::Integer).references("idk");
        missing.bind(&tmp.path().join("t2"));
        let err = missing.check_from().unwrap_err();
        assert!(err.to_string().contains("table 'idk' doesn't exist"));
    }
}
