use crate::config::Config;
use crate::error::{BcdbError, Result};
use crate::schema::types::check_table_name;
use crate::schema::{self, Column, FIELD_SEP};
use crate::table::Table;
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// A directory of table files.
///
/// Tables are exactly the regular files directly inside the directory and
/// are listed again on every access, so outside changes show up at once.
/// The directory itself is not locked: creating or removing tables from
/// several threads at once is not race-free.
#[derive(Debug)]
pub struct Database {
    directory: PathBuf,
    config: Config,
}

impl Database {
    /// Open a database directory with the default [`Config`].
    pub fn open(directory: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(directory, Config::default())
    }

    pub fn open_with_config(directory: impl AsRef<Path>, config: Config) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        if !directory.exists() {
            if !config.create_directory {
                return Err(BcdbError::NotFound(format!(
                    "database directory {} doesn't exist",
                    directory.display()
                )));
            }
            std::fs::create_dir_all(&directory)?;
            log::debug!("created database directory {}", directory.display());
        }
        if !directory.is_dir() {
            return Err(BcdbError::Validation(format!(
                "{} is not a directory",
                directory.display()
            )));
        }
        let resolved = directory.canonicalize()?;
        if resolved.to_string_lossy().contains(FIELD_SEP) {
            return Err(BcdbError::Validation(format!(
                "invalid database directory {}: path contains separator",
                resolved.display()
            )));
        }

        Ok(Database { directory, config })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Every table in the directory, in directory iteration order.
    pub fn tables(&self) -> Result<Vec<Table>> {
        let mut tables = Vec::new();
        for entry in std::fs::read_dir(&self.directory)? {
            let path = entry?.path();
            if path.is_file() {
                tables.push(self.wrap(Table::open(path)?));
            }
        }
        Ok(tables)
    }

    /// Create a new table file with the given columns.
    ///
    /// Reference columns are not resolved here; the referenced table may be
    /// created later.
    pub fn add_table(&self, name: &str, columns: Vec<Column>) -> Result<Table> {
        validate_table_name(name)?;
        if columns.is_empty() {
            return Err(BcdbError::Validation(
                "invalid table attributes: empty".into(),
            ));
        }
        let mut seen = HashSet::new();
        for column in &columns {
            column.validate()?;
            if !seen.insert(column.name()) {
                return Err(BcdbError::Validation(format!(
                    "invalid table attributes: duplicate attribute {}",
                    column.name()
                )));
            }
        }

        let path = self.directory.join(name);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(BcdbError::Validation(format!(
                    "table with name {name} already exists"
                )));
            }
            Err(e) => return Err(e.into()),
        };
        writeln!(file, "{}", schema::header_line(&columns))?;
        drop(file);

        log::debug!("created table {name} with {} column(s)", columns.len());
        Ok(self.wrap(Table::open(&path)?.with_columns(columns)))
    }

    /// Look up a table by its exact (case-sensitive) name.
    pub fn get_table(&self, name: &str) -> Result<Table> {
        self.tables()?
            .into_iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| {
                BcdbError::NotFound(format!("invalid table: no table found with name '{name}'"))
            })
    }

    /// Delete a table file.
    pub fn remove_table(&self, name: &str) -> Result<()> {
        validate_table_name(name)?;
        let path = self.directory.join(name);
        if !path.exists() {
            return Err(BcdbError::NotFound(format!(
                "table with name {name} doesn't exist"
            )));
        }
        std::fs::remove_file(&path)?;
        log::debug!("removed table {name}");
        Ok(())
    }

    fn wrap(&self, table: Table) -> Table {
        table.with_remove_limit(self.config.remove_limit)
    }
}

/// Table names are non-empty and ASCII letters and digits only.
pub fn validate_table_name(name: &str) -> Result<()> {
    check_table_name("table name", name)
}
