use crate::error::{BcdbError, Result};
use crate::row::{self, Row, Value};
use crate::schema::{self, Column, FIELD_SEP, MAGIC_PREFIX};
use std::cmp::Ordering;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::hash::{Hash, Hasher};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

/// Default cap on how many rows a single `remove_rows` call may delete.
pub const DEFAULT_REMOVE_LIMIT: usize = 1000;

/// Proof that the table lock is held. Internal helpers take one of these
/// instead of locking again, so nested calls never self-deadlock.
pub(crate) type Held<'a> = MutexGuard<'a, ()>;

/// A single table file: the schema on line 1, one row per following line.
///
/// The file is the only source of truth; every operation opens, reads or
/// writes it and closes it again. Access is serialized by a lock owned by
/// this instance. Two `Table` values opened on the same file do not share
/// that lock, so keep at most one live instance per file or coordinate
/// externally.
///
/// The schema is read once and cached. Rewriting the header line from
/// outside is not observed by an instance that already cached it.
pub struct Table {
    file: PathBuf,
    name: String,
    columns: OnceLock<Vec<Column>>,
    lock: Mutex<()>,
    remove_limit: usize,
}

impl Table {
    /// Open an existing table file.
    pub fn open(file: impl AsRef<Path>) -> Result<Self> {
        let file = file.as_ref().to_path_buf();
        if !file.exists() {
            return Err(BcdbError::NotFound(format!(
                "table file {} doesn't exist",
                file.display()
            )));
        }
        if !file.is_file() {
            return Err(BcdbError::Validation(format!(
                "{} is not a file",
                file.display()
            )));
        }
        check_magic(&file)?;

        let name = file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Table {
            file,
            name,
            columns: OnceLock::new(),
            lock: Mutex::new(()),
            remove_limit: DEFAULT_REMOVE_LIMIT,
        })
    }

    pub(crate) fn with_remove_limit(mut self, limit: usize) -> Self {
        self.remove_limit = limit;
        self
    }

    /// Seed the schema cache with columns the caller already holds,
    /// binding each one to this table.
    pub(crate) fn with_columns(self, mut columns: Vec<Column>) -> Self {
        for column in &mut columns {
            column.bind(&self.file);
        }
        let _ = self.columns.set(columns);
        self
    }

    /// The table name (the file stem).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Limit applied by `remove_rows` when none is given.
    pub fn remove_limit(&self) -> usize {
        self.remove_limit
    }

    pub(crate) fn lock(&self) -> Held<'_> {
        // The mutex guards no data, so a poisoned lock is still usable.
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Schema ───────────────────────────────────────────────────────

    /// The columns of this table, parsed from the header line.
    pub fn attributes(&self) -> Result<&[Column]> {
        if let Some(columns) = self.columns.get() {
            return Ok(columns);
        }
        let held = self.lock();
        self.attributes_held(&held)
    }

    pub(crate) fn attributes_held(&self, _held: &Held<'_>) -> Result<&[Column]> {
        if let Some(columns) = self.columns.get() {
            return Ok(columns);
        }
        let line = read_first_line(&self.file)?;
        let columns = schema::parse_header(&line, &self.file)?;
        Ok(self.columns.get_or_init(|| columns))
    }

    /// Get the column called `name`.
    pub fn get_attribute(&self, name: &str) -> Result<&Column> {
        self.attributes()?
            .iter()
            .find(|c| c.name() == name)
            .ok_or_else(|| missing_attribute(name))
    }

    /// Get the position of the column called `name`.
    pub fn get_attribute_index(&self, name: &str) -> Result<usize> {
        self.attributes()?
            .iter()
            .position(|c| c.name() == name)
            .ok_or_else(|| missing_attribute(name))
    }

    // ── Reading ──────────────────────────────────────────────────────

    /// Read and decode every row in file order.
    pub fn get_rows(&self) -> Result<Vec<Row>> {
        let held = self.lock();
        self.get_rows_held(&held)
    }

    pub(crate) fn get_rows_held(&self, held: &Held<'_>) -> Result<Vec<Row>> {
        let contents = fs::read_to_string(&self.file)?;
        if !contents.starts_with(&format!("{MAGIC_PREFIX} ")) {
            return Err(BcdbError::Corrupt(format!(
                "doesn't start with {MAGIC_PREFIX}"
            )));
        }
        let columns = self.attributes_held(held)?;

        let mut rows = Vec::new();
        // the header is line 1
        for (line_no, line) in contents.lines().enumerate().skip(1).map(|(i, l)| (i + 1, l)) {
            let mut row = Vec::with_capacity(columns.len());
            for (idx, field) in line.split(FIELD_SEP).enumerate() {
                let column = columns.get(idx).ok_or_else(|| BcdbError::CorruptRow {
                    line: line_no,
                    reason: "too many columns".into(),
                })?;
                row.push(row::decode(field, column.data_type()).map_err(|e| e.at_line(line_no))?);
            }
            if row.len() != columns.len() {
                return Err(BcdbError::CorruptRow {
                    line: line_no,
                    reason: format!(
                        "invalid columns, expected {}, got {}",
                        columns.len(),
                        row.len()
                    ),
                });
            }
            rows.push(row);
        }
        Ok(rows)
    }

    /// Whether any row has `value` in the column `attribute`.
    pub fn contains(&self, attribute: &str, value: impl Into<Value>) -> Result<bool> {
        let value = value.into();
        let idx = self.get_attribute_index(attribute)?;
        for (i, row) in self.get_rows()?.iter().enumerate() {
            if column_at(row, idx, i)? == &value {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn not_contains(&self, attribute: &str, value: impl Into<Value>) -> Result<bool> {
        self.contains(attribute, value).map(|found| !found)
    }

    /// Whether some row equals `row` exactly.
    pub fn contains_row(&self, row: &[Value]) -> Result<bool> {
        Ok(self.get_rows()?.iter().any(|r| r.as_slice() == row))
    }

    pub fn not_contains_row(&self, row: &[Value]) -> Result<bool> {
        self.contains_row(row).map(|found| !found)
    }

    /// The single row with `value` in column `attribute`.
    pub fn get_row_where(&self, attribute: &str, value: impl Into<Value>) -> Result<Row> {
        let value = value.into();
        let mut rows = self.rows_where(attribute, &value)?;
        match rows.len() {
            0 => Err(BcdbError::NotFound(format!(
                "no rows have {value} at attribute {attribute}"
            ))),
            1 => Ok(rows.remove(0)),
            n => Err(BcdbError::Validation(format!(
                "multiple rows have {value} at attribute {attribute} ({n})"
            ))),
        }
    }

    /// All rows with `value` in column `attribute`.
    pub fn get_rows_where(
        &self,
        attribute: &str,
        value: impl Into<Value>,
        allow_empty: bool,
    ) -> Result<Vec<Row>> {
        let value = value.into();
        let rows = self.rows_where(attribute, &value)?;
        if rows.is_empty() && !allow_empty {
            return Err(BcdbError::NotFound(format!(
                "no rows have {value} at attribute {attribute}"
            )));
        }
        Ok(rows)
    }

    fn rows_where(&self, attribute: &str, value: &Value) -> Result<Vec<Row>> {
        let idx = self.get_attribute_index(attribute)?;
        let mut matches = Vec::new();
        for (i, row) in self.get_rows()?.into_iter().enumerate() {
            if column_at(&row, idx, i)? == value {
                matches.push(row);
            }
        }
        Ok(matches)
    }

    // ── Writing ──────────────────────────────────────────────────────

    /// Validate and append one row.
    ///
    /// Every column is checked (type, uniqueness, reference) before anything
    /// is written; a failing column rejects the whole row.
    pub fn add_row(&self, row: &[Value]) -> Result<()> {
        let held = self.lock();
        self.add_row_held(&held, row)
    }

    pub(crate) fn add_row_held(&self, held: &Held<'_>, row: &[Value]) -> Result<()> {
        let columns = self.attributes_held(held)?;
        self.check_arity(columns, row)?;
        for (column, value) in columns.iter().zip(row) {
            self.verify_before_writing_held(held, column, value)?;
        }

        let mut file = OpenOptions::new().read(true).append(true).open(&self.file)?;
        if !ends_with_newline(&mut file)? {
            file.write_all(b"\n")?;
        }
        writeln!(file, "{}", row::encode_row(row))?;
        Ok(())
    }

    /// Append rows one after another. Not transactional: rows before a
    /// failing one stay written, and the error names the failing index.
    pub fn add_rows(&self, rows: &[Row]) -> Result<()> {
        for (index, row) in rows.iter().enumerate() {
            if let Err(e) = self.add_row(row) {
                log::warn!(
                    "add_rows on {} stopped at row {index}, {index} row(s) written",
                    self.name
                );
                return Err(BcdbError::Batch {
                    index,
                    row: row::display_row(row),
                    source: Box::new(e),
                });
            }
        }
        Ok(())
    }

    /// Remove the first row matching `predicate`; later matches are kept.
    ///
    /// Returns whether a row was removed. With `must_remove`, finding no
    /// match is an error.
    pub fn remove_row<F>(&self, mut predicate: F, must_remove: bool) -> Result<bool>
    where
        F: FnMut(&[Value]) -> bool,
    {
        let held = self.lock();
        let mut rows = self.get_rows_held(&held)?;
        match rows.iter().position(|r| predicate(r.as_slice())) {
            Some(idx) => {
                rows.remove(idx);
                self.write_rows_held(&held, &rows)?;
                Ok(true)
            }
            None if must_remove => Err(BcdbError::NotFound(format!(
                "must_remove but nothing was removed from table {}",
                self.name
            ))),
            None => Ok(false),
        }
    }

    /// Remove every row matching `predicate` and return how many went.
    ///
    /// If more than `limit` rows match (the table default when `None`),
    /// nothing is written and an error is returned.
    pub fn remove_rows<F>(&self, mut predicate: F, limit: Option<usize>) -> Result<usize>
    where
        F: FnMut(&[Value]) -> bool,
    {
        let limit = limit.unwrap_or(self.remove_limit);
        let held = self.lock();
        let rows = self.get_rows_held(&held)?;
        let total = rows.len();
        let kept: Vec<Row> = rows.into_iter().filter(|r| !predicate(r.as_slice())).collect();
        let removed = total - kept.len();

        if removed > limit {
            return Err(BcdbError::Validation(format!(
                "exceeded the limit ({limit}) with {removed} number of rows removed."
            )));
        }
        if removed > 0 {
            self.write_rows_held(&held, &kept)?;
            log::debug!("removed {removed} row(s) from table {}", self.name);
        }
        Ok(removed)
    }

    /// Replace every row in the table with `rows`.
    ///
    /// This throws away the current contents, so the caller has to pass
    /// `confirm_overwrite = true`. All rows are validated before the file is
    /// truncated.
    pub fn write_rows(&self, rows: &[Row], confirm_overwrite: bool) -> Result<()> {
        if !confirm_overwrite {
            return Err(BcdbError::Validation(format!(
                "write_rows replaces every row of table {}; pass confirm_overwrite = true",
                self.name
            )));
        }
        let held = self.lock();
        self.write_rows_held(&held, rows)
    }

    pub(crate) fn write_rows_held(&self, held: &Held<'_>, rows: &[Row]) -> Result<()> {
        self.preflight_held(held, rows)?;

        let mut header = read_first_line(&self.file)?;
        if !header.ends_with('\n') {
            header.push('\n');
        }
        fs::write(&self.file, header)?;

        for row in rows {
            self.add_row_held(held, row)?;
        }
        log::debug!("rewrote table {} with {} row(s)", self.name, rows.len());
        Ok(())
    }

    /// Apply `f` to every row under one lock. `Some(row)` replaces the row,
    /// `None` drops it. With `write`, the result replaces the table contents.
    /// The resulting rows are returned either way.
    pub fn map<F>(&self, mut f: F, write: bool) -> Result<Vec<Row>>
    where
        F: FnMut(Row) -> Option<Row>,
    {
        let held = self.lock();
        let width = self.attributes_held(&held)?.len();
        let rows = self.get_rows_held(&held)?;

        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            match f(row) {
                Some(mapped) if mapped.len() == width => result.push(mapped),
                Some(mapped) => {
                    return Err(BcdbError::Validation(format!(
                        "invalid row returned by map function: expected {width} columns, got {}",
                        mapped.len()
                    )))
                }
                None => {}
            }
        }

        if write {
            self.write_rows_held(&held, &result)?;
        }
        Ok(result)
    }

    /// Keep the rows for which `f` holds.
    pub fn filter<F>(&self, mut f: F, write: bool) -> Result<Vec<Row>>
    where
        F: FnMut(&[Value]) -> bool,
    {
        self.map(|row| if f(row.as_slice()) { Some(row) } else { None }, write)
    }

    pub(crate) fn check_arity(&self, columns: &[Column], row: &[Value]) -> Result<()> {
        if row.len() != columns.len() {
            return Err(BcdbError::Validation(format!(
                "invalid value for table {}: invalid number of columns, expected {}, got {}",
                self.name,
                columns.len(),
                row.len()
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("file", &self.file)
            .finish()
    }
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.file == other.file
    }
}

impl Eq for Table {}

impl PartialOrd for Table {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Table {
    fn cmp(&self, other: &Self) -> Ordering {
        self.file.cmp(&other.file)
    }
}

impl Hash for Table {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.file.hash(state);
    }
}

fn missing_attribute(name: &str) -> BcdbError {
    BcdbError::NotFound(format!("invalid attribute with name {name}: doesn't exist"))
}

/// Fetch column `idx` of the `i`-th data row (file line `i + 2`).
fn column_at(row: &[Value], idx: usize, i: usize) -> Result<&Value> {
    row.get(idx).ok_or_else(|| BcdbError::CorruptRow {
        line: i + 2,
        reason: format!("no column {}", idx + 1),
    })
}

fn check_magic(file: &Path) -> Result<()> {
    let prefix = format!("{MAGIC_PREFIX} ");
    let mut buf = Vec::with_capacity(prefix.len());
    File::open(file)?
        .take(prefix.len() as u64)
        .read_to_end(&mut buf)?;
    if buf != prefix.as_bytes() {
        return Err(BcdbError::Corrupt(format!(
            "{} doesn't start with {MAGIC_PREFIX}",
            file.display()
        )));
    }
    Ok(())
}

/// Whether the last byte of `file` is a newline. An empty file counts as one.
fn ends_with_newline(file: &mut File) -> Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

fn read_first_line(file: &Path) -> Result<String> {
    let mut line = String::new();
    BufReader::new(File::open(file)?).read_line(&mut line)?;
    Ok(line)
}
