use crate::error::{BcdbError, Result};
use crate::row::{Row, Value};
use crate::schema::types::resolve_reference;
use crate::schema::{Column, Constraint, DataType, FIELD_SEP};
use crate::table::{Held, Table};

/// Check that `value` has the column's type and can be written as a field.
pub fn check_type(column: &Column, value: &Value) -> Result<()> {
    let expected = column.data_type();
    if value.data_type() != expected {
        return Err(BcdbError::Validation(format!(
            "invalid value at attribute {}: invalid {}",
            column.name(),
            type_name(expected)
        )));
    }
    match value {
        Value::String(s) if s.contains(FIELD_SEP) => Err(separator_error(column)),
        Value::Float(f) if !f.is_finite() => Err(BcdbError::Validation(format!(
            "invalid value at attribute {}: float must be finite, got {f}",
            column.name()
        ))),
        _ => Ok(()),
    }
}

fn separator_error(column: &Column) -> BcdbError {
    BcdbError::Constraint(format!(
        "invalid value at attribute {}: string contains separator",
        column.name()
    ))
}

impl Table {
    /// Check that `value` may be written to `column`: its type, then the
    /// column's constraint, then its reference.
    pub fn verify_before_writing(&self, column: &Column, value: &Value) -> Result<()> {
        let held = self.lock();
        self.verify_before_writing_held(&held, column, value)
    }

    pub(crate) fn verify_before_writing_held(
        &self,
        held: &Held<'_>,
        column: &Column,
        value: &Value,
    ) -> Result<()> {
        check_type(column, value)?;
        if column.constraint().is_some() {
            self.verify_requirements_held(held, column, value)?;
        }
        if column.reference().is_some() {
            self.verify_from(value, column)?;
        }
        Ok(())
    }

    /// Check the column's constraint against the rows already stored.
    pub fn verify_requirements(&self, column: &Column, value: &Value) -> Result<()> {
        let held = self.lock();
        self.verify_requirements_held(&held, column, value)
    }

    pub(crate) fn verify_requirements_held(
        &self,
        held: &Held<'_>,
        column: &Column,
        value: &Value,
    ) -> Result<()> {
        if matches!(value, Value::String(s) if s.contains(FIELD_SEP)) {
            return Err(separator_error(column));
        }
        let which = self
            .attributes_held(held)?
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| {
                BcdbError::NotFound(format!(
                    "cannot find attribute {} within table {}",
                    column.name(),
                    self.name()
                ))
            })?;

        match column.constraint() {
            None => Ok(()),
            Some(Constraint::Unique) => {
                for (idx, row) in self.get_rows_held(held)?.iter().enumerate() {
                    let existing = row.get(which).ok_or_else(|| BcdbError::CorruptRow {
                        line: idx + 2,
                        reason: format!("doesn't have column {}", which + 1),
                    })?;
                    if existing == value {
                        return Err(BcdbError::Constraint(format!(
                            "invalid value at attribute {}: attribute is unique, but it already appears on row {}",
                            column.name(),
                            idx + 2
                        )));
                    }
                }
                Ok(())
            }
        }
    }

    /// Check that `value` exists in the same-named column of the table that
    /// `column` references. A no-op for columns without a reference.
    ///
    /// The referenced table is opened as a separate instance with its own
    /// lock; no ordering is enforced between the two locks.
    pub fn verify_from(&self, value: &Value, column: &Column) -> Result<()> {
        let Some(reference) = column.reference() else {
            return Ok(());
        };
        let file = resolve_reference(self.file(), reference)?;
        let from_table = Table::open(file)?;
        let idx = from_table.get_attribute_index(column.name())?;

        for (i, row) in from_table.get_rows()?.iter().enumerate() {
            match row.get(idx) {
                Some(existing) if existing == value => return Ok(()),
                Some(_) => {}
                None => {
                    return Err(BcdbError::CorruptRow {
                        line: i + 2,
                        reason: format!("no column {} in table {}", idx + 1, from_table.name()),
                    })
                }
            }
        }
        Err(BcdbError::Constraint(format!(
            "invalid value for attribute {}: {value} does not exist in from table {}",
            column.name(),
            from_table.name()
        )))
    }

    /// Validate a full replacement row set before anything is truncated:
    /// arity, types, uniqueness within the set, and references.
    pub(crate) fn preflight_held(&self, held: &Held<'_>, rows: &[Row]) -> Result<()> {
        let columns = self.attributes_held(held)?;
        for (i, row) in rows.iter().enumerate() {
            self.check_arity(columns, row)?;
            for (idx, (column, value)) in columns.iter().zip(row).enumerate() {
                check_type(column, value)?;
                if column.constraint() == Some(Constraint::Unique) {
                    if let Some(j) = rows[..i].iter().position(|earlier| &earlier[idx] == value) {
                        return Err(BcdbError::Constraint(format!(
                            "invalid value at attribute {}: attribute is unique, but it already appears on row {}",
                            column.name(),
                            j + 2
                        )));
                    }
                }
                self.verify_from(value, column)?;
            }
        }
        Ok(())
    }
}

/// Type name used in messages, e.g. `integer`.
pub fn type_name(data_type: DataType) -> String {
    data_type.as_str().to_lowercase()
}
