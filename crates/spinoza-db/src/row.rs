//! Forward-only typed row cursor.
//!
//! [`DataRowResult`] wraps the engine's cursor for the duration of one
//! [`crate::Database::select`] call. It advances eagerly on construction,
//! buffering the raw cells of the upcoming row, so emptiness is known
//! immediately and the cursor self-closes the moment the engine runs dry.
//! [`DataRow`] is a transient view valid only inside one `next` callback.

use rusqlite::types::Value as Cell;
use rusqlite::Rows;
use spinoza_types::{enum_codec, value, DataType, DbEnum};
use time::{Date, OffsetDateTime, Time};

use crate::catalog::Column;
use crate::error::{DbError, DbResult};

/// Owns the underlying engine cursor plus the originating select's
/// projection. State machine: `open → (has_row ? readable : closed)`.
pub struct DataRowResult<'stmt> {
    rows: Option<Rows<'stmt>>,
    projection: Vec<Column>,
    buffered: Option<Vec<Cell>>,
}

impl<'stmt> DataRowResult<'stmt> {
    pub(crate) fn new(rows: Rows<'stmt>, projection: Vec<Column>) -> DbResult<Self> {
        let mut cursor = DataRowResult {
            rows: Some(rows),
            projection,
            buffered: None,
        };
        cursor.advance()?;
        Ok(cursor)
    }

    /// Whether a row is buffered and `next` may be called.
    pub fn has_row(&self) -> bool {
        self.buffered.is_some()
    }

    /// Invoke `f` against the buffered row, then advance (self-closing when
    /// the engine cursor is exhausted). Fails with
    /// [`DbError::CursorExhausted`] once closed.
    pub fn next<R>(&mut self, f: impl FnOnce(&DataRow<'_>) -> DbResult<R>) -> DbResult<R> {
        let cells = self.buffered.take().ok_or(DbError::CursorExhausted)?;
        let row = DataRow {
            cells: &cells,
            projection: &self.projection,
        };
        let out = f(&row)?;
        self.advance()?;
        Ok(out)
    }

    /// Release the engine-side statement and cursor. Idempotent.
    pub fn close(&mut self) {
        self.rows = None;
        self.buffered = None;
    }

    fn advance(&mut self) -> DbResult<()> {
        let Some(rows) = self.rows.as_mut() else {
            return Ok(());
        };
        match rows.next()? {
            Some(row) => {
                let mut cells = Vec::with_capacity(self.projection.len());
                for i in 0..self.projection.len() {
                    cells.push(row.get::<_, Cell>(i)?);
                }
                self.buffered = Some(cells);
            }
            None => self.close(),
        }
        Ok(())
    }
}

/// A transient typed view over one row. Each getter validates the
/// requested column's declared type and resolves its position in the
/// originating select's projection.
pub struct DataRow<'a> {
    cells: &'a [Cell],
    projection: &'a [Column],
}

impl<'a> DataRow<'a> {
    fn cell(&self, name: &str, used: DataType) -> DbResult<&Cell> {
        let (index, column) = self
            .projection
            .iter()
            .enumerate()
            .find(|(_, c)| c.matches(name))
            .ok_or_else(|| DbError::NotProjected(name.to_string()))?;
        column.check_type(used)?;
        Ok(&self.cells[index])
    }

    fn integer_cell(&self, name: &str, used: DataType) -> DbResult<i64> {
        match self.cell(name, used)? {
            Cell::Integer(v) => Ok(*v),
            other => Err(decode_error(name, other)),
        }
    }

    fn text_cell(&self, name: &str, used: DataType) -> DbResult<String> {
        match self.cell(name, used)? {
            Cell::Text(s) => Ok(s.clone()),
            other => Err(decode_error(name, other)),
        }
    }

    pub fn get_id(&self, name: &str) -> DbResult<i64> {
        self.integer_cell(name, DataType::Id)
    }

    pub fn get_string(&self, name: &str) -> DbResult<String> {
        self.text_cell(name, DataType::Str)
    }

    pub fn get_bool(&self, name: &str) -> DbResult<bool> {
        Ok(self.integer_cell(name, DataType::Bool)? != 0)
    }

    pub fn get_byte(&self, name: &str) -> DbResult<i8> {
        let v = self.integer_cell(name, DataType::Byte)?;
        i8::try_from(v).map_err(|_| DbError::Decode(format!("byte cell '{name}' out of range")))
    }

    pub fn get_short(&self, name: &str) -> DbResult<i16> {
        let v = self.integer_cell(name, DataType::Short)?;
        i16::try_from(v).map_err(|_| DbError::Decode(format!("short cell '{name}' out of range")))
    }

    pub fn get_int(&self, name: &str) -> DbResult<i32> {
        let v = self.integer_cell(name, DataType::Int)?;
        i32::try_from(v).map_err(|_| DbError::Decode(format!("int cell '{name}' out of range")))
    }

    pub fn get_long(&self, name: &str) -> DbResult<i64> {
        self.integer_cell(name, DataType::Long)
    }

    pub fn get_float(&self, name: &str) -> DbResult<f32> {
        match self.cell(name, DataType::Float)? {
            Cell::Real(v) => Ok(*v as f32),
            Cell::Integer(v) => Ok(*v as f32),
            other => Err(decode_error(name, other)),
        }
    }

    pub fn get_double(&self, name: &str) -> DbResult<f64> {
        match self.cell(name, DataType::Double)? {
            Cell::Real(v) => Ok(*v),
            Cell::Integer(v) => Ok(*v as f64),
            other => Err(decode_error(name, other)),
        }
    }

    pub fn get_bytes(&self, name: &str) -> DbResult<Vec<u8>> {
        let text = self.text_cell(name, DataType::Bytes)?;
        spinoza_types::base64::decode(&text)
            .ok_or_else(|| DbError::Decode(format!("cell '{name}' is not valid base64")))
    }

    pub fn get_int_array(&self, name: &str) -> DbResult<Vec<i32>> {
        let text = self.text_cell(name, DataType::IntArray)?;
        let bytes = spinoza_types::base64::decode(&text)
            .ok_or_else(|| DbError::Decode(format!("cell '{name}' is not valid base64")))?;
        value::int_array_from_bytes(&bytes)
            .ok_or_else(|| DbError::Decode(format!("cell '{name}' has a truncated int array")))
    }

    pub fn get_calendar(&self, name: &str) -> DbResult<OffsetDateTime> {
        let millis = self.integer_cell(name, DataType::Calendar)?;
        value::from_epoch_millis(millis)
            .ok_or_else(|| DbError::Decode(format!("calendar cell '{name}' out of range")))
    }

    pub fn get_date(&self, name: &str) -> DbResult<Date> {
        let text = self.text_cell(name, DataType::Date)?;
        value::parse_date(&text)
            .ok_or_else(|| DbError::Decode(format!("cell '{name}' is not an ISO date")))
    }

    pub fn get_time(&self, name: &str) -> DbResult<Time> {
        let text = self.text_cell(name, DataType::Time)?;
        value::parse_time(&text)
            .ok_or_else(|| DbError::Decode(format!("cell '{name}' is not an ISO time")))
    }

    /// Decode an enum cell through the caller's [`DbEnum`] codec. The
    /// serialized tag must equal `E::TAG`.
    pub fn get_enum<E: DbEnum>(&self, name: &str) -> DbResult<E> {
        let text = self.text_cell(name, DataType::Enum)?;
        let (tag, constant) = enum_codec::split_serialized(&text)
            .ok_or_else(|| DbError::Decode(format!("enum cell '{name}' has no tag")))?;
        if tag != E::TAG {
            return Err(DbError::Decode(format!(
                "enum cell '{name}' has tag '{tag}', expected '{}'",
                E::TAG
            )));
        }
        E::from_constant(constant).ok_or_else(|| {
            DbError::Decode(format!("enum cell '{name}' has unknown constant '{constant}'"))
        })
    }
}

fn decode_error(name: &str, cell: &Cell) -> DbError {
    DbError::Decode(format!("cell '{name}' holds unexpected engine value {cell:?}"))
}
