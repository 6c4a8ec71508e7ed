pub mod descriptor;

use crate::catalog::types::{AppType, Value};
use crate::catalog::{ColumnIndex, SchemaCatalog, TableIndex};
use crate::error::{DalError, DalResult};
use std::sync::Arc;

pub use descriptor::{ColumnBindDescriptor, IoClass, IoDirection, ValueCell};
use descriptor::IoSlot;

/// Effective length of a record-count output: the count is fetched as an
/// `i64`.
pub const RECORD_COUNT_LEN: usize = std::mem::size_of::<i64>();

/// Per-call column bindings for one table.
///
/// Descriptors are kept sorted by column index, so every list derived from
/// the set (input values, match values, output columns) follows catalog
/// column order.
#[derive(Clone)]
pub struct TableBindSet {
    table: TableIndex,
    catalog: Arc<dyn SchemaCatalog>,
    descriptors: Vec<ColumnBindDescriptor>,
    input_count: usize,
    output_count: usize,
    match_count: usize,
}

impl std::fmt::Debug for TableBindSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableBindSet")
            .field("table", &self.table)
            .field("descriptors", &self.descriptors)
            .field("input_count", &self.input_count)
            .field("output_count", &self.output_count)
            .field("match_count", &self.match_count)
            .finish()
    }
}

impl TableBindSet {
    pub fn new(catalog: Arc<dyn SchemaCatalog>, table: TableIndex) -> DalResult<Self> {
        catalog.check_table(table)?;
        Ok(Self {
            table,
            catalog,
            descriptors: Vec::new(),
            input_count: 0,
            output_count: 0,
            match_count: 0,
        })
    }

    pub fn table(&self) -> TableIndex {
        self.table
    }

    pub fn catalog(&self) -> &Arc<dyn SchemaCatalog> {
        &self.catalog
    }

    pub fn input_count(&self) -> usize {
        self.input_count
    }

    pub fn output_count(&self) -> usize {
        self.output_count
    }

    pub fn match_count(&self) -> usize {
        self.match_count
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn descriptors(&self) -> &[ColumnBindDescriptor] {
        &self.descriptors
    }

    pub fn descriptor(&self, column: ColumnIndex) -> Option<&ColumnBindDescriptor> {
        self.position(column).ok().map(|idx| &self.descriptors[idx])
    }

    pub fn bind_input(
        &mut self,
        column: ColumnIndex,
        app_type: AppType,
        array_size: usize,
        value: impl Into<Value>,
    ) -> DalResult<()> {
        let value = value.into();
        let len = self.validate(column, app_type, array_size, IoClass::Input, Some(&value))?;
        self.attach(column, app_type, array_size, IoClass::Input, len, |d| {
            d.in_out = Some(IoSlot::Input(value));
        })
    }

    pub fn bind_output(
        &mut self,
        column: ColumnIndex,
        app_type: AppType,
        array_size: usize,
        cell: &ValueCell,
    ) -> DalResult<()> {
        let len = self.validate(column, app_type, array_size, IoClass::Output, None)?;
        let cell = cell.clone();
        self.attach(column, app_type, array_size, IoClass::Output, len, |d| {
            d.in_out = Some(IoSlot::Output(cell));
        })
    }

    pub fn bind_match(
        &mut self,
        column: ColumnIndex,
        app_type: AppType,
        array_size: usize,
        value: impl Into<Value>,
    ) -> DalResult<()> {
        let value = value.into();
        let len = self.validate(column, app_type, array_size, IoClass::Match, Some(&value))?;
        self.attach(column, app_type, array_size, IoClass::Match, len, |d| {
            d.match_value = Some(value);
        })
    }

    /// Binds `value` as input using the catalog's type and size for `column`.
    pub fn bind_input_value(&mut self, column: ColumnIndex, value: impl Into<Value>) -> DalResult<()> {
        let (app_type, size) = self.catalog_type(column)?;
        self.bind_input(column, app_type, size, value)
    }

    pub fn bind_match_value(&mut self, column: ColumnIndex, value: impl Into<Value>) -> DalResult<()> {
        let (app_type, size) = self.catalog_type(column)?;
        self.bind_match(column, app_type, size, value)
    }

    pub fn bind_output_cell(&mut self, column: ColumnIndex, cell: &ValueCell) -> DalResult<()> {
        if column.is_record_count() {
            return self.bind_output(column, AppType::Uint32, 1, cell);
        }
        let (app_type, size) = self.catalog_type(column)?;
        self.bind_output(column, app_type, size, cell)
    }

    fn catalog_type(&self, column: ColumnIndex) -> DalResult<(AppType, usize)> {
        self.catalog.check_column(self.table, column)?;
        let app_type = self
            .catalog
            .column_app_type(self.table, column)
            .ok_or(DalError::ColumnOutOfRange {
                table: self.table,
                column,
            })?;
        Ok((app_type, self.catalog.column_array_size(self.table, column)))
    }

    fn validate(
        &self,
        column: ColumnIndex,
        app_type: AppType,
        array_size: usize,
        class: IoClass,
        value: Option<&Value>,
    ) -> DalResult<usize> {
        if array_size == 0 {
            return Err(DalError::InvalidParameter(format!(
                "array size for column {column} must be greater than zero"
            )));
        }
        if column.is_record_count() {
            if class != IoClass::Output || !app_type.is_integral() {
                return Err(DalError::InvalidParameter(
                    "record count column only accepts integral output bindings".into(),
                ));
            }
            return Ok(RECORD_COUNT_LEN);
        }
        self.catalog.check_column(self.table, column)?;
        let expected = self.catalog.column_app_type(self.table, column);
        if expected != Some(app_type) {
            return Err(DalError::InvalidParameter(format!(
                "column {column} of table {} expects {expected:?}, got {app_type:?}",
                self.table
            )));
        }
        match value {
            Some(value) => app_type
                .check_value(value, array_size)
                .map_err(DalError::InvalidParameter),
            None => Ok(array_size),
        }
    }

    /// Finds the descriptor for `column`. `Ok` carries its position, `Err`
    /// the insertion point when the column is not bound yet.
    fn position(&self, column: ColumnIndex) -> Result<usize, usize> {
        self.descriptors
            .binary_search_by_key(&column, ColumnBindDescriptor::column)
    }

    fn attach(
        &mut self,
        column: ColumnIndex,
        app_type: AppType,
        array_size: usize,
        class: IoClass,
        effective_len: usize,
        fill: impl FnOnce(&mut ColumnBindDescriptor),
    ) -> DalResult<()> {
        let idx = match self.position(column) {
            Ok(idx) => idx,
            Err(insert_at) => {
                self.descriptors
                    .insert(insert_at, ColumnBindDescriptor::new(column, app_type, array_size));
                insert_at
            }
        };
        let descriptor = &mut self.descriptors[idx];
        let Some(next) = descriptor.io.with(class) else {
            return Err(DalError::AlreadyBound {
                table: self.table,
                column,
                class: class.slot_name(),
            });
        };
        descriptor.io = next;
        descriptor.effective_len = effective_len;
        fill(descriptor);
        match class {
            IoClass::Input => self.input_count += 1,
            IoClass::Output => self.output_count += 1,
            IoClass::Match => self.match_count += 1,
        }
        debug_assert!(self.counts_consistent());
        Ok(())
    }

    fn counts_consistent(&self) -> bool {
        let count = |f: fn(IoDirection) -> bool| {
            self.descriptors.iter().filter(|d| f(d.io)).count()
        };
        count(IoDirection::has_input) == self.input_count
            && count(IoDirection::has_output) == self.output_count
            && count(IoDirection::has_match) == self.match_count
    }

    /// Drops every binding so columns can be bound again.
    pub fn reset(&mut self) {
        self.descriptors.clear();
        self.input_count = 0;
        self.output_count = 0;
        self.match_count = 0;
    }

    /// Clears driver-side output buffers so a fetch never sees stale data.
    pub fn reset_output_buffers(&mut self) {
        for descriptor in self.descriptors.iter_mut().filter(|d| d.io.has_output()) {
            descriptor.driver_buffer = None;
            descriptor.fetched = false;
        }
    }

    /// Copies fetched driver buffers into the caller's cells.
    pub fn copy_result_to_app(&self) -> DalResult<()> {
        for descriptor in self.descriptors.iter().filter(|d| d.io.has_output()) {
            let Some(cell) = descriptor.output_cell() else {
                return Err(DalError::Internal(format!(
                    "output descriptor for column {} has no cell",
                    descriptor.column
                )));
            };
            if !descriptor.fetched {
                return Err(DalError::Internal(format!(
                    "no fetched data for column {}",
                    descriptor.column
                )));
            }
            cell.set(descriptor.driver_buffer.clone());
        }
        Ok(())
    }

    /// Stores one fetched row. `columns` lists the selected columns in the
    /// order the row carries them; unbound columns are skipped.
    pub(crate) fn fill_from_row(&mut self, columns: &[ColumnIndex], row: Vec<Value>) -> DalResult<()> {
        if columns.len() != row.len() {
            return Err(DalError::Internal(format!(
                "row has {} values for {} selected columns",
                row.len(),
                columns.len()
            )));
        }
        for (column, value) in columns.iter().zip(row) {
            if let Ok(idx) = self.position(*column) {
                let descriptor = &mut self.descriptors[idx];
                if descriptor.io.has_output() {
                    descriptor.driver_buffer = if value.is_null() { None } else { Some(value) };
                    descriptor.fetched = true;
                }
            }
        }
        Ok(())
    }

    pub fn input_value(&self, column: ColumnIndex) -> Option<&Value> {
        self.descriptor(column).and_then(ColumnBindDescriptor::input_value)
    }

    pub fn match_value(&self, column: ColumnIndex) -> Option<&Value> {
        self.descriptor(column).and_then(ColumnBindDescriptor::match_value)
    }

    pub fn input_columns(&self) -> impl Iterator<Item = (ColumnIndex, &Value)> {
        self.descriptors
            .iter()
            .filter_map(|d| d.input_value().map(|v| (d.column, v)))
    }

    pub fn match_columns(&self) -> impl Iterator<Item = (ColumnIndex, &Value)> {
        self.descriptors
            .iter()
            .filter_map(|d| d.match_value().map(|v| (d.column, v)))
    }

    pub fn output_columns(&self) -> Vec<ColumnIndex> {
        self.descriptors
            .iter()
            .filter(|d| d.io.has_output())
            .map(|d| d.column)
            .collect()
    }

    /// Columns a SELECT built from this set returns: the bound outputs, or
    /// every catalog column when nothing is bound for output.
    pub fn selected_columns(&self) -> Vec<ColumnIndex> {
        let bound = self.output_columns();
        if bound.is_empty() {
            self.catalog.columns(self.table)
        } else {
            bound
        }
    }

    /// Copy of the set holding only the match bindings.
    pub fn match_only(&self) -> TableBindSet {
        let mut copy = TableBindSet {
            table: self.table,
            catalog: Arc::clone(&self.catalog),
            descriptors: Vec::with_capacity(self.match_count),
            input_count: 0,
            output_count: 0,
            match_count: 0,
        };
        for d in self.descriptors.iter().filter(|d| d.io.has_match()) {
            let mut m = ColumnBindDescriptor::new(d.column, d.app_type, d.array_size);
            m.io = IoDirection::MatchOnly;
            m.match_value = d.match_value.clone();
            m.effective_len = d.effective_len;
            copy.descriptors.push(m);
            copy.match_count += 1;
        }
        copy
    }
}
