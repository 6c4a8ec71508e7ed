use crate::bind::TableBindSet;
use crate::catalog::ColumnIndex;
use crate::driver::{ErrorTranslator, StatementGuard, StatementHandle};
use crate::error::{DalError, DalResult};

/// One statement handle and the bind set receiving its rows.
#[derive(Debug)]
struct CursorLeg {
    handle: StatementGuard,
    bind: Option<TableBindSet>,
    columns: Vec<ColumnIndex>,
}

impl CursorLeg {
    fn new(handle: Box<dyn StatementHandle>, bind: Option<TableBindSet>, columns: Vec<ColumnIndex>) -> Self {
        Self {
            handle: StatementGuard::new(handle),
            bind,
            columns,
        }
    }

    fn advance(&mut self) -> DalResult<()> {
        if let Some(bind) = self.bind.as_mut() {
            bind.reset_output_buffers();
        }
        let row = self.handle.fetch().map_err(ErrorTranslator::to_dal_error)?;
        let Some(row) = row else {
            return Err(DalError::RecordNoMore);
        };
        if let Some(bind) = self.bind.as_mut() {
            bind.fill_from_row(&self.columns, row)?;
            bind.copy_result_to_app()?;
        }
        Ok(())
    }
}

/// Iterator over the rows of one query, or of two queries walked in
/// lockstep. The SQL of a paired cursor orders both sides identically; the
/// cursor itself does no correlation.
///
/// Dropping an unclosed cursor releases handle 2, then handle 1.
#[derive(Debug)]
pub struct Cursor {
    second: Option<CursorLeg>,
    first: CursorLeg,
}

impl Cursor {
    pub(crate) fn single(
        handle: Box<dyn StatementHandle>,
        bind: Option<TableBindSet>,
        columns: Vec<ColumnIndex>,
    ) -> Self {
        Self {
            second: None,
            first: CursorLeg::new(handle, bind, columns),
        }
    }

    pub(crate) fn paired(
        first: (Box<dyn StatementHandle>, Option<TableBindSet>, Vec<ColumnIndex>),
        second: (Box<dyn StatementHandle>, Option<TableBindSet>, Vec<ColumnIndex>),
    ) -> Self {
        Self {
            second: Some(CursorLeg::new(second.0, second.1, second.2)),
            first: CursorLeg::new(first.0, first.1, first.2),
        }
    }

    pub fn is_paired(&self) -> bool {
        self.second.is_some()
    }

    /// Bind set of handle 1 (`0`) or handle 2 (`1`).
    pub fn bind(&self, leg: usize) -> Option<&TableBindSet> {
        match leg {
            0 => self.first.bind.as_ref(),
            1 => self.second.as_ref().and_then(|l| l.bind.as_ref()),
            _ => None,
        }
    }

    /// Moves to the next row and copies it into the bound output cells.
    /// Handle 2 is only fetched once handle 1 produced a row.
    pub fn get_next(&mut self) -> DalResult<()> {
        self.first.advance()?;
        if let Some(second) = self.second.as_mut() {
            second.advance()?;
        }
        Ok(())
    }

    /// Releases handle 2 then handle 1 and hands back the bind sets unless
    /// `delete_bind` is set. When both releases fail the handle-1 error is
    /// returned, unless handle 1 had no live handle.
    pub fn close(mut self, delete_bind: bool) -> DalResult<Vec<TableBindSet>> {
        let second = self.second.as_mut().map(|leg| leg.handle.release());
        let first = self.first.handle.release();
        let released = match (first, second) {
            (Err(e1), _) => Err(e1),
            (Ok(_), Some(Err(e2))) => Err(e2),
            (Ok(false), _) => {
                return Err(DalError::InvalidCursor("handle 1 was already released".into()));
            }
            (Ok(true), _) => Ok(()),
        };
        released.map_err(ErrorTranslator::to_dal_error)?;
        if delete_bind {
            return Ok(Vec::new());
        }
        let mut binds = Vec::with_capacity(2);
        binds.extend(self.first.bind.take());
        if let Some(leg) = self.second.as_mut() {
            binds.extend(leg.bind.take());
        }
        Ok(binds)
    }
}
