use crate::catalog::ColumnIndex;
use crate::catalog::types::{AppType, Value};
use parking_lot::Mutex;
use std::sync::Arc;

/// Output slot shared between the caller and a bind set. Fetched values are
/// copied here by `TableBindSet::copy_result_to_app`.
#[derive(Debug, Clone, Default)]
pub struct ValueCell(Arc<Mutex<Option<Value>>>);

impl ValueCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Value> {
        self.0.lock().clone()
    }

    pub fn take(&self) -> Option<Value> {
        self.0.lock().take()
    }

    pub(crate) fn set(&self, value: Option<Value>) {
        *self.0.lock() = value;
    }

    pub fn get_i64(&self) -> Option<i64> {
        self.get().and_then(|v| v.as_i64())
    }

    pub fn get_text(&self) -> Option<String> {
        self.get().and_then(|v| v.as_str().map(str::to_owned))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoClass {
    Input,
    Output,
    Match,
}

impl IoClass {
    pub(crate) fn slot_name(self) -> &'static str {
        match self {
            IoClass::Input | IoClass::Output => "input/output",
            IoClass::Match => "match",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IoDirection {
    #[default]
    None,
    InputOnly,
    OutputOnly,
    MatchOnly,
    InputAndMatch,
    OutputAndMatch,
}

impl IoDirection {
    /// Next state after binding `class`, or `None` if that class is taken.
    pub fn with(self, class: IoClass) -> Option<IoDirection> {
        let next = match (self, class) {
            (IoDirection::None, IoClass::Input) => IoDirection::InputOnly,
            (IoDirection::None, IoClass::Output) => IoDirection::OutputOnly,
            (IoDirection::None, IoClass::Match) => IoDirection::MatchOnly,
            (IoDirection::InputOnly, IoClass::Match) => IoDirection::InputAndMatch,
            (IoDirection::OutputOnly, IoClass::Match) => IoDirection::OutputAndMatch,
            (IoDirection::MatchOnly, IoClass::Input) => IoDirection::InputAndMatch,
            (IoDirection::MatchOnly, IoClass::Output) => IoDirection::OutputAndMatch,
            _ => return None,
        };
        Some(next)
    }

    pub fn has_input(self) -> bool {
        matches!(self, IoDirection::InputOnly | IoDirection::InputAndMatch)
    }

    pub fn has_output(self) -> bool {
        matches!(self, IoDirection::OutputOnly | IoDirection::OutputAndMatch)
    }

    pub fn has_match(self) -> bool {
        matches!(
            self,
            IoDirection::MatchOnly | IoDirection::InputAndMatch | IoDirection::OutputAndMatch
        )
    }
}

#[derive(Debug, Clone)]
pub(crate) enum IoSlot {
    Input(Value),
    Output(ValueCell),
}

/// Binding state of one column.
#[derive(Debug, Clone)]
pub struct ColumnBindDescriptor {
    pub(crate) column: ColumnIndex,
    pub(crate) io: IoDirection,
    pub(crate) app_type: AppType,
    pub(crate) array_size: usize,
    pub(crate) in_out: Option<IoSlot>,
    pub(crate) match_value: Option<Value>,
    pub(crate) driver_buffer: Option<Value>,
    pub(crate) fetched: bool,
    pub(crate) effective_len: usize,
}

impl ColumnBindDescriptor {
    pub(crate) fn new(column: ColumnIndex, app_type: AppType, array_size: usize) -> Self {
        Self {
            column,
            io: IoDirection::None,
            app_type,
            array_size,
            in_out: None,
            match_value: None,
            driver_buffer: None,
            fetched: false,
            effective_len: 0,
        }
    }

    pub fn column(&self) -> ColumnIndex {
        self.column
    }

    pub fn io_direction(&self) -> IoDirection {
        self.io
    }

    pub fn app_type(&self) -> AppType {
        self.app_type
    }

    pub fn array_size(&self) -> usize {
        self.array_size
    }

    pub fn effective_len(&self) -> usize {
        self.effective_len
    }

    pub fn input_value(&self) -> Option<&Value> {
        match &self.in_out {
            Some(IoSlot::Input(v)) => Some(v),
            _ => None,
        }
    }

    pub fn match_value(&self) -> Option<&Value> {
        self.match_value.as_ref()
    }

    pub(crate) fn output_cell(&self) -> Option<&ValueCell> {
        match &self.in_out {
            Some(IoSlot::Output(cell)) => Some(cell),
            _ => None,
        }
    }

    /// Value last stored by the driver for this column.
    pub fn driver_value(&self) -> Option<&Value> {
        self.driver_buffer.as_ref()
    }
}
