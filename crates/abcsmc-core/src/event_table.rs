//! The scheduled-event table: the binary contract handed to the simulator.
//! Construction normalizes string event labels and calendar dates into plain
//! integers, validates every field, sorts rows into execution order, and
//! retains origin metadata so `to_rows` can render the table back out in its
//! original shape (spec §4.1, §9's "hidden mutable state" redesign note).

use abcsmc_common::{EventKind, Error, Result};
use abcsmc_config::{RawEventKind, RawEventRow, RawTime};
use chrono::NaiveDate;
use nalgebra::DMatrix;

/// A single normalized, validated scheduled event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    pub time: i64,
    pub node: i64,
    pub dest: i64,
    pub n: i64,
    pub proportion: f64,
    pub select: i64,
    pub shift: i64,
}

/// Records whether this table's `time` column started as integers or
/// calendar dates, and the reference day subtracted if so. Replaces the
/// "hidden mutable field" pattern spec §9 flags for re-architecture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeOrigin {
    Integer,
    Date(NaiveDate),
}

/// Records whether this table's `event` column started as integer codes or
/// string labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLabelOrigin {
    Integer,
    Label,
}

/// The non-negative, real-valued `compartments x selectors` matrix `E`.
#[derive(Debug, Clone)]
pub struct SelectMatrix {
    data: DMatrix<f64>,
    row_labels: Vec<String>,
}

impl SelectMatrix {
    pub fn new(data: DMatrix<f64>, row_labels: Vec<String>) -> Result<Self> {
        if row_labels.len() != data.nrows() {
            return Err(Error::EventTable(format!(
                "select matrix has {} rows but {} row labels",
                data.nrows(),
                row_labels.len()
            )));
        }
        if data.iter().any(|v| *v < 0.0 || v.is_nan()) {
            return Err(Error::EventTable("select matrix E must be non-negative".into()));
        }
        Ok(SelectMatrix { data, row_labels })
    }

    pub fn ncols(&self) -> usize {
        self.data.ncols()
    }

    pub fn row_labels(&self) -> &[String] {
        &self.row_labels
    }

    pub fn data(&self) -> &DMatrix<f64> {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.nrows() == 0 || self.data.ncols() == 0
    }
}

/// The integer `compartments x shifts` matrix `N`.
#[derive(Debug, Clone)]
pub struct ShiftMatrix {
    data: DMatrix<i64>,
    row_labels: Vec<String>,
}

impl ShiftMatrix {
    pub fn new(data: DMatrix<i64>, row_labels: Vec<String>) -> Result<Self> {
        if row_labels.len() != data.nrows() {
            return Err(Error::EventTable(format!(
                "shift matrix has {} rows but {} row labels",
                data.nrows(),
                row_labels.len()
            )));
        }
        Ok(ShiftMatrix { data, row_labels })
    }

    pub fn row_labels(&self) -> &[String] {
        &self.row_labels
    }

    pub fn data(&self) -> &DMatrix<i64> {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.nrows() == 0 || self.data.ncols() == 0
    }
}

/// The normalized, time-ordered, validated scheduled-event set plus its
/// auxiliary select/shift matrices (spec §3, §4.1).
#[derive(Debug, Clone)]
pub struct EventTable {
    events: Vec<Event>,
    select: SelectMatrix,
    shift: ShiftMatrix,
    time_origin: TimeOrigin,
    event_label_origin: EventLabelOrigin,
}

fn normalize_kind(raw: &RawEventKind) -> Result<EventKind> {
    match raw {
        RawEventKind::Int(code) => EventKind::from_code(*code)
            .ok_or_else(|| Error::EventTable(format!("event code out of range 0..3: {code}"))),
        RawEventKind::Label(label) => EventKind::from_label(label)
            .ok_or_else(|| Error::EventTable(format!("unknown event label: {label:?}"))),
    }
}

fn validate_event(event: &Event, select_cols: usize) -> Result<()> {
    if event.time <= 0 {
        return Err(Error::EventTable(format!("time must be >= 1, got {}", event.time)));
    }
    if event.node < 1 {
        return Err(Error::EventTable(format!("node must be >= 1, got {}", event.node)));
    }
    if event.kind == EventKind::ExtTransfer && event.dest < 1 {
        return Err(Error::EventTable("dest must be >= 1 for extTrans events".into()));
    }
    if event.n < 0 {
        return Err(Error::EventTable(format!("n must be >= 0, got {}", event.n)));
    }
    if !(0.0..=1.0).contains(&event.proportion) {
        return Err(Error::EventTable(format!(
            "proportion must be in [0,1], got {}",
            event.proportion
        )));
    }
    if event.select < 1 || event.select as usize > select_cols {
        return Err(Error::EventTable(format!(
            "select must be in 1..={select_cols}, got {}",
            event.select
        )));
    }
    if event.kind == EventKind::IntTransfer && event.shift < 1 {
        return Err(Error::EventTable("shift must be >= 1 for intTrans events".into()));
    }
    Ok(())
}

fn sort_key(event: &Event) -> (i64, u8, i64) {
    (event.time, event.kind.code(), event.select)
}

impl EventTable {
    /// Builds and validates a table from the external row format, sorting
    /// rows into `(time, kind, select)` execution order.
    ///
    /// `reference_day` must be supplied iff any row's `time` cell is a
    /// calendar date; it becomes the subtracted time origin.
    pub fn from_raw_rows(
        rows: Vec<RawEventRow>,
        select: SelectMatrix,
        shift: ShiftMatrix,
        reference_day: Option<NaiveDate>,
    ) -> Result<Self> {
        if !select.is_empty() && !shift.is_empty() && select.row_labels() != shift.row_labels() {
            return Err(Error::EventTable(
                "select matrix E and shift matrix N row labels must match".into(),
            ));
        }

        let has_dates = rows.iter().any(|r| matches!(r.time, RawTime::Date(_)));
        let has_labels = rows.iter().any(|r| matches!(r.event, RawEventKind::Label(_)));

        let time_origin = if has_dates {
            let origin = reference_day.ok_or_else(|| {
                Error::EventTable("calendar-date time column requires a reference_day".into())
            })?;
            TimeOrigin::Date(origin)
        } else {
            TimeOrigin::Integer
        };
        let event_label_origin =
            if has_labels { EventLabelOrigin::Label } else { EventLabelOrigin::Integer };

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let kind = normalize_kind(&row.event)?;
            let time = match (&row.time, time_origin) {
                (RawTime::Int(t), TimeOrigin::Integer) => *t,
                (RawTime::Date(d), TimeOrigin::Date(origin)) => (*d - origin).num_days(),
                (RawTime::Int(_), TimeOrigin::Date(_)) | (RawTime::Date(_), TimeOrigin::Integer) => {
                    return Err(Error::EventTable(
                        "time column mixes integers and calendar dates".into(),
                    ))
                }
            };

            let event = Event {
                kind,
                time,
                node: row.node,
                dest: if kind == EventKind::ExtTransfer { row.dest } else { 0 },
                n: row.n,
                proportion: row.proportion,
                select: row.select,
                shift: if kind == EventKind::IntTransfer { row.shift } else { 0 },
            };
            validate_event(&event, select.ncols())?;
            events.push(event);
        }

        events.sort_by_key(sort_key);

        Ok(EventTable { events, select, shift, time_origin, event_label_origin })
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn select(&self) -> &SelectMatrix {
        &self.select
    }

    pub fn shift(&self) -> &ShiftMatrix {
        &self.shift
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Renders the table back into the external row format, consulting the
    /// stored origin metadata rather than any hidden field (spec §9).
    pub fn to_rows(&self) -> Vec<RawEventRow> {
        self.events
            .iter()
            .map(|event| {
                let event_cell = match self.event_label_origin {
                    EventLabelOrigin::Integer => RawEventKind::Int(event.kind.code()),
                    EventLabelOrigin::Label => RawEventKind::Label(event.kind.label().to_string()),
                };
                let time_cell = match self.time_origin {
                    TimeOrigin::Integer => RawTime::Int(event.time),
                    TimeOrigin::Date(origin) => {
                        RawTime::Date(origin + chrono::Duration::days(event.time))
                    }
                };
                RawEventRow {
                    event: event_cell,
                    time: time_cell,
                    node: event.node,
                    dest: event.dest,
                    n: event.n,
                    proportion: event.proportion,
                    select: event.select,
                    shift: event.shift,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_matrices(ncols: usize) -> (SelectMatrix, ShiftMatrix) {
        let select = SelectMatrix::new(DMatrix::from_element(1, ncols, 1.0), vec!["c1".into()]).unwrap();
        let shift = ShiftMatrix::new(DMatrix::from_element(1, 1, 0i64), vec!["c1".into()]).unwrap();
        (select, shift)
    }

    fn row(event: i64, time: i64, node: i64, select: i64) -> RawEventRow {
        RawEventRow {
            event: RawEventKind::Int(event as u8),
            time: RawTime::Int(time),
            node,
            dest: 0,
            n: 1,
            proportion: 0.0,
            select,
            shift: 0,
        }
    }

    #[test]
    fn deterministic_event_sort() {
        let (select, shift) = empty_matrices(2);
        let rows = vec![row(0, 3, 1, 1), row(1, 1, 1, 2), row(0, 1, 1, 1), row(0, 1, 1, 2)];
        let table = EventTable::from_raw_rows(rows, select, shift, None).unwrap();
        let keys: Vec<_> = table.events().iter().map(sort_key).collect();
        assert_eq!(keys, vec![(1, 0, 1), (1, 0, 2), (1, 1, 2), (3, 0, 1)]);
    }

    #[test]
    fn round_trip_preserves_fields_and_order() {
        let (select, shift) = empty_matrices(2);
        let rows = vec![row(0, 3, 1, 1), row(1, 1, 1, 2)];
        let table = EventTable::from_raw_rows(rows, select, shift, None).unwrap();
        let rendered = table.to_rows();
        let (select, shift) = empty_matrices(2);
        let roundtripped = EventTable::from_raw_rows(rendered, select, shift, None).unwrap();
        assert_eq!(table.events(), roundtripped.events());
    }

    #[test]
    fn rejects_nonpositive_time() {
        let (select, shift) = empty_matrices(1);
        let rows = vec![row(0, 0, 1, 1)];
        assert!(EventTable::from_raw_rows(rows, select, shift, None).is_err());
    }

    #[test]
    fn rejects_select_out_of_range() {
        let (select, shift) = empty_matrices(1);
        let rows = vec![row(0, 1, 1, 5)];
        assert!(EventTable::from_raw_rows(rows, select, shift, None).is_err());
    }

    #[test]
    fn ext_transfer_requires_dest() {
        let (select, shift) = empty_matrices(1);
        let mut r = row(3, 1, 1, 1);
        r.dest = 0;
        assert!(EventTable::from_raw_rows(vec![r], select, shift, None).is_err());
    }

    #[test]
    fn int_transfer_requires_shift() {
        let (select, shift) = empty_matrices(1);
        let mut r = row(2, 1, 1, 1);
        r.shift = 0;
        assert!(EventTable::from_raw_rows(vec![r], select, shift, None).is_err());
    }

    #[test]
    fn calendar_dates_require_reference_day() {
        let (select, shift) = empty_matrices(1);
        let rows = vec![RawEventRow {
            event: RawEventKind::Int(0),
            time: RawTime::Date(NaiveDate::from_ymd_opt(2020, 1, 2).unwrap()),
            node: 1,
            dest: 0,
            n: 1,
            proportion: 0.0,
            select: 1,
            shift: 0,
        }];
        assert!(EventTable::from_raw_rows(rows.clone(), select.clone(), shift.clone(), None).is_err());
        let origin = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let table = EventTable::from_raw_rows(rows, select, shift, Some(origin)).unwrap();
        assert_eq!(table.events()[0].time, 1);
    }

    #[test]
    fn select_matrix_row_mismatch_with_shift_is_rejected() {
        let select =
            SelectMatrix::new(DMatrix::from_element(1, 1, 1.0), vec!["a".into()]).unwrap();
        let shift = ShiftMatrix::new(DMatrix::from_element(1, 1, 0i64), vec!["b".into()]).unwrap();
        let rows = vec![row(0, 1, 1, 1)];
        assert!(EventTable::from_raw_rows(rows, select, shift, None).is_err());
    }
}
