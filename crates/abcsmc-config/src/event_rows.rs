//! Reads the row-oriented scheduled-event table format described in spec §6:
//! exactly the columns `event, time, node, dest, n, proportion, select, shift`,
//! with `event` as an integer or fixed string label and `time` as an integer
//! or calendar date. This module only parses the external representation;
//! normalization, sorting, and invariant validation happen in
//! `abcsmc-core::EventTable::from_rows`.

use abcsmc_common::{Error, Result};
use chrono::NaiveDate;
use csv::ReaderBuilder;

const EXPECTED_HEADERS: [&str; 8] =
    ["event", "time", "node", "dest", "n", "proportion", "select", "shift"];

/// The `event` column cell, before remapping to `EventKind`.
#[derive(Debug, Clone, PartialEq)]
pub enum RawEventKind {
    Int(u8),
    Label(String),
}

/// The `time` column cell, before origin-day subtraction.
#[derive(Debug, Clone, PartialEq)]
pub enum RawTime {
    Int(i64),
    Date(NaiveDate),
}

/// One unvalidated row from the external table format.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEventRow {
    pub event: RawEventKind,
    pub time: RawTime,
    pub node: i64,
    pub dest: i64,
    pub n: i64,
    pub proportion: f64,
    pub select: i64,
    pub shift: i64,
}

fn parse_event(cell: &str) -> Result<RawEventKind> {
    if let Ok(code) = cell.parse::<u8>() {
        return Ok(RawEventKind::Int(code));
    }
    Ok(RawEventKind::Label(cell.to_string()))
}

fn parse_time(cell: &str) -> Result<RawTime> {
    if let Ok(i) = cell.parse::<i64>() {
        return Ok(RawTime::Int(i));
    }
    NaiveDate::parse_from_str(cell, "%Y-%m-%d")
        .map(RawTime::Date)
        .map_err(|_| Error::EventTable(format!("unparseable time cell: {cell:?}")))
}

fn parse_int(cell: &str, field: &str) -> Result<i64> {
    cell.trim()
        .parse::<i64>()
        .map_err(|_| Error::EventTable(format!("non-integer {field} cell: {cell:?}")))
}

fn parse_real(cell: &str, field: &str) -> Result<f64> {
    cell.trim()
        .parse::<f64>()
        .map_err(|_| Error::EventTable(format!("non-numeric {field} cell: {cell:?}")))
}

/// Parses a CSV document with a header row matching `EXPECTED_HEADERS`
/// (order-insensitive) into raw rows.
pub fn read_csv(source: &str) -> Result<Vec<RawEventRow>> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(source.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| Error::EventTable(format!("could not read header row: {e}")))?
        .iter()
        .map(str::to_string)
        .collect();

    for expected in EXPECTED_HEADERS {
        if !headers.iter().any(|h| h == expected) {
            return Err(Error::EventTable(format!("missing required column {expected:?}")));
        }
    }

    let col = |headers: &[String], name: &str| {
        headers.iter().position(|h| h == name).expect("checked above")
    };
    let idx_event = col(&headers, "event");
    let idx_time = col(&headers, "time");
    let idx_node = col(&headers, "node");
    let idx_dest = col(&headers, "dest");
    let idx_n = col(&headers, "n");
    let idx_proportion = col(&headers, "proportion");
    let idx_select = col(&headers, "select");
    let idx_shift = col(&headers, "shift");

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| Error::EventTable(format!("malformed row: {e}")))?;
        let get = |idx: usize| record.get(idx).unwrap_or_default();

        rows.push(RawEventRow {
            event: parse_event(get(idx_event))?,
            time: parse_time(get(idx_time))?,
            node: parse_int(get(idx_node), "node")?,
            dest: parse_int(get(idx_dest), "dest")?,
            n: parse_int(get(idx_n), "n")?,
            proportion: parse_real(get(idx_proportion), "proportion")?,
            select: parse_int(get(idx_select), "select")?,
            shift: parse_int(get(idx_shift), "shift")?,
        });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_integer_event_and_time() {
        let csv = "event,time,node,dest,n,proportion,select,shift\n1,5,1,0,2,0.0,1,0\n";
        let rows = read_csv(csv).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].event, RawEventKind::Int(1));
        assert_eq!(rows[0].time, RawTime::Int(5));
    }

    #[test]
    fn reads_label_event_and_calendar_date() {
        let csv =
            "event,time,node,dest,n,proportion,select,shift\nintTrans,2020-01-15,1,0,0,0.5,1,2\n";
        let rows = read_csv(csv).unwrap();
        assert_eq!(rows[0].event, RawEventKind::Label("intTrans".to_string()));
        assert_eq!(rows[0].time, RawTime::Date(NaiveDate::from_ymd_opt(2020, 1, 15).unwrap()));
    }

    #[test]
    fn columns_may_appear_in_any_order() {
        let csv = "select,shift,event,time,node,dest,n,proportion\n1,0,0,3,1,0,2,0.0\n";
        let rows = read_csv(csv).unwrap();
        assert_eq!(rows[0].select, 1);
        assert_eq!(rows[0].node, 1);
    }

    #[test]
    fn missing_column_is_rejected() {
        let csv = "event,time,node,dest,n,proportion,select\n0,1,1,0,1,0.0,1\n";
        assert!(read_csv(csv).is_err());
    }

    #[test]
    fn unparseable_time_is_rejected() {
        let csv = "event,time,node,dest,n,proportion,select,shift\n0,not-a-date,1,0,1,0.0,1,0\n";
        assert!(read_csv(csv).is_err());
    }
}
