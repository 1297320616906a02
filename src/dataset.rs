use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::domain::{
    DayRecord, DaySummaryEntry, DetailRecord, MAX_RECORD_SECONDS, MAX_YEAR, MIN_YEAR,
    is_supported_date,
};

const NAIVE_TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// A record that could not be read; it is skipped rather than aborting the load.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedRecord {
    #[error("{location}: expected an object")]
    NotAnObject { location: String },
    #[error("{location}: missing `{field}`")]
    MissingField {
        location: String,
        field: &'static str,
    },
    #[error("{location}: invalid `{field}`: {reason}")]
    InvalidField {
        location: String,
        field: &'static str,
        reason: String,
    },
}

#[derive(Debug, Clone, Default)]
pub struct ParseReport {
    pub dataset: Dataset,
    pub skipped: Vec<MalformedRecord>,
}

/// Day records sorted by date, one per calendar day, summaries computed once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    days: Vec<DayRecord>,
}

impl Dataset {
    pub fn from_details(details: Vec<DetailRecord>) -> Self {
        let mut builder = DatasetBuilder::default();
        for detail in details {
            builder.add_detail(detail);
        }
        builder.finish()
    }

    pub fn from_days(days: Vec<DayRecord>) -> Self {
        let mut builder = DatasetBuilder::default();
        for day in days {
            builder.add_day(day.date, day.details, Some(day.summary), Some(day.total));
        }
        builder.finish()
    }

    /// Reads detail and day records leniently; malformed ones end up in `skipped`.
    pub fn from_values(values: &[Value]) -> ParseReport {
        let mut builder = DatasetBuilder::default();
        let mut skipped = Vec::new();

        for (index, value) in values.iter().enumerate() {
            let location = format!("record {index}");
            let Some(object) = value.as_object() else {
                skipped.push(MalformedRecord::NotAnObject { location });
                continue;
            };

            if object.contains_key("details") || object.contains_key("summary") {
                match parse_day(object, &location, &mut skipped) {
                    Ok(day) => builder.add_day(day.date, day.details, day.summary, day.total),
                    Err(err) => skipped.push(err),
                }
            } else {
                match parse_detail(object, &location) {
                    Ok(detail) => builder.add_detail(detail),
                    Err(err) => skipped.push(err),
                }
            }
        }

        for record in &skipped {
            warn!(%record, "skipping malformed record");
        }

        ParseReport {
            dataset: builder.finish(),
            skipped,
        }
    }

    pub fn days(&self) -> &[DayRecord] {
        &self.days
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        self.days.first().map(|day| day.date)
    }

    pub fn last_day(&self) -> Option<NaiveDate> {
        self.days.last().map(|day| day.date)
    }

    pub fn day(&self, date: NaiveDate) -> Option<&DayRecord> {
        self.days
            .binary_search_by_key(&date, |day| day.date)
            .ok()
            .map(|index| &self.days[index])
    }

    pub fn days_between(&self, start: NaiveDate, end: NaiveDate) -> &[DayRecord] {
        let from = self.days.partition_point(|day| day.date < start);
        let to = self.days.partition_point(|day| day.date <= end);
        if from >= to {
            return &[];
        }
        &self.days[from..to]
    }

    /// One record per calendar day in `[start, end]`, with empty days filled in.
    pub fn calendar(&self, start: NaiveDate, end: NaiveDate) -> Vec<DayRecord> {
        let mut known = self.days_between(start, end).iter().peekable();
        let mut cells = Vec::new();
        let mut cursor = start;
        while cursor <= end {
            match known.peek() {
                Some(day) if day.date == cursor => {
                    cells.push((*day).clone());
                    known.next();
                }
                _ => cells.push(DayRecord::empty(cursor)),
            }
            cursor += Duration::days(1);
        }
        cells
    }

    /// Project names ordered by overall tracked time, then by name.
    pub fn project_names(&self) -> Vec<String> {
        let mut totals: HashMap<&str, u64> = HashMap::new();
        for day in &self.days {
            for entry in &day.summary {
                let total = totals.entry(entry.name.as_str()).or_insert(0);
                *total = total.saturating_add(entry.value);
            }
        }

        let mut rows = totals.into_iter().collect::<Vec<_>>();
        rows.sort_by(|left, right| right.1.cmp(&left.1).then_with(|| left.0.cmp(right.0)));
        rows.into_iter().map(|(name, _)| name.to_string()).collect()
    }
}

struct ParsedDay {
    date: NaiveDate,
    details: Vec<DetailRecord>,
    summary: Option<Vec<DaySummaryEntry>>,
    total: Option<u64>,
}

#[derive(Default)]
struct DayAccumulator {
    details: Vec<DetailRecord>,
    supplied_summary: Option<Vec<DaySummaryEntry>>,
    supplied_total: Option<u64>,
    sources: usize,
    has_loose_details: bool,
}

#[derive(Default)]
struct DatasetBuilder {
    days: BTreeMap<NaiveDate, DayAccumulator>,
}

impl DatasetBuilder {
    fn add_detail(&mut self, detail: DetailRecord) {
        if !is_supported_date(detail.day()) {
            warn!(date = %detail.date, "dropping detail outside the calendar range");
            return;
        }
        let day = self.days.entry(detail.day()).or_default();
        if !day.has_loose_details {
            day.has_loose_details = true;
            day.sources += 1;
        }
        day.details.push(detail);
    }

    fn add_day(
        &mut self,
        date: NaiveDate,
        details: Vec<DetailRecord>,
        summary: Option<Vec<DaySummaryEntry>>,
        total: Option<u64>,
    ) {
        if !is_supported_date(date) {
            warn!(%date, "dropping day outside the calendar range");
            return;
        }
        let day = self.days.entry(date).or_default();
        day.sources += 1;
        day.details.extend(details);
        if summary.is_some() {
            day.supplied_summary = summary;
            day.supplied_total = total;
        }
    }

    fn finish(self) -> Dataset {
        let days = self
            .days
            .into_iter()
            .map(|(date, day)| finish_day(date, day))
            .collect();
        Dataset { days }
    }
}

fn finish_day(date: NaiveDate, mut day: DayAccumulator) -> DayRecord {
    day.details.sort_by_key(|detail| detail.date);

    let summary = match day.supplied_summary {
        Some(summary) if day.sources == 1 => summary,
        _ => return DayRecord::from_details(date, day.details),
    };

    let record = DayRecord::with_summary(date, dedupe_summary(summary), day.details);
    if let Some(total) = day.supplied_total.filter(|total| *total != record.total) {
        warn!(%date, supplied = total, computed = record.total, "replacing inconsistent day total");
    }
    record
}

fn dedupe_summary(summary: Vec<DaySummaryEntry>) -> Vec<DaySummaryEntry> {
    let mut merged: Vec<DaySummaryEntry> = Vec::with_capacity(summary.len());
    for entry in summary {
        match merged.iter_mut().find(|existing| existing.name == entry.name) {
            Some(existing) => existing.value = existing.value.saturating_add(entry.value),
            None => merged.push(entry),
        }
    }
    merged.sort_by(|left, right| right.value.cmp(&left.value));
    merged
}

fn parse_day(
    object: &Map<String, Value>,
    location: &str,
    skipped: &mut Vec<MalformedRecord>,
) -> Result<ParsedDay, MalformedRecord> {
    let date = parse_date_field(object, location)?.date();

    let mut details = Vec::new();
    if let Some(raw_details) = object.get("details") {
        let Some(items) = raw_details.as_array() else {
            return Err(invalid(location, "details", "expected an array"));
        };
        for (index, item) in items.iter().enumerate() {
            let detail_location = format!("{location}.details[{index}]");
            let parsed = item
                .as_object()
                .ok_or_else(|| MalformedRecord::NotAnObject {
                    location: detail_location.clone(),
                })
                .and_then(|detail| parse_detail(detail, &detail_location));
            match parsed {
                Ok(detail) => details.push(detail),
                Err(err) => skipped.push(err),
            }
        }
    }

    let summary = match object.get("summary") {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => {
            let mut entries = Vec::new();
            for (index, item) in items.iter().enumerate() {
                let entry_location = format!("{location}.summary[{index}]");
                let parsed = item
                    .as_object()
                    .ok_or_else(|| MalformedRecord::NotAnObject {
                        location: entry_location.clone(),
                    })
                    .and_then(|entry| {
                        Ok(DaySummaryEntry {
                            name: parse_name(entry, &entry_location)?,
                            value: parse_value(entry, &entry_location)?,
                        })
                    });
                match parsed {
                    Ok(entry) => entries.push(entry),
                    Err(err) => skipped.push(err),
                }
            }
            Some(entries)
        }
        Some(_) => return Err(invalid(location, "summary", "expected an array")),
    };

    let total = match object.get("total") {
        None | Some(Value::Null) => None,
        Some(_) => Some(parse_value_field(object, "total", location)?),
    };

    Ok(ParsedDay {
        date,
        details,
        summary,
        total,
    })
}

fn parse_detail(
    object: &Map<String, Value>,
    location: &str,
) -> Result<DetailRecord, MalformedRecord> {
    Ok(DetailRecord {
        date: parse_date_field(object, location)?,
        name: parse_name(object, location)?,
        value: parse_value(object, location)?,
    })
}

fn parse_name(object: &Map<String, Value>, location: &str) -> Result<String, MalformedRecord> {
    match object.get("name") {
        None | Some(Value::Null) => Err(missing(location, "name")),
        Some(Value::String(name)) if name.trim().is_empty() => {
            Err(invalid(location, "name", "empty project name"))
        }
        Some(Value::String(name)) => Ok(name.clone()),
        Some(_) => Err(invalid(location, "name", "expected a string")),
    }
}

fn parse_value(object: &Map<String, Value>, location: &str) -> Result<u64, MalformedRecord> {
    parse_value_field(object, "value", location)
}

fn parse_value_field(
    object: &Map<String, Value>,
    field: &'static str,
    location: &str,
) -> Result<u64, MalformedRecord> {
    let Some(raw) = object.get(field).filter(|raw| !raw.is_null()) else {
        return Err(missing(location, field));
    };

    let seconds = match (raw.as_u64(), raw.as_f64()) {
        (Some(seconds), _) => seconds,
        (None, Some(seconds)) if seconds.is_finite() && seconds >= 0.0 => {
            seconds.round().min(u64::MAX as f64) as u64
        }
        (None, Some(_)) => return Err(invalid(location, field, "expected non-negative seconds")),
        (None, None) => return Err(invalid(location, field, "expected a number")),
    };

    if seconds > MAX_RECORD_SECONDS {
        return Err(invalid(
            location,
            field,
            format!("{seconds} seconds exceeds the {MAX_RECORD_SECONDS} second limit"),
        ));
    }
    Ok(seconds)
}

fn parse_date_field(
    object: &Map<String, Value>,
    location: &str,
) -> Result<NaiveDateTime, MalformedRecord> {
    let timestamp = match object.get("date") {
        None | Some(Value::Null) => return Err(missing(location, "date")),
        Some(Value::String(raw)) => parse_timestamp(raw).ok_or_else(|| {
            invalid(location, "date", format!("unrecognized timestamp {raw:?}"))
        })?,
        Some(Value::Number(number)) => number
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .map(|timestamp| timestamp.with_timezone(&Local).naive_local())
            .ok_or_else(|| invalid(location, "date", "epoch milliseconds out of range"))?,
        Some(_) => {
            return Err(invalid(location, "date", "expected a string or epoch milliseconds"));
        }
    };

    if !is_supported_date(timestamp.date()) {
        return Err(invalid(
            location,
            "date",
            format!("year {} is outside {MIN_YEAR}..={MAX_YEAR}", timestamp.year()),
        ));
    }
    Ok(timestamp)
}

/// Accepts RFC 3339 (converted to local time), naive timestamps and bare dates.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(timestamp.with_timezone(&Local).naive_local());
    }

    for format in NAIVE_TIMESTAMP_FORMATS {
        if let Ok(timestamp) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(timestamp);
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

fn missing(location: &str, field: &'static str) -> MalformedRecord {
    MalformedRecord::MissingField {
        location: location.to_string(),
        field,
    }
}

fn invalid(location: &str, field: &'static str, reason: impl Into<String>) -> MalformedRecord {
    MalformedRecord::InvalidField {
        location: location.to_string(),
        field,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use crate::domain::{DayRecord, DaySummaryEntry, DetailRecord};

    use super::{Dataset, MalformedRecord, parse_timestamp};

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn groups_detail_records_into_sorted_days() {
        let values = vec![
            json!({"date": "2016-01-02T10:00:00", "name": "A", "value": 60}),
            json!({"date": "2016-01-01T09:00:00", "name": "A", "value": 3600}),
            json!({"date": "2016-01-01T11:00:00", "name": "B", "value": 1800}),
        ];
        let report = Dataset::from_values(&values);
        assert!(report.skipped.is_empty());

        let days = report.dataset.days();
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].date, date(2016, 1, 1));
        assert_eq!(days[0].total, 5400);
        assert_eq!(
            days[0].summary,
            vec![DaySummaryEntry::new("A", 3600), DaySummaryEntry::new("B", 1800)]
        );
        assert_eq!(days[1].total, 60);
    }

    #[test]
    fn skips_malformed_records_and_keeps_going() {
        let values = vec![
            json!({"date": "2016-01-01T09:00:00", "name": "A", "value": 100}),
            json!({"name": "B", "value": 5}),
            json!({"date": "2016-01-01T10:00:00", "value": 5}),
            json!({"date": "2016-01-01T10:00:00", "name": "C"}),
            json!({"date": "2016-01-01T10:00:00", "name": "C", "value": -4}),
            json!("not a record"),
            json!({
                "date": "2016-01-03",
                "details": [
                    {"date": "2016-01-03T08:00:00", "name": "D", "value": 30},
                    {"date": "2016-01-03T09:00:00", "name": "D"}
                ]
            }),
        ];
        let report = Dataset::from_values(&values);

        assert_eq!(report.skipped.len(), 6);
        assert!(matches!(
            report.skipped[0],
            MalformedRecord::MissingField { field: "date", .. }
        ));
        assert!(matches!(
            report.skipped[3],
            MalformedRecord::InvalidField { field: "value", .. }
        ));
        assert!(matches!(report.skipped[4], MalformedRecord::NotAnObject { .. }));

        let days = report.dataset.days();
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].total, 100);
        assert_eq!(days[1].total, 30);
    }

    #[test]
    fn rejects_durations_and_dates_past_the_supported_range() {
        let values = vec![
            json!({"date": "2016-02-29T09:00:00", "name": "A", "value": u64::MAX}),
            json!({"date": "2016-02-29T10:00:00", "name": "A", "value": 1}),
            json!({"date": "2016-02-29T11:00:00", "name": "B", "value": 1e300}),
            json!({"date": 8_210_266_876_799_000_i64, "name": "A", "value": 1}),
            json!({"date": "12016-01-01", "name": "A", "value": 1}),
            json!({
                "date": "2016-03-01",
                "total": u64::MAX,
                "summary": [{"name": "A", "value": 5}]
            }),
        ];
        let report = Dataset::from_values(&values);

        let fields = report
            .skipped
            .iter()
            .map(|record| match record {
                MalformedRecord::InvalidField { field, .. } => *field,
                other => panic!("unexpected skip {other}"),
            })
            .collect::<Vec<_>>();
        assert_eq!(fields, vec!["value", "value", "date", "date", "total"]);
        assert_eq!(report.dataset.days().len(), 1);
        assert_eq!(report.dataset.days()[0].total, 1);
    }

    #[test]
    fn programmatic_records_outside_the_calendar_are_dropped() {
        let far = NaiveDate::from_ymd_opt(262_000, 1, 1).unwrap();
        let dataset = Dataset::from_details(vec![
            DetailRecord::new(far.and_hms_opt(9, 0, 0).unwrap(), "A", 10),
            DetailRecord::new(date(2016, 3, 2).and_hms_opt(9, 0, 0).unwrap(), "A", 20),
        ]);
        assert_eq!(dataset.last_day(), Some(date(2016, 3, 2)));
        assert!(Dataset::from_days(vec![DayRecord::empty(far)]).is_empty());
    }

    #[test]
    fn keeps_a_supplied_summary_but_recomputes_its_total() {
        let values = vec![json!({
            "date": "2016-05-04",
            "total": 999,
            "summary": [{"name": "A", "value": 10}, {"name": "B", "value": 20}],
            "details": []
        })];
        let report = Dataset::from_values(&values);
        let day = &report.dataset.days()[0];
        assert_eq!(day.total, 30);
        assert_eq!(day.summary[0], DaySummaryEntry::new("B", 20));
    }

    #[test]
    fn merges_duplicate_days_from_their_details() {
        let day = |hour: u32, name: &str, value: u64| {
            DetailRecord::new(date(2016, 5, 4).and_hms_opt(hour, 0, 0).unwrap(), name, value)
        };
        let dataset = Dataset::from_days(vec![
            DayRecord::from_details(date(2016, 5, 4), vec![day(9, "A", 10)]),
            DayRecord::from_details(date(2016, 5, 4), vec![day(8, "B", 25)]),
        ]);
        let merged = &dataset.days()[0];
        assert_eq!(dataset.days().len(), 1);
        assert_eq!(merged.total, 35);
        assert_eq!(merged.details[0].name, "B");
    }

    #[test]
    fn calendar_fills_missing_days() {
        let dataset = Dataset::from_details(vec![
            DetailRecord::new(date(2016, 3, 2).and_hms_opt(9, 0, 0).unwrap(), "A", 10),
            DetailRecord::new(date(2016, 3, 5).and_hms_opt(9, 0, 0).unwrap(), "A", 20),
        ]);
        let cells = dataset.calendar(date(2016, 3, 1), date(2016, 3, 6));
        let totals = cells.iter().map(|cell| cell.total).collect::<Vec<_>>();
        assert_eq!(totals, vec![0, 10, 0, 0, 20, 0]);
        assert_eq!(dataset.days_between(date(2016, 3, 3), date(2016, 3, 4)).len(), 0);
        assert_eq!(dataset.days_between(date(2016, 3, 1), date(2016, 3, 31)).len(), 2);
        assert!(dataset.day(date(2016, 3, 5)).is_some());
    }

    #[test]
    fn orders_projects_by_overall_time() {
        let at = |day: u32| date(2016, 3, day).and_hms_opt(9, 0, 0).unwrap();
        let dataset = Dataset::from_details(vec![
            DetailRecord::new(at(1), "small", 10),
            DetailRecord::new(at(1), "big", 100),
            DetailRecord::new(at(2), "mid", 50),
            DetailRecord::new(at(3), "small", 45),
        ]);
        assert_eq!(dataset.project_names(), vec!["big", "small", "mid"]);
    }

    #[test]
    fn parses_the_supported_timestamp_shapes() {
        let expected = date(2016, 1, 1).and_hms_opt(9, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2016-01-01T09:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2016-01-01 09:30:00"), Some(expected));
        assert_eq!(
            parse_timestamp("2016-01-01"),
            date(2016, 1, 1).and_hms_opt(0, 0, 0)
        );
        assert!(parse_timestamp("2016-01-01T09:30:00Z").is_some());
        assert_eq!(parse_timestamp("yesterday"), None);
    }
}
