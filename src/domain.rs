use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

pub const TOOLTIP_PROJECT_LIMIT: usize = 5;

const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_HOUR: u64 = 3600;
const SECONDS_PER_DAY: u64 = 86_400;

/// Longest duration a single record may carry: one leap year.
pub const MAX_RECORD_SECONDS: u64 = SECONDS_PER_DAY * 366;
/// Years every period bucket can be stepped through without leaving chrono's range.
pub const MIN_YEAR: i32 = 1;
pub const MAX_YEAR: i32 = 9999;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailRecord {
    pub date: NaiveDateTime,
    pub name: String,
    pub value: u64,
}

impl DetailRecord {
    pub fn new(date: NaiveDateTime, name: impl Into<String>, value: u64) -> Self {
        Self {
            date,
            name: name.into(),
            value,
        }
    }

    pub fn day(&self) -> NaiveDate {
        self.date.date()
    }

    pub fn end(&self) -> NaiveDateTime {
        self.date + Duration::seconds(self.value.min(MAX_RECORD_SECONDS) as i64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySummaryEntry {
    pub name: String,
    pub value: u64,
}

impl DaySummaryEntry {
    pub fn new(name: impl Into<String>, value: u64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayRecord {
    pub date: NaiveDate,
    pub total: u64,
    pub summary: Vec<DaySummaryEntry>,
    #[serde(default)]
    pub details: Vec<DetailRecord>,
}

impl DayRecord {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            total: 0,
            summary: Vec::new(),
            details: Vec::new(),
        }
    }

    /// Builds the record for one day, deriving the summary from `details`.
    pub fn from_details(date: NaiveDate, details: Vec<DetailRecord>) -> Self {
        let summary = summarize_day(&details);
        Self::with_summary(date, summary, details)
    }

    /// Keeps a caller-supplied summary; `total` is always recomputed from it.
    pub fn with_summary(
        date: NaiveDate,
        summary: Vec<DaySummaryEntry>,
        details: Vec<DetailRecord>,
    ) -> Self {
        let total = summary_total(&summary);
        Self {
            date,
            total,
            summary,
            details,
        }
    }

    pub fn has_data(&self) -> bool {
        self.total > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Year,
    Month,
    Week,
}

impl Period {
    pub fn start_of(self, date: NaiveDate) -> NaiveDate {
        match self {
            Period::Year => date
                .with_ordinal(1)
                .expect("first day of year must be valid"),
            Period::Month => date.with_day(1).expect("first day of month must be valid"),
            Period::Week => start_of_week(date),
        }
    }

    pub fn next_start(self, start: NaiveDate) -> NaiveDate {
        match self {
            Period::Year => start
                .checked_add_months(Months::new(12))
                .expect("next year should exist"),
            Period::Month => start
                .checked_add_months(Months::new(1))
                .expect("next month should exist"),
            Period::Week => start + Duration::days(7),
        }
    }

    pub fn end_of(self, start: NaiveDate) -> NaiveDate {
        self.next_start(start) - Duration::days(1)
    }

    pub fn label(self, start: NaiveDate) -> String {
        match self {
            Period::Year => start.format("%Y").to_string(),
            Period::Month => start.format("%B %Y").to_string(),
            Period::Week => {
                let week = start.iso_week();
                format!("W{:02} {}", week.week(), week.year())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeriodRecord {
    pub date: NaiveDate,
    pub period: Period,
    pub total: u64,
    pub summary: Vec<DaySummaryEntry>,
}

impl PeriodRecord {
    pub fn end(&self) -> NaiveDate {
        self.period.end_of(self.date)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.date <= date && date <= self.end()
    }

    pub fn label(&self) -> String {
        self.period.label(self.date)
    }

    pub fn has_data(&self) -> bool {
        self.total > 0
    }
}

/// Groups one day's details by project and sorts descending; ties keep encounter order.
pub fn summarize_day(details: &[DetailRecord]) -> Vec<DaySummaryEntry> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut summary: Vec<DaySummaryEntry> = Vec::new();

    for detail in details {
        match positions.get(detail.name.as_str()) {
            Some(&index) => {
                summary[index].value = summary[index].value.saturating_add(detail.value);
            }
            None => {
                positions.insert(detail.name.as_str(), summary.len());
                summary.push(DaySummaryEntry::new(detail.name.clone(), detail.value));
            }
        }
    }

    summary.sort_by(|left, right| right.value.cmp(&left.value));
    summary
}

pub fn summarize_period<'a>(
    period: Period,
    start: NaiveDate,
    days: impl IntoIterator<Item = &'a DayRecord>,
) -> PeriodRecord {
    let mut total: u64 = 0;
    let mut merged: HashMap<String, u64> = HashMap::new();

    for day in days {
        total = total.saturating_add(day.total);
        merge_into(&mut merged, &day.summary);
    }

    PeriodRecord {
        date: period.start_of(start),
        period,
        total,
        summary: sort_merged(merged),
    }
}

/// Folds finer periods (weeks) into a coarser one (a month).
pub fn merge_periods<'a>(
    period: Period,
    start: NaiveDate,
    periods: impl IntoIterator<Item = &'a PeriodRecord>,
) -> PeriodRecord {
    let mut total: u64 = 0;
    let mut merged: HashMap<String, u64> = HashMap::new();

    for record in periods {
        total = total.saturating_add(record.total);
        merge_into(&mut merged, &record.summary);
    }

    PeriodRecord {
        date: period.start_of(start),
        period,
        total,
        summary: sort_merged(merged),
    }
}

pub fn bucket_by_year(days: &[DayRecord], start: NaiveDate, end: NaiveDate) -> Vec<PeriodRecord> {
    bucket_by(Period::Year, days, start, end)
}

pub fn bucket_by_month(days: &[DayRecord], start: NaiveDate, end: NaiveDate) -> Vec<PeriodRecord> {
    bucket_by(Period::Month, days, start, end)
}

pub fn bucket_by_week(days: &[DayRecord], start: NaiveDate, end: NaiveDate) -> Vec<PeriodRecord> {
    bucket_by(Period::Week, days, start, end)
}

/// One record per calendar unit touching `[start, end]`, empty units included.
pub fn bucket_by(
    period: Period,
    days: &[DayRecord],
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<PeriodRecord> {
    if end < start {
        return Vec::new();
    }

    let mut grouped: BTreeMap<NaiveDate, Vec<&DayRecord>> = BTreeMap::new();
    for day in days.iter().filter(|day| start <= day.date && day.date <= end) {
        grouped.entry(period.start_of(day.date)).or_default().push(day);
    }

    let mut buckets = Vec::new();
    let mut cursor = period.start_of(start);
    while cursor <= end {
        let members = grouped.remove(&cursor).unwrap_or_default();
        buckets.push(summarize_period(period, cursor, members));
        cursor = period.next_start(cursor);
    }

    buckets
}

pub fn summary_total(summary: &[DaySummaryEntry]) -> u64 {
    summary
        .iter()
        .fold(0, |total: u64, entry| total.saturating_add(entry.value))
}

/// Dates whose year, month and week all have a successor inside chrono's range.
pub fn is_supported_date(date: NaiveDate) -> bool {
    (MIN_YEAR..=MAX_YEAR).contains(&date.year())
}

pub fn max_total(totals: impl IntoIterator<Item = u64>) -> u64 {
    totals.into_iter().max().unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryDigest {
    pub top: Vec<DaySummaryEntry>,
    pub other: Option<u64>,
}

pub fn digest_summary(summary: &[DaySummaryEntry], limit: usize) -> SummaryDigest {
    if summary.len() <= limit {
        return SummaryDigest {
            top: summary.to_vec(),
            other: None,
        };
    }

    SummaryDigest {
        top: summary[..limit].to_vec(),
        other: Some(summary_total(&summary[limit..])),
    }
}

pub fn start_of_week(day: NaiveDate) -> NaiveDate {
    let days_from_monday = day.weekday().number_from_monday() as i64 - 1;
    day - Duration::days(days_from_monday)
}

pub fn format_time(seconds: u64) -> String {
    let hours = seconds / SECONDS_PER_HOUR;
    let minutes = (seconds % SECONDS_PER_HOUR) / SECONDS_PER_MINUTE;

    let mut parts = Vec::new();
    if hours > 0 {
        parts.push(plural(hours, "hour"));
    }
    if minutes > 0 {
        parts.push(plural(minutes, "minute"));
    }
    if parts.is_empty() {
        return plural(seconds, "second");
    }
    parts.join(" ")
}

pub fn format_total(seconds: u64) -> String {
    let days = seconds / SECONDS_PER_DAY;
    let hours = (seconds % SECONDS_PER_DAY) / SECONDS_PER_HOUR;
    let minutes = (seconds % SECONDS_PER_HOUR) / SECONDS_PER_MINUTE;

    let parts = [(days, "day"), (hours, "hour"), (minutes, "minute")]
        .into_iter()
        .filter(|(amount, _)| *amount > 0)
        .map(|(amount, unit)| plural(amount, unit))
        .collect::<Vec<_>>();

    if parts.is_empty() {
        return plural(seconds, "second");
    }
    parts.join(", ")
}

pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / SECONDS_PER_HOUR;
    let minutes = (seconds % SECONDS_PER_HOUR) / SECONDS_PER_MINUTE;
    let seconds = seconds % SECONDS_PER_MINUTE;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

fn plural(amount: u64, unit: &str) -> String {
    if amount == 1 {
        format!("1 {unit}")
    } else {
        format!("{amount} {unit}s")
    }
}

fn merge_into(merged: &mut HashMap<String, u64>, summary: &[DaySummaryEntry]) {
    for entry in summary {
        let value = merged.entry(entry.name.clone()).or_insert(0);
        *value = value.saturating_add(entry.value);
    }
}

fn sort_merged(merged: HashMap<String, u64>) -> Vec<DaySummaryEntry> {
    let mut rows = merged
        .into_iter()
        .map(|(name, value)| DaySummaryEntry { name, value })
        .collect::<Vec<_>>();
    rows.sort_by(|left, right| {
        right
            .value
            .cmp(&left.value)
            .then_with(|| left.name.cmp(&right.name))
    });
    rows
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};
    use pretty_assertions::assert_eq;

    use super::*;

    fn at(year: i32, month: u32, day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, month, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn day_with(date: NaiveDate, projects: &[(&str, u64)]) -> DayRecord {
        let details = projects
            .iter()
            .enumerate()
            .map(|(hour, (name, value))| {
                DetailRecord::new(date.and_hms_opt(hour as u32, 0, 0).unwrap(), *name, *value)
            })
            .collect();
        DayRecord::from_details(date, details)
    }

    #[test]
    fn summarizes_two_projects_on_one_day() {
        let details = vec![
            DetailRecord::new(at(2016, 1, 1, 9), "A", 3600),
            DetailRecord::new(at(2016, 1, 1, 11), "B", 1800),
        ];
        let day = DayRecord::from_details(date(2016, 1, 1), details);
        assert_eq!(
            day.summary,
            vec![DaySummaryEntry::new("A", 3600), DaySummaryEntry::new("B", 1800)]
        );
        assert_eq!(day.total, 5400);
    }

    #[test]
    fn day_summary_conserves_totals_and_sorts_descending() {
        let details = vec![
            DetailRecord::new(at(2016, 3, 2, 8), "docs", 120),
            DetailRecord::new(at(2016, 3, 2, 9), "api", 900),
            DetailRecord::new(at(2016, 3, 2, 10), "docs", 1200),
            DetailRecord::new(at(2016, 3, 2, 11), "infra", 0),
            DetailRecord::new(at(2016, 3, 2, 12), "api", 60),
        ];
        let summary = summarize_day(&details);

        let input_total: u64 = details.iter().map(|detail| detail.value).sum();
        assert_eq!(summary_total(&summary), input_total);
        assert!(summary.windows(2).all(|pair| pair[0].value >= pair[1].value));
        assert_eq!(summary[0], DaySummaryEntry::new("docs", 1320));
        assert_eq!(summary.len(), 3);
    }

    #[test]
    fn day_summary_ties_keep_encounter_order() {
        let details = vec![
            DetailRecord::new(at(2016, 3, 2, 8), "zeta", 600),
            DetailRecord::new(at(2016, 3, 2, 9), "alpha", 600),
            DetailRecord::new(at(2016, 3, 2, 10), "mid", 600),
        ];
        let names = summarize_day(&details)
            .into_iter()
            .map(|entry| entry.name)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn huge_values_saturate_instead_of_overflowing() {
        let day = date(2016, 2, 29);
        let record = day_with(day, &[("api", u64::MAX), ("api", 1), ("docs", 5)]);
        assert_eq!(record.summary[0], DaySummaryEntry::new("api", u64::MAX));
        assert_eq!(record.total, u64::MAX);

        let month = summarize_period(Period::Month, day, [&record, &record]);
        assert_eq!(month.total, u64::MAX);
        let merged = merge_periods(Period::Year, day, [&month, &month]);
        assert_eq!(merged.total, u64::MAX);
        assert_eq!(merged.summary[1], DaySummaryEntry::new("docs", 20));
    }

    #[test]
    fn supported_dates_stop_at_four_digit_years() {
        assert!(is_supported_date(date(9999, 12, 31)));
        assert!(is_supported_date(date(1, 1, 1)));
        assert!(!is_supported_date(date(10_000, 1, 1)));
        assert!(!is_supported_date(date(0, 12, 31)));
        assert_eq!(Period::Year.next_start(date(9999, 1, 1)), date(10_000, 1, 1));
    }

    #[test]
    fn empty_input_summarizes_to_nothing() {
        assert!(summarize_day(&[]).is_empty());
        assert_eq!(max_total(Vec::new()), 0);

        let period = summarize_period(Period::Month, date(2016, 2, 10), Vec::new());
        assert_eq!(period.total, 0);
        assert!(period.summary.is_empty());
        assert_eq!(period.date, date(2016, 2, 1));
    }

    #[test]
    fn weeks_merged_into_a_month_match_the_month_directly() {
        let days = vec![
            day_with(date(2016, 2, 1), &[("A", 100), ("B", 40)]),
            day_with(date(2016, 2, 3), &[("B", 60)]),
            day_with(date(2016, 2, 9), &[("C", 300), ("A", 5)]),
            day_with(date(2016, 2, 17), &[("B", 200)]),
            day_with(date(2016, 2, 29), &[("A", 95), ("C", 1)]),
        ];
        let start = date(2016, 2, 1);
        let end = Period::Month.end_of(start);

        let direct = summarize_period(Period::Month, start, &days);
        let weeks = bucket_by_week(&days, start, end);
        let merged = merge_periods(Period::Month, start, &weeks);

        assert_eq!(merged, direct);
        assert_eq!(direct.total, 801);
        assert_eq!(direct.summary[0], DaySummaryEntry::new("C", 301));
    }

    #[test]
    fn buckets_include_empty_units() {
        let days = vec![
            day_with(date(2015, 6, 1), &[("A", 10)]),
            day_with(date(2017, 2, 1), &[("A", 20)]),
        ];
        let years = bucket_by_year(&days, date(2015, 1, 1), date(2017, 12, 31));
        let totals = years.iter().map(|year| (year.date.year(), year.total)).collect::<Vec<_>>();
        assert_eq!(totals, vec![(2015, 10), (2016, 0), (2017, 20)]);

        let months = bucket_by_month(&days, date(2015, 1, 1), date(2015, 12, 31));
        assert_eq!(months.len(), 12);
        assert_eq!(months.iter().filter(|month| month.has_data()).count(), 1);
    }

    #[test]
    fn buckets_exclude_days_outside_the_range() {
        let days = vec![
            day_with(date(2016, 1, 31), &[("A", 10)]),
            day_with(date(2016, 2, 1), &[("A", 20)]),
        ];
        let weeks = bucket_by_week(&days, date(2016, 2, 1), date(2016, 2, 7));
        assert_eq!(weeks.len(), 1);
        assert_eq!(weeks[0].total, 20);
    }

    #[test]
    fn weeks_start_on_monday() {
        // 2016-01-01 is a Friday; its ISO week starts on 2015-12-28.
        assert_eq!(Period::Week.start_of(date(2016, 1, 1)), date(2015, 12, 28));
        assert_eq!(Period::Week.label(date(2015, 12, 28)), "W53 2015");
        let weeks = bucket_by_week(&[], date(2016, 1, 1), date(2016, 1, 31));
        assert_eq!(weeks.first().map(|week| week.date), Some(date(2015, 12, 28)));
        assert_eq!(weeks.last().map(|week| week.date), Some(date(2016, 1, 25)));
    }

    #[test]
    fn digest_sums_everything_past_the_limit() {
        let summary = (0..8)
            .map(|index| DaySummaryEntry::new(format!("p{index}"), 100 - index))
            .collect::<Vec<_>>();
        let digest = digest_summary(&summary, TOOLTIP_PROJECT_LIMIT);
        assert_eq!(digest.top.len(), 5);
        assert_eq!(digest.other, Some(95 + 94 + 93));

        let short = digest_summary(&summary[..3], TOOLTIP_PROJECT_LIMIT);
        assert_eq!(short.other, None);
        assert_eq!(short.top.len(), 3);
    }

    #[test]
    fn formats_human_readable_durations() {
        assert_eq!(format_time(3600), "1 hour");
        assert_eq!(format_time(5400), "1 hour 30 minutes");
        assert_eq!(format_time(45), "45 seconds");
        assert_eq!(format_total(90_061), "1 day, 1 hour, 1 minute");
        assert_eq!(format_total(7_200), "2 hours");
        assert_eq!(format_duration(3_725), "01:02:05");
    }
}
