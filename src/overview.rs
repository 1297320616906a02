use chrono::{Datelike, NaiveDate};

use crate::dataset::Dataset;
use crate::domain::{
    DayRecord, DetailRecord, Period, PeriodRecord, bucket_by_month, bucket_by_week, bucket_by_year,
    max_total, summarize_period,
};
use crate::navigation::{Level, View};
use crate::settings::ConfigError;

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalView {
    pub years: Vec<PeriodRecord>,
    pub max_total: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct YearView {
    pub year: PeriodRecord,
    pub days: Vec<DayRecord>,
    pub months: Vec<PeriodRecord>,
    pub max_total: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthView {
    pub month: PeriodRecord,
    pub days: Vec<DayRecord>,
    pub weeks: Vec<PeriodRecord>,
    pub projects: Vec<String>,
    pub max_total: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeekView {
    pub week: PeriodRecord,
    pub days: Vec<DayRecord>,
    pub projects: Vec<String>,
    pub max_total: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DayView {
    pub day: DayRecord,
    pub details: Vec<DetailRecord>,
    pub projects: Vec<String>,
}

/// Everything the renderer needs for the active level, rebuilt on every transition.
#[derive(Debug, Clone, PartialEq)]
pub enum LevelView {
    Global(GlobalView),
    Year(YearView),
    Month(MonthView),
    Week(WeekView),
    Day(DayView),
}

/// Something the user can point at or click on a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Item {
    Year(usize),
    Month(usize),
    Week(usize),
    Day(usize),
    Detail(usize),
}

impl LevelView {
    pub fn level(&self) -> Level {
        match self {
            LevelView::Global(_) => Level::Global,
            LevelView::Year(_) => Level::Year,
            LevelView::Month(_) => Level::Month,
            LevelView::Week(_) => Level::Week,
            LevelView::Day(_) => Level::Day,
        }
    }

    /// Number of shapes the renderer fades in for this level.
    pub fn element_count(&self) -> usize {
        match self {
            LevelView::Global(view) => view.years.len(),
            LevelView::Year(view) => view.days.len(),
            LevelView::Month(view) => view.days.len(),
            LevelView::Week(view) => view.days.len(),
            LevelView::Day(view) => view.details.len(),
        }
    }

    pub fn days(&self) -> &[DayRecord] {
        match self {
            LevelView::Year(view) => &view.days,
            LevelView::Month(view) => &view.days,
            LevelView::Week(view) => &view.days,
            LevelView::Global(_) | LevelView::Day(_) => &[],
        }
    }

    pub fn max_total(&self) -> u64 {
        match self {
            LevelView::Global(view) => view.max_total,
            LevelView::Year(view) => view.max_total,
            LevelView::Month(view) => view.max_total,
            LevelView::Week(view) => view.max_total,
            LevelView::Day(view) => view.day.total,
        }
    }

    pub fn projects(&self) -> &[String] {
        match self {
            LevelView::Month(view) => &view.projects,
            LevelView::Week(view) => &view.projects,
            LevelView::Day(view) => &view.projects,
            LevelView::Global(_) | LevelView::Year(_) => &[],
        }
    }

    /// The view a click on `item` would select, if the item drills anywhere.
    pub fn drill_target(&self, item: Item) -> Option<View> {
        match (self, item) {
            (LevelView::Global(view), Item::Year(index)) => {
                view.years.get(index).cloned().map(View::Year)
            }
            (LevelView::Year(view), Item::Month(index)) => {
                view.months.get(index).cloned().map(View::Month)
            }
            (LevelView::Month(view), Item::Week(index)) => {
                view.weeks.get(index).cloned().map(View::Week)
            }
            (_, Item::Day(index)) if self.level() != Level::Day => {
                self.days().get(index).cloned().map(View::Day)
            }
            _ => None,
        }
    }

    pub fn detail(&self, index: usize) -> Option<&DetailRecord> {
        match self {
            LevelView::Day(view) => view.details.get(index),
            _ => None,
        }
    }

    /// Items a label hover keeps lit; everything else is dimmed.
    pub fn highlights(&self, label: Item, item: Item) -> bool {
        match (self, label, item) {
            (LevelView::Global(_), Item::Year(label), Item::Year(index)) => label == index,
            (LevelView::Year(view), Item::Month(label), Item::Day(index)) => {
                match (view.months.get(label), view.days.get(index)) {
                    (Some(month), Some(day)) => month.contains(day.date),
                    _ => false,
                }
            }
            (LevelView::Month(view), Item::Week(label), Item::Day(index)) => {
                match (view.weeks.get(label), view.days.get(index)) {
                    (Some(week), Some(day)) => week.contains(day.date),
                    _ => false,
                }
            }
            _ => true,
        }
    }
}

/// Derives the view-model of `view`'s level from the cached day records.
pub fn derive_view(view: &View, dataset: &Dataset) -> LevelView {
    match view {
        View::Global => LevelView::Global(global_view(dataset)),
        View::Year(year) => {
            let (start, end) = (year.date, year.end());
            let days = dataset.calendar(start, end);
            let months = bucket_by_month(dataset.days_between(start, end), start, end);
            LevelView::Year(YearView {
                year: year.clone(),
                max_total: max_total(days.iter().map(|day| day.total)),
                days,
                months,
            })
        }
        View::Month(month) => {
            let (start, end) = (month.date, month.end());
            let days = dataset.calendar(start, end);
            // Edge weeks keep their days in the neighbouring months.
            let first_week = Period::Week.start_of(start);
            let last_week = Period::Week.end_of(Period::Week.start_of(end));
            let weeks = bucket_by_week(
                dataset.days_between(first_week, last_week),
                first_week,
                last_week,
            );
            LevelView::Month(MonthView {
                month: month.clone(),
                max_total: max_total(days.iter().map(|day| day.total)),
                projects: dataset.project_names(),
                days,
                weeks,
            })
        }
        View::Week(week) => {
            let days = dataset.calendar(week.date, week.end());
            LevelView::Week(WeekView {
                week: week.clone(),
                max_total: max_total(days.iter().map(|day| day.total)),
                projects: dataset.project_names(),
                days,
            })
        }
        View::Day(day) => {
            let mut details = day.details.clone();
            details.sort_by_key(|detail| detail.date);
            LevelView::Day(DayView {
                day: day.clone(),
                details,
                projects: dataset.project_names(),
            })
        }
    }
}

/// Picks the starting view for `level`, anchored on the latest tracked day.
pub fn initial_view(dataset: &Dataset, level: Level) -> Result<View, ConfigError> {
    let anchor = dataset.last_day().ok_or(ConfigError::EmptyDataset)?;

    Ok(match level {
        Level::Global => View::Global,
        Level::Day => View::Day(
            dataset
                .day(anchor)
                .cloned()
                .unwrap_or_else(|| DayRecord::empty(anchor)),
        ),
        Level::Year | Level::Month | Level::Week => {
            let period = level.period().unwrap_or(Period::Year);
            View::period(period_record(dataset, period, anchor))
        }
    })
}

pub fn period_record(dataset: &Dataset, period: Period, date: NaiveDate) -> PeriodRecord {
    let start = period.start_of(date);
    let end = period.end_of(start);
    summarize_period(period, start, dataset.days_between(start, end))
}

fn global_view(dataset: &Dataset) -> GlobalView {
    let (Some(first), Some(last)) = (dataset.first_day(), dataset.last_day()) else {
        return GlobalView {
            years: Vec::new(),
            max_total: 0,
        };
    };

    let start = Period::Year.start_of(first);
    let end = Period::Year.end_of(Period::Year.start_of(last));
    let years = bucket_by_year(dataset.days(), start, end);
    GlobalView {
        max_total: max_total(years.iter().map(|year| year.total)),
        years,
    }
}

/// Column of `date` in a Monday-first grid that starts at `origin`'s week.
pub fn week_column(origin: NaiveDate, date: NaiveDate) -> usize {
    let first_monday = Period::Week.start_of(origin);
    let days = (Period::Week.start_of(date) - first_monday).num_days();
    usize::try_from(days / 7).unwrap_or(0)
}

pub fn weekday_row(date: NaiveDate) -> usize {
    date.weekday().num_days_from_monday() as usize
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    use crate::dataset::Dataset;
    use crate::domain::{DetailRecord, Period, merge_periods};
    use crate::navigation::{GuardViolation, Level, NavigationState, View};
    use crate::settings::ConfigError;

    use super::{
        Item, LevelView, derive_view, initial_view, period_record, week_column, weekday_row,
    };

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn sample() -> Dataset {
        let at = |year: i32, month: u32, day: u32, hour: u32| {
            date(year, month, day).and_hms_opt(hour, 0, 0).unwrap()
        };
        Dataset::from_details(vec![
            DetailRecord::new(at(2015, 11, 3, 9), "api", 1800),
            DetailRecord::new(at(2016, 1, 4, 9), "api", 3600),
            DetailRecord::new(at(2016, 1, 4, 14), "docs", 1200),
            DetailRecord::new(at(2016, 1, 20, 10), "docs", 600),
            DetailRecord::new(at(2016, 3, 1, 8), "infra", 7200),
        ])
    }

    #[test]
    fn global_view_covers_every_year_in_range() {
        let view = derive_view(&View::Global, &sample());
        let LevelView::Global(global) = &view else {
            panic!("expected the global view");
        };
        let totals = global.years.iter().map(|year| year.total).collect::<Vec<_>>();
        assert_eq!(totals, vec![1800, 12600]);
        assert_eq!(global.max_total, 12600);
        assert_eq!(view.element_count(), 2);
    }

    #[test]
    fn year_view_fills_the_whole_calendar() {
        let dataset = sample();
        let start = initial_view(&dataset, Level::Year).unwrap();
        assert_eq!(start.anchor(), Some(date(2016, 1, 1)));

        let view = derive_view(&start, &dataset);
        let LevelView::Year(year) = &view else {
            panic!("expected the year view");
        };
        assert_eq!(year.days.len(), 366);
        assert_eq!(year.months.len(), 12);
        assert_eq!(year.max_total, 7200);
        assert_eq!(year.year.total, 12600);
    }

    #[test]
    fn clicking_an_empty_month_keeps_the_year_level() {
        let dataset = sample();
        let mut state = NavigationState::new(initial_view(&dataset, Level::Year).unwrap());
        let view = derive_view(state.view(), &dataset);

        let february = view.drill_target(Item::Month(1)).unwrap();
        assert_eq!(state.select(february), Err(GuardViolation::EmptySelection));
        assert_eq!(state.level(), Level::Year);

        let march = view.drill_target(Item::Month(2)).unwrap();
        state.select(march).unwrap();
        assert_eq!(state.level(), Level::Month);
    }

    #[test]
    fn month_weeks_merge_back_into_the_month() {
        let dataset = sample();
        let january = View::period(period_record(&dataset, Period::Month, date(2016, 1, 1)));
        let LevelView::Month(month) = derive_view(&january, &dataset) else {
            panic!("expected the month view");
        };

        assert_eq!(month.days.len(), 31);
        assert_eq!(month.weeks.first().map(|week| week.date), Some(date(2015, 12, 28)));
        assert_eq!(month.weeks.last().map(|week| week.end()), Some(date(2016, 2, 7)));
        let merged = merge_periods(Period::Month, month.month.date, &month.weeks);
        assert_eq!(merged, month.month);
        assert_eq!(month.projects, vec!["infra", "api", "docs"]);
    }

    #[test]
    fn month_edge_week_selects_the_whole_week() {
        let at = |month: u32, day: u32| date(2016, month, day).and_hms_opt(9, 0, 0).unwrap();
        let dataset = Dataset::from_details(vec![
            DetailRecord::new(at(2, 29), "A", 100),
            DetailRecord::new(at(3, 1), "B", 5000),
        ]);
        let february = View::period(period_record(&dataset, Period::Month, date(2016, 2, 1)));
        let mut state = NavigationState::new(february);
        let view = derive_view(state.view(), &dataset);
        let LevelView::Month(month) = &view else {
            panic!("expected the month view");
        };
        assert_eq!(month.month.total, 100);
        assert_eq!(month.weeks.len(), 5);
        assert_eq!(month.weeks[4].total, 5100);

        let quiet = view.drill_target(Item::Week(0)).unwrap();
        assert_eq!(state.select(quiet), Err(GuardViolation::EmptySelection));
        assert_eq!(state.level(), Level::Month);

        let edge = view.drill_target(Item::Week(4)).unwrap();
        assert_eq!(edge.anchor(), Some(date(2016, 2, 29)));
        state.select(edge).unwrap();
        assert_eq!(state.level(), Level::Week);

        let LevelView::Week(week) = derive_view(state.view(), &dataset) else {
            panic!("expected the week view");
        };
        assert_eq!(week.week, period_record(&dataset, Period::Week, date(2016, 3, 1)));
        assert_eq!(week.days.iter().map(|day| day.total).sum::<u64>(), week.week.total);
        assert_eq!(week.week.total, 5100);
    }

    #[test]
    fn day_level_exposes_details_but_no_drill_target() {
        let dataset = sample();
        let day = dataset.day(date(2016, 1, 4)).cloned().unwrap();
        let view = derive_view(&View::Day(day), &dataset);
        assert_eq!(view.element_count(), 2);
        assert_eq!(view.detail(1).map(|detail| detail.name.as_str()), Some("docs"));
        assert_eq!(view.drill_target(Item::Detail(0)), None);
        assert_eq!(view.drill_target(Item::Day(0)), None);
    }

    #[test]
    fn month_label_highlights_only_its_days() {
        let dataset = sample();
        let start = initial_view(&dataset, Level::Year).unwrap();
        let view = derive_view(&start, &dataset);
        assert!(view.highlights(Item::Month(0), Item::Day(0)));
        assert!(!view.highlights(Item::Month(1), Item::Day(0)));
        assert!(view.highlights(Item::Month(1), Item::Day(31)));
    }

    #[test]
    fn empty_dataset_cannot_mount() {
        assert!(matches!(
            initial_view(&Dataset::default(), Level::Year),
            Err(ConfigError::EmptyDataset)
        ));
    }

    #[test]
    fn grid_positions_use_monday_weeks() {
        let origin = date(2016, 1, 1);
        assert_eq!(week_column(origin, date(2016, 1, 3)), 0);
        assert_eq!(week_column(origin, date(2016, 1, 4)), 1);
        assert_eq!(weekday_row(date(2016, 1, 4)), 0);
        assert_eq!(weekday_row(date(2016, 1, 3)), 6);
    }
}
