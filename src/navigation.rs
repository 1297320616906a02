use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{DayRecord, Period, PeriodRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Global,
    Year,
    Month,
    Week,
    Day,
}

impl Level {
    pub const ALL: [Level; 5] = [Level::Global, Level::Year, Level::Month, Level::Week, Level::Day];

    pub fn as_str(self) -> &'static str {
        match self {
            Level::Global => "global",
            Level::Year => "year",
            Level::Month => "month",
            Level::Week => "week",
            Level::Day => "day",
        }
    }

    pub fn period(self) -> Option<Period> {
        match self {
            Level::Year => Some(Period::Year),
            Level::Month => Some(Period::Month),
            Level::Week => Some(Period::Week),
            Level::Global | Level::Day => None,
        }
    }

    /// Whether a click at this level may drill into `to`.
    pub fn can_drill_into(self, to: Level) -> bool {
        matches!(
            (self, to),
            (Level::Global, Level::Year)
                | (Level::Year, Level::Month)
                | (Level::Year, Level::Day)
                | (Level::Month, Level::Week)
                | (Level::Month, Level::Day)
                | (Level::Week, Level::Day)
        )
    }
}

impl Display for Level {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Level::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(raw.trim()))
            .ok_or_else(|| {
                format!("unknown level `{raw}` (expected global, year, month, week or day)")
            })
    }
}

/// The active level together with its selection, so the two cannot disagree.
#[derive(Debug, Clone, PartialEq)]
pub enum View {
    Global,
    Year(PeriodRecord),
    Month(PeriodRecord),
    Week(PeriodRecord),
    Day(DayRecord),
}

impl View {
    pub fn level(&self) -> Level {
        match self {
            View::Global => Level::Global,
            View::Year(_) => Level::Year,
            View::Month(_) => Level::Month,
            View::Week(_) => Level::Week,
            View::Day(_) => Level::Day,
        }
    }

    pub fn period(record: PeriodRecord) -> View {
        match record.period {
            Period::Year => View::Year(record),
            Period::Month => View::Month(record),
            Period::Week => View::Week(record),
        }
    }

    pub fn total(&self) -> Option<u64> {
        match self {
            View::Global => None,
            View::Year(record) | View::Month(record) | View::Week(record) => Some(record.total),
            View::Day(day) => Some(day.total),
        }
    }

    pub fn anchor(&self) -> Option<NaiveDate> {
        match self {
            View::Global => None,
            View::Year(record) | View::Month(record) | View::Week(record) => Some(record.date),
            View::Day(day) => Some(day.date),
        }
    }

    pub fn title(&self) -> String {
        match self {
            View::Global => "All years".to_string(),
            View::Year(record) | View::Month(record) | View::Week(record) => record.label(),
            View::Day(day) => day.date.format("%A, %b %-d %Y").to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Idle,
    /// Committed, waiting for the renderer to report how many elements it animates.
    Awaiting,
    Animating { remaining: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GuardViolation {
    #[error("a transition is still in flight")]
    InTransition,
    #[error("selection has no tracked time")]
    EmptySelection,
    #[error("cannot drill from {from} into {to}")]
    Unreachable { from: Level, to: Level },
    #[error("already at the global overview")]
    AtRoot,
}

/// Owned drill-down state. A rejected transition leaves it untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationState {
    view: View,
    history: Vec<View>,
    transition: Transition,
}

impl NavigationState {
    pub fn new(view: View) -> Self {
        Self {
            view,
            history: Vec::new(),
            transition: Transition::Idle,
        }
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn level(&self) -> Level {
        self.view.level()
    }

    pub fn history(&self) -> &[View] {
        &self.history
    }

    pub fn history_levels(&self) -> Vec<Level> {
        self.history.iter().map(View::level).collect()
    }

    pub fn transition(&self) -> Transition {
        self.transition
    }

    pub fn is_in_transition(&self) -> bool {
        self.transition != Transition::Idle
    }

    pub fn select(&mut self, target: View) -> Result<(), GuardViolation> {
        if self.is_in_transition() {
            return Err(GuardViolation::InTransition);
        }

        let from = self.level();
        let to = target.level();
        if !from.can_drill_into(to) {
            return Err(GuardViolation::Unreachable { from, to });
        }
        if target.total() == Some(0) {
            return Err(GuardViolation::EmptySelection);
        }

        let previous = std::mem::replace(&mut self.view, target);
        match self.history.last_mut() {
            Some(top) if top.level() == previous.level() => *top = previous,
            _ => self.history.push(previous),
        }
        self.transition = Transition::Awaiting;
        Ok(())
    }

    pub fn back(&mut self) -> Result<(), GuardViolation> {
        if self.is_in_transition() {
            return Err(GuardViolation::InTransition);
        }

        match self.history.pop() {
            Some(previous) => self.view = previous,
            None if self.level() == Level::Global => return Err(GuardViolation::AtRoot),
            None => self.view = View::Global,
        }
        self.transition = Transition::Awaiting;
        Ok(())
    }

    /// Reported by the renderer once it knows how many elements fade in.
    pub fn begin_animation(&mut self, elements: usize) {
        if self.transition != Transition::Awaiting {
            return;
        }
        self.transition = if elements == 0 {
            Transition::Idle
        } else {
            Transition::Animating { remaining: elements }
        };
    }

    pub fn element_finished(&mut self) {
        if let Transition::Animating { remaining } = self.transition {
            self.transition = if remaining <= 1 {
                Transition::Idle
            } else {
                Transition::Animating {
                    remaining: remaining - 1,
                }
            };
        }
    }
}
