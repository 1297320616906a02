mod dataset;
mod domain;
mod logging;
mod navigation;
mod overview;
mod settings;
mod state;
mod storage;
mod ui;

use std::error::Error;
use std::path::{Path, PathBuf};

use chrono::{Datelike, Duration, Local, NaiveDate, Weekday};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::dataset::Dataset;
use crate::domain::{
	bucket_by, digest_summary, format_duration, format_time, merge_periods, DayRecord, DetailRecord, PeriodRecord,
};
use crate::logging::init_logging;
use crate::navigation::Level;
use crate::settings::{load_settings, save_settings, ConfigError, Settings};
use crate::state::StateDir;
use crate::storage::{load_dataset, save_dataset};
use crate::ui::Heatmap;

const DEMO_PROJECTS: [&str; 7] = ["api", "frontend", "docs", "infra", "reviews", "meetings", "research"];
const SUMMARY_PROJECTS: usize = 3;

#[derive(Debug, Parser)]
#[command(name = "chronos-heatmap", about = "Drill-down calendar heatmap of tracked time")]
struct Cli {
	#[arg(long, global = true)]
	data: Option<PathBuf>,
	#[arg(long, global = true)]
	config: Option<PathBuf>,
	#[arg(long, global = true)]
	overview: Option<Level>,
	#[arg(long, global = true)]
	color: Option<String>,
	/// Print picked detail records as JSON lines after the heatmap closes.
	#[arg(long)]
	pick: bool,
	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
	View,
	Summary {
		#[arg(long, default_value = "month")]
		level: Level,
		#[arg(long)]
		from: Option<String>,
		#[arg(long)]
		to: Option<String>,
	},
	Generate {
		#[arg(long, default_value_t = 365)]
		days: u32,
		#[arg(long)]
		out: PathBuf,
		#[arg(long)]
		seed: Option<u64>,
	},
	Settings {
		#[arg(long)]
		save: bool,
	},
	Datasets {
		#[arg(long, default_value_t = 20)]
		limit: usize,
	},
}

fn main() {
	if let Err(err) = run() {
		eprintln!("error: {err}");
		std::process::exit(1);
	}
}

fn run() -> Result<(), Box<dyn Error>> {
	let cli = Cli::parse();
	let state = StateDir::locate();
	if let Err(err) = init_logging(&state.log_file()) {
		eprintln!("warning: failed to start logging: {err}");
	}
	info!(state = %state.root().display(), "starting");

	match &cli.command {
		Some(Command::Datasets { limit }) => return print_recent_datasets(&state, *limit),
		Some(Command::Generate { days, out, seed }) => {
			let dataset = generate_dataset(*days, *seed, Local::now().date_naive());
			save_dataset(out, &dataset)?;
			if let Err(err) = state.remember_dataset(out) {
				eprintln!("warning: failed to store recent dataset: {err}");
			}
			println!("wrote {} days of demo data to {}", dataset.days().len(), out.display());
			return Ok(());
		}
		_ => {}
	}

	let config_path = cli.config.clone().unwrap_or_else(|| state.settings_file());
	let settings = effective_settings(&cli, &config_path)?;
	if let Some(Command::Settings { save }) = &cli.command {
		print!("{}", toml::to_string_pretty(&settings)?);
		if *save {
			save_settings(&config_path, &settings)?;
			println!("# saved to {}", config_path.display());
		}
		return Ok(());
	}

	let data_path = state.dataset_path(cli.data.clone())?;
	let report = load_dataset(&data_path)?;
	if !report.skipped.is_empty() {
		eprintln!(
			"warning: skipped {} malformed records in {}",
			report.skipped.len(),
			data_path.display()
		);
	}
	if let Err(err) = state.remember_dataset(&data_path) {
		eprintln!("warning: failed to store recent dataset: {err}");
	}

	match cli.command.unwrap_or(Command::View) {
		Command::View => run_view(&report.dataset, settings, cli.pick)?,
		Command::Summary { level, from, to } => {
			let from = parse_day(from.as_deref())?;
			let to = parse_day(to.as_deref())?;
			print_summary(&summary_buckets(&report.dataset, level, from, to)?);
		}
		Command::Generate { .. } | Command::Settings { .. } | Command::Datasets { .. } => {}
	}

	Ok(())
}

/// Settings file, then command-line overrides.
fn effective_settings(cli: &Cli, path: &Path) -> Result<Settings, ConfigError> {
	let mut settings = load_settings(path)?;
	if let Some(level) = cli.overview {
		settings.overview = level;
	}
	if let Some(color) = &cli.color {
		settings.color = color.clone();
		settings.base_color()?;
	}
	Ok(settings)
}

fn run_view(dataset: &Dataset, settings: Settings, pick: bool) -> Result<(), Box<dyn Error>> {
	let mut picked: Vec<DetailRecord> = Vec::new();
	let heatmap = Heatmap::new(dataset, settings)?;
	if pick {
		heatmap.with_handler(|detail| picked.push(detail.clone())).run()?;
	} else {
		heatmap.run()?;
	}

	for detail in &picked {
		println!("{}", serde_json::to_string(detail)?);
	}
	Ok(())
}

fn print_recent_datasets(state: &StateDir, limit: usize) -> Result<(), Box<dyn Error>> {
	let rows = state.recent_datasets(limit)?;
	if rows.is_empty() {
		println!("no recent datasets");
		return Ok(());
	}

	for (index, entry) in rows.iter().enumerate() {
		println!(
			"{:>2}. {}  (opened {})",
			index + 1,
			entry.path.display(),
			entry.opened.format("%Y-%m-%d %H:%M")
		);
	}

	Ok(())
}

fn parse_day(input: Option<&str>) -> Result<Option<NaiveDate>, Box<dyn Error>> {
	match input {
		Some(raw) => Ok(Some(NaiveDate::parse_from_str(raw, "%Y-%m-%d")?)),
		None => Ok(None),
	}
}

fn summary_buckets(
	dataset: &Dataset,
	level: Level,
	from: Option<NaiveDate>,
	to: Option<NaiveDate>,
) -> Result<Vec<PeriodRecord>, Box<dyn Error>> {
	let period = level
		.period()
		.ok_or_else(|| format!("summary needs year, month or week, not {level}"))?;
	let (Some(first), Some(last)) = (dataset.first_day(), dataset.last_day()) else {
		return Ok(Vec::new());
	};

	let start = from.unwrap_or(first);
	let end = to.unwrap_or(last);
	Ok(bucket_by(period, dataset.days_between(start, end), start, end))
}

fn print_summary(buckets: &[PeriodRecord]) {
	if buckets.is_empty() {
		println!("no tracked time in range");
		return;
	}

	for bucket in buckets {
		let digest = digest_summary(&bucket.summary, SUMMARY_PROJECTS);
		let mut projects = digest
			.top
			.iter()
			.map(|entry| format!("{} {}", entry.name, format_time(entry.value)))
			.collect::<Vec<_>>();
		if let Some(other) = digest.other {
			projects.push(format!("other {}", format_time(other)));
		}
		println!(
			"{} | {} | {}",
			format_duration(bucket.total),
			bucket.label(),
			projects.join(", ")
		);
	}

	let overall = merge_periods(buckets[0].period, buckets[0].date, buckets);
	let leaders = digest_summary(&overall.summary, SUMMARY_PROJECTS)
		.top
		.iter()
		.map(|entry| entry.name.as_str())
		.collect::<Vec<_>>()
		.join(", ");
	println!("\ntotal: {} | {}", format_duration(overall.total), leaders);
}

/// Weekday-heavy random sessions for the `days` days ending at `end`.
fn generate_dataset(days: u32, seed: Option<u64>, end: NaiveDate) -> Dataset {
	let mut rng = match seed {
		Some(seed) => StdRng::seed_from_u64(seed),
		None => StdRng::from_entropy(),
	};

	let mut records = Vec::new();
	for offset in (0..days).rev() {
		let date = end - Duration::days(i64::from(offset));
		let weekend = matches!(date.weekday(), Weekday::Sat | Weekday::Sun);
		if (weekend && rng.gen_bool(0.7)) || rng.gen_bool(0.15) {
			continue;
		}

		let Some(mut clock) = date.and_hms_opt(rng.gen_range(7..11), rng.gen_range(0..4) * 15, 0) else {
			continue;
		};
		let mut details = Vec::new();
		for _ in 0..rng.gen_range(1..=5) {
			let name = DEMO_PROJECTS[rng.gen_range(0..DEMO_PROJECTS.len())];
			let value = rng.gen_range(15..=180u64) * 60;
			details.push(DetailRecord::new(clock, name, value));

			clock += Duration::seconds(value as i64) + Duration::minutes(rng.gen_range(0..=45));
			if clock.date() != date {
				break;
			}
		}
		records.push(DayRecord::from_details(date, details));
	}

	info!(days, tracked_days = records.len(), "generated demo dataset");
	Dataset::from_days(records)
}

#[cfg(test)]
mod tests {
	use chrono::NaiveDate;
	use clap::Parser;
	use pretty_assertions::assert_eq;

	use crate::dataset::Dataset;
	use crate::domain::DetailRecord;
	use crate::navigation::Level;

	use super::{generate_dataset, summary_buckets, Cli, Command};

	fn date(year: i32, month: u32, day: u32) -> NaiveDate {
		NaiveDate::from_ymd_opt(year, month, day).unwrap()
	}

	fn sample() -> Dataset {
		let at = |month: u32, day: u32, hour: u32| date(2016, month, day).and_hms_opt(hour, 0, 0).unwrap();
		Dataset::from_details(vec![
			DetailRecord::new(at(1, 4, 9), "api", 3600),
			DetailRecord::new(at(1, 4, 13), "docs", 1800),
			DetailRecord::new(at(3, 1, 8), "infra", 7200),
		])
	}

	#[test]
	fn summary_buckets_cover_the_data_range() {
		let buckets = summary_buckets(&sample(), Level::Month, None, None).expect("month summary");
		let totals = buckets
			.iter()
			.map(|bucket| (bucket.label(), bucket.total))
			.collect::<Vec<_>>();
		assert_eq!(
			totals,
			vec![
				("January 2016".to_string(), 5400),
				("February 2016".to_string(), 0),
				("March 2016".to_string(), 7200),
			]
		);

		let ranged = summary_buckets(&sample(), Level::Year, Some(date(2016, 2, 1)), None).expect("ranged summary");
		assert_eq!(ranged.len(), 1);
		assert_eq!(ranged[0].total, 7200);
	}

	#[test]
	fn summary_rejects_levels_without_a_period() {
		assert!(summary_buckets(&sample(), Level::Day, None, None).is_err());
		assert!(summary_buckets(&Dataset::default(), Level::Week, None, None)
			.expect("empty dataset")
			.is_empty());
	}

	#[test]
	fn seeded_generation_is_repeatable_and_in_range() {
		let end = date(2016, 3, 31);
		let first = generate_dataset(60, Some(7), end);
		assert_eq!(first, generate_dataset(60, Some(7), end));
		assert!(first.days().len() <= 60);
		assert!(first.first_day().is_none_or(|day| day >= date(2016, 2, 1)));
		assert!(first.last_day().is_none_or(|day| day <= end));
		assert!(generate_dataset(0, Some(7), end).is_empty());
	}

	#[test]
	fn global_flags_apply_to_subcommands() {
		let cli = Cli::try_parse_from([
			"chronos-heatmap",
			"summary",
			"--level",
			"week",
			"--overview",
			"month",
		])
		.expect("cli should parse");
		assert_eq!(cli.overview, Some(Level::Month));
		assert!(matches!(cli.command, Some(Command::Summary { level: Level::Week, .. })));
		assert!(Cli::try_parse_from(["chronos-heatmap", "--overview", "decade"]).is_err());
	}
}
