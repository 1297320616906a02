use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::f64::consts::PI;
use std::io;
use std::time::{Duration as StdDuration, Instant};

use chrono::{Datelike, Duration, NaiveDate, Timelike};
use crossterm::event::{
	self, DisableMouseCapture, EnableMouseCapture, Event as CEvent, KeyCode, KeyEventKind, MouseButton, MouseEvent,
	MouseEventKind,
};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use rand::Rng;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::{Frame, Terminal};
use tracing::{debug, info, warn};

use crate::dataset::Dataset;
use crate::domain::{
	digest_summary, format_duration, format_time, format_total, DayRecord, DaySummaryEntry, DetailRecord,
	PeriodRecord,
};
use crate::navigation::{GuardViolation, Level, NavigationState, Transition};
use crate::overview::{
	derive_view, initial_view, week_column, weekday_row, DayView, GlobalView, Item, LevelView, MonthView, WeekView,
	YearView,
};
use crate::settings::{parse_hex_color, ColorScale, ConfigError, Rgb, Settings};

const PROJECT_COLORS: [Color; 12] = [
	Color::LightRed,
	Color::LightBlue,
	Color::LightGreen,
	Color::LightYellow,
	Color::LightMagenta,
	Color::LightCyan,
	Color::Red,
	Color::Blue,
	Color::Green,
	Color::Yellow,
	Color::Magenta,
	Color::Cyan,
];
const FOCUSED_PANEL_BORDER_COLOR: Color = Color::Yellow;
const INACTIVE_PANEL_BORDER_COLOR: Color = Color::DarkGray;
const EMPTY_CELL_COLOR: Color = Color::DarkGray;
const LABEL_COLOR: Color = Color::Gray;
const SURFACE: Rgb = Rgb(22, 22, 26);
const DIMMED_OPACITY: f64 = 0.1;
const WEEKDAY_LABEL_WIDTH: u16 = 3;
const WEEK_ROW_LABEL_WIDTH: u16 = 12;
const DAY_ROW_LABEL_WIDTH: u16 = 12;
const DAY_NAME_WIDTH: u16 = 28;
const SECONDS_PER_DAY: u64 = 86_400;
const BACK_BUTTON: &str = "[ <- back ]";
const WEEKDAY_LETTERS: [&str; 7] = ["Mo", "Tu", "We", "Th", "Fr", "Sa", "Su"];

pub type DetailHandler<'a> = Box<dyn FnMut(&DetailRecord) + 'a>;

/// Drill-down calendar heatmap bound to the terminal.
pub struct Heatmap<'a> {
	dataset: &'a Dataset,
	settings: Settings,
	base_color: Rgb,
	handler: Option<DetailHandler<'a>>,
}

impl<'a> Heatmap<'a> {
	pub fn new(dataset: &'a Dataset, settings: Settings) -> Result<Self, ConfigError> {
		let base_color = settings.base_color()?;
		Ok(Self {
			dataset,
			settings,
			base_color,
			handler: None,
		})
	}

	/// Called with the detail record picked at the day level.
	pub fn with_handler(mut self, handler: impl FnMut(&DetailRecord) + 'a) -> Self {
		self.handler = Some(Box::new(handler));
		self
	}

	pub fn run(mut self) -> Result<(), Box<dyn Error>> {
		enable_raw_mode()?;
		let mut stdout = io::stdout();
		execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
		let backend = CrosstermBackend::new(stdout);
		let mut terminal = Terminal::new(backend)?;

		let result = self.run_event_loop(&mut terminal);

		disable_raw_mode()?;
		execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
		terminal.show_cursor()?;

		result
	}

	fn run_event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<(), Box<dyn Error>> {
		let mut app = App::new(self.dataset, &self.settings, self.base_color, Instant::now());
		let tick = StdDuration::from_millis(self.settings.tick_ms.max(1));

		loop {
			let now = Instant::now();
			app.advance_animation(now);
			let mut hits = Vec::new();
			terminal.draw(|frame| hits = draw_heatmap(frame, &app, now))?;
			app.hits = hits;

			if !event::poll(tick)? {
				continue;
			}

			match event::read()? {
				CEvent::Key(key) if key.kind == KeyEventKind::Press => {
					if handle_key(&mut app, key.code, &mut self.handler) {
						break;
					}
				}
				CEvent::Mouse(mouse) => handle_mouse(&mut app, mouse, &mut self.handler),
				_ => {}
			}
		}

		Ok(())
	}
}

fn handle_key(app: &mut App, code: KeyCode, handler: &mut Option<DetailHandler>) -> bool {
	let now = Instant::now();
	match code {
		KeyCode::Char('q') => return true,
		KeyCode::Esc | KeyCode::Backspace | KeyCode::Char('b') => app.back(now),
		KeyCode::Enter | KeyCode::Char(' ') => app.activate(handler, now),
		KeyCode::Tab | KeyCode::BackTab => app.toggle_labels(),
		KeyCode::Left | KeyCode::Char('h') => app.step_pointer(Step::Left),
		KeyCode::Right | KeyCode::Char('l') => app.step_pointer(Step::Right),
		KeyCode::Up | KeyCode::Char('k') => app.step_pointer(Step::Up),
		KeyCode::Down | KeyCode::Char('j') => app.step_pointer(Step::Down),
		_ => {}
	}
	false
}

fn handle_mouse(app: &mut App, mouse: MouseEvent, handler: &mut Option<DetailHandler>) {
	let now = Instant::now();
	let target = app.hit_at(mouse.column, mouse.row);
	match (mouse.kind, target) {
		(MouseEventKind::Moved, Some(Target::Pointer(pointer))) => app.hover(pointer),
		(MouseEventKind::Moved, None) => app.leave(),
		(MouseEventKind::Down(MouseButton::Left), Some(Target::Pointer(pointer))) => {
			app.hover(pointer);
			app.activate(handler, now);
		}
		(MouseEventKind::Down(MouseButton::Left), Some(Target::Back)) => app.back(now),
		(MouseEventKind::Down(MouseButton::Right), _) => app.back(now),
		_ => {}
	}
}

fn draw_heatmap(frame: &mut Frame, app: &App, now: Instant) -> Vec<Hit> {
	let layout = Layout::default()
		.direction(Direction::Vertical)
		.constraints([
			Constraint::Length(3),
			Constraint::Min(16),
			Constraint::Length(10),
			Constraint::Length(4),
		])
		.split(frame.area());

	let mut hits = Vec::new();
	render_header(frame, layout[0], app, &mut hits);

	match &app.view {
		Some(view) => {
			let scene = Scene {
				app,
				view,
				palette: Palette::new(view.projects(), &app.settings.projects),
				now,
			};
			render_chart(frame, layout[1], &scene, &mut hits);
			render_tooltip(frame, layout[2], &scene);
		}
		None => render_empty(frame, layout[1], app),
	}

	render_footer(frame, layout[3], app);
	hits
}

fn render_header(frame: &mut Frame, area: Rect, app: &App, hits: &mut Vec<Hit>) {
	let mut spans = Vec::new();
	if let Some(nav) = &app.nav {
		for view in nav.history() {
			spans.push(Span::styled(view.title(), Style::default().fg(LABEL_COLOR)));
			spans.push(Span::styled(" > ", Style::default().fg(EMPTY_CELL_COLOR)));
		}
		spans.push(Span::styled(
			nav.view().title(),
			Style::default().fg(FOCUSED_PANEL_BORDER_COLOR).add_modifier(Modifier::BOLD),
		));
		if let Transition::Animating { remaining } = nav.transition() {
			spans.push(Span::styled(
				format!("  (drawing, {remaining} left)"),
				Style::default().fg(EMPTY_CELL_COLOR),
			));
		}
	}

	let block = Block::default().borders(Borders::ALL).title("Calendar Heatmap");
	let inner = block.inner(area);
	frame.render_widget(Paragraph::new(Line::from(spans)).block(block), area);

	let has_history = app
		.nav
		.as_ref()
		.is_some_and(|nav| nav.level() != Level::Global || !nav.history().is_empty());
	let button_width = BACK_BUTTON.len() as u16;
	if has_history && inner.width > button_width {
		let button = Rect::new(inner.right() - button_width, inner.y, button_width, 1);
		frame.render_widget(
			Paragraph::new(Span::styled(BACK_BUTTON, Style::default().fg(Color::Black).bg(LABEL_COLOR))),
			button,
		);
		hits.push(Hit {
			area: button,
			target: Target::Back,
		});
	}
}

fn render_chart(frame: &mut Frame, area: Rect, scene: &Scene, hits: &mut Vec<Hit>) {
	let idle = !scene.app.in_transition();
	let block = Block::default()
		.borders(Borders::ALL)
		.title(format!("{} overview", scene.view.level()))
		.border_style(border_style(idle));
	let inner = block.inner(area);
	frame.render_widget(block, area);

	match scene.view {
		LevelView::Global(global) => render_global(frame, inner, scene, global, hits),
		LevelView::Year(year) => render_year(frame, inner, scene, year, hits),
		LevelView::Month(month) => render_month(frame, inner, scene, month, hits),
		LevelView::Week(week) => render_week(frame, inner, scene, week, hits),
		LevelView::Day(day) => render_day(frame, inner, scene, day, hits),
	}
}

fn render_global(frame: &mut Frame, area: Rect, scene: &Scene, global: &GlobalView, hits: &mut Vec<Hit>) {
	if global.years.is_empty() || area.height < 2 {
		return;
	}

	let gutter = 2u16;
	// Years that do not fit at one column each are left off the right edge.
	let fitting = usize::from((area.width.saturating_add(gutter) / (gutter + 1)).max(1));
	let count = global.years.len().min(fitting) as u16;
	let block_width = (area.width.saturating_sub(gutter * (count - 1)) / count).max(1);
	let scale = ColorScale::new(scene.app.base_color, global.max_total);

	let mut label_spans = Vec::new();
	let mut block_spans = Vec::new();
	for (index, year) in global.years.iter().enumerate().take(usize::from(count)) {
		if index > 0 {
			label_spans.push(Span::raw(" ".repeat(gutter as usize)));
			block_spans.push(Span::raw(" ".repeat(gutter as usize)));
		}

		let x = area.x + index as u16 * (block_width + gutter);
		let label = Pointer {
			item: Item::Year(index),
			label: true,
		};
		let block = Pointer {
			item: Item::Year(index),
			label: false,
		};
		label_spans.push(Span::styled(fit(&year.label(), block_width as usize), scene.label_style(label)));

		let symbol = if scene.is_pointed(block.item) { "▓" } else { "█" };
		let color = scene.shade(index, block.item, scale.color_for(year.total));
		block_spans.push(Span::styled(
			symbol.repeat(block_width as usize),
			Style::default().fg(color),
		));

		push_hit(hits, area, Rect::new(x, area.y, block_width, 1), Target::Pointer(label));
		push_hit(
			hits,
			area,
			Rect::new(x, area.y + 1, block_width, area.height - 1),
			Target::Pointer(block),
		);
	}

	let mut lines = vec![Line::from(label_spans)];
	for _ in 1..area.height {
		lines.push(Line::from(block_spans.clone()));
	}
	frame.render_widget(Paragraph::new(lines), area);
}

fn render_year(frame: &mut Frame, area: Rect, scene: &Scene, year: &YearView, hits: &mut Vec<Hit>) {
	let start = year.year.date;
	let columns = week_column(start, year.year.end()) + 1;
	let cell_width = (area.width.saturating_sub(WEEKDAY_LABEL_WIDTH) as usize / columns).clamp(1, 3);
	let scale = ColorScale::new(scene.app.base_color, scene.view.max_total());

	let mut grid = vec![vec![None; columns]; 7];
	for (index, day) in year.days.iter().enumerate() {
		grid[weekday_row(day.date)][week_column(start, day.date)] = Some(index);
	}

	let labels = year
		.months
		.iter()
		.enumerate()
		.map(|(index, month)| Label {
			x: WEEKDAY_LABEL_WIDTH as usize + week_column(start, month.date) * cell_width,
			text: month.date.format("%b").to_string(),
			pointer: Pointer {
				item: Item::Month(index),
				label: true,
			},
		})
		.collect::<Vec<_>>();

	let mut lines = vec![label_line(&labels, area, 0, scene, hits)];
	for (row, cells) in grid.iter().enumerate() {
		let mut spans = vec![weekday_label(row)];
		for (column, cell) in cells.iter().enumerate() {
			let Some(index) = *cell else {
				spans.push(Span::raw(" ".repeat(cell_width)));
				continue;
			};

			spans.push(scene.grid_cell(index, year.days[index].total, &scale, cell_width));
			let x = area.x + WEEKDAY_LABEL_WIDTH + (column * cell_width) as u16;
			push_hit(
				hits,
				area,
				Rect::new(x, area.y + 1 + row as u16, cell_width as u16, 1),
				Target::Pointer(Pointer {
					item: Item::Day(index),
					label: false,
				}),
			);
		}
		lines.push(Line::from(spans));
	}

	frame.render_widget(Paragraph::new(lines), area);
}

fn render_month(frame: &mut Frame, area: Rect, scene: &Scene, month: &MonthView, hits: &mut Vec<Hit>) {
	let start = month.month.date;
	let columns = month.weeks.len().max(1);
	let cell_width = (area.width.saturating_sub(WEEKDAY_LABEL_WIDTH) as usize / columns).clamp(4, 16);
	let scale = ColorScale::new(scene.app.base_color, month.max_total);

	let labels = month
		.weeks
		.iter()
		.enumerate()
		.map(|(index, week)| Label {
			x: WEEKDAY_LABEL_WIDTH as usize + index * cell_width,
			text: format!("W{:02}", week.date.iso_week().week()),
			pointer: Pointer {
				item: Item::Week(index),
				label: true,
			},
		})
		.collect::<Vec<_>>();

	let mut lines = vec![label_line(&labels, area, 0, scene, hits)];
	for row in 0..7usize {
		let mut numbers = vec![weekday_label(row)];
		let mut bars = vec![Span::raw(" ".repeat(WEEKDAY_LABEL_WIDTH as usize))];

		for (column, week) in month.weeks.iter().enumerate() {
			let date = week.date + Duration::days(row as i64);
			let Some(index) = day_index(&month.days, start, date) else {
				numbers.push(Span::raw(" ".repeat(cell_width)));
				bars.push(Span::raw(" ".repeat(cell_width)));
				continue;
			};

			let day = &month.days[index];
			let item = Item::Day(index);
			let mut style = if day.has_data() {
				let color = scene.shade(index, item, scale.color_for(day.total));
				Style::default().fg(Color::Black).bg(color)
			} else {
				Style::default().fg(EMPTY_CELL_COLOR)
			};
			if scene.is_pointed(item) {
				style = style.add_modifier(Modifier::BOLD | Modifier::UNDERLINED);
			}
			numbers.push(Span::styled(fit(&format!(" {}", date.day()), cell_width - 1), style));
			numbers.push(Span::raw(" "));

			let bar_width = scene.grown(index, cell_width - 1);
			bars.extend(stacked_bar(&day.summary, day.total, bar_width, &scene.palette));
			bars.push(Span::raw(" ".repeat(cell_width - bar_width)));

			let x = area.x + WEEKDAY_LABEL_WIDTH + (column * cell_width) as u16;
			push_hit(
				hits,
				area,
				Rect::new(x, area.y + 1 + (row * 2) as u16, cell_width as u16, 2),
				Target::Pointer(Pointer { item, label: false }),
			);
		}

		lines.push(Line::from(numbers));
		lines.push(Line::from(bars));
	}

	frame.render_widget(Paragraph::new(lines), area);
}

fn render_week(frame: &mut Frame, area: Rect, scene: &Scene, week: &WeekView, hits: &mut Vec<Hit>) {
	let total_width = 10u16;
	let bar_space = area
		.width
		.saturating_sub(WEEK_ROW_LABEL_WIDTH + total_width) as usize;
	let spacing = if area.height >= 14 { 2 } else { 1 };

	let mut lines = Vec::new();
	for (index, day) in week.days.iter().enumerate() {
		let item = Item::Day(index);
		let label_style = if scene.is_pointed(item) {
			Style::default().fg(FOCUSED_PANEL_BORDER_COLOR).add_modifier(Modifier::BOLD)
		} else if day.has_data() {
			Style::default().fg(LABEL_COLOR)
		} else {
			Style::default().fg(EMPTY_CELL_COLOR)
		};

		let full = if week.max_total == 0 {
			0
		} else {
			(day.total as f64 / week.max_total as f64 * bar_space as f64).round() as usize
		};
		let bar_width = scene.grown(index, full);

		let mut spans = vec![Span::styled(
			fit(&day.date.format("%a %d %b").to_string(), WEEK_ROW_LABEL_WIDTH as usize),
			label_style,
		)];
		spans.extend(stacked_bar(&day.summary, day.total, bar_width, &scene.palette));
		spans.push(Span::raw(" ".repeat(bar_space - bar_width)));
		spans.push(Span::styled(
			format!(" {}", format_duration(day.total)),
			label_style,
		));
		lines.push(Line::from(spans));
		if spacing == 2 {
			lines.push(Line::from(""));
		}

		push_hit(
			hits,
			area,
			Rect::new(area.x, area.y + (index * spacing) as u16, area.width, 1),
			Target::Pointer(Pointer { item, label: false }),
		);
	}

	frame.render_widget(Paragraph::new(lines), area);
}

fn render_day(frame: &mut Frame, area: Rect, scene: &Scene, day: &DayView, hits: &mut Vec<Hit>) {
	if area.height < 2 {
		return;
	}
	let timeline_width = area
		.width
		.saturating_sub(DAY_ROW_LABEL_WIDTH + DAY_NAME_WIDTH) as usize;

	let mut ruler = vec![Span::raw(" ".repeat(DAY_ROW_LABEL_WIDTH as usize))];
	let mut cursor = 0;
	for hour in [0usize, 6, 12, 18, 24] {
		let x = hour * timeline_width / 24;
		if cursor > 0 && x <= cursor {
			continue;
		}
		ruler.push(Span::raw(" ".repeat(x - cursor)));
		ruler.push(Span::styled(format!("{hour:02}"), Style::default().fg(EMPTY_CELL_COLOR)));
		cursor = x + 2;
	}

	let visible = (area.height - 1) as usize;
	let pointed = match scene.app.pointer {
		Some(Pointer {
			item: Item::Detail(index),
			..
		}) => index,
		_ => 0,
	};
	let offset = pointed.saturating_sub(visible.saturating_sub(1));

	let mut lines = vec![Line::from(ruler)];
	for (row, (index, detail)) in day.details.iter().enumerate().skip(offset).take(visible).enumerate() {
		let item = Item::Detail(index);
		let seconds_into_day = u64::from(detail.date.time().num_seconds_from_midnight());
		let start_column = (seconds_into_day as usize * timeline_width / SECONDS_PER_DAY as usize).min(timeline_width);
		let length = (detail.value.min(SECONDS_PER_DAY) as usize * timeline_width / SECONDS_PER_DAY as usize)
			.max(1)
			.min(timeline_width - start_column);
		let length = scene.grown(index, length);

		let label_style = if scene.is_pointed(item) {
			Style::default().fg(FOCUSED_PANEL_BORDER_COLOR).add_modifier(Modifier::BOLD)
		} else {
			Style::default().fg(LABEL_COLOR)
		};
		let color = scene.palette.color(&detail.name);
		lines.push(Line::from(vec![
			Span::styled(
				fit(
					&format!("{}-{}", detail.date.format("%H:%M"), detail.end().format("%H:%M")),
					DAY_ROW_LABEL_WIDTH as usize,
				),
				label_style,
			),
			Span::raw(" ".repeat(start_column)),
			Span::styled("█".repeat(length), Style::default().fg(color)),
			Span::raw(" ".repeat(timeline_width - start_column - length)),
			Span::styled(
				fit(&format!(" {} ({})", detail.name, format_time(detail.value)), DAY_NAME_WIDTH as usize),
				Style::default().fg(color),
			),
		]));

		push_hit(
			hits,
			area,
			Rect::new(area.x, area.y + 1 + row as u16, area.width, 1),
			Target::Pointer(Pointer { item, label: false }),
		);
	}

	frame.render_widget(Paragraph::new(lines), area);
}

fn render_tooltip(frame: &mut Frame, area: Rect, scene: &Scene) {
	let lines = scene
		.app
		.pointer
		.map(|pointer| tooltip_lines(scene, pointer))
		.unwrap_or_default();
	let panel = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Details"));
	frame.render_widget(panel, area);
}

fn tooltip_lines(scene: &Scene, pointer: Pointer) -> Vec<Line<'static>> {
	let limit = scene.app.settings.tooltip_projects;
	match (scene.view, pointer.item) {
		(LevelView::Global(global), Item::Year(index)) => global
			.years
			.get(index)
			.map(|year| period_lines(year, limit, &scene.palette))
			.unwrap_or_default(),
		(LevelView::Year(year), Item::Month(index)) => year
			.months
			.get(index)
			.map(|month| period_lines(month, limit, &scene.palette))
			.unwrap_or_default(),
		(LevelView::Month(month), Item::Week(index)) => month
			.weeks
			.get(index)
			.map(|week| period_lines(week, limit, &scene.palette))
			.unwrap_or_default(),
		(view, Item::Day(index)) => view
			.days()
			.get(index)
			.map(|day| day_lines(day, &scene.palette))
			.unwrap_or_default(),
		(LevelView::Day(day), Item::Detail(index)) => day
			.details
			.get(index)
			.map(|detail| detail_lines(detail, &day.day, &scene.palette))
			.unwrap_or_default(),
		_ => Vec::new(),
	}
}

fn period_lines(record: &PeriodRecord, limit: usize, palette: &Palette) -> Vec<Line<'static>> {
	let mut lines = vec![Line::from(vec![
		Span::styled(record.label(), Style::default().add_modifier(Modifier::BOLD)),
		Span::raw(format!(
			"  Total time tracked: {}",
			if record.has_data() {
				format_total(record.total)
			} else {
				"none".to_string()
			}
		)),
	])];
	lines.push(Line::from(""));

	let digest = digest_summary(&record.summary, limit);
	lines.extend(digest.top.iter().map(|entry| summary_line(entry, palette)));
	if let Some(other) = digest.other {
		lines.push(Line::from(format!("Other: {}", format_time(other))));
	}
	lines
}

fn day_lines(day: &DayRecord, palette: &Palette) -> Vec<Line<'static>> {
	let tracked = if day.has_data() {
		format!("{} tracked", format_time(day.total))
	} else {
		"No time tracked".to_string()
	};
	let mut lines = vec![
		Line::from(Span::styled(tracked, Style::default().add_modifier(Modifier::BOLD))),
		Line::from(format!(
			"on {}, {} {}{} {}",
			day.date.format("%A"),
			day.date.format("%b"),
			day.date.day(),
			ordinal_suffix(day.date.day()),
			day.date.year()
		)),
	];
	lines.extend(day.summary.iter().map(|entry| summary_line(entry, palette)));
	lines
}

fn detail_lines(detail: &DetailRecord, day: &DayRecord, palette: &Palette) -> Vec<Line<'static>> {
	let share = if day.total == 0 {
		0.0
	} else {
		detail.value as f64 / day.total as f64 * 100.0
	};
	vec![
		Line::from(Span::styled(
			detail.name.clone(),
			Style::default()
				.fg(palette.color(&detail.name))
				.add_modifier(Modifier::BOLD),
		)),
		Line::from(format!(
			"{} - {}",
			detail.date.format("%H:%M:%S"),
			detail.end().format("%H:%M:%S")
		)),
		Line::from(format!("{} ({share:.0}% of the day)", format_time(detail.value))),
		Line::from(""),
		Line::from("Enter / click to pick this record"),
	]
}

fn summary_line(entry: &DaySummaryEntry, palette: &Palette) -> Line<'static> {
	Line::from(vec![
		Span::styled(entry.name.clone(), Style::default().fg(palette.color(&entry.name))),
		Span::raw(format!("  {}", format_time(entry.value))),
	])
}

fn render_empty(frame: &mut Frame, area: Rect, app: &App) {
	let panel = Paragraph::new(vec![
		Line::from("No data to display."),
		Line::from(Span::styled(app.status.clone(), Style::default().fg(EMPTY_CELL_COLOR))),
	])
	.block(Block::default().borders(Borders::ALL).title("Calendar Heatmap"));
	frame.render_widget(panel, area);
}

fn render_footer(frame: &mut Frame, area: Rect, app: &App) {
	let hint = match app.view.as_ref().map(LevelView::level) {
		Some(Level::Day) => "Enter/click pick record",
		Some(Level::Week) => "Enter/click open day",
		Some(Level::Global) => "Enter/click open year | Tab label highlight",
		Some(_) => "Enter/click drill down | Tab month/week labels",
		None => "",
	};
	let footer = Paragraph::new(vec![
		Line::from(format!("arrows/hjkl move | {hint} | Esc/Backspace/right-click back | q quit")),
		Line::from(app.status.clone()),
	])
	.block(Block::default().borders(Borders::ALL).title("Shortcuts"));
	frame.render_widget(footer, area);
}

/// Segments of `width` cells, one per project, proportional to the summary.
fn stacked_bar(summary: &[DaySummaryEntry], total: u64, width: usize, palette: &Palette) -> Vec<Span<'static>> {
	if total == 0 || width == 0 {
		return vec![Span::raw(" ".repeat(width))];
	}

	let mut spans = Vec::new();
	let mut covered = 0u64;
	let mut drawn = 0usize;
	for entry in summary {
		covered += entry.value;
		let end = ((covered as f64 / total as f64) * width as f64).round() as usize;
		let segment = end.min(width).saturating_sub(drawn);
		if segment > 0 {
			spans.push(Span::styled(
				"▆".repeat(segment),
				Style::default().fg(palette.color(&entry.name)),
			));
			drawn += segment;
		}
	}
	if drawn < width {
		spans.push(Span::raw(" ".repeat(width - drawn)));
	}
	spans
}

fn label_line(labels: &[Label], area: Rect, row: u16, scene: &Scene, hits: &mut Vec<Hit>) -> Line<'static> {
	let mut spans = Vec::new();
	let mut cursor = 0usize;
	for label in labels {
		if cursor > 0 && label.x <= cursor {
			continue;
		}
		let width = label.text.chars().count();
		spans.push(Span::raw(" ".repeat(label.x - cursor)));
		spans.push(Span::styled(label.text.clone(), scene.label_style(label.pointer)));
		push_hit(
			hits,
			area,
			Rect::new(area.x + label.x as u16, area.y + row, width as u16, 1),
			Target::Pointer(label.pointer),
		);
		cursor = label.x + width;
	}
	Line::from(spans)
}

fn weekday_label(row: usize) -> Span<'static> {
	Span::styled(
		fit(WEEKDAY_LETTERS[row], WEEKDAY_LABEL_WIDTH as usize),
		Style::default().fg(EMPTY_CELL_COLOR),
	)
}

fn day_index(days: &[DayRecord], start: NaiveDate, date: NaiveDate) -> Option<usize> {
	let offset = usize::try_from((date - start).num_days()).ok()?;
	days.get(offset).filter(|day| day.date == date).map(|_| offset)
}

fn push_hit(hits: &mut Vec<Hit>, bounds: Rect, area: Rect, target: Target) {
	let area = area.intersection(bounds);
	if !area.is_empty() {
		hits.push(Hit { area, target });
	}
}

fn fit(text: &str, width: usize) -> String {
	let truncated = text.chars().take(width).collect::<String>();
	format!("{truncated:<width$}")
}

fn ordinal_suffix(day: u32) -> &'static str {
	match (day % 10, day % 100) {
		(_, 11..=13) => "th",
		(1, _) => "st",
		(2, _) => "nd",
		(3, _) => "rd",
		_ => "th",
	}
}

fn rgb_color(rgb: Rgb) -> Color {
	Color::Rgb(rgb.0, rgb.1, rgb.2)
}

fn color_from_setting(raw: &str) -> Option<Color> {
	if raw.trim_start().starts_with('#') {
		return parse_hex_color(raw).ok().map(rgb_color);
	}
	color_from_name(raw)
}

fn color_from_name(color_name: &str) -> Option<Color> {
	match color_name {
		"black" => Some(Color::Black),
		"red" => Some(Color::Red),
		"green" => Some(Color::Green),
		"yellow" => Some(Color::Yellow),
		"blue" => Some(Color::Blue),
		"magenta" => Some(Color::Magenta),
		"cyan" => Some(Color::Cyan),
		"gray" => Some(Color::Gray),
		"dark_gray" => Some(Color::DarkGray),
		"light_red" => Some(Color::LightRed),
		"light_green" => Some(Color::LightGreen),
		"light_yellow" => Some(Color::LightYellow),
		"light_blue" => Some(Color::LightBlue),
		"light_magenta" => Some(Color::LightMagenta),
		"light_cyan" => Some(Color::LightCyan),
		"white" => Some(Color::White),
		_ => None,
	}
}

fn border_style(focused: bool) -> Style {
	if focused {
		Style::default()
			.fg(FOCUSED_PANEL_BORDER_COLOR)
			.add_modifier(Modifier::BOLD)
	} else {
		Style::default().fg(INACTIVE_PANEL_BORDER_COLOR)
	}
}

fn default_pointer(view: &LevelView, focus: Option<NaiveDate>) -> Option<Pointer> {
	let item = match view {
		LevelView::Global(global) => {
			if global.years.is_empty() {
				return None;
			}
			let index = focus
				.and_then(|date| global.years.iter().position(|year| year.contains(date)))
				.or_else(|| global.years.iter().rposition(PeriodRecord::has_data))
				.unwrap_or(0);
			Item::Year(index)
		}
		LevelView::Day(day) => {
			if day.details.is_empty() {
				return None;
			}
			Item::Detail(0)
		}
		LevelView::Year(_) | LevelView::Month(_) | LevelView::Week(_) => {
			let days = view.days();
			if days.is_empty() {
				return None;
			}
			let index = focus
				.and_then(|date| days.iter().position(|day| day.date == date))
				.or_else(|| days.iter().rposition(DayRecord::has_data))
				.unwrap_or(0);
			Item::Day(index)
		}
	};
	Some(Pointer { item, label: false })
}

fn shift(index: usize, delta: i64, len: usize) -> usize {
	if len == 0 {
		return 0;
	}
	(index as i64 + delta).clamp(0, len as i64 - 1) as usize
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pointer {
	item: Item,
	label: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
	Pointer(Pointer),
	Back,
}

#[derive(Debug, Clone, Copy)]
struct Hit {
	area: Rect,
	target: Target,
}

struct Label {
	x: usize,
	text: String,
	pointer: Pointer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
	Left,
	Right,
	Up,
	Down,
}

impl Step {
	fn along(self) -> i64 {
		match self {
			Step::Left | Step::Up => -1,
			Step::Right | Step::Down => 1,
		}
	}

	/// Weeks run left to right and weekdays top to bottom.
	fn in_grid(self) -> i64 {
		match self {
			Step::Left => -7,
			Step::Right => 7,
			Step::Up => -1,
			Step::Down => 1,
		}
	}
}

struct Palette {
	colors: HashMap<String, Color>,
}

impl Palette {
	fn new(projects: &[String], overrides: &BTreeMap<String, String>) -> Self {
		let colors = projects
			.iter()
			.enumerate()
			.map(|(index, name)| {
				let color = overrides
					.get(name)
					.and_then(|raw| color_from_setting(raw))
					.unwrap_or(PROJECT_COLORS[index % PROJECT_COLORS.len()]);
				(name.clone(), color)
			})
			.collect();
		Self { colors }
	}

	fn color(&self, name: &str) -> Color {
		self.colors.get(name).copied().unwrap_or(LABEL_COLOR)
	}
}

/// Staggered fade-in; each element reports once when its fade completes.
#[derive(Debug, Clone)]
struct Fade {
	started: Instant,
	delays: Vec<StdDuration>,
	duration: StdDuration,
	finished: Vec<bool>,
}

impl Fade {
	fn new(level: Level, count: usize, duration: StdDuration, now: Instant) -> Self {
		let mut rng = rand::thread_rng();
		let delays = (0..count)
			.map(|index| match level {
				Level::Global => duration.mul_f64((index + 1) as f64 / 10.0),
				Level::Year => duration.mul_f64((PI * rng.gen_range(0.0..1.0_f64)).cos() + 1.0),
				Level::Month | Level::Week | Level::Day => {
					duration.mul_f64(index as f64 / (count.max(1) * 2) as f64)
				}
			})
			.collect();

		Self {
			started: now,
			delays,
			duration,
			finished: vec![false; count],
		}
	}

	fn progress(&self, index: usize, now: Instant) -> f64 {
		let Some(delay) = self.delays.get(index) else {
			return 1.0;
		};
		let elapsed = now.saturating_duration_since(self.started);
		if elapsed <= *delay {
			return 0.0;
		}
		if self.duration.is_zero() {
			return 1.0;
		}
		((elapsed - *delay).as_secs_f64() / self.duration.as_secs_f64()).min(1.0)
	}

	/// Marks newly completed elements and returns how many there were.
	fn advance(&mut self, now: Instant) -> usize {
		let mut newly_finished = 0;
		for index in 0..self.finished.len() {
			if !self.finished[index] && self.progress(index, now) >= 1.0 {
				self.finished[index] = true;
				newly_finished += 1;
			}
		}
		newly_finished
	}
}

struct Scene<'s, 'a> {
	app: &'s App<'a>,
	view: &'s LevelView,
	palette: Palette,
	now: Instant,
}

impl Scene<'_, '_> {
	fn is_pointed(&self, item: Item) -> bool {
		self.app.pointer == Some(Pointer { item, label: false })
	}

	/// Label hovers dim everything the label does not cover.
	fn is_lit(&self, item: Item) -> bool {
		match self.app.pointer {
			Some(pointer) if pointer.label && !self.app.in_transition() => self.view.highlights(pointer.item, item),
			_ => true,
		}
	}

	fn opacity(&self, index: usize, item: Item) -> f64 {
		let progress = self.app.fade.progress(index, self.now);
		if self.is_lit(item) {
			progress
		} else {
			progress * DIMMED_OPACITY
		}
	}

	fn shade(&self, index: usize, item: Item, target: Rgb) -> Color {
		rgb_color(SURFACE.blend(target, self.opacity(index, item)))
	}

	/// Bars grow with the fade instead of blending named colors.
	fn grown(&self, index: usize, full: usize) -> usize {
		let progress = self.app.fade.progress(index, self.now);
		((full as f64) * progress).round() as usize
	}

	fn grid_cell(&self, index: usize, total: u64, scale: &ColorScale, width: usize) -> Span<'static> {
		let item = Item::Day(index);
		let symbol = match (self.is_pointed(item), total > 0) {
			(true, _) => "◆",
			(false, true) => "■",
			(false, false) => "·",
		};
		let style = if total > 0 {
			Style::default().fg(self.shade(index, item, scale.color_for(total)))
		} else if self.is_pointed(item) {
			Style::default().fg(LABEL_COLOR)
		} else {
			Style::default().fg(EMPTY_CELL_COLOR)
		};
		Span::styled(fit(symbol, width), style)
	}

	fn label_style(&self, pointer: Pointer) -> Style {
		if self.app.pointer == Some(pointer) {
			Style::default()
				.fg(FOCUSED_PANEL_BORDER_COLOR)
				.add_modifier(Modifier::BOLD)
		} else {
			Style::default().fg(LABEL_COLOR)
		}
	}
}

struct App<'a> {
	dataset: &'a Dataset,
	settings: &'a Settings,
	base_color: Rgb,
	nav: Option<NavigationState>,
	view: Option<LevelView>,
	pointer: Option<Pointer>,
	fade: Fade,
	hits: Vec<Hit>,
	status: String,
}

impl<'a> App<'a> {
	fn new(dataset: &'a Dataset, settings: &'a Settings, base_color: Rgb, now: Instant) -> Self {
		let mut app = Self {
			dataset,
			settings,
			base_color,
			nav: None,
			view: None,
			pointer: None,
			fade: Fade::new(Level::Global, 0, StdDuration::ZERO, now),
			hits: Vec::new(),
			status: "Ready".to_string(),
		};

		match initial_view(dataset, settings.overview) {
			Ok(view) => {
				app.nav = Some(NavigationState::new(view));
				app.refresh(None, now);
			}
			Err(err) => {
				warn!(%err, "nothing to render");
				app.status = err.to_string();
			}
		}
		app
	}

	fn in_transition(&self) -> bool {
		self.nav.as_ref().is_some_and(NavigationState::is_in_transition)
	}

	fn transition_duration(&self) -> StdDuration {
		StdDuration::from_millis(self.settings.transition_ms)
	}

	/// Rebuilds the level view-model; the previous one is dropped.
	fn refresh(&mut self, focus: Option<NaiveDate>, now: Instant) {
		let duration = self.transition_duration();
		let Some(nav) = self.nav.as_mut() else {
			return;
		};

		let view = derive_view(nav.view(), self.dataset);
		let count = view.element_count();
		self.fade = Fade::new(view.level(), count, duration, now);
		nav.begin_animation(count);
		self.pointer = default_pointer(&view, focus);
		self.view = Some(view);
	}

	fn advance_animation(&mut self, now: Instant) {
		let finished = self.fade.advance(now);
		if let Some(nav) = self.nav.as_mut() {
			for _ in 0..finished {
				nav.element_finished();
			}
		}
	}

	fn apply(
		&mut self,
		step: impl FnOnce(&mut NavigationState) -> Result<(), GuardViolation>,
		keep_focus: bool,
		now: Instant,
	) {
		let Some(nav) = self.nav.as_mut() else {
			return;
		};

		let from = nav.level();
		let anchor = nav.view().anchor();
		match step(nav) {
			Ok(()) => {
				info!(%from, to = %nav.level(), history = ?nav.history_levels(), "transition");
				self.status = format!("{} overview", nav.level());
				self.refresh(anchor.filter(|_| keep_focus), now);
			}
			Err(violation) => debug!(%violation, "transition ignored"),
		}
	}

	fn back(&mut self, now: Instant) {
		self.apply(NavigationState::back, true, now);
	}

	fn activate(&mut self, handler: &mut Option<DetailHandler>, now: Instant) {
		let (Some(view), Some(pointer)) = (&self.view, self.pointer) else {
			return;
		};

		if let Item::Detail(index) = pointer.item {
			if self.nav.as_ref().is_some_and(NavigationState::is_in_transition) {
				return;
			}
			if let Some(detail) = view.detail(index) {
				info!(project = %detail.name, date = %detail.date, value = detail.value, "picked detail record");
				if let Some(handler) = handler.as_mut() {
					handler(detail);
				}
				self.status = format!("Picked {} at {}", detail.name, detail.date.format("%Y-%m-%d %H:%M"));
			}
			return;
		}

		let Some(target) = view.drill_target(pointer.item) else {
			return;
		};
		self.apply(|nav| nav.select(target), false, now);
	}

	fn hover(&mut self, pointer: Pointer) {
		if self.in_transition() {
			return;
		}
		self.pointer = Some(pointer);
	}

	fn leave(&mut self) {
		if self.in_transition() {
			return;
		}
		if self.pointer.is_some_and(|pointer| pointer.label) {
			self.pointer = None;
		}
	}

	fn hit_at(&self, column: u16, row: u16) -> Option<Target> {
		self.hits
			.iter()
			.rev()
			.find(|hit| {
				hit.area.x <= column && column < hit.area.right() && hit.area.y <= row && row < hit.area.bottom()
			})
			.map(|hit| hit.target)
	}

	fn step_pointer(&mut self, step: Step) {
		if self.in_transition() {
			return;
		}
		let (Some(view), Some(pointer)) = (&self.view, self.pointer) else {
			return;
		};

		let item = match (view, pointer.item) {
			(LevelView::Global(global), Item::Year(index)) => Item::Year(shift(index, step.along(), global.years.len())),
			(LevelView::Year(year), Item::Month(index)) => Item::Month(shift(index, step.along(), year.months.len())),
			(LevelView::Month(month), Item::Week(index)) => Item::Week(shift(index, step.along(), month.weeks.len())),
			(LevelView::Year(_) | LevelView::Month(_), Item::Day(index)) => {
				Item::Day(shift(index, step.in_grid(), view.days().len()))
			}
			(LevelView::Week(week), Item::Day(index)) => Item::Day(shift(index, step.along(), week.days.len())),
			(LevelView::Day(day), Item::Detail(index)) => Item::Detail(shift(index, step.along(), day.details.len())),
			_ => pointer.item,
		};
		self.pointer = Some(Pointer { item, ..pointer });
	}

	/// Moves between a cell and the label (month, week or year) that contains it.
	fn toggle_labels(&mut self) {
		if self.in_transition() {
			return;
		}
		let (Some(view), Some(pointer)) = (&self.view, self.pointer) else {
			return;
		};

		let next = match (view, pointer.item) {
			(LevelView::Global(_), Item::Year(_)) => Pointer {
				item: pointer.item,
				label: !pointer.label,
			},
			(LevelView::Year(year), Item::Day(index)) => {
				let Some(month) = year.days.get(index).and_then(|day| {
					year.months.iter().position(|month| month.contains(day.date))
				}) else {
					return;
				};
				Pointer {
					item: Item::Month(month),
					label: true,
				}
			}
			(LevelView::Year(year), Item::Month(index)) => {
				let Some(first) = year
					.months
					.get(index)
					.and_then(|month| day_index(&year.days, year.year.date, month.date))
				else {
					return;
				};
				Pointer {
					item: Item::Day(first),
					label: false,
				}
			}
			(LevelView::Month(month), Item::Day(index)) => {
				let Some(week) = month
					.days
					.get(index)
					.and_then(|day| month.weeks.iter().position(|week| week.contains(day.date)))
				else {
					return;
				};
				Pointer {
					item: Item::Week(week),
					label: true,
				}
			}
			(LevelView::Month(month), Item::Week(index)) => {
				let Some(first) = month
					.weeks
					.get(index)
					.and_then(|week| day_index(&month.days, month.month.date, week.date.max(month.month.date)))
				else {
					return;
				};
				Pointer {
					item: Item::Day(first),
					label: false,
				}
			}
			_ => return,
		};
		self.pointer = Some(next);
	}
}
