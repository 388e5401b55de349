use std::collections::HashMap;
use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{DateTime, Datelike, NaiveDate};
use chrono_tz::Tz;
use unicode_width::UnicodeWidthStr;

use crate::calendar::{CalendarDay, CalendarGrid, DayIndicator};
use crate::classify::{Temporal, classify};
use crate::config::Config;
use crate::stats::TaskStats;
use crate::task::{Project, Task};

const RED: &str = "31";
const AMBER: &str = "33";
const DIM: &str = "2";
const BOLD: &str = "1";

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self {
            color: color && io::stdout().is_terminal(),
        })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip(self, out, tasks, projects, now))]
    pub fn print_task_table<W: Write>(
        &self,
        out: &mut W,
        tasks: &[Task],
        projects: &[Project],
        now: &DateTime<Tz>,
    ) -> anyhow::Result<()> {
        if tasks.is_empty() {
            writeln!(out, "No matching tasks.")?;
            return Ok(());
        }

        let names: HashMap<&str, &str> = projects
            .iter()
            .map(|p| (p.id.as_str(), p.name.as_str()))
            .collect();
        let tz = now.timezone();

        let headers = vec![
            "ID".to_string(),
            "Pri".to_string(),
            "Due".to_string(),
            "Project".to_string(),
            "Title".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());
        for task in tasks {
            let due = task
                .due_date
                .map(|date| date.with_timezone(&tz).format("%Y-%m-%d").to_string())
                .unwrap_or_default();
            let due = if task.completed {
                due
            } else {
                match classify(task.due_date, now) {
                    Temporal::Overdue => self.paint(&due, RED),
                    Temporal::DueToday => self.paint(&due, AMBER),
                    Temporal::Upcoming | Temporal::NoDueDate => due,
                }
            };

            let project = task
                .project_id
                .as_deref()
                .map(|id| names.get(id).copied().unwrap_or(id).to_string())
                .unwrap_or_default();

            let title = if task.completed {
                self.paint(&format!("[x] {}", task.title), DIM)
            } else {
                format!("[ ] {}", task.title)
            };

            rows.push(vec![
                self.paint(&task.id.to_string(), AMBER),
                task.priority.label().to_string(),
                due,
                project,
                title,
            ]);
        }

        write_table(&mut *out, headers, rows)?;
        writeln!(out)?;
        writeln!(out, "{} task(s)", tasks.len())?;
        Ok(())
    }

    pub fn print_stats<W: Write>(&self, out: &mut W, stats: &TaskStats) -> anyhow::Result<()> {
        let rows = vec![
            vec!["Total".to_string(), stats.total.to_string()],
            vec!["Completed".to_string(), stats.completed.to_string()],
            vec!["Pending".to_string(), stats.pending.to_string()],
            vec![
                "Overdue".to_string(),
                self.paint_nonzero(stats.overdue, RED),
            ],
            vec![
                "Due today".to_string(),
                self.paint_nonzero(stats.today, AMBER),
            ],
            vec![
                "Completion".to_string(),
                format!("{}%", stats.completion_rate),
            ],
        ];
        write_table(out, vec!["Metric".to_string(), "Value".to_string()], rows)
    }

    /// Month grid, one row per week. Cells carry the day number, an
    /// indicator mark and the pending-count badge.
    #[tracing::instrument(skip(self, out, grid))]
    pub fn print_calendar<W: Write>(
        &self,
        out: &mut W,
        grid: &CalendarGrid<'_>,
    ) -> anyhow::Result<()> {
        let title = grid.month.format("%B %Y").to_string();
        writeln!(out, "{}", self.paint(&title, BOLD))?;

        let header = ["Su", "Mo", "Tu", "We", "Th", "Fr", "Sa"]
            .iter()
            .map(|d| format!("{d:<6}"))
            .collect::<String>();
        writeln!(out, "{}", header.trim_end())?;

        for week in grid.weeks() {
            let line = week
                .iter()
                .map(|day| self.calendar_cell(day))
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(out, "{}", line.trim_end())?;
        }

        writeln!(out)?;
        writeln!(out, "! overdue  * due today  + upcoming")?;
        Ok(())
    }

    /// Detail list under the grid for one selected day.
    pub fn print_day<W: Write>(
        &self,
        out: &mut W,
        date: NaiveDate,
        tasks: &[&Task],
    ) -> anyhow::Result<()> {
        writeln!(out)?;
        writeln!(out, "{}", date.format("%A, %B %-d"))?;
        if tasks.is_empty() {
            writeln!(out, "  nothing due")?;
        }
        for task in tasks {
            let mark = if task.completed { "x" } else { " " };
            writeln!(out, "  [{mark}] {:>3}  {}", task.id, task.title)?;
        }
        Ok(())
    }

    pub fn print_projects<W: Write>(
        &self,
        out: &mut W,
        projects: &[Project],
    ) -> anyhow::Result<()> {
        if projects.is_empty() {
            writeln!(out, "No projects.")?;
            return Ok(());
        }
        let rows = projects
            .iter()
            .map(|p| {
                vec![
                    p.id.clone(),
                    p.name.clone(),
                    p.color.clone(),
                    p.task_count.to_string(),
                ]
            })
            .collect();
        write_table(
            out,
            vec![
                "ID".to_string(),
                "Name".to_string(),
                "Color".to_string(),
                "Open".to_string(),
            ],
            rows,
        )
    }

    fn calendar_cell(&self, day: &CalendarDay<'_>) -> String {
        let mark = match day.indicator {
            DayIndicator::Overdue => "!",
            DayIndicator::DueToday => "*",
            DayIndicator::Upcoming => "+",
            DayIndicator::Empty => " ",
        };
        let badge = day.badge_label().unwrap_or_default();
        let cell = format!("{:>2}{mark}{badge:<2}", day.date.day());

        if !day.in_current_month {
            self.paint(&cell, DIM)
        } else if day.is_today {
            self.paint(&cell, BOLD)
        } else {
            match day.indicator {
                DayIndicator::Overdue => self.paint(&cell, RED),
                DayIndicator::DueToday => self.paint(&cell, AMBER),
                DayIndicator::Upcoming | DayIndicator::Empty => cell,
            }
        }
    }

    fn paint_nonzero(&self, value: usize, code: &str) -> String {
        if value == 0 {
            value.to_string()
        } else {
            self.paint(&value.to_string(), code)
        }
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    let header_line = headers
        .iter()
        .enumerate()
        .map(|(idx, header)| pad(header, widths[idx]))
        .collect::<Vec<_>>()
        .join(" ");
    writeln!(writer, "{}", header_line.trim_end())?;

    let rule = widths
        .iter()
        .map(|width| "-".repeat(*width))
        .collect::<Vec<_>>()
        .join(" ");
    writeln!(writer, "{rule}")?;

    for row in rows {
        let line = row
            .iter()
            .enumerate()
            .map(|(idx, cell)| pad(cell, widths[idx]))
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(writer, "{}", line.trim_end())?;
    }

    Ok(())
}

fn pad(cell: &str, width: usize) -> String {
    let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
    format!("{cell}{}", " ".repeat(width.saturating_sub(visible_width)))
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use chrono_tz::Tz;
    use pretty_assertions::assert_eq;

    use super::{Renderer, strip_ansi, write_table};
    use crate::calendar::build_grid;
    use crate::stats::aggregate;
    use crate::task::{Priority, Project, Task};

    fn now() -> DateTime<Tz> {
        chrono_tz::UTC.with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap()
    }

    fn fixture() -> Vec<Task> {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let mut overdue = Task::new("Renew passport 日本".to_string(), created, 1);
        overdue.due_date = Some(Utc.with_ymd_and_hms(2024, 3, 8, 12, 0, 0).unwrap());
        overdue.priority = Priority::High;
        overdue.project_id = Some("home".to_string());

        let mut today = Task::new("Water plants".to_string(), created, 2);
        today.due_date = Some(Utc.with_ymd_and_hms(2024, 3, 10, 18, 0, 0).unwrap());

        let mut done = Task::new("Sweep".to_string(), created, 3);
        done.set_completed(true, created);
        vec![overdue, today, done]
    }

    fn render(f: impl FnOnce(&mut Vec<u8>)) -> String {
        let mut buf = Vec::new();
        f(&mut buf);
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn table_aligns_wide_characters() {
        let mut buf = Vec::new();
        write_table(
            &mut buf,
            vec!["A".to_string(), "B".to_string()],
            vec![
                vec!["日本".to_string(), "x".to_string()],
                vec!["\x1b[31mab\x1b[0m".to_string(), "y".to_string()],
            ],
        )
        .unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<String> = text.lines().map(strip_ansi).collect();
        assert_eq!(lines, vec!["A    B", "---- -", "日本 x", "ab   y"]);
    }

    #[test]
    fn task_table_shows_project_names_and_status() {
        let projects = vec![Project::new(
            "home".to_string(),
            "Home".to_string(),
            now().with_timezone(&Utc),
        )];
        let out = render(|buf| {
            Renderer::plain()
                .print_task_table(buf, &fixture(), &projects, &now())
                .unwrap()
        });
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "ID Pri  Due        Project Title");
        assert!(lines[2].starts_with("1  High 2024-03-08 Home    [ ] Renew passport"));
        assert!(lines[4].ends_with("[x] Sweep"));
        assert_eq!(lines.last().copied(), Some("3 task(s)"));

        let empty = render(|buf| {
            Renderer::plain()
                .print_task_table(buf, &[], &[], &now())
                .unwrap()
        });
        assert_eq!(empty, "No matching tasks.\n");
    }

    #[test]
    fn calendar_marks_indicators() {
        let tasks = fixture();
        let grid = build_grid(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(), &tasks, &now());
        let out = render(|buf| Renderer::plain().print_calendar(buf, &grid).unwrap());
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "March 2024");
        assert!(lines[1].starts_with("Su    Mo"));
        // Week of March 3: the 8th is overdue with one pending task.
        assert!(lines[3].contains(" 8!1 "));
        // Week of March 10 starts with today's cell.
        assert!(lines[4].starts_with("10*1"));
        assert_eq!(lines.len(), 2 + 6 + 2);
    }

    #[test]
    fn stats_lists_every_counter() {
        let stats = aggregate(&fixture(), &now());
        let out = render(|buf| Renderer::plain().print_stats(buf, &stats).unwrap());
        assert!(out.contains("Overdue    1"));
        assert!(out.contains("Due today  1"));
        assert!(out.contains("Completion 33%"));
    }
}
