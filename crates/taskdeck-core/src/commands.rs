use std::io::Write;
use std::time::Duration;

use anyhow::{Context, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, instrument, warn};

use crate::calendar;
use crate::cli::Invocation;
use crate::config::Config;
use crate::datetime::{local_date, parse_instant, parse_month_arg, resolve_timezone, shift_months};
use crate::filter::{FilterCriteria, filter_tasks};
use crate::render::Renderer;
use crate::repo::{ProjectRepository, TaskRepository};
use crate::service::Tracker;
use crate::sort::{SortOrder, sort_tasks};
use crate::stats::aggregate;
use crate::task::Priority;

const RETRY_DELAY: Duration = Duration::from_millis(100);

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "add",
        "list",
        "done",
        "undone",
        "delete",
        "stats",
        "calendar",
        "projects",
        "project-add",
        "project-delete",
        "export",
        "help",
        "version",
    ]
}

/// Exact name, or the single command `token` is a prefix of.
pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if token.is_empty() {
        return None;
    }
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

/// Reference instant for the whole invocation, in the display timezone.
pub fn reference_now(cfg: &Config, now_override: Option<&str>) -> anyhow::Result<DateTime<Tz>> {
    let tz = resolve_timezone(cfg.get("timezone").as_deref());
    let instant = match now_override {
        Some(raw) => parse_instant(raw).ok_or_else(|| anyhow!("invalid --now value: {raw}"))?,
        None => Utc::now(),
    };
    debug!(%tz, %instant, "resolved reference instant");
    Ok(instant.with_timezone(&tz))
}

pub fn tracker_for<S>(store: S, cfg: &Config) -> Tracker<S>
where
    S: TaskRepository + ProjectRepository,
{
    let retries = cfg
        .get_u32("store.retries")
        .unwrap_or(crate::service::DEFAULT_RETRIES);
    Tracker::new(store).with_retries(retries, RETRY_DELAY)
}

#[instrument(skip(tracker, cfg, renderer, inv, out))]
pub fn dispatch<S, W>(
    tracker: &mut Tracker<S>,
    cfg: &Config,
    renderer: &Renderer,
    inv: Invocation,
    now_override: Option<&str>,
    out: &mut W,
) -> anyhow::Result<()>
where
    S: TaskRepository + ProjectRepository,
    W: Write,
{
    let now = reference_now(cfg, now_override)?;
    let command = inv.command.as_str();

    debug!(
        command,
        filter = ?inv.filter_terms,
        args = ?inv.command_args,
        now = %now,
        "dispatching command"
    );

    match command {
        "add" => cmd_add(tracker, &inv.command_args, &now, out),
        "list" => cmd_list(tracker, cfg, renderer, &inv.filter_terms, &now, out),
        "done" => cmd_set_completed(tracker, &inv, true, &now, out),
        "undone" => cmd_set_completed(tracker, &inv, false, &now, out),
        "delete" => cmd_delete(tracker, &inv, out),
        "stats" => cmd_stats(tracker, renderer, &inv.filter_terms, &now, out),
        "calendar" => cmd_calendar(tracker, renderer, &inv.command_args, &now, out),
        "projects" => cmd_projects(tracker, renderer, out),
        "project-add" => cmd_project_add(tracker, &inv.command_args, &now, out),
        "project-delete" => cmd_project_delete(tracker, &inv.command_args, out),
        "export" => cmd_export(tracker, cfg, &inv.filter_terms, &now, out),
        "help" => cmd_help(out),
        "version" => cmd_version(out),
        other => Err(anyhow!("unknown command: {other}")),
    }
}

#[instrument(skip(tracker, args, now, out))]
fn cmd_add<S, W>(
    tracker: &mut Tracker<S>,
    args: &[String],
    now: &DateTime<Tz>,
    out: &mut W,
) -> anyhow::Result<()>
where
    S: TaskRepository + ProjectRepository,
    W: Write,
{
    info!("command add");

    let mut project = None;
    let mut priority = Priority::default();
    let mut words = Vec::with_capacity(args.len());

    for arg in args {
        if let Some(value) = arg.strip_prefix("project:") {
            project = (!value.is_empty()).then(|| value.to_string());
        } else if let Some(value) = arg
            .strip_prefix("pri:")
            .or_else(|| arg.strip_prefix("priority:"))
        {
            priority = parse_priority(value)?;
        } else {
            words.push(arg.as_str());
        }
    }

    let text = words.join(" ");
    let task = tracker.quick_add(&text, project, priority, now)?;

    match task.due_date {
        Some(due) => writeln!(
            out,
            "Created task {} due {}.",
            task.id,
            local_date(due, &now.timezone())
        )?,
        None => writeln!(out, "Created task {}.", task.id)?,
    }
    Ok(())
}

#[instrument(skip(tracker, cfg, renderer, filter_terms, now, out))]
fn cmd_list<S, W>(
    tracker: &Tracker<S>,
    cfg: &Config,
    renderer: &Renderer,
    filter_terms: &[String],
    now: &DateTime<Tz>,
    out: &mut W,
) -> anyhow::Result<()>
where
    S: TaskRepository + ProjectRepository,
    W: Write,
{
    info!("command list");

    let criteria = FilterCriteria::parse(filter_terms)?;
    let view = tracker.view(&criteria, sort_order(cfg), now);
    let projects = tracker.load_projects();
    renderer.print_task_table(out, &view.visible, &projects, now)?;
    Ok(())
}

#[instrument(skip(tracker, inv, now, out))]
fn cmd_set_completed<S, W>(
    tracker: &mut Tracker<S>,
    inv: &Invocation,
    completed: bool,
    now: &DateTime<Tz>,
    out: &mut W,
) -> anyhow::Result<()>
where
    S: TaskRepository + ProjectRepository,
    W: Write,
{
    info!(completed, "command done/undone");

    let ids = parse_ids(inv)?;
    let changed = tracker.set_completed(&ids, completed, now)?;
    let verb = if completed { "Completed" } else { "Reopened" };
    writeln!(out, "{verb} {} task(s).", changed.len())?;
    Ok(())
}

#[instrument(skip(tracker, inv, out))]
fn cmd_delete<S, W>(tracker: &mut Tracker<S>, inv: &Invocation, out: &mut W) -> anyhow::Result<()>
where
    S: TaskRepository + ProjectRepository,
    W: Write,
{
    info!("command delete");

    let ids = parse_ids(inv)?;
    let removed = tracker.delete(&ids)?;
    writeln!(out, "Deleted {} task(s).", removed.len())?;
    Ok(())
}

#[instrument(skip(tracker, renderer, filter_terms, now, out))]
fn cmd_stats<S, W>(
    tracker: &Tracker<S>,
    renderer: &Renderer,
    filter_terms: &[String],
    now: &DateTime<Tz>,
    out: &mut W,
) -> anyhow::Result<()>
where
    S: TaskRepository + ProjectRepository,
    W: Write,
{
    info!("command stats");

    let criteria = FilterCriteria::parse(filter_terms)?;
    let view = tracker.view(&criteria, SortOrder::default(), now);
    let stats = if criteria.is_empty() {
        view.stats
    } else {
        aggregate(&view.visible, now)
    };
    renderer.print_stats(out, &stats)
}

/// `calendar [YYYY-MM | YYYY-MM-DD | +N | -N]`; a full date also lists
/// that day's tasks.
#[instrument(skip(tracker, renderer, args, now, out))]
fn cmd_calendar<S, W>(
    tracker: &Tracker<S>,
    renderer: &Renderer,
    args: &[String],
    now: &DateTime<Tz>,
    out: &mut W,
) -> anyhow::Result<()>
where
    S: TaskRepository + ProjectRepository,
    W: Write,
{
    info!("command calendar");

    let today = now.date_naive();
    let (month, selected) = match args.first().map(String::as_str) {
        None => (today, None),
        Some(token) => parse_calendar_arg(token, today)?,
    };

    tracker.calendar(month, now, |grid, all| -> anyhow::Result<()> {
        renderer.print_calendar(out, grid)?;
        if let Some(date) = selected {
            let tasks = calendar::tasks_on(all, date, &now.timezone());
            renderer.print_day(out, date, &tasks)?;
        }
        Ok(())
    })
}

#[instrument(skip(tracker, renderer, out))]
fn cmd_projects<S, W>(
    tracker: &mut Tracker<S>,
    renderer: &Renderer,
    out: &mut W,
) -> anyhow::Result<()>
where
    S: TaskRepository + ProjectRepository,
    W: Write,
{
    info!("command projects");
    let projects = tracker.projects_with_active_counts();
    renderer.print_projects(out, &projects)
}

#[instrument(skip(tracker, args, now, out))]
fn cmd_project_add<S, W>(
    tracker: &mut Tracker<S>,
    args: &[String],
    now: &DateTime<Tz>,
    out: &mut W,
) -> anyhow::Result<()>
where
    S: TaskRepository + ProjectRepository,
    W: Write,
{
    info!("command project-add");

    let (id, rest) = args
        .split_first()
        .ok_or_else(|| anyhow!("usage: project-add <id> <name...> [color:#RRGGBB]"))?;

    let mut color = None;
    let mut name_words = Vec::with_capacity(rest.len());
    for word in rest {
        if let Some(value) = word.strip_prefix("color:") {
            if !is_hex_color(value) {
                return Err(anyhow!("invalid color (expected #RRGGBB): {value}"));
            }
            color = Some(value.to_string());
        } else {
            name_words.push(word.as_str());
        }
    }

    let name = if name_words.is_empty() {
        id.clone()
    } else {
        name_words.join(" ")
    };
    let project = tracker.create_project(id, &name, color, now)?;
    writeln!(out, "Created project {} ({}).", project.id, project.name)?;
    Ok(())
}

#[instrument(skip(tracker, args, out))]
fn cmd_project_delete<S, W>(
    tracker: &mut Tracker<S>,
    args: &[String],
    out: &mut W,
) -> anyhow::Result<()>
where
    S: TaskRepository + ProjectRepository,
    W: Write,
{
    info!("command project-delete");

    let id = args
        .first()
        .ok_or_else(|| anyhow!("usage: project-delete <id>"))?;
    let removed = tracker.delete_project(id)?;
    writeln!(out, "Deleted project {}.", removed.id)?;
    Ok(())
}

#[instrument(skip(tracker, cfg, filter_terms, now, out))]
fn cmd_export<S, W>(
    tracker: &Tracker<S>,
    cfg: &Config,
    filter_terms: &[String],
    now: &DateTime<Tz>,
    out: &mut W,
) -> anyhow::Result<()>
where
    S: TaskRepository + ProjectRepository,
    W: Write,
{
    info!("command export");

    let criteria = FilterCriteria::parse(filter_terms)?;
    let rows = sort_tasks(filter_tasks(&tracker.load_tasks(), &criteria, now), sort_order(cfg));
    let json = serde_json::to_string_pretty(&rows).context("failed to serialize tasks")?;
    writeln!(out, "{json}")?;
    Ok(())
}

fn cmd_help<W: Write>(out: &mut W) -> anyhow::Result<()> {
    writeln!(
        out,
        "usage: taskdeck [options] [filter...] <command> [args...]\n\n\
         commands:\n  \
         add <text> [project:ID] [pri:1|2|3]\n  \
         list | stats | export\n  \
         done <id...> | undone <id...> | delete <id...>\n  \
         calendar [YYYY-MM | YYYY-MM-DD | +N | -N]\n  \
         projects | project-add <id> <name> [color:#RRGGBB] | project-delete <id>\n  \
         help | version\n\n\
         filters: project:ID status:pending|completed due:YYYY-MM-DD +OVERDUE +TODAY <words>"
    )?;
    Ok(())
}

fn cmd_version<W: Write>(out: &mut W) -> anyhow::Result<()> {
    writeln!(out, "taskdeck {}", env!("CARGO_PKG_VERSION"))?;
    Ok(())
}

fn sort_order(cfg: &Config) -> SortOrder {
    match cfg.get("sort") {
        None => SortOrder::default(),
        Some(raw) => SortOrder::parse(&raw).unwrap_or_else(|| {
            warn!(value = %raw, "unknown sort order; using priority");
            SortOrder::default()
        }),
    }
}

fn parse_priority(raw: &str) -> anyhow::Result<Priority> {
    match raw.to_ascii_lowercase().as_str() {
        "h" | "high" => Ok(Priority::High),
        "m" | "medium" => Ok(Priority::Medium),
        "l" | "low" => Ok(Priority::Low),
        other => {
            let rank: u8 = other
                .parse()
                .with_context(|| format!("invalid priority: {raw}"))?;
            Priority::try_from(rank)
        }
    }
}

/// Short ids from the terms before the command and the arguments after
/// it; `1,2` lists are split.
fn parse_ids(inv: &Invocation) -> anyhow::Result<Vec<u64>> {
    let mut ids = Vec::new();
    for token in inv.filter_terms.iter().chain(&inv.command_args) {
        for part in token.split(',').filter(|p| !p.is_empty()) {
            let id = part
                .parse::<u64>()
                .with_context(|| format!("expected a task id, got: {part}"))?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    if ids.is_empty() {
        return Err(anyhow!("{} needs at least one task id", inv.command));
    }
    Ok(ids)
}

fn parse_calendar_arg(
    token: &str,
    today: NaiveDate,
) -> anyhow::Result<(NaiveDate, Option<NaiveDate>)> {
    if let Some(offset) = token
        .strip_prefix('+')
        .or_else(|| token.starts_with('-').then_some(token))
        && let Ok(months) = offset.parse::<i32>()
    {
        return Ok((shift_months(today, months), None));
    }

    if let Ok(date) = NaiveDate::parse_from_str(token, "%Y-%m-%d") {
        return Ok((date, Some(date)));
    }

    let month = parse_month_arg(token)
        .ok_or_else(|| anyhow!("expected YYYY-MM, YYYY-MM-DD or +N/-N, got: {token}"))?;
    Ok((month, None))
}

fn is_hex_color(value: &str) -> bool {
    value.len() == 7
        && value.starts_with('#')
        && value[1..].chars().all(|c| c.is_ascii_hexdigit())
}
