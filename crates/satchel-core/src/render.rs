use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::today_in_project_tz;
use crate::storage::StorageInfo;
use crate::task::Task;
use crate::views::{CategoryCount, TaskStats};

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

        Ok(Self { color })
    }

    #[tracing::instrument(skip(self, tasks, now))]
    pub fn print_task_table(&mut self, tasks: &[Task], now: DateTime<Utc>) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let today = today_in_project_tz(now);

        let headers = ["ID", "", "Pri", "Due", "Category", "Title"];

        let mut rows = Vec::with_capacity(tasks.len());
        for task in tasks {
            let id = self.paint(&short_id(task), "33");
            let done = if task.completed { "x" } else { " " };

            let due = task
                .due_date
                .map(|date| date.format("%Y-%m-%d").to_string())
                .unwrap_or_default();
            let due = match task.due_date {
                Some(date) if !task.completed && date < today => self.paint(&due, "31"),
                _ => due,
            };

            let title = if task.subtasks.is_empty() {
                task.title.clone()
            } else {
                let done_subs = task.subtasks.iter().filter(|sub| sub.completed).count();
                format!("{} [{}/{}]", task.title, done_subs, task.subtasks.len())
            };

            rows.push(vec![
                id,
                done.to_string(),
                task.priority.as_str().to_string(),
                due,
                task.category.clone(),
                title,
            ]);
        }

        write_table(&mut out, &headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, task))]
    pub fn print_task_detail(&mut self, task: &Task) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id          {}", task.id)?;
        writeln!(out, "title       {}", task.title)?;
        if !task.description.is_empty() {
            writeln!(out, "description {}", task.description)?;
        }
        writeln!(out, "category    {}", task.category)?;
        writeln!(out, "priority    {}", task.priority)?;
        writeln!(
            out,
            "completed   {}",
            if task.completed { "yes" } else { "no" }
        )?;
        if let Some(due) = task.due_date {
            writeln!(out, "due         {}", due.format("%Y-%m-%d"))?;
        }
        writeln!(out, "created     {}", task.created_at.to_rfc3339())?;

        for subtask in &task.subtasks {
            let mark = if subtask.completed { "x" } else { " " };
            writeln!(out, "  [{mark}] {}  {}", short_sub_id(subtask.id), subtask.title)?;
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, stats))]
    pub fn print_stats(&mut self, stats: &TaskStats) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "total        {}", stats.total)?;
        writeln!(out, "completed    {}", stats.completed)?;
        writeln!(out, "pending      {}", stats.pending)?;
        writeln!(out, "completion   {}%", stats.completion_rate)?;
        writeln!(out, "overdue      {}", self.paint_if(stats.overdue > 0, &stats.overdue.to_string(), "31"))?;
        writeln!(out, "due today    {}", stats.due_today)?;

        if !stats.by_priority.is_empty() {
            writeln!(out)?;
            for (priority, count) in &stats.by_priority {
                writeln!(out, "{:<12} {count}", priority.to_string())?;
            }
        }

        if !stats.by_category.is_empty() {
            writeln!(out)?;
            for (category, count) in &stats.by_category {
                writeln!(out, "{category:<12} {count}")?;
            }
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, counts))]
    pub fn print_category_table(&mut self, counts: &[CategoryCount]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let headers = ["ID", "Name", "Color", "Tasks"];
        let rows = counts
            .iter()
            .map(|entry| {
                vec![
                    self.paint(&entry.category.id.to_string()[..8].to_string(), "33"),
                    entry.category.name.clone(),
                    entry.category.color.clone(),
                    entry.count.to_string(),
                ]
            })
            .collect();

        write_table(&mut out, &headers, rows)?;
        Ok(())
    }

    pub fn print_storage_info(&mut self, info: &StorageInfo) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "used       {} bytes", info.used)?;
        writeln!(out, "available  {} bytes", info.available)?;
        writeln!(out, "total      {} bytes", info.total)?;
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }

    fn paint_if(&self, condition: bool, text: &str, code: &str) -> String {
        if condition {
            self.paint(text, code)
        } else {
            text.to_string()
        }
    }
}

fn short_id(task: &Task) -> String {
    task.id.to_string()[..8].to_string()
}

fn short_sub_id(id: uuid::Uuid) -> String {
    id.to_string()[..8].to_string()
}

fn write_table<W: Write>(
    mut writer: W,
    headers: &[&str],
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();

    let mut widths: Vec<usize> = headers
        .iter()
        .map(|header| UnicodeWidthStr::width(*header))
        .collect();
    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for (idx, header) in headers.iter().enumerate() {
        write!(writer, "{:width$} ", header, width = widths[idx])?;
    }
    writeln!(writer)?;

    for &width in &widths {
        write!(writer, "{:-<width$} ", "", width = width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            let visible = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
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
