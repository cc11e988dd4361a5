//! Output formats shared by every command.

use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Json,
    Table,
    Markdown,
}

/// Print `value` as JSON on stdout, compact unless `pretty`.
pub fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{text}");
    Ok(())
}

/// Dispatch to the JSON encoder or one of the human renderers.
pub fn print_with<T, F, G>(value: &T, format: Format, pretty: bool, table: F, markdown: G) -> Result<()>
where
    T: Serialize,
    F: FnOnce(&T),
    G: FnOnce(&T),
{
    match format {
        Format::Json => print_json(value, pretty)?,
        Format::Table => table(value),
        Format::Markdown => markdown(value),
    }
    Ok(())
}

/// Left-aligned, space-padded columns with a dashed rule under the header.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) {
    print!("{}", table_string(headers, rows));
}

pub fn render_markdown(headers: &[&str], rows: &[Vec<String>]) {
    print!("{}", markdown_string(headers, rows));
}

fn column_widths(headers: &[&str], rows: &[Vec<String>]) -> Vec<usize> {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(widths.len()) {
            widths[i] = widths[i].max(compact(cell).chars().count());
        }
    }
    widths
}

pub fn table_string(headers: &[&str], rows: &[Vec<String>]) -> String {
    let widths = column_widths(headers, rows);
    let mut out = String::new();
    let line = |cells: Vec<String>| {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(c, &w)| format!("{c:<w$}"))
            .collect();
        format!("{}\n", padded.join("  ").trim_end())
    };
    out.push_str(&line(headers.iter().map(|h| h.to_uppercase()).collect()));
    let total: usize = widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1);
    out.push_str(&"-".repeat(total));
    out.push('\n');
    for row in rows {
        out.push_str(&line(row.iter().map(|c| compact(c)).collect()));
    }
    out
}

pub fn markdown_string(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut out = format!("| {} |\n", headers.join(" | "));
    out.push_str(&format!("|{}\n", " --- |".repeat(headers.len())));
    for row in rows {
        let cells: Vec<String> = row.iter().map(|c| escape_markdown(c)).collect();
        out.push_str(&format!("| {} |\n", cells.join(" | ")));
    }
    out
}

/// Collapse runs of whitespace (including newlines) to single spaces.
pub fn compact(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn escape_markdown(input: &str) -> String {
    compact(input).replace('|', "\\|")
}

/// `value` trimmed, or `n/a` when blank.
pub fn or_na(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => "n/a".to_string(),
    }
}
