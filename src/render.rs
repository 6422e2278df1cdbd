//! Plain-text rendering of result sets for the terminal.

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::audit::LogEntry;
use crate::db::{CellValue, ResultSet};

const MAX_CELL_WIDTH: usize = 60;

/// psql-style aligned table followed by a row count footer.
pub fn render_table(result: &ResultSet) -> String {
    let headers: Vec<String> = result.columns.iter().map(|c| cell_text(&c.name)).collect();
    let body: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| row.iter().map(|cell| cell_text(&cell.display())).collect())
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.width()).collect();
    for row in &body {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.width());
            }
        }
    }

    let mut out = String::new();
    if !headers.is_empty() {
        out.push_str(&render_line(&headers, &widths));
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(w + 2)).collect();
        out.push_str(&rule.join("+"));
        out.push('\n');
        for row in &body {
            out.push_str(&render_line(row, &widths));
        }
    }

    let n = result.row_count();
    out.push_str(&format!("({} row{})", n, if n == 1 { "" } else { "s" }));
    out
}

/// Audit entries as a result set, so they render like any query result.
pub fn logs_table(entries: &[LogEntry]) -> ResultSet {
    let rows = entries
        .iter()
        .map(|e| {
            vec![
                CellValue::TimestampTz(e.log_time),
                CellValue::Text(e.user_name.clone()),
                CellValue::Text(e.action_type.to_string()),
                CellValue::Text(e.status.to_string()),
                CellValue::Text(e.user_input.clone()),
                CellValue::Text(e.generated_sql.clone()),
                CellValue::Text(e.details.clone()),
            ]
        })
        .collect();
    ResultSet::new(
        &[
            "log_time",
            "user_name",
            "action_type",
            "status",
            "user_input",
            "generated_sql",
            "details",
        ],
        rows,
    )
}

fn render_line(cells: &[String], widths: &[usize]) -> String {
    let padded: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, &w)| format!(" {}{} ", cell, " ".repeat(w.saturating_sub(cell.width()))))
        .collect();
    let mut line = padded.join("|").trim_end().to_string();
    line.push('\n');
    line
}

/// Single-line, width-capped text for one cell.
fn cell_text(raw: &str) -> String {
    let flat: String = raw
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    truncate_to_width(&flat, MAX_CELL_WIDTH)
}

fn truncate_to_width(s: &str, max: usize) -> String {
    if s.width() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for c in s.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > max.saturating_sub(1) {
            break;
        }
        out.push(c);
        used += w;
    }
    out.push('…');
    out
}
