//! Aligned plain-text tables for reports printed to stdout.

use std::fmt::Write as _;

/// Renders `rows` under `headers` with two-space column gaps. Cells that
/// look numeric are right-aligned.
pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut widths = headers
        .iter()
        .map(|h| h.chars().count())
        .collect::<Vec<_>>();
    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(widths.len()) {
            widths[idx] = widths[idx].max(clean(cell).chars().count());
        }
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_line(headers, &widths));
    let rule = widths.iter().map(|w| "-".repeat((*w).max(3))).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_line(&rule, &widths));
    for row in rows {
        let _ = writeln!(output, "{}", format_line(row, &widths));
    }
    output
}

/// Two-column `metric  value` rendering used by the stage reports.
pub fn render_report(title: &str, rows: &[Vec<String>]) -> String {
    render_table(&[title.to_string(), "value".to_string()], rows)
}

pub fn print_report(title: &str, rows: &[Vec<String>]) {
    print!("{}", render_report(title, rows));
}

fn format_line(cells: &[String], widths: &[usize]) -> String {
    let mut line = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| {
            let text = clean(cell);
            let pad = width.saturating_sub(text.chars().count());
            if looks_numeric(&text) {
                format!("{}{text}", " ".repeat(pad))
            } else {
                format!("{text}{}", " ".repeat(pad))
            }
        })
        .collect::<Vec<_>>()
        .join("  ");
    line.truncate(line.trim_end().len());
    line
}

fn clean(value: &str) -> String {
    value.replace(['\n', '\r', '\t'], " ")
}

fn looks_numeric(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | ',' | ' ' | '/'))
        && value.chars().any(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn right_aligns_numbers_and_left_aligns_text() {
        let rendered = render_report(
            "metric",
            &[
                vec!["order lines".to_string(), "2155".to_string()],
                vec!["years".to_string(), "1996, 1997".to_string()],
                vec!["note".to_string(), "ok".to_string()],
            ],
        );
        let lines = rendered.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "metric       value");
        assert_eq!(lines[1], "-----------  ----------");
        assert_eq!(lines[2], "order lines        2155");
        assert_eq!(lines[4], "note         ok");
    }

    #[test]
    fn control_characters_become_spaces() {
        let rendered = render_table(&["a".to_string()], &[vec!["x\ny".to_string()]]);
        assert_eq!(rendered.lines().nth(2), Some("x y"));
    }
}
