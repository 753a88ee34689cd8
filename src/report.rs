//! Terminal rendering of probe results: one table row per probe, plus the
//! captured HTTP exchange for anything that failed.

use crate::domain::{Severity, TestResult};

const GREEN: &str = "\x1b[92m";
const YELLOW: &str = "\x1b[93m";
const RED: &str = "\x1b[91m";
const RESET: &str = "\x1b[0m";

const DESCRIPTION_WIDTH: usize = 60;

fn color_for(severity: Severity) -> &'static str {
    match severity {
        Severity::Ok => GREEN,
        Severity::Warning => YELLOW,
        Severity::Fail => RED,
    }
}

fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            if current.is_empty() {
                current = word.to_string();
            } else if current.len() + 1 + word.len() <= width {
                current.push(' ');
                current.push_str(word);
            } else {
                lines.push(std::mem::take(&mut current));
                current = word.to_string();
            }
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

pub fn print_title(title: &str) {
    println!();
    println!("{}", "-".repeat(title.len()));
    println!("{title}");
    println!("{}", "-".repeat(title.len()));
    println!();
}

/// Renders the per-probe table. The description column only appears when
/// at least one probe produced a message.
pub fn print_results(results: &[TestResult], no_color: bool) {
    let any_message = results.iter().any(|r| r.message.is_some());

    let mut rows: Vec<(String, String, String, Vec<String>)> = Vec::new();
    for (i, result) in results.iter().enumerate() {
        let description = match (&result.message, any_message) {
            (Some(message), _) => wrap_text(message, DESCRIPTION_WIDTH),
            (None, true) => vec![String::new()],
            (None, false) => Vec::new(),
        };
        rows.push((
            (i + 1).to_string(),
            format!("{}ms", result.duration_ms),
            result.title.clone(),
            description,
        ));
    }

    let index_width = rows.iter().map(|r| r.0.len()).max().unwrap_or(1).max(1);
    let time_width = rows.iter().map(|r| r.1.len()).max().unwrap_or(4).max(4);
    let title_width = rows
        .iter()
        .map(|r| r.2.len())
        .max()
        .unwrap_or(9)
        .max("Test name".len());
    let desc_width = rows
        .iter()
        .flat_map(|r| r.3.iter().map(String::len))
        .max()
        .unwrap_or(0)
        .max("Description".len());

    let separator = if any_message {
        format!(
            "+{}+{}+{}+{}+",
            "-".repeat(index_width + 2),
            "-".repeat(time_width + 2),
            "-".repeat(title_width + 2),
            "-".repeat(desc_width + 2),
        )
    } else {
        format!(
            "+{}+{}+{}+",
            "-".repeat(index_width + 2),
            "-".repeat(time_width + 2),
            "-".repeat(title_width + 2),
        )
    };

    println!("{separator}");
    if any_message {
        println!(
            "| {:index_width$} | {:time_width$} | {:title_width$} | {:desc_width$} |",
            "#", "Time", "Test name", "Description",
        );
    } else {
        println!(
            "| {:index_width$} | {:time_width$} | {:title_width$} |",
            "#", "Time", "Test name",
        );
    }
    println!("{separator}");

    for (row, result) in rows.iter().zip(results) {
        let (color, reset) = if no_color {
            ("", "")
        } else {
            (color_for(result.severity), RESET)
        };
        let description_lines = if row.3.is_empty() {
            vec![String::new()]
        } else {
            row.3.clone()
        };
        for (line_no, line) in description_lines.iter().enumerate() {
            let (index, time, title) = if line_no == 0 {
                (row.0.as_str(), row.1.as_str(), row.2.as_str())
            } else {
                ("", "", "")
            };
            if any_message {
                println!(
                    "| {index:index_width$} | {color}{time:time_width$}{reset} | \
                     {color}{title:title_width$}{reset} | {line:desc_width$} |",
                );
            } else {
                println!(
                    "| {index:index_width$} | {color}{time:time_width$}{reset} | \
                     {color}{title:title_width$}{reset} |",
                );
            }
        }
    }
    println!("{separator}");
}

/// Dumps the captured HTTP exchange of every failed probe, for debugging
/// against a live remote.
pub fn print_failures(results: &[TestResult]) {
    for result in results.iter().filter(|r| r.is_fail()) {
        let Some(exchange) = &result.response else {
            continue;
        };
        println!();
        println!("--- {} ---", result.title);
        println!("URL:    {}", exchange.url);
        println!("Status: {}", exchange.status);
        for (name, value) in &exchange.headers {
            println!("Header: {name}: {value}");
        }
        if let Some(payload) = &exchange.payload {
            println!("Request payload: {payload}");
        }
        println!("Response body: {}", exchange.body);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_text_respects_width() {
        let lines = wrap_text(
            "the quick brown fox jumps over the lazy dog and keeps running",
            20,
        );
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|l| l.len() <= 20));
    }

    #[test]
    fn wrap_text_keeps_explicit_line_breaks() {
        let lines = wrap_text("first\n second", 40);
        assert_eq!(lines, vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn wrap_text_handles_empty_input() {
        assert_eq!(wrap_text("", 10), vec![String::new()]);
    }
}
