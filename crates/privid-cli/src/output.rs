//! Output formatting for human-readable and JSON modes.
//!
//! Human mode uses colored terminal output.
//! JSON mode outputs pure JSON with no ANSI escapes.

use colored::Colorize;
use privid_types::{AccessFlags, AttributeSet, StatusKind, StatusMessage};
use serde::Serialize;

/// Prints a success message.
pub fn print_success(msg: &str, json_mode: bool) {
    if json_mode {
        let obj = serde_json::json!({ "status": "ok", "message": msg });
        println!("{obj}");
    } else {
        println!("{} {}", "✓".green().bold(), msg);
    }
}

/// Prints a single key-value pair.
pub fn print_kv(key: &str, value: &str, json_mode: bool) {
    if json_mode {
        let obj = serde_json::json!({ key: value });
        println!("{obj}");
    } else {
        println!("{}: {}", key.bold(), value);
    }
}

/// Prints a serializable value as compact JSON or pretty JSON.
pub fn print_value<T: Serialize>(value: &T, json_mode: bool) {
    let rendered = if json_mode {
        serde_json::to_string(value)
    } else {
        serde_json::to_string_pretty(value)
    };
    match rendered {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("{{\"error\":\"json serialization failed: {e}\"}}"),
    }
}

/// Prints an error message.
pub fn print_error(msg: &str, json_mode: bool) {
    if json_mode {
        let obj = serde_json::json!({ "error": msg });
        eprintln!("{obj}");
    } else {
        eprintln!("{} {}", "error:".red().bold(), msg);
    }
}

/// Prints a session status line, colored by kind.
pub fn print_status(status: &StatusMessage, json_mode: bool) {
    if json_mode {
        let obj = serde_json::json!({ "kind": status.kind.to_string(), "text": status.text });
        println!("{obj}");
        return;
    }
    let label = match status.kind {
        StatusKind::Info => "info:".cyan(),
        StatusKind::Success => "ok:".green(),
        StatusKind::Warning => "warning:".yellow(),
        StatusKind::Error => "error:".red(),
    };
    println!("{} {}", label.bold(), status.text);
}

/// JSON form of an attribute set.
pub fn attributes_json(attrs: Option<&AttributeSet>) -> serde_json::Value {
    match attrs {
        Some(a) => serde_json::json!({
            "age": a.age.to_string(),
            "region": a.region.to_string(),
            "kyc": a.kyc.to_string(),
        }),
        None => serde_json::Value::Null,
    }
}

/// Prints the current attribute handles.
pub fn print_attributes(attrs: Option<&AttributeSet>, json_mode: bool) {
    if json_mode {
        println!("{}", attributes_json(attrs));
        return;
    }
    match attrs {
        Some(a) => {
            print_kv("Age handle", &short_hex(&a.age.to_string(), 18), false);
            print_kv("Region handle", &short_hex(&a.region.to_string(), 18), false);
            print_kv("KYC handle", &short_hex(&a.kyc.to_string(), 18), false);
        }
        None => println!("  {}", "(no attributes submitted)".dimmed()),
    }
}

/// JSON form of decrypted access flags.
pub fn flags_json(flags: &AccessFlags) -> serde_json::Value {
    serde_json::json!({
        "is_adult": flags.is_adult.value,
        "is_region": flags.is_region.value,
        "access_a": flags.pair.access_a.to_string(),
        "access_b": flags.pair.access_b.to_string(),
    })
}

/// Prints decrypted access flags.
pub fn print_flags(flags: &AccessFlags, json_mode: bool) {
    if json_mode {
        println!("{}", flags_json(flags));
        return;
    }
    print_kv("Is adult", &yes_no(flags.is_adult.value), false);
    print_kv("In region", &yes_no(flags.is_region.value), false);
}

fn yes_no(value: bool) -> String {
    if value {
        "yes".green().to_string()
    } else {
        "no".red().to_string()
    }
}

/// Prints a table of rows in human mode, JSON array in JSON mode.
pub fn print_table(headers: &[&str], rows: &[Vec<String>], json_mode: bool) {
    if json_mode {
        let arr: Vec<serde_json::Value> = rows
            .iter()
            .map(|row| {
                let mut obj = serde_json::Map::new();
                for (i, h) in headers.iter().enumerate() {
                    let val = row.get(i).cloned().unwrap_or_default();
                    obj.insert(h.to_lowercase(), serde_json::Value::String(val));
                }
                serde_json::Value::Object(obj)
            })
            .collect();
        println!("{}", serde_json::Value::Array(arr));
        return;
    }

    if rows.is_empty() {
        println!("{}", "(no results)".dimmed());
        return;
    }

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() && cell.len() > widths[i] {
                widths[i] = cell.len();
            }
        }
    }

    let header_line: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:<w$}", h.to_uppercase(), w = widths[i]))
        .collect();
    println!("{}", header_line.join("  ").bold());

    let sep: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    println!("{}", sep.join("  ").dimmed());

    for row in rows {
        let line: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{cell:<w$}")
            })
            .collect();
        println!("{}", line.join("  "));
    }
}

/// Shortens a long hex string to its first `max` characters.
pub fn short_hex(s: &str, max: usize) -> String {
    if s.len() > max + 3 {
        format!("{}...", &s[..max])
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_hex_truncates_long_values() {
        assert_eq!(short_hex("0x0123456789abcdef", 6), "0x0123...");
        assert_eq!(short_hex("0xabc", 6), "0xabc");
    }
}
