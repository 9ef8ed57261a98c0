//! formatting helpers for listings and interactive prompts

use crate::item::Item;
use std::io::{self, BufRead, Write};
use time::{format_description::BorrowedFormatItem, macros::format_description, OffsetDateTime};

const LISTING_TIME: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// format bytes in human-readable format
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}

/// `ls -l` style mode string; unknown permissions print as `?`
pub fn format_mode(item: &Item) -> String {
    let kind = if item.is_symbolic_link() {
        'l'
    } else if item.is_dir {
        'd'
    } else {
        '-'
    };

    let mut mode = String::with_capacity(10);
    mode.push(kind);
    match item.permissions() {
        Some(bits) => {
            for shift in [6u16, 3, 0] {
                let triplet = (bits >> shift) & 0o7;
                mode.push(if triplet & 0o4 != 0 { 'r' } else { '-' });
                mode.push(if triplet & 0o2 != 0 { 'w' } else { '-' });
                mode.push(if triplet & 0o1 != 0 { 'x' } else { '-' });
            }
        }
        None => mode.push_str("?????????"),
    }
    mode
}

/// UTC timestamp as `YYYY-MM-DD HH:MM:SS`, blank when unknown
pub fn format_time(moment: Option<OffsetDateTime>) -> String {
    moment
        .and_then(|moment| moment.format(LISTING_TIME).ok())
        .unwrap_or_else(|| " ".repeat(19))
}

/// prompt on stderr and read one line from stdin, `None` on EOF or empty input
pub fn prompt_line(message: &str) -> Option<String> {
    eprint!("{message}: ");
    io::stderr().flush().ok()?;

    let mut input = String::new();
    match io::stdin().lock().read_line(&mut input) {
        Ok(0) | Err(_) => None,
        Ok(_) => {
            let input = input.trim_end_matches(['\r', '\n']);
            (!input.is_empty()).then(|| input.to_string())
        }
    }
}
