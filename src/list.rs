//! archive detection and listing output

use crate::{
    detect::OpenedArchive, item::Item, progress::Progress, session::Session, utils, Result,
};
use std::path::Path;

/// print the detected format chain of an archive
pub fn detect(archive_path: &Path, session: &Session, verbose: bool) -> Result<()> {
    let Some(opened) = session.open(archive_path)? else {
        println!("operation cancelled");
        return Ok(());
    };

    let chain = opened
        .formats()
        .iter()
        .map(|format| format.name())
        .collect::<Vec<_>>()
        .join(" > ");
    println!(
        "{}: {} ({} items)",
        archive_path.display(),
        chain,
        opened.item_count()
    );

    if verbose {
        for (depth, layer) in opened.layers().iter().enumerate() {
            println!(
                "  layer {}: {} with {} items",
                depth,
                layer.outer_format(),
                layer.outer_item_count()
            );
        }
    }

    Ok(())
}

/// list the items of the innermost archive
pub fn list(archive_path: &Path, session: &Session, verbose: bool, progress: bool) -> Result<()> {
    let Some(opened) = session.open(archive_path)? else {
        println!("operation cancelled");
        return Ok(());
    };

    if verbose {
        println!(
            "listing contents of {} ({})",
            archive_path.display(),
            opened.format()
        );
    }

    let items = read_items(&opened, progress)?;
    let mut total_size = 0u64;
    for item in &items {
        total_size = total_size.saturating_add(item.size);
        if verbose {
            println!("{}", detailed_line(item));
        } else {
            println!("{}", display_path(item));
        }
    }

    if verbose {
        println!(
            "{} items, {}",
            items.len(),
            utils::format_bytes(total_size)
        );
    }

    Ok(())
}

fn read_items(opened: &OpenedArchive, show_progress: bool) -> Result<Vec<Item>> {
    let count = opened.item_count();
    let progress = Progress::new(show_progress, u64::from(count));
    let mut items = Vec::with_capacity(count as usize);
    for index in 0..count {
        items.push(opened.item_at(index)?);
        progress.update(u64::from(index) + 1);
    }
    progress.finish();
    Ok(items)
}

/// directories get a trailing slash, unnamed payloads a placeholder
fn display_path(item: &Item) -> String {
    if item.path.is_empty() {
        "<payload>".to_string()
    } else if item.is_dir {
        format!("{}/", item.path)
    } else {
        item.path.clone()
    }
}

fn detailed_line(item: &Item) -> String {
    let size = if item.is_dir {
        "dir".to_string()
    } else {
        utils::format_bytes(item.size)
    };
    let mut line = format!(
        "{} {:>12} {} {}{}",
        utils::format_mode(item),
        size,
        utils::format_time(item.stat.last_modification),
        if item.encrypted { "*" } else { "" },
        display_path(item)
    );
    if let Some(target) = &item.stat.symbolic_link {
        line.push_str(" -> ");
        line.push_str(target);
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::Stat;

    fn sample(path: &str, is_dir: bool) -> Item {
        Item {
            path: path.into(),
            index: 0,
            is_dir,
            size: 2048,
            pack_size: 0,
            crc32: None,
            encrypted: false,
            stat: Stat::default(),
        }
    }

    #[test]
    fn test_display_path() {
        assert_eq!(display_path(&sample("src", true)), "src/");
        assert_eq!(display_path(&sample("src/lib.rs", false)), "src/lib.rs");
        assert_eq!(display_path(&sample("", false)), "<payload>");
    }

    #[test]
    fn test_detailed_line_shows_link_target() {
        let mut link = sample("current", false);
        link.stat.is_symbolic_link = true;
        link.stat.permissions = Some(0o777);
        link.stat.symbolic_link = Some("v2".into());

        let line = detailed_line(&link);
        assert!(line.starts_with("lrwxrwxrwx"));
        assert!(line.contains("2.00 KiB"));
        assert!(line.ends_with("current -> v2"));
    }
}
