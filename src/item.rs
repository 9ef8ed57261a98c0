//! uniform item records built from per-format property tables

use crate::{
    error::{Error, Result},
    formats::{Archive, PropId, PropValue, MODE_SYMLINK, MODE_TYPE_MASK},
};
use time::OffsetDateTime;

/// Timestamps, permission bits and link target of one item
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stat {
    pub creation: Option<OffsetDateTime>,
    pub last_access: Option<OffsetDateTime>,
    pub last_modification: Option<OffsetDateTime>,
    pub last_change: Option<OffsetDateTime>,
    /// owner/group/other rwx bits
    pub permissions: Option<u16>,
    pub is_symbolic_link: bool,
    pub symbolic_link: Option<String>,
}

/// One catalog entry.
///
/// `index` is only valid against the archive that produced the item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub path: String,
    pub index: u32,
    pub is_dir: bool,
    pub size: u64,
    pub pack_size: u64,
    pub crc32: Option<u32>,
    pub encrypted: bool,
    pub stat: Stat,
}

impl Item {
    pub fn is_symbolic_link(&self) -> bool {
        self.stat.is_symbolic_link
    }

    pub fn permissions(&self) -> Option<u16> {
        self.stat.permissions
    }

    /// last path component
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Read the item at `index`
pub fn item_at(archive: &dyn Archive, index: u32) -> Result<Item> {
    check_index(archive, index)?;
    Ok(read_item(archive, index))
}

/// Read only the [`Stat`] block of the item at `index`
pub fn stat_at(archive: &dyn Archive, index: u32) -> Result<Stat> {
    check_index(archive, index)?;
    Ok(read_stat(archive, index))
}

/// Every item of `archive`, in index order
pub fn all_items(archive: &dyn Archive) -> Result<Vec<Item>> {
    let count = archive.item_count()?;
    Ok((0..count).map(|index| read_item(archive, index)).collect())
}

fn check_index(archive: &dyn Archive, index: u32) -> Result<()> {
    let count = archive.item_count()?;
    if index >= count {
        return Err(Error::IndexOutOfRange { index, count });
    }
    Ok(())
}

fn read_item(archive: &dyn Archive, index: u32) -> Item {
    let prop = |id: PropId| archive.property(index, id);
    let number = |id: PropId| prop(id).and_then(|value| value.as_u64());
    let flag = |id: PropId| prop(id).and_then(|value| value.as_bool()).unwrap_or(false);

    let path = prop(PropId::Path)
        .and_then(|value| value.as_str().map(normalize_path))
        .unwrap_or_default();

    Item {
        path,
        index,
        is_dir: flag(PropId::IsDir),
        size: number(PropId::Size).unwrap_or(0),
        pack_size: number(PropId::PackSize).unwrap_or(0),
        crc32: number(PropId::Crc).map(|crc| crc as u32),
        encrypted: flag(PropId::Encrypted),
        stat: read_stat(archive, index),
    }
}

fn read_stat(archive: &dyn Archive, index: u32) -> Stat {
    let time = |id: PropId| {
        archive
            .property(index, id)
            .and_then(|value| value.as_datetime())
    };

    let mut stat = Stat {
        creation: time(PropId::CreationTime),
        last_access: time(PropId::AccessTime),
        last_modification: time(PropId::ModificationTime),
        last_change: time(PropId::ChangeTime),
        ..Stat::default()
    };

    let mode = archive
        .property(index, PropId::PosixAttrib)
        .and_then(|value| value.as_u64());
    if let Some(mode) = mode {
        stat.permissions = Some((mode & 0o777) as u16);
        if mode & MODE_TYPE_MASK == MODE_SYMLINK {
            stat.is_symbolic_link = true;
            stat.symbolic_link = archive
                .property(index, PropId::SymLink)
                .as_ref()
                .and_then(PropValue::as_str)
                .filter(|target| !target.is_empty())
                .map(str::to_owned);
        }
    }
    stat
}

/// forward slashes, no leading `./`, no trailing slash
fn normalize_path(raw: &str) -> String {
    let path = raw.replace('\\', "/");
    let path = path.strip_prefix("./").unwrap_or(&path);
    path.trim_end_matches('/').to_string()
}
