//! Tar format support.
//!
//! The first header block must carry a valid checksum before the entry walk
//! starts, otherwise any run of bytes long enough would read as an empty tar.

use crate::{
    catalog::FormatId,
    context::ProbeContext,
    formats::{
        is_parse_error, read_prefix, reject_or_fatal, ProbeOutcome, PropId, PropValue,
        PropertyMap, TableArchive, MODE_DIRECTORY, MODE_REGULAR, MODE_SYMLINK,
    },
    stream::StreamHandle,
    Result,
};
use std::io;
use tar::{EntryType, Header};

const BLOCK_SIZE: u64 = 512;
const CHECKSUM_FIELD: std::ops::Range<usize> = 148..156;

const MODE_CHAR_DEVICE: u64 = 0o020000;
const MODE_BLOCK_DEVICE: u64 = 0o060000;
const MODE_FIFO: u64 = 0o010000;

pub fn probe(stream: &StreamHandle, ctx: &ProbeContext) -> Result<ProbeOutcome> {
    let origin = stream.position()?;

    let mut block = [0u8; BLOCK_SIZE as usize];
    if read_prefix(&mut stream.clone(), &mut block)? < block.len() {
        return Ok(ProbeOutcome::Rejected);
    }
    if !has_valid_checksum(&block) {
        return Ok(ProbeOutcome::Rejected);
    }

    stream.seek_to(origin)?;
    match read_entries(stream, ctx) {
        Ok(Some(items)) => {
            log::debug!("tar walk found {} entries", items.len());
            Ok(ProbeOutcome::Accepted(Box::new(TableArchive::new(
                FormatId::Tar,
                items,
            ))))
        }
        Ok(None) => Ok(ProbeOutcome::Cancelled),
        Err(err) => reject_or_fatal(err),
    }
}

/// An all-zero block is an end marker, not a header
fn has_valid_checksum(block: &[u8; BLOCK_SIZE as usize]) -> bool {
    if block.iter().all(|byte| *byte == 0) {
        return false;
    }
    let computed: u32 = block
        .iter()
        .enumerate()
        .map(|(offset, byte)| {
            if CHECKSUM_FIELD.contains(&offset) {
                u32::from(b' ')
            } else {
                u32::from(*byte)
            }
        })
        .sum();
    match Header::from_byte_slice(block).cksum() {
        Ok(stored) => stored == computed,
        Err(_) => false,
    }
}

/// Walk every entry; `None` when cancelled part way.
///
/// A malformed or truncated header past the first one ends the walk with the
/// entries read so far. Failures of the stream itself are returned.
fn read_entries(stream: &StreamHandle, ctx: &ProbeContext) -> io::Result<Option<Vec<PropertyMap>>> {
    let mut archive = tar::Archive::new(stream.clone());
    let mut items = Vec::new();

    for entry in archive.entries()? {
        if ctx.is_cancelled() {
            return Ok(None);
        }
        match entry.and_then(|entry| entry_props(&entry)) {
            Ok(Some(props)) => items.push(props),
            Ok(None) => {}
            Err(err) if is_damaged_header(&err) => {
                log::debug!("tar walk stopped after {} entries: {err}", items.len());
                break;
            }
            Err(err) => return Err(err),
        }
    }

    Ok(Some(items))
}

/// The tar reader reports bad headers as `Other`
fn is_damaged_header(err: &io::Error) -> bool {
    is_parse_error(err) || err.kind() == io::ErrorKind::Other
}

/// Properties of one entry, `None` for pax global headers
fn entry_props<R: io::Read>(entry: &tar::Entry<'_, R>) -> io::Result<Option<PropertyMap>> {
    let header = entry.header();
    let entry_type = header.entry_type();
    if entry_type == EntryType::XGlobalHeader {
        return Ok(None);
    }

    let mut props = PropertyMap::new();
    props.insert(
        PropId::Path,
        PropValue::Str(entry.path()?.to_string_lossy().into_owned()),
    );
    let size = entry.size();
    props.insert(PropId::Size, PropValue::UInt(size));
    props.insert(
        PropId::PackSize,
        PropValue::UInt(size.div_ceil(BLOCK_SIZE) * BLOCK_SIZE),
    );
    props.insert(PropId::IsDir, PropValue::Bool(entry_type.is_dir()));

    if let Ok(mtime) = header.mtime() {
        props.insert(PropId::ModificationTime, unix_time(mtime));
    }
    if let Some(gnu) = header.as_gnu() {
        if let Ok(atime) = gnu.atime() {
            if atime != 0 {
                props.insert(PropId::AccessTime, unix_time(atime));
            }
        }
        if let Ok(ctime) = gnu.ctime() {
            if ctime != 0 {
                props.insert(PropId::ChangeTime, unix_time(ctime));
            }
        }
    }
    if let Ok(mode) = header.mode() {
        let mode = (u64::from(mode) & 0o7777) | file_type_bits(entry_type);
        props.insert(PropId::PosixAttrib, PropValue::UInt(mode));
    }
    if entry_type.is_symlink() {
        if let Some(target) = entry.link_name()? {
            props.insert(
                PropId::SymLink,
                PropValue::Str(target.to_string_lossy().into_owned()),
            );
        }
    }
    Ok(Some(props))
}

fn unix_time(seconds: u64) -> PropValue {
    PropValue::UnixTime(i64::try_from(seconds).unwrap_or(i64::MAX))
}

fn file_type_bits(entry_type: EntryType) -> u64 {
    match entry_type {
        EntryType::Directory => MODE_DIRECTORY,
        EntryType::Symlink => MODE_SYMLINK,
        EntryType::Char => MODE_CHAR_DEVICE,
        EntryType::Block => MODE_BLOCK_DEVICE,
        EntryType::Fifo => MODE_FIFO,
        _ => MODE_REGULAR,
    }
}
