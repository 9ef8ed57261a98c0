//! 7-Zip format support

use crate::{
    catalog::FormatId,
    context::ProbeContext,
    formats::{
        read_prefix, reject_or_fatal, ProbeOutcome, PropId, PropValue, PropertyMap, TableArchive,
    },
    stream::StreamHandle,
    Result,
};
use sevenz_rust::{Password, SevenZArchiveEntry, SevenZMethod, SevenZReader};
use std::io;
use std::time::{SystemTime, UNIX_EPOCH};

const SIGNATURE: [u8; 6] = [b'7', b'z', 0xBC, 0xAF, 0x27, 0x1C];
/// high 16 bits of the attributes hold a unix mode when this bit is set
const UNIX_EXTENSION: u32 = 0x8000;
const NT_TICKS_PER_SECOND: u64 = 10_000_000;
const NT_UNIX_EPOCH_SECONDS: u64 = 11_644_473_600;

pub fn probe(stream: &StreamHandle, ctx: &ProbeContext) -> Result<ProbeOutcome> {
    let origin = stream.position()?;
    let mut view = stream.view()?;
    let len = view.len()?;

    let mut signature = [0u8; 6];
    if read_prefix(&mut view, &mut signature)? < signature.len()
        || signature != SIGNATURE
    {
        return Ok(ProbeOutcome::Rejected);
    }
    view.rewind_to_base()?;

    let reader = match SevenZReader::new(view, len, Password::empty()) {
        Ok(reader) => reader,
        Err(err) if is_password_error(&err) => {
            let Some(password) = ctx.request_password() else {
                log::debug!("7z headers are encrypted and no password is available");
                return Ok(ProbeOutcome::PasswordNeeded);
            };
            stream.seek_to(origin)?;
            match SevenZReader::new(stream.view()?, len, Password::from(password.as_str())) {
                Ok(reader) => reader,
                Err(err) if is_password_error(&err) => {
                    log::debug!("7z password was rejected: {err}");
                    return Ok(ProbeOutcome::PasswordNeeded);
                }
                Err(err) => return rejected(err),
            }
        }
        Err(err) => return rejected(err),
    };

    let archive = reader.archive();
    let locked_folders = encrypted_folders(archive);
    let mut items = Vec::with_capacity(archive.files.len());
    for (index, entry) in archive.files.iter().enumerate() {
        if ctx.is_cancelled() {
            return Ok(ProbeOutcome::Cancelled);
        }
        let mut props = entry_props(entry);
        let encrypted = archive
            .stream_map
            .file_folder_index
            .get(index)
            .copied()
            .flatten()
            .and_then(|folder| locked_folders.get(folder).copied())
            .unwrap_or(false);
        props.insert(PropId::Encrypted, PropValue::Bool(encrypted));
        items.push(props);
    }

    Ok(ProbeOutcome::Accepted(Box::new(TableArchive::new(
        FormatId::SevenZ,
        items,
    ))))
}

fn is_password_error(err: &sevenz_rust::Error) -> bool {
    matches!(
        err,
        sevenz_rust::Error::PasswordRequired | sevenz_rust::Error::MaybeBadPassword(_)
    )
}

/// Stream failures stay fatal, everything else means "not a 7z archive"
fn rejected(err: sevenz_rust::Error) -> Result<ProbeOutcome> {
    match err {
        sevenz_rust::Error::Io(err, _) | sevenz_rust::Error::FileOpen(err, _)
            if !wraps_format_error(&err) =>
        {
            reject_or_fatal(err)
        }
        err => {
            log::trace!("not a readable 7z archive: {err}");
            Ok(ProbeOutcome::Rejected)
        }
    }
}

/// Checksum mismatches surface as I/O errors carrying the reader's own error
fn wraps_format_error(err: &io::Error) -> bool {
    err.get_ref()
        .is_some_and(|inner| inner.is::<sevenz_rust::Error>())
}

/// One flag per folder: does any coder in it decrypt
fn encrypted_folders(archive: &sevenz_rust::Archive) -> Vec<bool> {
    archive
        .folders
        .iter()
        .map(|folder| {
            folder
                .coders
                .iter()
                .any(|coder| coder.decompression_method_id() == SevenZMethod::ID_AES256SHA256)
        })
        .collect()
}

fn entry_props(entry: &SevenZArchiveEntry) -> PropertyMap {
    let mut props = PropertyMap::new();
    props.insert(PropId::Path, PropValue::Str(entry.name.clone()));
    props.insert(PropId::IsDir, PropValue::Bool(entry.is_directory));
    props.insert(PropId::Size, PropValue::UInt(entry.size));
    props.insert(PropId::PackSize, PropValue::UInt(entry.compressed_size));
    if entry.has_crc {
        props.insert(PropId::Crc, PropValue::UInt(entry.crc));
    }

    let times = [
        (PropId::CreationTime, entry.has_creation_date, entry.creation_date),
        (PropId::AccessTime, entry.has_access_date, entry.access_date),
        (
            PropId::ModificationTime,
            entry.has_last_modified_date,
            entry.last_modified_date,
        ),
    ];
    for (prop, present, stamp) in times {
        if present {
            if let Some(ticks) = nt_ticks(SystemTime::from(stamp)) {
                props.insert(prop, PropValue::FileTime(ticks));
            }
        }
    }

    if entry.has_windows_attributes && entry.windows_attributes & UNIX_EXTENSION != 0 {
        props.insert(
            PropId::PosixAttrib,
            PropValue::UInt(u64::from(entry.windows_attributes >> 16)),
        );
    }
    props
}

/// NT file time ticks for a system time, `None` before 1601
fn nt_ticks(moment: SystemTime) -> Option<u64> {
    let epoch_ticks = NT_UNIX_EPOCH_SECONDS * NT_TICKS_PER_SECOND;
    match moment.duration_since(UNIX_EPOCH) {
        Ok(after) => {
            let ticks = u64::try_from(after.as_nanos() / 100).ok()?;
            epoch_ticks.checked_add(ticks)
        }
        Err(before) => {
            let ticks = u64::try_from(before.duration().as_nanos() / 100).ok()?;
            epoch_ticks.checked_sub(ticks)
        }
    }
}
