//! ZIP format support

use crate::{
    catalog::FormatId,
    context::ProbeContext,
    formats::{
        reject_or_fatal, ProbeOutcome, PropId, PropValue, PropertyMap, TableArchive,
        MODE_SYMLINK, MODE_TYPE_MASK,
    },
    stream::{StreamHandle, StreamView},
    Result,
};
use std::io::Read;
use time::{Date, Month};
use zip::{result::ZipError, ZipArchive};

pub fn probe(stream: &StreamHandle, ctx: &ProbeContext) -> Result<ProbeOutcome> {
    let mut archive = match ZipArchive::new(stream.view()?) {
        Ok(archive) => archive,
        Err(ZipError::Io(err)) => return reject_or_fatal(err),
        Err(err) => {
            log::trace!("not a zip archive: {err}");
            return Ok(ProbeOutcome::Rejected);
        }
    };

    let mut items = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        if ctx.is_cancelled() {
            return Ok(ProbeOutcome::Cancelled);
        }
        match read_entry(&mut archive, index) {
            Ok(props) => items.push(props),
            Err(ZipError::Io(err)) => return reject_or_fatal(err),
            Err(err) => {
                log::debug!("zip entry {index} is unreadable: {err}");
                return Ok(ProbeOutcome::Rejected);
            }
        }
    }

    log::debug!("zip central directory lists {} entries", items.len());
    Ok(ProbeOutcome::Accepted(Box::new(TableArchive::new(
        FormatId::Zip,
        items,
    ))))
}

fn read_entry(archive: &mut ZipArchive<StreamView>, index: usize) -> zip::result::ZipResult<PropertyMap> {
    let mut props = PropertyMap::new();
    let mode;
    let encrypted;
    {
        let entry = archive.by_index_raw(index)?;
        props.insert(PropId::Path, PropValue::Str(entry.name().to_string()));
        props.insert(PropId::IsDir, PropValue::Bool(entry.is_dir()));
        props.insert(PropId::Size, PropValue::UInt(entry.size()));
        props.insert(PropId::PackSize, PropValue::UInt(entry.compressed_size()));
        props.insert(PropId::Crc, PropValue::UInt(u64::from(entry.crc32())));
        encrypted = entry.encrypted();
        props.insert(PropId::Encrypted, PropValue::Bool(encrypted));

        if let Some(modified) = entry.last_modified().and_then(dos_time) {
            props.insert(PropId::ModificationTime, modified);
        }
        mode = entry.unix_mode();
        if let Some(mode) = mode {
            props.insert(PropId::PosixAttrib, PropValue::UInt(u64::from(mode)));
        }
    }

    let is_symlink = mode.is_some_and(|mode| u64::from(mode) & MODE_TYPE_MASK == MODE_SYMLINK);
    if is_symlink && !encrypted {
        match read_link_target(archive, index) {
            Ok(target) => {
                props.insert(PropId::SymLink, PropValue::Str(target));
            }
            Err(err) => log::debug!("zip entry {index}: symlink target unreadable: {err}"),
        }
    }

    Ok(props)
}

/// Link targets are stored as the entry body, in no particular encoding
fn read_link_target(
    archive: &mut ZipArchive<StreamView>,
    index: usize,
) -> zip::result::ZipResult<String> {
    let mut target = Vec::new();
    archive.by_index(index)?.read_to_end(&mut target)?;
    Ok(String::from_utf8_lossy(&target).into_owned())
}

/// MS-DOS timestamps carry no zone; they are read as UTC
fn dos_time(stamp: zip::DateTime) -> Option<PropValue> {
    let month = Month::try_from(stamp.month()).ok()?;
    let date = Date::from_calendar_date(i32::from(stamp.year()), month, stamp.day()).ok()?;
    let moment = date
        .with_hms(stamp.hour(), stamp.minute(), stamp.second())
        .ok()?
        .assume_utc();
    Some(PropValue::UnixTime(moment.unix_timestamp()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::{Archive, MODE_REGULAR};
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;

    fn sample_zip() -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().unix_permissions(0o640);
        writer.add_directory("src/", options).unwrap();
        writer.start_file("src/main.rs", options).unwrap();
        writer.write_all(b"fn main() {}\n").unwrap();
        writer
            .add_symlink("src/entry.rs", "main.rs", SimpleFileOptions::default())
            .unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_reads_central_directory() -> Result<()> {
        let stream = StreamHandle::from_bytes(sample_zip());
        let ProbeOutcome::Accepted(archive) = probe(&stream, &ProbeContext::new())? else {
            panic!("zip was not accepted");
        };
        assert_eq!(archive.format(), FormatId::Zip);
        assert_eq!(archive.item_count()?, 3);

        assert_eq!(archive.property(0, PropId::IsDir), Some(PropValue::Bool(true)));
        assert_eq!(
            archive.property(1, PropId::Path),
            Some(PropValue::Str("src/main.rs".into()))
        );
        assert_eq!(archive.property(1, PropId::Size), Some(PropValue::UInt(13)));
        assert_eq!(
            archive.property(1, PropId::Encrypted),
            Some(PropValue::Bool(false))
        );
        let mode = archive
            .property(1, PropId::PosixAttrib)
            .and_then(|value| value.as_u64())
            .unwrap();
        assert_eq!(mode & 0o777, 0o640);
        assert_eq!(mode & MODE_TYPE_MASK, MODE_REGULAR);
        assert!(archive.property(1, PropId::ModificationTime).is_some());
        Ok(())
    }

    #[test]
    fn test_symlink_target_is_read() -> Result<()> {
        let stream = StreamHandle::from_bytes(sample_zip());
        let ProbeOutcome::Accepted(archive) = probe(&stream, &ProbeContext::new())? else {
            panic!("zip was not accepted");
        };
        assert_eq!(
            archive.property(2, PropId::SymLink),
            Some(PropValue::Str("main.rs".into()))
        );
        Ok(())
    }

    fn crc32(bytes: &[u8]) -> u32 {
        let mut crc = flate2::Crc::new();
        crc.update(bytes);
        crc.sum()
    }

    fn replace_all(haystack: &mut [u8], from: &[u8], to: &[u8]) {
        let mut offset = 0;
        while let Some(found) = haystack[offset..]
            .windows(from.len())
            .position(|window| window == from)
        {
            let start = offset + found;
            haystack[start..start + to.len()].copy_from_slice(to);
            offset = start + to.len();
        }
    }

    #[test]
    fn test_non_utf8_symlink_target_is_kept_lossy() -> Result<()> {
        let placeholder = b"@@AB";
        let target = [0xff, 0xfe, b'A', b'B'];

        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file("a.txt", SimpleFileOptions::default()).unwrap();
        writer.write_all(b"alpha").unwrap();
        writer
            .add_symlink("link", "@@AB", SimpleFileOptions::default())
            .unwrap();
        let mut bytes = writer.finish().unwrap().into_inner();
        // stored symlink body, so the target can be swapped in place
        replace_all(&mut bytes, placeholder, &target);
        replace_all(
            &mut bytes,
            &crc32(placeholder).to_le_bytes(),
            &crc32(&target).to_le_bytes(),
        );

        let stream = StreamHandle::from_bytes(bytes);
        let ProbeOutcome::Accepted(archive) = probe(&stream, &ProbeContext::new())? else {
            panic!("zip was not accepted");
        };
        assert_eq!(archive.item_count()?, 2);
        assert_eq!(
            archive.property(0, PropId::Path),
            Some(PropValue::Str("a.txt".into()))
        );
        assert_eq!(
            archive.property(1, PropId::SymLink),
            Some(PropValue::Str("\u{FFFD}\u{FFFD}AB".into()))
        );
        Ok(())
    }

    #[test]
    fn test_truncated_zip_rejected() -> Result<()> {
        let mut bytes = sample_zip();
        bytes.truncate(bytes.len() / 2);
        let stream = StreamHandle::from_bytes(bytes);
        assert!(matches!(
            probe(&stream, &ProbeContext::new())?,
            ProbeOutcome::Rejected
        ));
        Ok(())
    }

    #[test]
    fn test_dos_time_conversion() {
        let stamp = zip::DateTime::from_date_and_time(2020, 2, 29, 12, 30, 10).unwrap();
        assert_eq!(dos_time(stamp), Some(PropValue::UnixTime(1_582_979_410)));
    }
}
