//! Gzip format support (.gz, and the outer layer of .tar.gz/.tgz)

use crate::{
    catalog::FormatId,
    context::ProbeContext,
    formats::{
        read_prefix, single::SingleStreamArchive, ProbeOutcome, PropId, PropValue, PropertyMap,
    },
    stream::{StreamHandle, StreamView},
    Result,
};
use flate2::read::{GzDecoder, MultiGzDecoder};
use std::io::{self, Read};

/// ID1, ID2 and the deflate compression method
const GZIP_MAGIC: [u8; 3] = [0x1F, 0x8B, 0x08];
/// fixed header plus CRC32 and ISIZE trailer
const MIN_GZIP_LEN: u64 = 18;

pub fn probe(stream: &StreamHandle, _ctx: &ProbeContext) -> Result<ProbeOutcome> {
    let origin = stream.position()?;

    let mut magic = [0u8; 3];
    if read_prefix(&mut stream.clone(), &mut magic)? < magic.len() || magic != GZIP_MAGIC {
        return Ok(ProbeOutcome::Rejected);
    }

    stream.seek_to(origin)?;
    let mut props = PropertyMap::new();
    {
        let decoder = GzDecoder::new(stream.view()?);
        let Some(header) = decoder.header() else {
            log::trace!("gzip magic present but header did not parse");
            return Ok(ProbeOutcome::Rejected);
        };
        if let Some(name) = header.filename() {
            props.insert(
                PropId::Path,
                PropValue::Str(String::from_utf8_lossy(name).into_owned()),
            );
        }
        if header.mtime() != 0 {
            props.insert(
                PropId::ModificationTime,
                PropValue::UnixTime(i64::from(header.mtime())),
            );
        }
    }

    let packed = stream.len()?.saturating_sub(origin);
    props.insert(PropId::PackSize, PropValue::UInt(packed));
    if let Some(size) = trailer_size(stream, origin, packed)? {
        props.insert(PropId::Size, PropValue::UInt(size));
    }

    Ok(ProbeOutcome::Accepted(Box::new(SingleStreamArchive::new(
        FormatId::Gzip,
        stream,
        origin,
        props,
        open_decoder,
    ))))
}

/// ISIZE from the trailer: the decoded length modulo 2^32 of the last member
fn trailer_size(stream: &StreamHandle, origin: u64, packed: u64) -> io::Result<Option<u64>> {
    if packed < MIN_GZIP_LEN {
        return Ok(None);
    }
    stream.seek_to(origin + packed - 4)?;
    let mut isize = [0u8; 4];
    stream.clone().read_exact(&mut isize)?;
    Ok(Some(u64::from(u32::from_le_bytes(isize))))
}

fn open_decoder(view: StreamView) -> io::Result<Box<dyn Read + Send>> {
    Ok(Box::new(MultiGzDecoder::new(view)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::Archive;
    use flate2::{write::GzEncoder, Compression, GzBuilder};
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_accepts_gzip_and_reads_trailer() -> Result<()> {
        let stream = StreamHandle::from_bytes(gzip(b"hello gzip"));
        let ctx = ProbeContext::new();
        let ProbeOutcome::Accepted(archive) = probe(&stream, &ctx)? else {
            panic!("gzip stream was not accepted");
        };
        assert_eq!(archive.format(), FormatId::Gzip);
        assert_eq!(archive.property(0, PropId::Size), Some(PropValue::UInt(10)));
        assert_eq!(archive.property(0, PropId::Path), None);
        Ok(())
    }

    #[test]
    fn test_stored_file_name_and_mtime() -> Result<()> {
        let mut encoder = GzBuilder::new()
            .filename("notes.txt")
            .mtime(1_600_000_000)
            .write(Vec::new(), Compression::fast());
        encoder.write_all(b"named payload")?;
        let stream = StreamHandle::from_bytes(encoder.finish()?);

        let ProbeOutcome::Accepted(archive) = probe(&stream, &ProbeContext::new())? else {
            panic!("gzip stream was not accepted");
        };
        assert_eq!(
            archive.property(0, PropId::Path),
            Some(PropValue::Str("notes.txt".into()))
        );
        assert_eq!(
            archive.property(0, PropId::ModificationTime),
            Some(PropValue::UnixTime(1_600_000_000))
        );
        Ok(())
    }

    #[test]
    fn test_rejects_other_bytes() -> Result<()> {
        let stream = StreamHandle::from_bytes(b"PK\x03\x04 not gzip".to_vec());
        assert!(matches!(
            probe(&stream, &ProbeContext::new())?,
            ProbeOutcome::Rejected
        ));
        Ok(())
    }

    #[test]
    fn test_rejects_short_stream() -> Result<()> {
        let stream = StreamHandle::from_bytes(vec![0x1F]);
        assert!(matches!(
            probe(&stream, &ProbeContext::new())?,
            ProbeOutcome::Rejected
        ));
        Ok(())
    }
}
