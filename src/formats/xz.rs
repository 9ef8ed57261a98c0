//! XZ format support (.xz, and the outer layer of .tar.xz/.txz)

use crate::{
    catalog::FormatId,
    context::ProbeContext,
    formats::{read_prefix, single::SingleStreamArchive, ProbeOutcome, PropId, PropValue, PropertyMap},
    stream::{StreamHandle, StreamView},
    Result,
};
use std::io::{self, Read};
use xz2::read::XzDecoder;

const XZ_MAGIC: [u8; 6] = [0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00];
const STREAM_HEADER_LEN: usize = 12;

pub fn probe(stream: &StreamHandle, _ctx: &ProbeContext) -> Result<ProbeOutcome> {
    let origin = stream.position()?;

    let mut header = [0u8; STREAM_HEADER_LEN];
    if read_prefix(&mut stream.clone(), &mut header)? < STREAM_HEADER_LEN {
        return Ok(ProbeOutcome::Rejected);
    }
    if !is_stream_header(&header) {
        return Ok(ProbeOutcome::Rejected);
    }

    let mut props = PropertyMap::new();
    props.insert(
        PropId::PackSize,
        PropValue::UInt(stream.len()?.saturating_sub(origin)),
    );

    Ok(ProbeOutcome::Accepted(Box::new(SingleStreamArchive::new(
        FormatId::Xz,
        stream,
        origin,
        props,
        open_decoder,
    ))))
}

/// Magic, reserved stream flag bits and the CRC32 over the flags
fn is_stream_header(header: &[u8; STREAM_HEADER_LEN]) -> bool {
    if header[..6] != XZ_MAGIC {
        return false;
    }
    let flags = &header[6..8];
    if flags[0] != 0 || flags[1] & 0xF0 != 0 {
        log::trace!("xz magic present but stream flags are reserved");
        return false;
    }
    let mut crc = flate2::Crc::new();
    crc.update(flags);
    crc.sum() == u32::from_le_bytes([header[8], header[9], header[10], header[11]])
}

fn open_decoder(view: StreamView) -> io::Result<Box<dyn Read + Send>> {
    Ok(Box::new(XzDecoder::new(view)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::Archive;
    use crate::stream::SubStream;
    use std::io::Write;
    use xz2::write::XzEncoder;

    fn xz(data: &[u8]) -> Vec<u8> {
        let mut encoder = XzEncoder::new(Vec::new(), 6);
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_accepts_and_decodes_xz() -> Result<()> {
        let stream = StreamHandle::from_bytes(xz(b"hello xz"));
        let ctx = ProbeContext::new();
        let ProbeOutcome::Accepted(mut archive) = probe(&stream, &ctx)? else {
            panic!("xz stream was not accepted");
        };
        assert_eq!(archive.format(), FormatId::Xz);
        assert_eq!(archive.item_count()?, 1);

        let Some(SubStream::Seekable(mut inner)) = archive.sub_stream(0, &ctx, 1 << 20)? else {
            panic!("expected decoded payload");
        };
        let mut text = String::new();
        inner.read_to_string(&mut text)?;
        assert_eq!(text, "hello xz");
        Ok(())
    }

    #[test]
    fn test_rejects_bad_header_crc() -> Result<()> {
        let mut bytes = xz(b"data");
        bytes[8] ^= 0xFF;
        let stream = StreamHandle::from_bytes(bytes);
        assert!(matches!(
            probe(&stream, &ProbeContext::new())?,
            ProbeOutcome::Rejected
        ));
        Ok(())
    }

    #[test]
    fn test_rejects_magic_only() -> Result<()> {
        let stream = StreamHandle::from_bytes(XZ_MAGIC.to_vec());
        assert!(matches!(
            probe(&stream, &ProbeContext::new())?,
            ProbeOutcome::Rejected
        ));
        Ok(())
    }
}
