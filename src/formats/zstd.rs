//! Zstandard format support (.zst, and the outer layer of .tar.zst)

use crate::{
    catalog::FormatId,
    context::ProbeContext,
    formats::{read_prefix, single::SingleStreamArchive, ProbeOutcome, PropId, PropValue, PropertyMap},
    stream::{StreamHandle, StreamView},
    Result,
};
use std::io::{self, Read};

const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];
/// magic, descriptor, window byte, 4 byte dictionary id, 8 byte content size
const MAX_FRAME_HEADER_LEN: usize = 18;

pub fn probe(stream: &StreamHandle, _ctx: &ProbeContext) -> Result<ProbeOutcome> {
    let origin = stream.position()?;

    let mut header = [0u8; MAX_FRAME_HEADER_LEN];
    let read = read_prefix(&mut stream.clone(), &mut header)?;
    let header = &header[..read];
    if read < 5 || header[..4] != ZSTD_MAGIC {
        return Ok(ProbeOutcome::Rejected);
    }
    if header[4] & 0x08 != 0 {
        log::trace!("zstd magic present but reserved descriptor bit is set");
        return Ok(ProbeOutcome::Rejected);
    }

    let mut props = PropertyMap::new();
    props.insert(
        PropId::PackSize,
        PropValue::UInt(stream.len()?.saturating_sub(origin)),
    );
    if let Some(size) = frame_content_size(header) {
        props.insert(PropId::Size, PropValue::UInt(size));
    }

    Ok(ProbeOutcome::Accepted(Box::new(SingleStreamArchive::new(
        FormatId::Zstd,
        stream,
        origin,
        props,
        open_decoder,
    ))))
}

/// Frame_Content_Size of the first frame, when the encoder recorded it
fn frame_content_size(header: &[u8]) -> Option<u64> {
    let descriptor = *header.get(4)?;
    let fcs_flag = descriptor >> 6;
    let single_segment = (descriptor >> 5) & 1 == 1;
    let dict_id_len = [0usize, 1, 2, 4][usize::from(descriptor & 3)];
    let window_len = usize::from(!single_segment);

    let fcs_len = match fcs_flag {
        0 if single_segment => 1,
        0 => return None,
        1 => 2,
        2 => 4,
        _ => 8,
    };
    let start = 5 + window_len + dict_id_len;
    let field = header.get(start..start + fcs_len)?;

    let mut raw = [0u8; 8];
    raw[..fcs_len].copy_from_slice(field);
    let value = u64::from_le_bytes(raw);
    Some(if fcs_len == 2 { value + 256 } else { value })
}

fn open_decoder(view: StreamView) -> io::Result<Box<dyn Read + Send>> {
    Ok(Box::new(::zstd::stream::read::Decoder::new(view)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::Archive;
    use crate::stream::SubStream;

    #[test]
    fn test_content_size_single_segment_one_byte() {
        // single segment, fcs flag 0, no dictionary
        let header = [0x28, 0xB5, 0x2F, 0xFD, 0x20, 42];
        assert_eq!(frame_content_size(&header), Some(42));
    }

    #[test]
    fn test_content_size_two_bytes_is_offset() {
        // fcs flag 1 with window descriptor
        let header = [0x28, 0xB5, 0x2F, 0xFD, 0x40, 0x58, 0x00, 0x01];
        assert_eq!(frame_content_size(&header), Some(256 + 256));
    }

    #[test]
    fn test_content_size_after_dictionary_id() {
        // fcs flag 2, single segment, 1 byte dictionary id
        let header = [0x28, 0xB5, 0x2F, 0xFD, 0xA1, 0x07, 0x10, 0x27, 0x00, 0x00];
        assert_eq!(frame_content_size(&header), Some(10_000));
    }

    #[test]
    fn test_content_size_absent() {
        let header = [0x28, 0xB5, 0x2F, 0xFD, 0x00, 0x58];
        assert_eq!(frame_content_size(&header), None);
        // truncated field
        let header = [0x28, 0xB5, 0x2F, 0xFD, 0xE0, 0x01];
        assert_eq!(frame_content_size(&header), None);
    }

    #[test]
    fn test_accepts_and_decodes_zstd() -> Result<()> {
        let compressed = ::zstd::encode_all(&b"hello zstd"[..], 3)?;
        let stream = StreamHandle::from_bytes(compressed);
        let ctx = ProbeContext::new();
        let ProbeOutcome::Accepted(mut archive) = probe(&stream, &ctx)? else {
            panic!("zstd stream was not accepted");
        };
        assert_eq!(archive.format(), FormatId::Zstd);

        let Some(SubStream::Seekable(mut inner)) = archive.sub_stream(0, &ctx, 1 << 20)? else {
            panic!("expected decoded payload");
        };
        let mut text = String::new();
        inner.read_to_string(&mut text)?;
        assert_eq!(text, "hello zstd");
        Ok(())
    }

    #[test]
    fn test_rejects_reserved_bit() -> Result<()> {
        let stream = StreamHandle::from_bytes(vec![0x28, 0xB5, 0x2F, 0xFD, 0x08, 0, 0, 0]);
        assert!(matches!(
            probe(&stream, &ProbeContext::new())?,
            ProbeOutcome::Rejected
        ));
        Ok(())
    }
}
