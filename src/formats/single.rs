//! Shared handle for single-stream wrapper formats (gz, xz, zst).
//!
//! A wrapper holds exactly one item, its decoded payload, and names that item
//! as the main subfile so detection can look inside it.

use crate::{
    catalog::FormatId,
    context::ProbeContext,
    formats::{Archive, ArchiveProp, PropId, PropValue, PropertyMap},
    stream::{StreamHandle, StreamView, SubStream},
    Result,
};
use std::io::{self, Read};

const DECODE_CHUNK_SIZE: usize = 64 * 1024;

/// Builds a decoder reading the compressed stream from the view's base
pub type DecoderFactory = fn(StreamView) -> io::Result<Box<dyn Read + Send>>;

pub struct SingleStreamArchive {
    format: FormatId,
    stream: StreamHandle,
    origin: u64,
    props: PropertyMap,
    decoder: DecoderFactory,
}

impl SingleStreamArchive {
    pub fn new(
        format: FormatId,
        stream: &StreamHandle,
        origin: u64,
        mut props: PropertyMap,
        decoder: DecoderFactory,
    ) -> Self {
        props.entry(PropId::IsDir).or_insert(PropValue::Bool(false));
        Self {
            format,
            stream: stream.clone(),
            origin,
            props,
            decoder,
        }
    }

    fn open_decoder(&self) -> io::Result<Box<dyn Read + Send>> {
        self.stream.seek_to(self.origin)?;
        (self.decoder)(self.stream.view()?)
    }
}

impl Archive for SingleStreamArchive {
    fn format(&self) -> FormatId {
        self.format
    }

    fn item_count(&self) -> Result<u32> {
        Ok(1)
    }

    fn property(&self, index: u32, prop: PropId) -> Option<PropValue> {
        if index != 0 {
            return None;
        }
        self.props.get(&prop).cloned()
    }

    fn archive_property(&self, prop: ArchiveProp) -> Option<PropValue> {
        match prop {
            ArchiveProp::MainSubfile => Some(PropValue::UInt(0)),
        }
    }

    /// Decode the payload into memory while it fits in `budget`.
    ///
    /// Larger payloads come back as a forward-only decoder.
    fn sub_stream(
        &mut self,
        index: u32,
        ctx: &ProbeContext,
        budget: u64,
    ) -> Result<Option<SubStream>> {
        if index != 0 {
            return Ok(None);
        }

        let mut decoder = self.open_decoder()?;
        let mut payload = Vec::new();
        let mut chunk = vec![0u8; DECODE_CHUNK_SIZE];
        loop {
            if ctx.is_cancelled() {
                return Ok(None);
            }
            let read = match decoder.read(&mut chunk) {
                Ok(0) => break,
                Ok(read) => read,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            };
            if payload.len() as u64 + read as u64 > budget {
                log::debug!(
                    "{} payload exceeds the {budget} byte buffer budget, exposing it sequentially",
                    self.format
                );
                drop(decoder);
                return Ok(Some(SubStream::Sequential(self.open_decoder()?)));
            }
            payload.extend_from_slice(&chunk[..read]);
        }

        log::debug!("decoded {} payload of {} bytes", self.format, payload.len());
        Ok(Some(SubStream::Seekable(StreamHandle::from_bytes(payload))))
    }
}
