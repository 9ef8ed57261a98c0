//! seekable stream handles shared between the sequencer and format parsers

use parking_lot::Mutex;
use std::{
    fs::File,
    io::{self, BufReader, Cursor, Read, Seek, SeekFrom},
    path::Path,
    sync::Arc,
};

/// Any seekable byte source a parser can read from
pub trait ArchiveStream: Read + Seek + Send {}

impl<T: Read + Seek + Send> ArchiveStream for T {}

/// Clonable handle over one shared stream.
///
/// Clones share the cursor. The sequencer keeps one clone and hands others to
/// parsers, so restoring the position through any clone restores it for all.
#[derive(Clone)]
pub struct StreamHandle {
    inner: Arc<Mutex<Box<dyn ArchiveStream>>>,
}

impl StreamHandle {
    pub fn new<S: ArchiveStream + 'static>(stream: S) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(stream))),
        }
    }

    /// open a file on disk as a buffered stream
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::new(Cursor::new(bytes))
    }

    /// current absolute position
    pub fn position(&self) -> io::Result<u64> {
        self.inner.lock().stream_position()
    }

    pub fn seek_to(&self, position: u64) -> io::Result<()> {
        self.inner.lock().seek(SeekFrom::Start(position))?;
        Ok(())
    }

    /// total length of the underlying stream, cursor left where it was
    pub fn len(&self) -> io::Result<u64> {
        let mut stream = self.inner.lock();
        let position = stream.stream_position()?;
        let end = stream.seek(SeekFrom::End(0))?;
        stream.seek(SeekFrom::Start(position))?;
        Ok(end)
    }

    pub fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    /// bytes between the cursor and the end of the stream
    pub fn remaining(&self) -> io::Result<u64> {
        let position = self.position()?;
        Ok(self.len()?.saturating_sub(position))
    }

    /// view whose offset zero is the current position
    pub fn view(&self) -> io::Result<StreamView> {
        let base = self.position()?;
        Ok(StreamView {
            handle: self.clone(),
            base,
        })
    }
}

impl Read for StreamHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.lock().read(buf)
    }
}

impl Seek for StreamHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.lock().seek(pos)
    }
}

/// Window onto a [`StreamHandle`] that starts at a fixed base offset.
///
/// Parsers that seek to absolute offsets see the base as offset zero.
pub struct StreamView {
    handle: StreamHandle,
    base: u64,
}

impl StreamView {
    pub fn base(&self) -> u64 {
        self.base
    }

    /// length from the base to the end of the stream
    pub fn len(&self) -> io::Result<u64> {
        Ok(self.handle.len()?.saturating_sub(self.base))
    }

    pub fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    /// move the cursor back to the base
    pub fn rewind_to_base(&mut self) -> io::Result<()> {
        self.handle.seek_to(self.base)
    }
}

impl Read for StreamView {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.handle.read(buf)
    }
}

impl Seek for StreamView {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => {
                let absolute = self.base.checked_add(offset).ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidInput, "seek offset overflows")
                })?;
                SeekFrom::Start(absolute)
            }
            relative => relative,
        };
        let absolute = self.handle.seek(target)?;
        absolute.checked_sub(self.base).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before the start of the stream view",
            )
        })
    }
}

/// Embedded payload handed out by a wrapping archive
pub enum SubStream {
    /// random access is available, detection can recurse into it
    Seekable(StreamHandle),
    /// forward-only bytes, not enough to probe
    Sequential(Box<dyn Read + Send>),
}

impl SubStream {
    pub fn is_seekable(&self) -> bool {
        matches!(self, SubStream::Seekable(_))
    }
}
