//! archive format abstraction
//!
//! Every container parser is reached through [`FormatProbe`] and, once it has
//! accepted a stream, through the [`Archive`] handle it returns. Handles expose
//! their native metadata as loosely typed property tables; [`crate::item`]
//! turns those into uniform records.

use crate::catalog::FormatId;
use crate::context::ProbeContext;
use crate::stream::{StreamHandle, SubStream};
use crate::Result;
use std::collections::BTreeMap;
use std::io;
use time::OffsetDateTime;

pub mod gz;
pub mod sevenz;
pub mod single;
pub mod tarball;
pub mod xz;
pub mod zip;
pub mod zstd;

/// `S_IFMT` file-type mask of a POSIX mode
pub const MODE_TYPE_MASK: u64 = 0o170000;
pub const MODE_SYMLINK: u64 = 0o120000;
pub const MODE_DIRECTORY: u64 = 0o040000;
pub const MODE_REGULAR: u64 = 0o100000;

/// NT file time ticks (100 ns) between 1601-01-01 and the unix epoch
const NT_UNIX_EPOCH_TICKS: i128 = 116_444_736_000_000_000;

/// Per-item properties a format may expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PropId {
    Path,
    IsDir,
    Size,
    PackSize,
    Crc,
    Encrypted,
    CreationTime,
    AccessTime,
    ModificationTime,
    ChangeTime,
    PosixAttrib,
    SymLink,
}

/// Archive-wide properties
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArchiveProp {
    /// index of the item that carries the real payload of a wrapper
    MainSubfile,
}

/// Loosely typed property value, shaped like the format stores it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropValue {
    Empty,
    Bool(bool),
    UInt(u64),
    Str(String),
    /// 100 ns ticks since 1601-01-01 UTC
    FileTime(u64),
    /// seconds since the unix epoch
    UnixTime(i64),
}

impl PropValue {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            PropValue::UInt(value) => Some(*value),
            PropValue::Bool(value) => Some(u64::from(*value)),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropValue::Bool(value) => Some(*value),
            PropValue::UInt(value) => Some(*value != 0),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::Str(value) => Some(value),
            _ => None,
        }
    }

    /// Only the two time variants convert; anything else counts as absent
    pub fn as_datetime(&self) -> Option<OffsetDateTime> {
        match self {
            PropValue::FileTime(ticks) => {
                let nanos = (i128::from(*ticks) - NT_UNIX_EPOCH_TICKS) * 100;
                OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()
            }
            PropValue::UnixTime(seconds) => OffsetDateTime::from_unix_timestamp(*seconds).ok(),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, PropValue::Empty)
    }
}

/// Property table for one item
pub type PropertyMap = BTreeMap<PropId, PropValue>;

/// Handle on an accepted archive.
///
/// Indices are only meaningful for the handle that produced them.
pub trait Archive: Send {
    fn format(&self) -> FormatId;

    fn item_count(&self) -> Result<u32>;

    /// native value of one property, `None` when the format does not expose it
    fn property(&self, index: u32, prop: PropId) -> Option<PropValue>;

    fn archive_property(&self, _prop: ArchiveProp) -> Option<PropValue> {
        None
    }

    /// Open an item as a stream of its own.
    ///
    /// `budget` caps how many bytes the handle may buffer to make the stream
    /// seekable. `Ok(None)` means the format cannot expose the item.
    fn sub_stream(
        &mut self,
        _index: u32,
        _ctx: &ProbeContext,
        _budget: u64,
    ) -> Result<Option<SubStream>> {
        Ok(None)
    }
}

/// Result of one format attempt
pub enum ProbeOutcome {
    Accepted(Box<dyn Archive>),
    Rejected,
    PasswordNeeded,
    Cancelled,
}

impl std::fmt::Debug for ProbeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeOutcome::Accepted(archive) => write!(f, "Accepted({})", archive.format()),
            ProbeOutcome::Rejected => f.write_str("Rejected"),
            ProbeOutcome::PasswordNeeded => f.write_str("PasswordNeeded"),
            ProbeOutcome::Cancelled => f.write_str("Cancelled"),
        }
    }
}

/// Attempts to open a stream as one specific format.
///
/// The stream arrives positioned at the probe origin. Implementations may move
/// the cursor freely; restoring it after a rejection is the caller's job.
/// Structural mismatches are `Ok(Rejected)`, never errors. An `Err` is fatal
/// and ends detection.
pub trait FormatProbe {
    fn probe(
        &self,
        format: FormatId,
        stream: &StreamHandle,
        ctx: &ProbeContext,
    ) -> Result<ProbeOutcome>;
}

/// The codecs compiled into this crate
#[derive(Debug, Clone, Copy, Default)]
pub struct Codecs;

impl Codecs {
    pub fn supports(format: FormatId) -> bool {
        matches!(
            format,
            FormatId::SevenZ
                | FormatId::Xz
                | FormatId::Gzip
                | FormatId::Zstd
                | FormatId::Tar
                | FormatId::Zip
        )
    }
}

impl FormatProbe for Codecs {
    fn probe(
        &self,
        format: FormatId,
        stream: &StreamHandle,
        ctx: &ProbeContext,
    ) -> Result<ProbeOutcome> {
        if ctx.is_cancelled() {
            return Ok(ProbeOutcome::Cancelled);
        }
        match format {
            FormatId::SevenZ => self::sevenz::probe(stream, ctx),
            FormatId::Zip => self::zip::probe(stream, ctx),
            FormatId::Tar => self::tarball::probe(stream, ctx),
            FormatId::Gzip => self::gz::probe(stream, ctx),
            FormatId::Xz => self::xz::probe(stream, ctx),
            FormatId::Zstd => self::zstd::probe(stream, ctx),
            other => {
                log::trace!("no codec compiled in for {other}");
                Ok(ProbeOutcome::Rejected)
            }
        }
    }
}

/// Split parser I/O failures into "not this format" and "stream is broken".
///
/// Truncation and malformed data mean the bytes are not this format. Anything
/// else comes from the stream itself and is fatal.
pub(crate) fn reject_or_fatal(err: io::Error) -> Result<ProbeOutcome> {
    if is_parse_error(&err) {
        log::trace!("rejected on parse error: {err}");
        Ok(ProbeOutcome::Rejected)
    } else {
        Err(err.into())
    }
}

/// Truncated or malformed input, as opposed to a failing device
pub(crate) fn is_parse_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput
    )
}

/// Read up to `buf.len()` bytes, stopping early only at end of stream
pub(crate) fn read_prefix<R: io::Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(read) => filled += read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

/// Archive whose item properties were fully read while probing
pub struct TableArchive {
    format: FormatId,
    items: Vec<PropertyMap>,
    archive_props: BTreeMap<ArchiveProp, PropValue>,
}

impl TableArchive {
    pub fn new(format: FormatId, items: Vec<PropertyMap>) -> Self {
        Self {
            format,
            items,
            archive_props: BTreeMap::new(),
        }
    }

    pub fn with_archive_property(mut self, prop: ArchiveProp, value: PropValue) -> Self {
        self.archive_props.insert(prop, value);
        self
    }
}

impl Archive for TableArchive {
    fn format(&self) -> FormatId {
        self.format
    }

    fn item_count(&self) -> Result<u32> {
        u32::try_from(self.items.len()).map_err(|_| {
            crate::Error::internal(format!(
                "{} archive lists {} items, more than can be indexed",
                self.format,
                self.items.len()
            ))
        })
    }

    fn property(&self, index: u32, prop: PropId) -> Option<PropValue> {
        self.items.get(index as usize)?.get(&prop).cloned()
    }

    fn archive_property(&self, prop: ArchiveProp) -> Option<PropValue> {
        self.archive_props.get(&prop).cloned()
    }
}
