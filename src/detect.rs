//! format detection over an ordered catalog
//!
//! [`Detector::detect`] tries each catalog format against the stream in order,
//! restoring the stream position between attempts, and keeps the first
//! format that accepts. When the accepted archive names a main subfile the
//! detector opens that payload and runs the same sweep over it, keeping every
//! wrapper it passes through.

use crate::{
    catalog::{FormatCatalog, FormatId},
    context::ProbeContext,
    error::{Error, Result},
    formats::{Archive, ArchiveProp, Codecs, FormatProbe, ProbeOutcome},
    item::{self, Item},
    stream::{StreamHandle, SubStream},
};
use std::fmt;

const DEFAULT_SUB_STREAM_MEMORY_LIMIT: u64 = 256 * 1024 * 1024;

/// Knobs for one detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectOptions {
    /// look inside wrappers that declare a main subfile
    pub resolve_sub_streams: bool,
    /// bytes all nesting levels together may buffer to make payloads seekable
    pub sub_stream_memory_limit: u64,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            resolve_sub_streams: true,
            sub_stream_memory_limit: DEFAULT_SUB_STREAM_MEMORY_LIMIT,
        }
    }
}

/// Outcome of a detection call that did not fail
#[derive(Debug)]
pub enum Detection {
    Accepted(OpenedArchive),
    /// the context was cancelled; nothing was opened
    Cancelled,
}

impl Detection {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Detection::Cancelled)
    }

    pub fn accepted(self) -> Option<OpenedArchive> {
        match self {
            Detection::Accepted(opened) => Some(opened),
            Detection::Cancelled => None,
        }
    }
}

/// An accepted archive together with the archive found inside it, if any.
///
/// Listing goes to the innermost layer. The wrappers stay open because
/// reading inner data may still go through them.
pub struct OpenedArchive {
    archive: Box<dyn Archive>,
    item_count: u32,
    inner: Option<Box<OpenedArchive>>,
}

impl OpenedArchive {
    fn new(archive: Box<dyn Archive>, item_count: u32) -> Self {
        Self {
            archive,
            item_count,
            inner: None,
        }
    }

    fn innermost(&self) -> &OpenedArchive {
        let mut current = self;
        while let Some(inner) = &current.inner {
            current = inner;
        }
        current
    }

    /// format of the archive whose items are listed
    pub fn format(&self) -> FormatId {
        self.innermost().archive.format()
    }

    pub fn item_count(&self) -> u32 {
        self.innermost().item_count
    }

    /// the innermost archive handle
    pub fn archive(&self) -> &dyn Archive {
        self.innermost().archive.as_ref()
    }

    pub fn item_at(&self, index: u32) -> Result<Item> {
        item::item_at(self.archive(), index)
    }

    pub fn items(&self) -> Result<Vec<Item>> {
        item::all_items(self.archive())
    }

    /// the outermost archive, whatever was found inside it
    pub fn outer(&self) -> &dyn Archive {
        self.archive.as_ref()
    }

    pub fn outer_mut(&mut self) -> &mut dyn Archive {
        self.archive.as_mut()
    }

    pub fn outer_format(&self) -> FormatId {
        self.archive.format()
    }

    pub fn outer_item_count(&self) -> u32 {
        self.item_count
    }

    pub fn inner(&self) -> Option<&OpenedArchive> {
        self.inner.as_deref()
    }

    pub fn is_nested(&self) -> bool {
        self.inner.is_some()
    }

    /// every layer, outermost first
    pub fn layers(&self) -> Vec<&OpenedArchive> {
        let mut layers = vec![self];
        let mut current = self;
        while let Some(inner) = current.inner() {
            layers.push(inner);
            current = inner;
        }
        layers
    }

    /// layer formats, outermost first
    pub fn formats(&self) -> Vec<FormatId> {
        self.layers()
            .iter()
            .map(|layer| layer.outer_format())
            .collect()
    }
}

impl fmt::Debug for OpenedArchive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenedArchive")
            .field("format", &self.archive.format())
            .field("item_count", &self.item_count)
            .field("inner", &self.inner)
            .finish()
    }
}

/// Result of sweeping the catalog over one stream
enum Sweep {
    Accepted(OpenedArchive),
    IncorrectFormat { password_needed: bool },
    Cancelled,
}

/// Runs format probes in catalog order over a stream
pub struct Detector<P = Codecs> {
    catalog: FormatCatalog,
    probe: P,
    options: DetectOptions,
}

impl Detector<Codecs> {
    /// every compiled-in format, default options
    pub fn new() -> Self {
        Self::with_probe(FormatCatalog::builtin(), Codecs)
    }
}

impl Default for Detector<Codecs> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: FormatProbe> Detector<P> {
    pub fn with_probe(catalog: FormatCatalog, probe: P) -> Self {
        Self {
            catalog,
            probe,
            options: DetectOptions::default(),
        }
    }

    pub fn with_options(mut self, options: DetectOptions) -> Self {
        self.options = options;
        self
    }

    pub fn catalog(&self) -> &FormatCatalog {
        &self.catalog
    }

    pub fn options(&self) -> &DetectOptions {
        &self.options
    }

    /// Detect the format of `stream`, starting at its current position.
    ///
    /// Returns `Err(IncorrectFormat)` when nothing matched, or
    /// `Err(PasswordNeeded)` when nothing opened but some format asked for a
    /// password. I/O and internal errors end the call at once and are also
    /// recorded in the context.
    pub fn detect(&self, stream: &StreamHandle, ctx: &ProbeContext) -> Result<Detection> {
        if ctx.is_cancelled() {
            log::debug!("detection cancelled before the first probe");
            return Ok(Detection::Cancelled);
        }

        let mut budget = self.options.sub_stream_memory_limit;
        match self.open(stream, ctx, &mut budget) {
            Ok(Sweep::Accepted(opened)) => Ok(Detection::Accepted(opened)),
            Ok(Sweep::Cancelled) => Ok(Detection::Cancelled),
            Ok(Sweep::IncorrectFormat {
                password_needed: true,
            }) => Err(Error::PasswordNeeded),
            Ok(Sweep::IncorrectFormat {
                password_needed: false,
            }) => Err(Error::IncorrectFormat),
            Err(err) => {
                log::warn!("detection failed: {err}");
                ctx.record_fatal(&err);
                Err(err)
            }
        }
    }

    /// sweep, then look inside whatever was accepted
    fn open(&self, stream: &StreamHandle, ctx: &ProbeContext, budget: &mut u64) -> Result<Sweep> {
        match self.sweep(stream, ctx)? {
            Sweep::Accepted(opened) => self.resolve(opened, ctx, budget),
            other => Ok(other),
        }
    }

    fn sweep(&self, stream: &StreamHandle, ctx: &ProbeContext) -> Result<Sweep> {
        let origin = stream.position()?;
        let mut password_needed = false;

        for format in self.catalog.iter() {
            if ctx.is_cancelled() {
                return Ok(Sweep::Cancelled);
            }
            log::trace!("probing {format} at offset {origin}");

            match self.probe.probe(format, stream, ctx)? {
                ProbeOutcome::Accepted(archive) => {
                    let item_count = archive.item_count().map_err(|err| {
                        Error::internal(format!(
                            "{format} accepted the stream but could not count its items: {err}"
                        ))
                    })?;
                    log::debug!("{format} accepted the stream with {item_count} items");
                    return Ok(Sweep::Accepted(OpenedArchive::new(archive, item_count)));
                }
                ProbeOutcome::Cancelled => {
                    log::debug!("{format} probe was cancelled");
                    return Ok(Sweep::Cancelled);
                }
                ProbeOutcome::PasswordNeeded => {
                    log::debug!("{format} needs a password, trying the remaining formats");
                    password_needed = true;
                }
                ProbeOutcome::Rejected => {}
            }

            stream.seek_to(origin)?;
        }

        Ok(Sweep::IncorrectFormat { password_needed })
    }

    fn resolve(
        &self,
        mut opened: OpenedArchive,
        ctx: &ProbeContext,
        budget: &mut u64,
    ) -> Result<Sweep> {
        if !self.options.resolve_sub_streams {
            return Ok(Sweep::Accepted(opened));
        }
        let format = opened.archive.format();
        let Some(index) = opened
            .archive
            .archive_property(ArchiveProp::MainSubfile)
            .and_then(|value| value.as_u64())
            .and_then(|index| u32::try_from(index).ok())
        else {
            return Ok(Sweep::Accepted(opened));
        };
        if index >= opened.item_count {
            log::debug!("{format} main subfile {index} is out of range, keeping the outer archive");
            return Ok(Sweep::Accepted(opened));
        }

        let inner_stream = match opened.archive.sub_stream(index, ctx, *budget) {
            Ok(Some(SubStream::Seekable(inner))) => inner,
            Ok(Some(SubStream::Sequential(_))) => {
                log::debug!("{format} payload is not seekable, keeping the outer archive");
                return Ok(Sweep::Accepted(opened));
            }
            Ok(None) if ctx.is_cancelled() => return Ok(Sweep::Cancelled),
            Ok(None) => {
                log::debug!("{format} did not expose its main subfile");
                return Ok(Sweep::Accepted(opened));
            }
            Err(err) => {
                log::debug!("{format} main subfile is unreadable ({err}), keeping the outer archive");
                return Ok(Sweep::Accepted(opened));
            }
        };

        let buffered = inner_stream.len()?;
        *budget = budget.saturating_sub(buffered);
        log::debug!("probing {buffered} byte payload of {format}");

        match self.open(&inner_stream, ctx, budget)? {
            Sweep::Accepted(inner) => {
                opened.inner = Some(Box::new(inner));
                Ok(Sweep::Accepted(opened))
            }
            Sweep::Cancelled => Ok(Sweep::Cancelled),
            Sweep::IncorrectFormat {
                password_needed: true,
            } => Ok(Sweep::IncorrectFormat {
                password_needed: true,
            }),
            Sweep::IncorrectFormat {
                password_needed: false,
            } => {
                log::debug!("{format} payload is not a known archive, keeping the outer archive");
                Ok(Sweep::Accepted(opened))
            }
        }
    }
}
