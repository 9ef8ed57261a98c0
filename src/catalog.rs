//! format identifiers and the ordered probe catalog

use crate::error::{Error, Result};
use crate::formats::Codecs;
use std::fmt;

/// Supported container format identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FormatId {
    Mbr,
    Base64,
    Pe,
    Gpt,
    MachO,
    Lzh,
    Ext,
    Fat,
    Udf,
    Vhd,
    Apfs,
    Dmg,
    Vhdx,
    Vmdk,
    Hfs,
    Iso,
    Qcow,
    Ntfs,
    Wim,
    Cab,
    Nsis,
    SevenZ,
    Xz,
    Gzip,
    Zstd,
    Tar,
    Zip,
}

impl FormatId {
    /// Every identifier, in standard probe order.
    ///
    /// Fixed-offset signatures come first. Tar precedes zip because zip
    /// locates its directory from the tail and can match a zip stored as the
    /// last member of a tar.
    pub const ALL: [FormatId; 27] = [
        FormatId::Mbr,
        FormatId::Base64,
        FormatId::Pe,
        FormatId::Gpt,
        FormatId::MachO,
        FormatId::Lzh,
        FormatId::Ext,
        FormatId::Fat,
        FormatId::Udf,
        FormatId::Vhd,
        FormatId::Apfs,
        FormatId::Dmg,
        FormatId::Vhdx,
        FormatId::Vmdk,
        FormatId::Hfs,
        FormatId::Iso,
        FormatId::Qcow,
        FormatId::Ntfs,
        FormatId::Wim,
        FormatId::Cab,
        FormatId::Nsis,
        FormatId::SevenZ,
        FormatId::Xz,
        FormatId::Gzip,
        FormatId::Zstd,
        FormatId::Tar,
        FormatId::Zip,
    ];

    /// Get format name for display
    pub fn name(&self) -> &'static str {
        match self {
            FormatId::Mbr => "MBR",
            FormatId::Base64 => "Base64",
            FormatId::Pe => "PE",
            FormatId::Gpt => "GPT",
            FormatId::MachO => "Mach-O",
            FormatId::Lzh => "LZH",
            FormatId::Ext => "Ext",
            FormatId::Fat => "FAT",
            FormatId::Udf => "UDF",
            FormatId::Vhd => "VHD",
            FormatId::Apfs => "APFS",
            FormatId::Dmg => "DMG",
            FormatId::Vhdx => "VHDX",
            FormatId::Vmdk => "VMDK",
            FormatId::Hfs => "HFS",
            FormatId::Iso => "ISO",
            FormatId::Qcow => "QCOW",
            FormatId::Ntfs => "NTFS",
            FormatId::Wim => "WIM",
            FormatId::Cab => "Cab",
            FormatId::Nsis => "NSIS",
            FormatId::SevenZ => "7-Zip",
            FormatId::Xz => "XZ",
            FormatId::Gzip => "Gzip",
            FormatId::Zstd => "Zstandard",
            FormatId::Tar => "Tar",
            FormatId::Zip => "ZIP",
        }
    }

    /// Get the usual file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            FormatId::Mbr => "mbr",
            FormatId::Base64 => "b64",
            FormatId::Pe => "exe",
            FormatId::Gpt => "gpt",
            FormatId::MachO => "macho",
            FormatId::Lzh => "lzh",
            FormatId::Ext => "ext",
            FormatId::Fat => "fat",
            FormatId::Udf => "udf",
            FormatId::Vhd => "vhd",
            FormatId::Apfs => "apfs",
            FormatId::Dmg => "dmg",
            FormatId::Vhdx => "vhdx",
            FormatId::Vmdk => "vmdk",
            FormatId::Hfs => "hfs",
            FormatId::Iso => "iso",
            FormatId::Qcow => "qcow2",
            FormatId::Ntfs => "ntfs",
            FormatId::Wim => "wim",
            FormatId::Cab => "cab",
            FormatId::Nsis => "nsis",
            FormatId::SevenZ => "7z",
            FormatId::Xz => "xz",
            FormatId::Gzip => "gz",
            FormatId::Zstd => "zst",
            FormatId::Tar => "tar",
            FormatId::Zip => "zip",
        }
    }
}

impl fmt::Display for FormatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered, duplicate-free list of formats to probe.
///
/// Order is the tie-break policy: the first format that accepts a stream wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatCatalog {
    formats: Vec<FormatId>,
}

impl FormatCatalog {
    /// every known identifier in standard order
    pub fn standard() -> Self {
        Self {
            formats: FormatId::ALL.to_vec(),
        }
    }

    /// standard order restricted to formats with a compiled-in codec
    pub fn builtin() -> Self {
        Self {
            formats: FormatId::ALL
                .iter()
                .copied()
                .filter(|format| Codecs::supports(*format))
                .collect(),
        }
    }

    pub fn from_formats<I>(formats: I) -> Result<Self>
    where
        I: IntoIterator<Item = FormatId>,
    {
        let mut ordered: Vec<FormatId> = Vec::new();
        for format in formats {
            if ordered.contains(&format) {
                return Err(Error::DuplicateFormat(format));
            }
            ordered.push(format);
        }
        Ok(Self { formats: ordered })
    }

    pub fn iter(&self) -> impl Iterator<Item = FormatId> + '_ {
        self.formats.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }

    pub fn contains(&self, format: FormatId) -> bool {
        self.formats.contains(&format)
    }

    pub fn position(&self, format: FormatId) -> Option<usize> {
        self.formats.iter().position(|candidate| *candidate == format)
    }
}

impl Default for FormatCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_standard_has_no_duplicates() {
        let catalog = FormatCatalog::standard();
        let unique: HashSet<_> = catalog.iter().collect();
        assert_eq!(unique.len(), catalog.len());
    }

    #[test]
    fn test_builtin_keeps_standard_order() {
        let builtin = FormatCatalog::builtin();
        let standard = FormatCatalog::standard();
        let positions: Vec<_> = builtin
            .iter()
            .map(|format| standard.position(format).unwrap())
            .collect();
        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(builtin.len(), 6);
    }

    #[test]
    fn test_tar_probed_before_zip() {
        let catalog = FormatCatalog::builtin();
        assert!(catalog.position(FormatId::Tar) < catalog.position(FormatId::Zip));
    }

    #[test]
    fn test_duplicate_rejected() {
        let err = FormatCatalog::from_formats([FormatId::Zip, FormatId::Tar, FormatId::Zip])
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateFormat(FormatId::Zip)));
    }

    #[test]
    fn test_from_formats_keeps_order() -> Result<()> {
        let catalog = FormatCatalog::from_formats([FormatId::Zip, FormatId::SevenZ])?;
        assert_eq!(catalog.iter().collect::<Vec<_>>(), [FormatId::Zip, FormatId::SevenZ]);
        assert!(!catalog.contains(FormatId::Tar));
        Ok(())
    }

    #[test]
    fn test_display_uses_name() {
        assert_eq!(FormatId::SevenZ.to_string(), "7-Zip");
        assert_eq!(FormatId::Zstd.extension(), "zst");
    }
}
