//! Archive-level enums and identifiers shared with the engine.

use crate::variant::FileTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A COM-style GUID, laid out exactly as the engine expects.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Guid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl Guid {
    pub const fn new(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        Self { data1, data2, data3, data4 }
    }

    /// Interface id in the engine's `23170F69-40C1-278A-0000-000600xx0000` family.
    const fn archive_interface(id: u8) -> Self {
        Self::new(0x2317_0F69, 0x40C1, 0x278A, [0x00, 0x00, 0x00, 0x06, 0x00, id, 0x00, 0x00])
    }

    pub const IID_IN_ARCHIVE: Guid = Guid::archive_interface(0x60);
    pub const IID_OUT_ARCHIVE: Guid = Guid::archive_interface(0xA0);
    pub const IID_SET_PROPERTIES: Guid = Guid::archive_interface(0x03);
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.data4;
        write!(
            f,
            "{{{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}}}",
            self.data1, self.data2, self.data3, d[0], d[1], d[2], d[3], d[4], d[5], d[6], d[7]
        )
    }
}

/// Archive formats the engine ships handlers for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    SevenZip,
    Zip,
    BZip2,
    Rar,
    Rar5,
    Cab,
    Lzma,
    Xz,
    Wim,
    Iso,
    Tar,
    GZip,
}

impl ArchiveFormat {
    pub const ALL: [ArchiveFormat; 12] = [
        Self::SevenZip,
        Self::Zip,
        Self::BZip2,
        Self::Rar,
        Self::Rar5,
        Self::Cab,
        Self::Lzma,
        Self::Xz,
        Self::Wim,
        Self::Iso,
        Self::Tar,
        Self::GZip,
    ];

    /// Handler byte inside the `23170F69-40C1-278A-1000-000110xx0000` class id.
    fn handler_id(self) -> u8 {
        match self {
            Self::Zip => 0x01,
            Self::BZip2 => 0x02,
            Self::Rar => 0x03,
            Self::SevenZip => 0x07,
            Self::Cab => 0x08,
            Self::Lzma => 0x0A,
            Self::Xz => 0x0C,
            Self::Rar5 => 0xCC,
            Self::Wim => 0xE6,
            Self::Iso => 0xE7,
            Self::Tar => 0xEE,
            Self::GZip => 0xEF,
        }
    }

    /// Class id passed to `CreateObject`.
    pub fn class_id(self) -> Guid {
        Guid::new(
            0x2317_0F69,
            0x40C1,
            0x278A,
            [0x10, 0x00, 0x00, 0x01, 0x10, self.handler_id(), 0x00, 0x00],
        )
    }

    /// Whether the engine can write this format (not just read it).
    pub fn is_writable(self) -> bool {
        matches!(
            self,
            Self::SevenZip | Self::Zip | Self::BZip2 | Self::Xz | Self::Wim | Self::Tar | Self::GZip
        )
    }

    /// Canonical file extension.
    pub fn extension(self) -> &'static str {
        match self {
            Self::SevenZip => "7z",
            Self::Zip => "zip",
            Self::BZip2 => "bz2",
            Self::Rar | Self::Rar5 => "rar",
            Self::Cab => "cab",
            Self::Lzma => "lzma",
            Self::Xz => "xz",
            Self::Wim => "wim",
            Self::Iso => "iso",
            Self::Tar => "tar",
            Self::GZip => "gz",
        }
    }
}

impl FromStr for ArchiveFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "7z" | "sevenzip" => Ok(Self::SevenZip),
            "zip" => Ok(Self::Zip),
            "bz2" | "bzip2" => Ok(Self::BZip2),
            "rar" => Ok(Self::Rar),
            "rar5" => Ok(Self::Rar5),
            "cab" => Ok(Self::Cab),
            "lzma" => Ok(Self::Lzma),
            "xz" => Ok(Self::Xz),
            "wim" => Ok(Self::Wim),
            "iso" => Ok(Self::Iso),
            "tar" => Ok(Self::Tar),
            "gz" | "gzip" => Ok(Self::GZip),
            _ => Err(UnknownFormat(s.to_string())),
        }
    }
}

/// Error returned when a format name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown archive format: {0}")]
pub struct UnknownFormat(pub String);

/// What the engine intends to do with the stream it asks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AskMode {
    Extract,
    Test,
    Skip,
    /// A mode value this crate does not know.
    Other(i32),
}

impl From<i32> for AskMode {
    fn from(raw: i32) -> Self {
        match raw {
            0 => Self::Extract,
            1 => Self::Test,
            2 => Self::Skip,
            other => Self::Other(other),
        }
    }
}

impl From<AskMode> for i32 {
    fn from(mode: AskMode) -> Self {
        match mode {
            AskMode::Extract => 0,
            AskMode::Test => 1,
            AskMode::Skip => 2,
            AskMode::Other(raw) => raw,
        }
    }
}

/// Per-item outcome reported through `SetOperationResult`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationResult {
    Ok,
    UnsupportedMethod,
    DataError,
    CrcError,
    Unavailable,
    UnexpectedEnd,
    DataAfterEnd,
    IsNotArc,
    HeadersError,
    WrongPassword,
    Other(i32),
}

impl OperationResult {
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}

impl From<i32> for OperationResult {
    fn from(raw: i32) -> Self {
        match raw {
            0 => Self::Ok,
            1 => Self::UnsupportedMethod,
            2 => Self::DataError,
            3 => Self::CrcError,
            4 => Self::Unavailable,
            5 => Self::UnexpectedEnd,
            6 => Self::DataAfterEnd,
            7 => Self::IsNotArc,
            8 => Self::HeadersError,
            9 => Self::WrongPassword,
            other => Self::Other(other),
        }
    }
}

impl From<OperationResult> for i32 {
    fn from(result: OperationResult) -> Self {
        match result {
            OperationResult::Ok => 0,
            OperationResult::UnsupportedMethod => 1,
            OperationResult::DataError => 2,
            OperationResult::CrcError => 3,
            OperationResult::Unavailable => 4,
            OperationResult::UnexpectedEnd => 5,
            OperationResult::DataAfterEnd => 6,
            OperationResult::IsNotArc => 7,
            OperationResult::HeadersError => 8,
            OperationResult::WrongPassword => 9,
            OperationResult::Other(raw) => raw,
        }
    }
}

/// Timestamp precision an archive writer stores.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileTimeType {
    Windows,
    Unix,
    Dos,
    Other(u32),
}

impl From<u32> for FileTimeType {
    fn from(raw: u32) -> Self {
        match raw {
            0 => Self::Windows,
            1 => Self::Unix,
            2 => Self::Dos,
            other => Self::Other(other),
        }
    }
}

/// Answer to `GetUpdateItemInfo`: what changed for an output item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateItemInfo {
    /// The item's data must be read from a new stream.
    pub new_data: bool,
    /// The item's properties must be queried through the callback.
    pub new_properties: bool,
    /// Index of the item in the source archive, if it is copied from one.
    pub index_in_archive: Option<u32>,
}

impl UpdateItemInfo {
    /// A brand new item: data and properties come from the host.
    pub fn new_item() -> Self {
        Self {
            new_data: true,
            new_properties: true,
            index_in_archive: None,
        }
    }

    /// An item copied unchanged from the source archive.
    pub fn unchanged(index_in_archive: u32) -> Self {
        Self {
            new_data: false,
            new_properties: false,
            index_in_archive: Some(index_in_archive),
        }
    }
}

/// Summary of one archive entry, assembled from its properties.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveItem {
    pub index: u32,
    pub path: String,
    pub size: u64,
    pub packed_size: u64,
    pub is_dir: bool,
    pub encrypted: bool,
    pub crc: Option<u32>,
    pub modified: Option<FileTime>,
}
