//! Property identifiers and variant type tags.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an item or archive property (`kpid*` in the engine).
///
/// A newtype rather than an enum: the engine may report ids this crate
/// does not know about through `GetPropertyInfo`.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropId(pub u32);

impl PropId {
    pub const NO_PROPERTY: PropId = PropId(0);
    pub const MAIN_SUBFILE: PropId = PropId(1);
    pub const HANDLER_ITEM_INDEX: PropId = PropId(2);
    pub const PATH: PropId = PropId(3);
    pub const NAME: PropId = PropId(4);
    pub const EXTENSION: PropId = PropId(5);
    pub const IS_DIR: PropId = PropId(6);
    pub const SIZE: PropId = PropId(7);
    pub const PACK_SIZE: PropId = PropId(8);
    pub const ATTRIB: PropId = PropId(9);
    pub const CTIME: PropId = PropId(10);
    pub const ATIME: PropId = PropId(11);
    pub const MTIME: PropId = PropId(12);
    pub const SOLID: PropId = PropId(13);
    pub const COMMENTED: PropId = PropId(14);
    pub const ENCRYPTED: PropId = PropId(15);
    pub const SPLIT_BEFORE: PropId = PropId(16);
    pub const SPLIT_AFTER: PropId = PropId(17);
    pub const DICTIONARY_SIZE: PropId = PropId(18);
    pub const CRC: PropId = PropId(19);
    pub const TYPE: PropId = PropId(20);
    pub const IS_ANTI: PropId = PropId(21);
    pub const METHOD: PropId = PropId(22);
    pub const HOST_OS: PropId = PropId(23);
    pub const FILE_SYSTEM: PropId = PropId(24);
    pub const USER: PropId = PropId(25);
    pub const GROUP: PropId = PropId(26);
    pub const BLOCK: PropId = PropId(27);
    pub const COMMENT: PropId = PropId(28);
    pub const POSITION: PropId = PropId(29);
    pub const PREFIX: PropId = PropId(30);
    pub const NUM_SUB_DIRS: PropId = PropId(31);
    pub const NUM_SUB_FILES: PropId = PropId(32);
    pub const UNPACK_VER: PropId = PropId(33);
    pub const VOLUME: PropId = PropId(34);
    pub const IS_VOLUME: PropId = PropId(35);
    pub const OFFSET: PropId = PropId(36);
    pub const LINKS: PropId = PropId(37);
    pub const NUM_BLOCKS: PropId = PropId(38);
    pub const NUM_VOLUMES: PropId = PropId(39);
    pub const TIME_TYPE: PropId = PropId(40);
    pub const BIT64: PropId = PropId(41);
    pub const BIG_ENDIAN: PropId = PropId(42);
    pub const CPU: PropId = PropId(43);
    pub const PHY_SIZE: PropId = PropId(44);
    pub const HEADERS_SIZE: PropId = PropId(45);
    pub const CHECKSUM: PropId = PropId(46);
    pub const CHARACTS: PropId = PropId(47);
    pub const VA: PropId = PropId(48);
    pub const ID: PropId = PropId(49);
    pub const SHORT_NAME: PropId = PropId(50);
    pub const CREATOR_APP: PropId = PropId(51);
    pub const SECTOR_SIZE: PropId = PropId(52);
    pub const POSIX_ATTRIB: PropId = PropId(53);
    pub const SYM_LINK: PropId = PropId(54);
    pub const ERROR: PropId = PropId(55);
    pub const TOTAL_SIZE: PropId = PropId(56);
    pub const FREE_SPACE: PropId = PropId(57);
    pub const CLUSTER_SIZE: PropId = PropId(58);
    pub const VOLUME_NAME: PropId = PropId(59);
    pub const LOCAL_NAME: PropId = PropId(60);
    pub const PROVIDER: PropId = PropId(61);
    pub const USER_DEFINED: PropId = PropId(0x10000);

    /// Human-readable name for well-known ids.
    pub fn name(self) -> Option<&'static str> {
        const NAMES: [&str; 62] = [
            "NoProperty", "MainSubfile", "HandlerItemIndex", "Path", "Name",
            "Extension", "IsDir", "Size", "PackSize", "Attrib", "CTime", "ATime",
            "MTime", "Solid", "Commented", "Encrypted", "SplitBefore", "SplitAfter",
            "DictionarySize", "CRC", "Type", "IsAnti", "Method", "HostOS",
            "FileSystem", "User", "Group", "Block", "Comment", "Position", "Prefix",
            "NumSubDirs", "NumSubFiles", "UnpackVer", "Volume", "IsVolume", "Offset",
            "Links", "NumBlocks", "NumVolumes", "TimeType", "Bit64", "BigEndian",
            "Cpu", "PhySize", "HeadersSize", "Checksum", "Characts", "Va", "Id",
            "ShortName", "CreatorApp", "SectorSize", "PosixAttrib", "SymLink",
            "Error", "TotalSize", "FreeSpace", "ClusterSize", "VolumeName",
            "LocalName", "Provider",
        ];
        if self == Self::USER_DEFINED {
            return Some("UserDefined");
        }
        NAMES.get(self.0 as usize).copied()
    }
}

impl From<u32> for PropId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for PropId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "PropId({})", self.0),
        }
    }
}

/// `VARTYPE` tag of a property variant.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VarType(pub u16);

impl VarType {
    pub const EMPTY: VarType = VarType(0);
    pub const I2: VarType = VarType(2);
    pub const I4: VarType = VarType(3);
    pub const BSTR: VarType = VarType(8);
    pub const BOOL: VarType = VarType(11);
    pub const I1: VarType = VarType(16);
    pub const UI1: VarType = VarType(17);
    pub const UI2: VarType = VarType(18);
    pub const UI4: VarType = VarType(19);
    pub const I8: VarType = VarType(20);
    pub const UI8: VarType = VarType(21);
    pub const INT: VarType = VarType(22);
    pub const UINT: VarType = VarType(23);
    pub const FILETIME: VarType = VarType(64);
}

/// Description of one property as reported by `GetPropertyInfo`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyInfo {
    /// Optional display name; most built-in properties report none.
    pub name: Option<String>,
    pub id: PropId,
    pub var_type: VarType,
}
