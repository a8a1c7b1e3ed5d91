//! Conversion between host values and their native representations.
//!
//! Two pieces: the wide-string sub-codec (length-prefixed UTF-16 or UTF-32
//! strings in natively allocated memory) and the `PROPVARIANT` codec built
//! on top of it. Typed reads with defaults live in
//! [`lib_archive_types::safe_cast`].

pub mod string;
pub mod variant;

pub use lib_archive_types::safe_cast;
pub use string::{
    decode_string, decode_wide_cstr, encode_string, free_string, NativeString, RawString, StringConvention,
};
pub use variant::{
    decode_variant, encode_variant, take_variant, EncodedVariant, RawFileTime, RawPropValue, RawPropVariant,
};
