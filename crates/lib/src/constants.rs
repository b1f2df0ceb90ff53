//! Constants used throughout the normref library.
//!
//! This module provides central definitions for the reserved physical keys and
//! the metadata keys that appear in exported snapshot values.

/// Reserved physical key: the location's own identifier is the field value.
pub const KEY_MARKER: &str = "$key";

/// Reserved physical key: the location's own content is the field value.
pub const VALUE_MARKER: &str = "$value";

/// Metadata key carrying a location's priority in exported values.
pub const PRIORITY_KEY: &str = ".priority";

/// Metadata key wrapping a primitive value in exported values.
pub const VALUE_KEY: &str = ".value";

/// Separator between segments of a relative child path.
pub const PATH_SEPARATOR: char = '/';

/// Keyword separating a field selector from its logical name (`users.name as n`).
pub const ALIAS_KEYWORD: &str = " as ";

/// Alphabet for push ids, in ascending ASCII order so ids sort by creation time.
pub const PUSH_CHARS: &[u8; 64] =
    b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";
