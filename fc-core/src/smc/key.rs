//! Four-character identifiers used by the management controller
//!
//! Both key names (`TC0P`, `F0Tg`, ...) and value type tags (`ui8 `, `fp88`,
//! `flt `, ...) are four ASCII bytes packed big-endian into a `u32`.

use std::fmt;
use std::str::FromStr;

use fc_error::FancurveError;
use serde::{Deserialize, Serialize};

/// Maximum number of value bytes a single read or write carries
pub const VALUE_CAPACITY: usize = 32;

fn pack(name: &str) -> Result<u32, FancurveError> {
    let bytes: [u8; 4] = name
        .as_bytes()
        .try_into()
        .map_err(|_| FancurveError::InvalidKey(name.to_string()))?;
    if !bytes.iter().all(u8::is_ascii) {
        return Err(FancurveError::InvalidKey(name.to_string()));
    }
    Ok(u32::from_be_bytes(bytes))
}

fn write_label(f: &mut fmt::Formatter<'_>, raw: u32) -> fmt::Result {
    for b in raw.to_be_bytes() {
        let c = if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' };
        write!(f, "{}", c)?;
    }
    Ok(())
}

/// Sensor or actuator key
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Key(u32);

impl Key {
    pub const fn from_bytes(name: [u8; 4]) -> Self {
        Self(u32::from_be_bytes(name))
    }

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    /// Character at position `i` (0..4), `'\0'` past the end
    pub fn char_at(self, i: usize) -> char {
        self.bytes().get(i).map(|b| *b as char).unwrap_or('\0')
    }
}

impl FromStr for Key {
    type Err = FancurveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        pack(s).map(Self)
    }
}

impl TryFrom<String> for Key {
    type Error = FancurveError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.to_string()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_label(f, self.0)
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key(\"")?;
        write_label(f, self.0)?;
        write!(f, "\")")
    }
}

/// Wire encoding of a key's value
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TypeTag(u32);

impl TypeTag {
    pub const UI8: Self = Self::from_bytes(*b"ui8 ");
    pub const UI16: Self = Self::from_bytes(*b"ui16");
    pub const UI32: Self = Self::from_bytes(*b"ui32");
    pub const UI64: Self = Self::from_bytes(*b"ui64");
    pub const SI8: Self = Self::from_bytes(*b"si8 ");
    pub const SI16: Self = Self::from_bytes(*b"si16");
    pub const SI32: Self = Self::from_bytes(*b"si32");
    pub const SI64: Self = Self::from_bytes(*b"si64");
    pub const FLT: Self = Self::from_bytes(*b"flt ");
    pub const FP88: Self = Self::from_bytes(*b"fp88");
    pub const FPE2: Self = Self::from_bytes(*b"fpe2");
    pub const SP78: Self = Self::from_bytes(*b"sp78");
    pub const FLAG: Self = Self::from_bytes(*b"flag");

    pub const fn from_bytes(name: [u8; 4]) -> Self {
        Self(u32::from_be_bytes(name))
    }

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    /// `flt ` or any `fp..`/`sp..` fixed-point tag, known or not.
    ///
    /// Temperature keys are only considered when their tag is in this family.
    pub fn is_float_family(self) -> bool {
        let prefix = self.0 & 0xFFFF_0000;
        self == Self::FLT
            || prefix == u32::from_be_bytes(*b"fp\0\0")
            || prefix == u32::from_be_bytes(*b"sp\0\0")
    }
}

impl FromStr for TypeTag {
    type Err = FancurveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        pack(s).map(Self)
    }
}

impl TryFrom<String> for TypeTag {
    type Error = FancurveError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TypeTag> for String {
    fn from(tag: TypeTag) -> Self {
        tag.to_string()
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_label(f, self.0)
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeTag(\"")?;
        write_label(f, self.0)?;
        write!(f, "\")")
    }
}

/// Per-key metadata reported by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyInfo {
    /// Declared byte length of the value
    pub size: u32,
    pub tag: TypeTag,
    pub attributes: u8,
}

/// Value bytes as read from the controller, alongside their metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawValue {
    pub info: KeyInfo,
    pub bytes: [u8; VALUE_CAPACITY],
}

impl RawValue {
    /// The declared-length prefix of the value buffer
    pub fn payload(&self) -> &[u8] {
        let len = (self.info.size as usize).min(VALUE_CAPACITY);
        &self.bytes[..len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_packing_is_big_endian() {
        let key: Key = "TC0P".parse().unwrap();
        assert_eq!(key.raw(), 0x5443_3050);
        assert_eq!(key, Key::from_bytes(*b"TC0P"));
        assert_eq!(key.char_at(0), 'T');
        assert_eq!(key.char_at(3), 'P');
        assert_eq!(key.char_at(4), '\0');
    }

    #[test]
    fn test_key_display_roundtrip() {
        let key = Key::from_bytes(*b"F1Md");
        assert_eq!(key.to_string(), "F1Md");
        assert_eq!(format!("{:?}", key), "Key(\"F1Md\")");
        assert_eq!(Key::from_raw(0).to_string(), "????");
    }

    #[test]
    fn test_key_rejects_wrong_length() {
        assert!("TC0".parse::<Key>().is_err());
        assert!("TC0PX".parse::<Key>().is_err());
        assert!("TCé".parse::<Key>().is_err());
    }

    #[test]
    fn test_float_family() {
        assert!(TypeTag::FLT.is_float_family());
        assert!(TypeTag::FP88.is_float_family());
        assert!(TypeTag::SP78.is_float_family());
        // unknown fixed-point variants still count as floating
        assert!("fp97".parse::<TypeTag>().unwrap().is_float_family());
        assert!(!TypeTag::UI8.is_float_family());
        assert!(!TypeTag::SI16.is_float_family());
        assert!(!TypeTag::FLAG.is_float_family());
    }

    #[test]
    fn test_serde_as_string() {
        let key: Key = serde_json::from_str("\"TPCD\"").unwrap();
        assert_eq!(key, Key::from_bytes(*b"TPCD"));
        assert_eq!(serde_json::to_string(&TypeTag::UI16).unwrap(), "\"ui16\"");
        assert!(serde_json::from_str::<TypeTag>("\"ui\"").is_err());
    }

    #[test]
    fn test_payload_respects_declared_size() {
        let value = RawValue {
            info: KeyInfo { size: 2, tag: TypeTag::UI16, attributes: 0 },
            bytes: [0xAB; VALUE_CAPACITY],
        };
        assert_eq!(value.payload(), &[0xAB, 0xAB]);
    }
}
