//! Value codec for the controller's wire encodings
//!
//! Integers and fixed-point values are big-endian at their declared width.
//! `flt ` is an IEEE-754 single in the controller's native (little-endian)
//! order. Fixed-point tags name their layout in the last two characters:
//! `fpXY` is unsigned 16-bit, `spXY` signed 16-bit, and `Y` (hex) is the
//! number of fractional bits, so `fp88` divides by 256 and `spf0` by 1.

use fc_error::{FancurveError, Result};

use super::key::{TypeTag, VALUE_CAPACITY};

/// Unsigned fixed-point tags the controller uses
const UNSIGNED_FIXED: [&[u8; 4]; 11] = [
    b"fp1f", b"fp2e", b"fp3d", b"fp4c", b"fp5b", b"fp6a", b"fp79", b"fp88", b"fpa6", b"fpc4",
    b"fpe2",
];

/// Signed fixed-point tags the controller uses
const SIGNED_FIXED: [&[u8; 4]; 12] = [
    b"sp1e", b"sp2d", b"sp3c", b"sp4b", b"sp5a", b"sp69", b"sp78", b"sp87", b"sp96", b"spa5",
    b"spb4", b"spf0",
];

/// Decoded layout of a supported type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Unsigned { bytes: usize },
    Signed { bytes: usize },
    Float32,
    UnsignedFixed { frac_bits: u32 },
    SignedFixed { frac_bits: u32 },
}

impl Encoding {
    /// Resolve a tag, `None` for anything outside the supported table
    pub fn of(tag: TypeTag) -> Option<Self> {
        let name = tag.bytes();
        let encoding = match &name {
            b"ui8 " => Self::Unsigned { bytes: 1 },
            b"ui16" => Self::Unsigned { bytes: 2 },
            b"ui32" => Self::Unsigned { bytes: 4 },
            b"ui64" => Self::Unsigned { bytes: 8 },
            b"si8 " => Self::Signed { bytes: 1 },
            b"si16" => Self::Signed { bytes: 2 },
            b"si32" => Self::Signed { bytes: 4 },
            b"si64" => Self::Signed { bytes: 8 },
            b"flt " => Self::Float32,
            n if UNSIGNED_FIXED.contains(&n) => Self::UnsignedFixed { frac_bits: hex_digit(n[3])? },
            n if SIGNED_FIXED.contains(&n) => Self::SignedFixed { frac_bits: hex_digit(n[3])? },
            _ => return None,
        };
        Some(encoding)
    }

    /// Number of bytes the value occupies on the wire
    pub fn width(self) -> usize {
        match self {
            Self::Unsigned { bytes } | Self::Signed { bytes } => bytes,
            Self::Float32 => 4,
            Self::UnsignedFixed { .. } | Self::SignedFixed { .. } => 2,
        }
    }

    fn scale(frac_bits: u32) -> f64 {
        f64::from(1u32 << frac_bits)
    }
}

fn hex_digit(c: u8) -> Option<u32> {
    (c as char).to_digit(16)
}

fn resolve(tag: TypeTag) -> Result<Encoding> {
    Encoding::of(tag).ok_or_else(|| FancurveError::UnsupportedType(tag.to_string()))
}

fn take<'a>(tag: TypeTag, bytes: &'a [u8], width: usize) -> Result<&'a [u8]> {
    bytes.get(..width).ok_or(FancurveError::ShortBuffer {
        tag: tag.to_string(),
        needed: width,
        got: bytes.len(),
    })
}

/// Big-endian unsigned read of `dat.len()` bytes
fn be_unsigned(dat: &[u8]) -> u64 {
    dat.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
}

/// Big-endian two's-complement read of `dat.len()` bytes
fn be_signed(dat: &[u8]) -> i64 {
    let bits = 64 - 8 * dat.len() as u32;
    ((be_unsigned(dat) << bits) as i64) >> bits
}

/// Write the low `width` bytes of `value` big-endian
fn put_be(value: u64, width: usize) -> [u8; VALUE_CAPACITY] {
    let mut out = [0u8; VALUE_CAPACITY];
    out[..width].copy_from_slice(&value.to_be_bytes()[8 - width..]);
    out
}

/// Decode a value into a double
pub fn decode_number(tag: TypeTag, bytes: &[u8]) -> Result<f64> {
    let encoding = resolve(tag)?;
    let dat = take(tag, bytes, encoding.width())?;
    let value = match encoding {
        Encoding::Unsigned { .. } => be_unsigned(dat) as f64,
        Encoding::Signed { .. } => be_signed(dat) as f64,
        Encoding::Float32 => f64::from(f32::from_le_bytes([dat[0], dat[1], dat[2], dat[3]])),
        Encoding::UnsignedFixed { frac_bits } => be_unsigned(dat) as f64 / Encoding::scale(frac_bits),
        Encoding::SignedFixed { frac_bits } => be_signed(dat) as f64 / Encoding::scale(frac_bits),
    };
    Ok(value)
}

/// Decode a value into an integer, truncating fractional encodings toward zero
///
/// `ui64` values above `i64::MAX` saturate.
pub fn decode_integer(tag: TypeTag, bytes: &[u8]) -> Result<i64> {
    let encoding = resolve(tag)?;
    let dat = take(tag, bytes, encoding.width())?;
    match encoding {
        Encoding::Unsigned { .. } => Ok(i64::try_from(be_unsigned(dat)).unwrap_or(i64::MAX)),
        Encoding::Signed { .. } => Ok(be_signed(dat)),
        _ => decode_number(tag, dat).map(|v| v as i64),
    }
}

/// Check that a truncated value fits `bytes` bytes and return its bit pattern
fn fit(tag: TypeTag, value: f64, bytes: usize, signed: bool) -> Result<u64> {
    let out_of_range = || FancurveError::OutOfRange { tag: tag.to_string(), value };
    if !value.is_finite() || (!signed && value < 0.0) {
        return Err(out_of_range());
    }
    let t = value.trunc();
    let bits = 8 * bytes as i32;
    let (lo, hi) = if signed {
        (-(2f64.powi(bits - 1)), 2f64.powi(bits - 1))
    } else {
        (0.0, 2f64.powi(bits))
    };
    if t < lo || t >= hi {
        return Err(out_of_range());
    }
    Ok(if signed { t as i64 as u64 } else { t as u64 })
}

/// Encode a double for a key of the given type
///
/// Values outside the destination range are refused rather than wrapped;
/// in particular nothing negative is written to an unsigned encoding.
pub fn encode_number(tag: TypeTag, value: f64) -> Result<[u8; VALUE_CAPACITY]> {
    let encoding = resolve(tag)?;
    let width = encoding.width();
    match encoding {
        Encoding::Unsigned { bytes } => fit(tag, value, bytes, false).map(|v| put_be(v, width)),
        Encoding::Signed { bytes } => fit(tag, value, bytes, true).map(|v| put_be(v, width)),
        Encoding::Float32 => {
            let mut out = [0u8; VALUE_CAPACITY];
            out[..4].copy_from_slice(&(value as f32).to_le_bytes());
            Ok(out)
        }
        Encoding::UnsignedFixed { frac_bits } => {
            if value < 0.0 {
                return Err(FancurveError::OutOfRange { tag: tag.to_string(), value });
            }
            fit(tag, value * Encoding::scale(frac_bits), 2, false).map(|v| put_be(v, width))
        }
        Encoding::SignedFixed { frac_bits } => {
            fit(tag, value * Encoding::scale(frac_bits), 2, true).map(|v| put_be(v, width))
        }
    }
}

/// Encode an integer for a key of the given type
///
/// Integer encodings are range-checked exactly (no trip through `f64`), so the
/// full 64-bit range is available. Other encodings go through [`encode_number`].
pub fn encode_integer(tag: TypeTag, value: i64) -> Result<[u8; VALUE_CAPACITY]> {
    let encoding = resolve(tag)?;
    let out_of_range = || FancurveError::OutOfRange { tag: tag.to_string(), value: value as f64 };
    match encoding {
        Encoding::Unsigned { bytes } => {
            let v = u64::try_from(value).map_err(|_| out_of_range())?;
            if bytes < 8 && v >> (8 * bytes) != 0 {
                return Err(out_of_range());
            }
            Ok(put_be(v, bytes))
        }
        Encoding::Signed { bytes } => {
            let bits = 8 * bytes as u32;
            if bits < 64 {
                let half = 1i64 << (bits - 1);
                if value < -half || value >= half {
                    return Err(out_of_range());
                }
            }
            Ok(put_be(value as u64, bytes))
        }
        _ => encode_number(tag, value as f64),
    }
}
