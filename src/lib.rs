//! Compiles a vendor device descriptor (EDC XML) into a bit-accurate model of a device's
//! configuration fuse registers, and resolves named fuse settings against it.

use anyhow::{bail, Context};

mod config;
mod emit;
mod error;
mod field;
mod options;
mod query;
mod register;
mod space;
mod value;

pub use config::DeviceConfig;
pub use error::{ErrorKind, FuseConfigError, FuseConfigResult};
pub use field::FieldSpec;
pub use options::LoadOptions;
pub use query::{DocumentQuery, XmlDocument};
pub use register::RegisterSpec;
pub use space::{AddressSpaceSpec, MAX_REGION_BYTES};
pub use value::ReferenceValueSpec;

/// Name given to padding registers and fields.
pub const RESERVED_NAME: &str = "reserved";

/// The widest register or field the model can hold.
pub const MAX_WIDTH_BITS: u32 = 64;

/// All-ones mask covering the lowest `width` bits.
pub(crate) fn bit_mask(width: u32) -> u64 {
  match width {
    0 => 0,
    w if w >= 64 => u64::MAX,
    w => (1u64 << w) - 1,
  }
}

/// Parses an integer literal the way C's `strtol(text, NULL, 0)` reads descriptor attributes:
/// leading whitespace is skipped, `0x` selects hexadecimal, a leading `0` selects octal, and
/// anything after the literal is ignored.
pub(crate) fn parse_int(text: &str) -> anyhow::Result<u64> {
  let trimmed = text.trim_start();
  let unsigned = match trimmed.strip_prefix('+') {
    Some(rest) => rest,
    None => {
      if trimmed.starts_with('-') {
        bail!("negative literal '{}' is not allowed", text);
      }
      trimmed
    }
  };

  let (radix, digits) = if unsigned.starts_with("0x") || unsigned.starts_with("0X") {
    (16, &unsigned[2..])
  } else if unsigned.starts_with('0') {
    (8, &unsigned[1..])
  } else {
    (10, unsigned)
  };

  let end = digits
    .find(|c: char| !c.is_digit(radix))
    .unwrap_or_else(|| digits.len());

  if end == 0 {
    // A lone "0" (or "0" followed by non-octal text) is zero.
    if radix == 8 {
      return Ok(0);
    }
    bail!("'{}' is not an integer literal", text);
  }

  u64::from_str_radix(&digits[..end], radix)
    .with_context(|| format!("integer literal '{}' is out of range", text))
}

#[cfg(test)]
mod tests {
  use super::{bit_mask, parse_int};

  #[test]
  fn parses_integer_literals_like_strtol() {
    assert_eq!(98, parse_int("98").unwrap());
    assert_eq!(0x62, parse_int("0x62").unwrap());
    assert_eq!(0xFF, parse_int("  0XfF").unwrap());
    assert_eq!(8, parse_int("010").unwrap());
    assert_eq!(0, parse_int("0").unwrap());
    assert_eq!(3, parse_int("3)").unwrap());
    assert_eq!(12, parse_int("+12").unwrap());
  }

  #[test]
  fn rejects_non_literals() {
    assert!(parse_int("").is_err());
    assert!(parse_int("FOO").is_err());
    assert!(parse_int("0x").is_err());
    assert!(parse_int("-1").is_err());
    assert!(parse_int("99999999999999999999999").is_err());
  }

  #[test]
  fn masks_cover_width() {
    assert_eq!(0, bit_mask(0));
    assert_eq!(0b1, bit_mask(1));
    assert_eq!(0xF, bit_mask(4));
    assert_eq!(0xFF, bit_mask(8));
    assert_eq!(u64::MAX, bit_mask(64));
  }
}
