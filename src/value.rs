use std::fmt;

use xmltree::Element;

use crate::{
  error::{ErrorKind, FuseConfigError, FuseConfigResult},
  parse_int,
  query::required_attribute,
};

/// Constant names shared by unrelated fields; they are never prefixed with the field name.
const CANONICAL_NAMES: [&str; 2] = ["SET", "CLEAR"];

/// A symbolic name that a field accepts, and the encoding it stands for.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceValueSpec {
  /// The name a setting may use, e.g. `SET` or `SUT_CKSEL_INTRCOSC_8MHZ_6CK_14CK_65MS`.
  pub name: String,

  /// The value written into the field when this name is selected.
  pub value: u64,
}
impl ReferenceValueSpec {
  pub fn new(name: &str, value: u64) -> Self {
    Self {
      name: name.to_owned(),
      value,
    }
  }

  /// Builds a reference value from a `DCRFieldSemantic` node of the field named `field_name`.
  ///
  /// The encoding is the literal after the last `=` of the node's `when` condition, e.g.
  /// `($0000 & 0x1) == 0x0`.
  pub(crate) fn from_node(node: &Element, field_name: &str) -> FuseConfigResult<Self> {
    let constant = required_attribute(node, "cname")?;
    let when = required_attribute(node, "when")?;

    let literal = match when.rfind('=') {
      Some(pos) => &when[pos + 1..],
      None => {
        return Err(FuseConfigError::new(
          ErrorKind::MalformedAttribute,
          &format!(
            "Reference value {} of field {}: condition '{}' has no '='",
            constant, field_name, when
          ),
        ))
      }
    };

    let value = parse_int(literal).map_err(|e| {
      FuseConfigError::new(
        ErrorKind::MalformedAttribute,
        &format!(
          "Reference value {} of field {}: {:#}",
          constant, field_name, e
        ),
      )
    })?;

    let name = match CANONICAL_NAMES.contains(&constant) {
      true => constant.to_owned(),
      false => format!("{}_{}", field_name, constant),
    };

    Ok(Self { name, value })
  }
}
impl fmt::Display for ReferenceValueSpec {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "({}, 0x{:x})", self.name, self.value)
  }
}

/// How a setting's value text is interpreted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum SettingValue<'a> {
  /// Decimal digits only.
  Number(u64),

  /// Decimal digits only, but too large for any field.
  Overflow,

  /// Anything else, matched against reference names.
  Symbol(&'a str),
}
impl<'a> SettingValue<'a> {
  pub(crate) fn classify(text: &'a str) -> Self {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
      return SettingValue::Symbol(text);
    }

    match text.parse::<u64>() {
      Ok(n) => SettingValue::Number(n),
      Err(_) => SettingValue::Overflow,
    }
  }
}
