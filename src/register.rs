use std::fmt;

use log::debug;
use xmltree::Element;

use super::field::FieldSpec;
use crate::{
  bit_mask,
  error::{ErrorKind, FuseConfigError, FuseConfigResult},
  query::{attribute, child_elements, int_attribute, required_attribute, DocumentQuery},
  LoadOptions, MAX_WIDTH_BITS, RESERVED_NAME,
};

/// Describes a byte-aligned configuration register and the fields packed into it.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterSpec {
  /// Name that identifies the register, or `reserved` for padding.
  pub name: String,

  /// Register's starting byte offset within its address space.
  pub offset: u32,

  /// The bit width of the register. Always a multiple of 8.
  pub width: u32,

  /// The factory default (erased) value of the register.
  pub default_value: u64,

  /// The fields of the register, least-significant first, covering every bit of the register.
  pub fields: Vec<FieldSpec>,
}
impl RegisterSpec {
  pub fn new(name: &str, offset: u32, width: u32, default_value: u64) -> Self {
    Self {
      name: name.to_owned(),
      offset,
      width,
      default_value,
      fields: Vec::new(),
    }
  }

  /// A padding register of `width` bits with all bits set and a single reserved field.
  pub fn reserved(offset: u32, width: u32) -> Self {
    let mut register = Self::new(RESERVED_NAME, offset, width, bit_mask(width));
    register
      .fields
      .push(FieldSpec::reserved(width, 0, register.default_value));
    register
  }

  /// Builds a register from a `DCRDef` node, including its fields.
  pub(crate) fn from_node<Q: DocumentQuery>(
    doc: &Q,
    options: &LoadOptions,
    node: &Element,
  ) -> FuseConfigResult<Self> {
    let name = required_attribute(node, "cname")?;
    let offset = Self::checked_offset(int_attribute(node, "_addr")?, name)?;
    let default_value = int_attribute(node, "factorydefault")?;
    let width = int_attribute(node, "nzwidth")?;

    if width == 0 || width % 8 != 0 || width > MAX_WIDTH_BITS as u64 {
      return Err(FuseConfigError::new(
        ErrorKind::MalformedRegisterWidth,
        &format!(
          "Unsupported config register size ({}) for {}, expected a multiple of 8 bits up to {}.",
          width, name, MAX_WIDTH_BITS
        ),
      ));
    }

    if default_value & !bit_mask(width as u32) != 0 {
      return Err(FuseConfigError::new(
        ErrorKind::MalformedAttribute,
        &format!(
          "Register {}: factory default 0x{:x} does not fit in {} bits",
          name, default_value, width
        ),
      ));
    }

    let mut register = Self::new(name, offset, width as u32, default_value);
    register.add_fields(doc, options, node)?;

    debug!(
      "Register {} at offset 0x{:x}: {} bits, default 0x{:x}, {} fields",
      register.name,
      register.offset,
      register.width,
      register.default_value,
      register.fields.len()
    );

    Ok(register)
  }

  /// Builds a padding register from an `AdjustPoint` node, whose `offset` attribute counts
  /// bytes. The node's address is used when present, otherwise `next_offset`.
  pub(crate) fn padding_from_node(node: &Element, next_offset: u32) -> FuseConfigResult<Self> {
    let bytes = int_attribute(node, "offset")?;
    if bytes == 0 || bytes * 8 > MAX_WIDTH_BITS as u64 {
      return Err(FuseConfigError::new(
        ErrorKind::MalformedRegisterWidth,
        &format!(
          "Unsupported reserved register size ({} bytes), expected 1 to {} bytes.",
          bytes,
          MAX_WIDTH_BITS / 8
        ),
      ));
    }

    let offset = match attribute(node, "_addr") {
      Some(_) => Self::checked_offset(int_attribute(node, "_addr")?, RESERVED_NAME)?,
      None => next_offset,
    };

    Ok(Self::reserved(offset, bytes as u32 * 8))
  }

  /// The number of bytes the register occupies.
  pub fn byte_width(&self) -> u32 {
    self.width / 8
  }

  /// The byte offset just past this register.
  pub fn end_offset(&self) -> u32 {
    self.offset + self.byte_width()
  }

  /// Whether this register is padding.
  pub fn is_reserved(&self) -> bool {
    self.name == RESERVED_NAME
  }

  /// The resolved register value: the factory default with every field's bits replaced by the
  /// field's current value.
  pub fn value(&self) -> u64 {
    let mut value = self.default_value;

    for field in self.fields.iter() {
      let mask = field.mask().checked_shl(field.offset).unwrap_or(0);
      let bits = (field.value() & field.mask())
        .checked_shl(field.offset)
        .unwrap_or(0);
      value = (value & !mask) | bits;
    }

    value & bit_mask(self.width)
  }

  /// The resolved value as little-endian bytes, one per byte of register width.
  pub fn bytes(&self) -> Vec<u8> {
    self.value().to_le_bytes()[..self.byte_width() as usize].to_vec()
  }

  pub fn field(&self, name: &str) -> Option<&FieldSpec> {
    self.fields.iter().find(|f| f.name == name)
  }

  pub fn field_mut(&mut self, name: &str) -> Option<&mut FieldSpec> {
    self.fields.iter_mut().find(|f| f.name == name)
  }

  fn add_fields<Q: DocumentQuery>(
    &mut self,
    doc: &Q,
    options: &LoadOptions,
    node: &Element,
  ) -> FuseConfigResult<()> {
    // Registers without structure are set as a single scalar, e.g. APPEND and BOOTEND.
    if child_elements(node).next().is_none() {
      self
        .fields
        .push(FieldSpec::new(&self.name, self.width, 0, self.default_value));
      return Ok(());
    }

    let mode_path = format!(
      "{}/{}",
      options.qualify("DCRModeList"),
      options.qualify("DCRMode")
    );
    let modes = doc.evaluate(Some(node), &mode_path)?;
    if modes.len() != 1 {
      return Err(FuseConfigError::new(
        ErrorKind::MalformedModeList,
        &format!(
          "Register {}: expected exactly one DCRMode, '{}' nodes found.",
          self.name,
          modes.len()
        ),
      ));
    }

    let mut bit_pos = 0;
    for child in child_elements(modes[0]) {
      let field = match child.name.as_str() {
        "AdjustPoint" => FieldSpec::padding_from_node(child, bit_pos, self.default_value)?,
        _ => FieldSpec::from_node(doc, options, child, bit_pos, self.default_value)?,
      };

      bit_pos += field.width;
      if bit_pos > self.width {
        return Err(FuseConfigError::new(
          ErrorKind::MalformedModeList,
          &format!(
            "Register {}: fields occupy {} bits, more than the register's {}.",
            self.name, bit_pos, self.width
          ),
        ));
      }

      self.fields.push(field);
    }

    if bit_pos < self.width {
      debug!(
        "Register {}: reserving {} unlisted high bits",
        self.name,
        self.width - bit_pos
      );
      self.fields.push(FieldSpec::reserved(
        self.width - bit_pos,
        bit_pos,
        self.default_value,
      ));
    }

    Ok(())
  }

  fn checked_offset(offset: u64, name: &str) -> FuseConfigResult<u32> {
    if offset > u32::MAX as u64 {
      return Err(FuseConfigError::new(
        ErrorKind::MalformedAttribute,
        &format!("Register {}: address 0x{:x} is out of range", name, offset),
      ));
    }
    Ok(offset as u32)
  }
}
impl fmt::Display for RegisterSpec {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    writeln!(
      f,
      "  Reg: {} (offset: 0x{:x} width: 0x{:x} default: 0x{:x})",
      self.name, self.offset, self.width, self.default_value
    )?;
    for field in self.fields.iter() {
      write!(f, "{}", field)?;
    }
    Ok(())
  }
}
