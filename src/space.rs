use std::fmt;

use log::debug;
use xmltree::Element;

use super::{field::FieldSpec, register::RegisterSpec};
use crate::{
  error::{ErrorKind, FuseConfigError, FuseConfigResult},
  query::{child_elements, int_attribute, DocumentQuery},
  LoadOptions,
};

/// The largest fuse region the compiler accepts, in bytes.
pub const MAX_REGION_BYTES: u64 = 0x1_0000;

/// Describes a region of device memory that holds configuration registers.
#[derive(Debug, Clone, PartialEq)]
pub struct AddressSpaceSpec {
  referenced: bool,

  /// The region identifier, e.g. `FUSES`.
  pub name: String,

  /// The region's begin address as declared by the descriptor.
  pub address: u32,

  /// The size of the region in bytes.
  pub width: u32,

  /// The registers of the region in address order, padding included. Their byte widths add up
  /// to `width`.
  pub registers: Vec<RegisterSpec>,
}
impl AddressSpaceSpec {
  pub fn new(name: &str, address: u32, width: u32) -> Self {
    Self {
      referenced: false,
      name: name.to_owned(),
      address,
      width,
      registers: Vec::new(),
    }
  }

  /// Compiles the single `ConfigFuseSector` whose `regionid` is `options.region_id`.
  pub fn from_document<Q: DocumentQuery>(
    doc: &Q,
    options: &LoadOptions,
  ) -> FuseConfigResult<Self> {
    let path = format!(
      "//{}[@{}='{}']",
      options.qualify("ConfigFuseSector"),
      options.qualify("regionid"),
      options.region_id
    );
    let sectors = doc.evaluate(None, &path)?;

    if sectors.len() != 1 {
      return Err(FuseConfigError::new(
        ErrorKind::AmbiguousOrMissingRegion,
        &format!(
          "No unique {} region in ConfigFuseSector, '{}' nodes found.",
          options.region_id,
          sectors.len()
        ),
      ));
    }

    let sector = sectors[0];
    let begin = int_attribute(sector, "beginaddr")?;
    let end = int_attribute(sector, "endaddr")?;
    if end < begin || begin > u32::MAX as u64 {
      return Err(FuseConfigError::new(
        ErrorKind::MalformedAttribute,
        &format!(
          "Region {}: invalid address range 0x{:x}..0x{:x}",
          options.region_id, begin, end
        ),
      ));
    }
    if end - begin > MAX_REGION_BYTES {
      return Err(FuseConfigError::new(
        ErrorKind::MalformedAttribute,
        &format!(
          "Region {}: {} bytes exceeds the supported {} bytes",
          options.region_id,
          end - begin,
          MAX_REGION_BYTES
        ),
      ));
    }

    let mut space = Self::new(&options.region_id, begin as u32, (end - begin) as u32);
    debug!(
      "Region {} at 0x{:x}: {} bytes",
      space.name, space.address, space.width
    );

    space.add_registers(doc, options, sector)?;
    Ok(space)
  }

  /// Whether any field in this space has been set.
  pub fn is_referenced(&self) -> bool {
    self.referenced
  }

  pub(crate) fn mark_referenced(&mut self) {
    self.referenced = true;
  }

  /// The resolved bytes of the whole space, in register order.
  pub fn image(&self) -> Vec<u8> {
    self.registers.iter().flat_map(|r| r.bytes()).collect()
  }

  pub fn register(&self, name: &str) -> Option<&RegisterSpec> {
    self.registers.iter().find(|r| r.name == name)
  }

  /// Iterates the fields of every register, in register order.
  pub fn iter_fields(&self) -> impl Iterator<Item = &FieldSpec> {
    self.registers.iter().flat_map(|r| r.fields.iter())
  }

  /// The first field named `name` in register order.
  pub(crate) fn field_mut(&mut self, name: &str) -> Option<&mut FieldSpec> {
    self.registers.iter_mut().find_map(|r| r.field_mut(name))
  }

  fn add_registers<Q: DocumentQuery>(
    &mut self,
    doc: &Q,
    options: &LoadOptions,
    sector: &Element,
  ) -> FuseConfigResult<()> {
    let mut bytes_consumed = 0u32;

    for node in child_elements(sector) {
      let next_offset = self.next_offset();
      let register = match node.name.as_str() {
        "AdjustPoint" => RegisterSpec::padding_from_node(node, next_offset)?,
        _ => RegisterSpec::from_node(doc, options, node)?,
      };

      if let Some(previous) = self.registers.last() {
        if register.offset < previous.offset {
          return Err(FuseConfigError::new(
            ErrorKind::MalformedAttribute,
            &format!(
              "Register {} at offset 0x{:x} precedes register {} at 0x{:x}",
              register.name, register.offset, previous.name, previous.offset
            ),
          ));
        }
      }

      bytes_consumed += register.byte_width();
      if bytes_consumed > self.width {
        return Err(FuseConfigError::new(
          ErrorKind::MalformedRegisterWidth,
          &format!(
            "Region {}: registers occupy {} bytes, more than the region's {}.",
            self.name, bytes_consumed, self.width
          ),
        ));
      }

      self.registers.push(register);
    }

    // Descriptors may leave out reserved bytes at the end of the region.
    while bytes_consumed < self.width {
      let offset = self.next_offset();
      debug!(
        "Region {}: synthesizing reserved byte at offset 0x{:x}",
        self.name, offset
      );
      self.registers.push(RegisterSpec::reserved(offset, 8));
      bytes_consumed += 1;
    }

    Ok(())
  }

  fn next_offset(&self) -> u32 {
    match self.registers.last() {
      Some(r) => r.end_offset(),
      None => 0,
    }
  }
}
impl fmt::Display for AddressSpaceSpec {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    writeln!(f, "Space: {} (0x{:x}, {})", self.name, self.address, self.width)?;
    for register in self.registers.iter() {
      write!(f, "{}", register)?;
    }
    Ok(())
  }
}
