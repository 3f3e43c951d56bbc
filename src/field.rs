use std::fmt;

use log::warn;
use xmltree::Element;

use crate::{
  bit_mask,
  error::{ErrorKind, FuseConfigError, FuseConfigResult},
  query::{int_attribute, required_attribute, DocumentQuery},
  value::{ReferenceValueSpec, SettingValue},
  LoadOptions, MAX_WIDTH_BITS, RESERVED_NAME,
};

/// Describes a named range of bits within a configuration register, or a reserved range that
/// only keeps its neighbours aligned.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
  modified: bool,
  user_value: u64,

  /// The setting name, or `reserved` for padding.
  pub name: String,

  /// The bit width of the field.
  pub width: u32,

  /// The position of the least-significant bit of this field within its register.
  pub offset: u32,

  /// The field's bits of the register's factory default, shifted down to bit 0.
  pub default_value: u64,

  /// Whether settings may assign this field. Reserved fields are never editable.
  pub editable: bool,

  /// The symbolic values the field accepts, in descriptor order. When empty, any number that
  /// fits in the field is accepted instead.
  pub reference_values: Vec<ReferenceValueSpec>,
}
impl FieldSpec {
  pub fn new(name: &str, width: u32, offset: u32, register_default: u64) -> Self {
    let mut field = Self {
      modified: false,
      user_value: 0,
      name: name.to_owned(),
      width,
      offset,
      default_value: 0,
      editable: true,
      reference_values: Vec::new(),
    };
    field.set_default_value(register_default);
    field
  }

  /// A padding field. It keeps the register default's bits and cannot be set.
  pub fn reserved(width: u32, offset: u32, register_default: u64) -> Self {
    let mut field = Self::new(RESERVED_NAME, width, offset, register_default);
    field.editable = false;
    field
  }

  /// Builds a field from a `DCRFieldDef` node, collecting its `DCRFieldSemantic` children as
  /// reference values.
  pub(crate) fn from_node<Q: DocumentQuery>(
    doc: &Q,
    options: &LoadOptions,
    node: &Element,
    offset: u32,
    register_default: u64,
  ) -> FuseConfigResult<Self> {
    let name = required_attribute(node, "cname")?;
    let width = Self::checked_width(int_attribute(node, "nzwidth")?, name)?;

    let mut field = Self::new(name, width, offset, register_default);

    for semantic in doc.evaluate(Some(node), &options.qualify("DCRFieldSemantic"))? {
      field.add_reference_value(ReferenceValueSpec::from_node(semantic, name)?);
    }

    Ok(field)
  }

  /// Builds a padding field from an `AdjustPoint` node within a mode list, whose `offset`
  /// attribute counts bits.
  pub(crate) fn padding_from_node(
    node: &Element,
    offset: u32,
    register_default: u64,
  ) -> FuseConfigResult<Self> {
    let width = Self::checked_width(int_attribute(node, "offset")?, RESERVED_NAME)?;
    Ok(Self::reserved(width, offset, register_default))
  }

  /// Appends a reference value. Duplicates are kept; lookups use the first match.
  pub fn add_reference_value(&mut self, reference_value: ReferenceValueSpec) {
    if self
      .reference_values
      .iter()
      .any(|rv| rv.name == reference_value.name)
    {
      warn!(
        "Field {} lists reference value {} more than once",
        self.name, reference_value.name
      );
    }
    self.reference_values.push(reference_value);
  }

  /// All-ones mask for the field's width, at bit 0.
  pub fn mask(&self) -> u64 {
    bit_mask(self.width)
  }

  /// Whether a setting has assigned this field.
  pub fn is_modified(&self) -> bool {
    self.modified
  }

  /// The value the field contributes to its register: the assigned value if any, otherwise the
  /// default.
  pub fn value(&self) -> u64 {
    match self.modified {
      true => self.user_value,
      false => self.default_value,
    }
  }

  /// Resolves `text` against the field and records the result.
  ///
  /// A field can be assigned only once. Text made only of decimal digits is taken as a number;
  /// anything else must name one of the reference values. When the field has reference values,
  /// numbers must equal one of their encodings; otherwise numbers must fit the field's mask.
  pub fn set_value(&mut self, text: &str) -> FuseConfigResult<u64> {
    if !self.editable {
      return Err(FuseConfigError::new(
        ErrorKind::NotWritable,
        &format!("configuration setting '{}' is not writable", self.name),
      ));
    }

    if self.modified {
      return Err(FuseConfigError::new(
        ErrorKind::AlreadySet,
        &format!("multiple definition for configuration setting '{}'", self.name),
      ));
    }

    let candidate = SettingValue::classify(text);
    let resolved = match (self.reference_values.is_empty(), candidate) {
      (true, SettingValue::Number(n)) if n <= self.mask() => Some(n),
      (true, _) => None,
      (false, _) => self.find_reference_value(candidate),
    };

    match resolved {
      Some(value) => {
        self.user_value = value;
        self.modified = true;
        Ok(value)
      }
      None => Err(FuseConfigError::new(
        ErrorKind::InvalidValue,
        &format!("unknown value for configuration '{}': '{}'", self.name, text),
      )),
    }
  }

  fn find_reference_value(&self, candidate: SettingValue) -> Option<u64> {
    self
      .reference_values
      .iter()
      .find(|rv| match candidate {
        SettingValue::Number(n) => rv.value == n,
        SettingValue::Symbol(s) => rv.name == s,
        SettingValue::Overflow => false,
      })
      .map(|rv| rv.value)
  }

  fn set_default_value(&mut self, register_default: u64) {
    self.default_value = match self.offset {
      o if o >= MAX_WIDTH_BITS => 0,
      o => (register_default >> o) & self.mask(),
    };
  }

  fn checked_width(width: u64, name: &str) -> FuseConfigResult<u32> {
    if width > MAX_WIDTH_BITS as u64 {
      return Err(FuseConfigError::new(
        ErrorKind::MalformedModeList,
        &format!(
          "Field {}: width {} exceeds the supported {} bits",
          name, width, MAX_WIDTH_BITS
        ),
      ));
    }
    Ok(width as u32)
  }
}
impl fmt::Display for FieldSpec {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    writeln!(
      f,
      "    config: {} {} bits offset: {} default: 0x{:x}",
      self.name, self.width, self.offset, self.default_value
    )?;
    for rv in self.reference_values.iter() {
      writeln!(f, "      {}", rv)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::FieldSpec;
  use crate::value::SettingValue;
  use crate::{DocumentQuery, ErrorKind, LoadOptions, ReferenceValueSpec, XmlDocument};

  fn field_from_xml(xml: &str, offset: u32, register_default: u64) -> FieldSpec {
    let mut doc = XmlDocument::parse(xml.as_bytes()).unwrap();
    doc.register_namespace("edc", "http://crownking/edc");
    let options = LoadOptions::default();
    let node = doc.evaluate(None, "/edc:DCRFieldDef").unwrap()[0];
    FieldSpec::from_node(&doc, &options, node, offset, register_default).unwrap()
  }

  fn sut() -> FieldSpec {
    field_from_xml(
      r##"
      <edc:DCRFieldDef xmlns:edc="http://crownking/edc" edc:cname="SUT" edc:nzwidth="2">
        <edc:DCRFieldSemantic edc:cname="0" edc:when="($0000 &amp; 0x30) == 0x0"/>
        <edc:DCRFieldSemantic edc:cname="1" edc:when="($0000 &amp; 0x30) == 0x1"/>
        <edc:DCRFieldSemantic edc:cname="2" edc:when="($0000 &amp; 0x30) == 0x2"/>
      </edc:DCRFieldDef>
      "##,
      4,
      0x62,
    )
  }

  #[test]
  fn can_create_from_xml() {
    let fs = sut();

    assert_eq!("SUT", fs.name);
    assert_eq!(2, fs.width);
    assert_eq!(4, fs.offset);
    assert_eq!(0b11, fs.mask());
    assert_eq!(2, fs.default_value);
    assert!(fs.editable);
    assert!(!fs.is_modified());
    assert_eq!(
      vec![
        ReferenceValueSpec::new("SUT_0", 0),
        ReferenceValueSpec::new("SUT_1", 1),
        ReferenceValueSpec::new("SUT_2", 2),
      ],
      fs.reference_values
    );
  }

  #[test]
  fn derives_default_from_register_default() {
    for offset in 0..8 {
      let fs = FieldSpec::new("F", 2, offset, 0xA5);
      assert_eq!((0xA5 >> offset) & 0b11, fs.default_value);
      assert!(fs.default_value <= fs.mask());
    }
  }

  #[test]
  fn padding_is_not_editable() {
    let mut fs = FieldSpec::reserved(3, 5, 0xFF);

    assert_eq!("reserved", fs.name);
    assert_eq!(0b111, fs.default_value);
    assert_eq!(
      ErrorKind::NotWritable,
      fs.set_value("0").unwrap_err().kind
    );
  }

  #[test]
  fn sets_symbolic_and_numeric_reference_values() {
    let mut by_name = sut();
    assert_eq!(1, by_name.set_value("SUT_1").unwrap());
    assert!(by_name.is_modified());
    assert_eq!(1, by_name.value());

    let mut by_number = sut();
    assert_eq!(0, by_number.set_value("0").unwrap());
    assert_eq!(0, by_number.value());
  }

  #[test]
  fn rejects_values_outside_reference_table() {
    let mut fs = sut();

    assert_eq!(ErrorKind::InvalidValue, fs.set_value("3").unwrap_err().kind);
    assert_eq!(ErrorKind::InvalidValue, fs.set_value("SUT_9").unwrap_err().kind);
    assert_eq!(ErrorKind::InvalidValue, fs.set_value("sut_1").unwrap_err().kind);
    assert!(!fs.is_modified());
    assert_eq!(2, fs.set_value("2").unwrap());
  }

  #[test]
  fn numeric_field_is_bounded_by_mask() {
    let mut too_big = FieldSpec::new("CKSEL", 4, 0, 0x62);
    assert_eq!(
      ErrorKind::InvalidValue,
      too_big.set_value("16").unwrap_err().kind
    );
    assert!(!too_big.is_modified());
    assert_eq!(2, too_big.value());

    let mut at_mask = FieldSpec::new("CKSEL", 4, 0, 0x62);
    assert_eq!(15, at_mask.set_value("15").unwrap());

    let mut symbolic = FieldSpec::new("CKSEL", 4, 0, 0x62);
    assert_eq!(
      ErrorKind::InvalidValue,
      symbolic.set_value("FAST").unwrap_err().kind
    );
    assert_eq!(
      ErrorKind::InvalidValue,
      symbolic.set_value("0x3").unwrap_err().kind
    );
  }

  #[test]
  fn can_only_be_set_once() {
    let mut fs = sut();

    fs.set_value("SUT_2").unwrap();
    let err = fs.set_value("SUT_2").unwrap_err();

    assert_eq!(ErrorKind::AlreadySet, err.kind);
    assert!(err.details.contains("SUT"));
    assert_eq!(2, fs.value());
  }

  #[test]
  fn first_duplicate_reference_value_wins() {
    let mut fs = FieldSpec::new("BODLEVEL", 3, 0, 0xFF);
    fs.add_reference_value(ReferenceValueSpec::new("BODLEVEL_OFF", 7));
    fs.add_reference_value(ReferenceValueSpec::new("BODLEVEL_OFF", 6));

    assert_eq!(7, fs.set_value("BODLEVEL_OFF").unwrap());
  }

  #[test]
  fn first_reference_value_with_same_encoding_wins() {
    let mut fs = FieldSpec::new("BODLEVEL", 3, 0, 0xFF);
    fs.add_reference_value(ReferenceValueSpec::new("BODLEVEL_1V8", 6));
    fs.add_reference_value(ReferenceValueSpec::new("BODLEVEL_DEFAULT", 6));
    fs.add_reference_value(ReferenceValueSpec::new("BODLEVEL_OFF", 7));

    assert_eq!(Some(6), fs.find_reference_value(SettingValue::Number(6)));
    assert_eq!(6, fs.set_value("6").unwrap());
    assert_eq!(6, fs.value());
    assert!(fs.is_modified());
  }

  #[test]
  fn rejects_oversized_width() {
    let mut doc = XmlDocument::parse(
      r##"<edc:DCRFieldDef xmlns:edc="http://crownking/edc" edc:cname="BIG" edc:nzwidth="65"/>"##
        .as_bytes(),
    )
    .unwrap();
    doc.register_namespace("edc", "http://crownking/edc");
    let node = doc.evaluate(None, "/edc:DCRFieldDef").unwrap()[0];

    let err = FieldSpec::from_node(&doc, &LoadOptions::default(), node, 0, 0).unwrap_err();

    assert_eq!(ErrorKind::MalformedModeList, err.kind);
  }

  #[test]
  fn displays_field_and_reference_values() {
    assert_eq!(
      "    config: SUT 2 bits offset: 4 default: 0x2\n      (SUT_0, 0x0)\n      (SUT_1, 0x1)\n      (SUT_2, 0x2)\n",
      sut().to_string()
    );
  }
}
