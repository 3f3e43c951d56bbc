/// Settings that bind descriptor compilation to a particular schema and fuse region.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOptions {
  /// Value of the `regionid` attribute that identifies the fuse region.
  pub region_id: String,

  /// Prefix used for the descriptor schema in path queries.
  pub namespace_prefix: String,

  /// Namespace URI of the descriptor schema.
  pub namespace_uri: String,

  /// Assembler section that receives the emitted fuse bytes.
  pub section_name: String,
}
impl Default for LoadOptions {
  fn default() -> Self {
    Self {
      region_id: "FUSES".to_owned(),
      namespace_prefix: "edc".to_owned(),
      namespace_uri: "http://crownking/edc".to_owned(),
      section_name: ".fuse".to_owned(),
    }
  }
}
impl LoadOptions {
  pub fn with_region_id(mut self, region_id: &str) -> Self {
    self.region_id = region_id.to_owned();
    self
  }

  pub fn with_namespace(mut self, prefix: &str, uri: &str) -> Self {
    self.namespace_prefix = prefix.to_owned();
    self.namespace_uri = uri.to_owned();
    self
  }

  pub fn with_section_name(mut self, section_name: &str) -> Self {
    self.section_name = section_name.to_owned();
    self
  }

  /// Qualifies a local element or attribute name with the schema prefix.
  pub(crate) fn qualify(&self, local_name: &str) -> String {
    format!("{}:{}", self.namespace_prefix, local_name)
  }
}

#[cfg(test)]
mod tests {
  use super::LoadOptions;

  #[test]
  fn defaults_target_edc_fuses() {
    let options = LoadOptions::default();

    assert_eq!("FUSES", options.region_id);
    assert_eq!("edc", options.namespace_prefix);
    assert_eq!("http://crownking/edc", options.namespace_uri);
    assert_eq!("edc:DCRMode", options.qualify("DCRMode"));
  }

  #[test]
  fn builder_overrides() {
    let options = LoadOptions::default()
      .with_region_id("BOOTFUSES")
      .with_namespace("d", "urn:devices")
      .with_section_name(".bootfuse");

    assert_eq!("BOOTFUSES", options.region_id);
    assert_eq!("d:DCRMode", options.qualify("DCRMode"));
    assert_eq!("urn:devices", options.namespace_uri);
    assert_eq!(".bootfuse", options.section_name);
  }
}
