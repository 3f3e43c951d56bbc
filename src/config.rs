use std::{
  fmt,
  io::Write,
  path::{Path, PathBuf},
};

use log::{info, warn};

use crate::{
  emit,
  error::{ErrorKind, FuseConfigError, FuseConfigResult},
  query::{DocumentQuery, XmlDocument},
  AddressSpaceSpec, FieldSpec, LoadOptions, RegisterSpec,
};

/// A configuration session: the compiled fuse model of one device, and the settings applied to
/// it so far.
///
/// A session is loaded once, then receives settings one at a time. Each field accepts a single
/// setting per session.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
  options: LoadOptions,
  config_file: Option<PathBuf>,
  loaded: bool,
  changed: bool,
  spaces: Vec<AddressSpaceSpec>,
}
impl DeviceConfig {
  pub fn new(options: LoadOptions) -> Self {
    Self {
      options,
      config_file: None,
      loaded: false,
      changed: false,
      spaces: Vec::new(),
    }
  }

  /// Loads and compiles the descriptor at `path`.
  ///
  /// On failure the session holds no model and every later setting is rejected.
  pub fn load_configurations<P: AsRef<Path>>(&mut self, path: P) -> FuseConfigResult<()> {
    self.reset();

    let path = path.as_ref();
    if path.as_os_str().is_empty() {
      return Err(FuseConfigError::new(
        ErrorKind::DocumentLoadFailure,
        "No device descriptor file given.",
      ));
    }

    let mut doc = XmlDocument::load(path)?;
    doc.register_namespace(&self.options.namespace_prefix, &self.options.namespace_uri);
    self.load_document(&doc)?;

    self.config_file = Some(path.to_owned());
    info!(
      "Loaded configuration fuses of {} from {}",
      self.options.region_id,
      path.display()
    );
    Ok(())
  }

  /// Compiles an already-parsed descriptor. Its namespace prefixes must already be bound.
  pub fn load_document<Q: DocumentQuery>(&mut self, doc: &Q) -> FuseConfigResult<()> {
    self.reset();

    let space = AddressSpaceSpec::from_document(doc, &self.options)?;
    self.spaces.push(space);
    self.loaded = true;
    Ok(())
  }

  /// Resolves `value` for the setting `name` and records it.
  pub fn set_config(&mut self, name: &str, value: &str) -> FuseConfigResult<()> {
    if !self.loaded {
      return Err(FuseConfigError::new(
        ErrorKind::ConfigurationsNotLoaded,
        &format!(
          "configuration setting '{}' given before device configurations were loaded",
          name
        ),
      ));
    }

    for space in self.spaces.iter_mut() {
      let field = match space.field_mut(name) {
        Some(f) => f,
        None => continue,
      };

      return match field.set_value(value) {
        Ok(resolved) => {
          space.mark_referenced();
          self.changed = true;
          info!("Configuration {} = {} (0x{:x})", name, value, resolved);
          Ok(())
        }
        Err(err) => {
          warn!("Rejected configuration {} = {}: {}", name, value, err);
          Err(err)
        }
      };
    }

    let err = FuseConfigError::new(
      ErrorKind::UnknownSetting,
      &format!("unknown configuration setting: '{}'", name),
    );
    warn!("{}", err);
    Err(err)
  }

  pub fn options(&self) -> &LoadOptions {
    &self.options
  }

  /// The descriptor the model was loaded from, if it came from a file.
  pub fn config_file(&self) -> Option<&Path> {
    self.config_file.as_deref()
  }

  pub fn is_loaded(&self) -> bool {
    self.loaded
  }

  /// Whether any setting has been applied.
  pub fn is_changed(&self) -> bool {
    self.changed
  }

  pub fn spaces(&self) -> &[AddressSpaceSpec] {
    &self.spaces
  }

  pub fn space(&self, name: &str) -> Option<&AddressSpaceSpec> {
    self.spaces.iter().find(|s| s.name == name)
  }

  pub fn register(&self, name: &str) -> Option<&RegisterSpec> {
    self.spaces.iter().find_map(|s| s.register(name))
  }

  pub fn field(&self, name: &str) -> Option<&FieldSpec> {
    self
      .spaces
      .iter()
      .flat_map(|s| s.iter_fields())
      .find(|f| f.name == name)
  }

  /// The resolved bytes of the space named `name`.
  pub fn image(&self, name: &str) -> Option<Vec<u8>> {
    self.space(name).map(|s| s.image())
  }

  /// Writes assembler data for every space that received a setting.
  pub fn write_assembly<W: Write>(&self, mut w: W) -> FuseConfigResult<()> {
    for space in self.spaces.iter().filter(|s| s.is_referenced()) {
      emit::write_space(&mut w, space, &self.options.section_name)?;
    }
    Ok(())
  }

  fn reset(&mut self) {
    self.config_file = None;
    self.loaded = false;
    self.changed = false;
    self.spaces.clear();
  }
}
impl Default for DeviceConfig {
  fn default() -> Self {
    Self::new(LoadOptions::default())
  }
}
impl fmt::Display for DeviceConfig {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    for space in self.spaces.iter() {
      write!(f, "{}", space)?;
    }
    Ok(())
  }
}
