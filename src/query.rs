use std::{collections::HashMap, fs::File, io::BufReader, io::Read, path::Path};

use anyhow::{anyhow, bail};
use log::debug;
use regex::Regex;
use xmltree::{Element, XMLNode};

use crate::{
  error::{ErrorKind, FuseConfigError, FuseConfigResult},
  parse_int,
};

/// Evaluates path expressions against a structured document.
///
/// A query is evaluated from `root` when one is given, or from the document itself otherwise.
/// The returned node set borrows from the document and is released when dropped.
pub trait DocumentQuery {
  fn evaluate<'a>(
    &'a self,
    root: Option<&'a Element>,
    path: &str,
  ) -> FuseConfigResult<Vec<&'a Element>>;
}

/// An XML document loaded into memory, with the namespace prefixes that queries may use.
#[derive(Debug)]
pub struct XmlDocument {
  root: Element,
  namespaces: HashMap<String, String>,
  parser: QueryParser,
}
impl XmlDocument {
  /// Reads and parses the document at `path`.
  pub fn load<P: AsRef<Path>>(path: P) -> FuseConfigResult<Self> {
    let file = File::open(path.as_ref())?;
    debug!("Parsing descriptor {}", path.as_ref().display());
    Self::parse(BufReader::new(file))
  }

  pub fn parse<R: Read>(reader: R) -> FuseConfigResult<Self> {
    Ok(Self {
      root: Element::parse(reader)?,
      namespaces: HashMap::new(),
      parser: QueryParser::new()?,
    })
  }

  /// Binds `prefix` to `uri` for use in name tests.
  pub fn register_namespace(&mut self, prefix: &str, uri: &str) {
    self.namespaces.insert(prefix.to_owned(), uri.to_owned());
  }

  /// The document element.
  pub fn root(&self) -> &Element {
    &self.root
  }

  fn candidates<'a>(
    &'a self,
    context: Option<&'a Element>,
    axis: Axis,
    out: &mut Vec<&'a Element>,
  ) {
    match (context, axis) {
      (None, Axis::Child) => out.push(&self.root),
      (None, Axis::Descendant) => {
        out.push(&self.root);
        collect_descendants(&self.root, out);
      }
      (Some(el), Axis::Child) => out.extend(child_elements(el)),
      (Some(el), Axis::Descendant) => collect_descendants(el, out),
    }
  }
}
impl DocumentQuery for XmlDocument {
  fn evaluate<'a>(
    &'a self,
    root: Option<&'a Element>,
    path: &str,
  ) -> FuseConfigResult<Vec<&'a Element>> {
    let query = self.parser.parse(path, &self.namespaces).map_err(|e| {
      FuseConfigError::new(
        ErrorKind::QueryFailure,
        &format!("Unable to evaluate path expression \"{}\": {:#}", path, e),
      )
    })?;

    let mut contexts: Vec<Option<&'a Element>> = vec![match query.absolute {
      true => None,
      false => root,
    }];

    for step in query.steps.iter() {
      let mut selected: Vec<&'a Element> = Vec::new();
      let mut candidates = Vec::new();

      for context in contexts.iter() {
        candidates.clear();
        self.candidates(*context, step.axis, &mut candidates);

        for el in candidates.iter() {
          if step.matches(el) && !selected.iter().any(|s| std::ptr::eq(*s, *el)) {
            selected.push(*el);
          }
        }
      }

      contexts = selected.into_iter().map(Some).collect();
    }

    Ok(contexts.into_iter().flatten().collect())
  }
}

/// Iterates the element children of `el` in document order, skipping text and comments.
pub(crate) fn child_elements(el: &Element) -> impl Iterator<Item = &Element> {
  el.children.iter().filter_map(|n| match n {
    XMLNode::Element(ref child) => Some(child),
    _ => None,
  })
}

/// Looks up an attribute by its local name.
pub(crate) fn attribute<'a>(el: &'a Element, name: &str) -> Option<&'a str> {
  el.attributes.get(name).map(|v| v.as_str())
}

/// Looks up an attribute that the descriptor schema requires.
pub(crate) fn required_attribute<'a>(el: &'a Element, name: &str) -> FuseConfigResult<&'a str> {
  attribute(el, name).ok_or_else(|| {
    FuseConfigError::new(
      ErrorKind::MalformedAttribute,
      &format!("<{}> is missing the '{}' attribute", el.name, name),
    )
  })
}

/// Reads a required attribute as an integer literal.
pub(crate) fn int_attribute(el: &Element, name: &str) -> FuseConfigResult<u64> {
  parse_int(required_attribute(el, name)?).map_err(|e| {
    FuseConfigError::new(
      ErrorKind::MalformedAttribute,
      &format!("<{}> attribute '{}': {:#}", el.name, name, e),
    )
  })
}

fn collect_descendants<'a>(el: &'a Element, out: &mut Vec<&'a Element>) {
  for child in child_elements(el) {
    out.push(child);
    collect_descendants(child, out);
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Axis {
  Child,
  Descendant,
}

#[derive(Debug, Clone, PartialEq)]
enum NameTest {
  Any,
  Named {
    namespace: Option<String>,
    local_name: String,
  },
}

#[derive(Debug, Clone, PartialEq)]
struct Predicate {
  attribute: String,
  value: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
struct Step {
  axis: Axis,
  name: NameTest,
  predicates: Vec<Predicate>,
}
impl Step {
  fn matches(&self, el: &Element) -> bool {
    let name_matches = match self.name {
      NameTest::Any => true,
      NameTest::Named {
        ref namespace,
        ref local_name,
      } => el.name == *local_name && el.namespace == *namespace,
    };

    name_matches
      && self
        .predicates
        .iter()
        .all(|p| match (attribute(el, &p.attribute), &p.value) {
          (Some(actual), Some(expected)) => actual == expected,
          (Some(_), None) => true,
          (None, _) => false,
        })
  }
}

#[derive(Debug, Clone, PartialEq)]
struct PathQuery {
  absolute: bool,
  steps: Vec<Step>,
}

#[derive(Debug)]
struct QueryParser {
  name_test: Regex,
  predicate: Regex,
}
impl QueryParser {
  fn new() -> FuseConfigResult<Self> {
    Ok(Self {
      name_test: Regex::new(r"^(?:([A-Za-z_][\w.-]*):)?([A-Za-z_][\w.-]*|\*)$")?,
      predicate: Regex::new(
        r#"^@(?:[A-Za-z_][\w.-]*:)?([A-Za-z_][\w.-]*)\s*(?:=\s*(?:'([^']*)'|"([^"]*)"))?$"#,
      )?,
    })
  }

  fn parse(&self, path: &str, namespaces: &HashMap<String, String>) -> anyhow::Result<PathQuery> {
    let path = path.trim();
    let steps = split_steps(path)?
      .into_iter()
      .map(|(axis, text)| self.parse_step(axis, &text, namespaces))
      .collect::<anyhow::Result<Vec<Step>>>()?;

    Ok(PathQuery {
      absolute: path.starts_with('/'),
      steps,
    })
  }

  fn parse_step(
    &self,
    axis: Axis,
    text: &str,
    namespaces: &HashMap<String, String>,
  ) -> anyhow::Result<Step> {
    let (name_text, mut rest) = match text.find('[') {
      Some(pos) => (text[..pos].trim(), &text[pos..]),
      None => (text.trim(), ""),
    };

    let caps = self
      .name_test
      .captures(name_text)
      .ok_or_else(|| anyhow!("invalid name test '{}'", name_text))?;

    let local_name = &caps[2];
    let name = match (caps.get(1), local_name) {
      (None, "*") => NameTest::Any,
      (Some(prefix), "*") => bail!("namespace wildcard '{}:*' is not supported", prefix.as_str()),
      (Some(prefix), _) => NameTest::Named {
        namespace: Some(
          namespaces
            .get(prefix.as_str())
            .cloned()
            .ok_or_else(|| anyhow!("namespace prefix '{}' is not bound", prefix.as_str()))?,
        ),
        local_name: local_name.to_owned(),
      },
      (None, _) => NameTest::Named {
        namespace: None,
        local_name: local_name.to_owned(),
      },
    };

    let mut predicates = Vec::new();
    while !rest.is_empty() {
      let close = closing_bracket(rest)
        .ok_or_else(|| anyhow!("unterminated predicate in step '{}'", text))?;
      let body = rest[1..close].trim();
      let caps = self
        .predicate
        .captures(body)
        .ok_or_else(|| anyhow!("unsupported predicate '[{}]'", body))?;

      predicates.push(Predicate {
        attribute: caps[1].to_owned(),
        value: caps.get(2).or_else(|| caps.get(3)).map(|m| m.as_str().to_owned()),
      });
      rest = rest[close + 1..].trim_start();
    }

    Ok(Step {
      axis,
      name,
      predicates,
    })
  }
}

/// Splits a path into its steps, pairing each with the axis given by the slashes before it.
fn split_steps(path: &str) -> anyhow::Result<Vec<(Axis, String)>> {
  let mut steps = Vec::new();
  let mut current = String::new();
  let mut axis = Axis::Child;
  let mut slashes = 0;
  let mut depth = 0;
  let mut quote: Option<char> = None;

  for c in path.chars() {
    if let Some(q) = quote {
      current.push(c);
      if c == q {
        quote = None;
      }
      continue;
    }

    match c {
      '\'' | '"' if depth > 0 => {
        quote = Some(c);
        current.push(c);
      }
      '[' => {
        depth += 1;
        current.push(c);
      }
      ']' => {
        if depth == 0 {
          bail!("unbalanced ']'");
        }
        depth -= 1;
        current.push(c);
      }
      '/' if depth == 0 => {
        if !current.trim().is_empty() {
          steps.push((axis, current.trim().to_owned()));
          current.clear();
          slashes = 0;
        }
        slashes += 1;
        if slashes > 2 {
          bail!("too many consecutive '/'");
        }
        axis = match slashes {
          2 => Axis::Descendant,
          _ => Axis::Child,
        };
      }
      _ => current.push(c),
    }
  }

  if quote.is_some() || depth != 0 {
    bail!("unterminated predicate");
  }
  if current.trim().is_empty() {
    bail!("expression does not end with a step");
  }
  steps.push((axis, current.trim().to_owned()));

  Ok(steps)
}

/// Index of the `]` that closes the `[` at the start of `text`, skipping quoted values.
fn closing_bracket(text: &str) -> Option<usize> {
  if !text.starts_with('[') {
    return None;
  }

  let mut quote: Option<char> = None;
  for (i, c) in text.char_indices().skip(1) {
    match (quote, c) {
      (Some(q), c) if c == q => quote = None,
      (Some(_), _) => {}
      (None, '\'') | (None, '"') => quote = Some(c),
      (None, ']') => return Some(i),
      (None, _) => {}
    }
  }
  None
}
