use std::{collections::HashMap, fmt};

/// Secrets passed along with a request. Values never show up in debug
/// output.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secrets(HashMap<String, String>);

impl Secrets {
  #[inline]
  pub fn get(&self, key: &str) -> Option<&str> {
    self.0.get(key).map(|v| &**v)
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

impl AsRef<HashMap<String, String>> for Secrets {
  #[inline]
  fn as_ref(&self) -> &HashMap<String, String> {
    &self.0
  }
}

impl From<HashMap<String, String>> for Secrets {
  #[inline]
  fn from(v: HashMap<String, String>) -> Self {
    Secrets(v)
  }
}

impl From<Secrets> for HashMap<String, String> {
  #[inline]
  fn from(v: Secrets) -> Self {
    v.0
  }
}

impl fmt::Debug for Secrets {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut m = f.debug_map();
    for k in self.0.keys() {
      m.key(k).value(&"SECRET");
    }

    m.finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn debug_hides_values() {
    let mut map = HashMap::new();
    map.insert("luksKey".to_owned(), "hunter2".to_owned());
    let secrets = Secrets::from(map);

    let debug = format!("{:?}", secrets);
    assert!(debug.contains("luksKey"));
    assert!(debug.contains("SECRET"));
    assert!(!debug.contains("hunter2"));
    assert_eq!(secrets.get("luksKey"), Some("hunter2"));
  }
}
