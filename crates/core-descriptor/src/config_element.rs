//! The extension configuration tree. Carried opaquely from the descriptor
//! parser through to extension consumers; this crate never interprets its
//! contents against a schema (that is a concern of the host and, out of
//! scope here, the descriptor parser).

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: Option<String>,
    pub children: Vec<ConfigElement>,
}

impl ConfigElement {
    pub fn root() -> Self {
        Self {
            name: "root".to_string(),
            ..Default::default()
        }
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_child(mut self, child: ConfigElement) -> Self {
        self.children.push(child);
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn child(&self, name: &str) -> Option<&ConfigElement> {
        self.children.iter().find(|c| c.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_lookup() {
        let el = ConfigElement::new("entry").with_attribute("key", "value");
        assert_eq!(el.attribute("key"), Some("value"));
        assert_eq!(el.attribute("missing"), None);
    }

    #[test]
    fn child_lookup() {
        let el = ConfigElement::root().with_child(ConfigElement::new("entry").with_text("v"));
        assert_eq!(el.child("entry").unwrap().text.as_deref(), Some("v"));
        assert!(el.child("missing").is_none());
    }
}
