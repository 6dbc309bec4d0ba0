use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Normalize an item code: surrounding whitespace trimmed, upper-cased.
#[inline]
pub fn normalize_item_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// A raw attribute value as read from the item master.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum AttrValue {
    #[default]
    Null,
    Number(f64),
    Text(String),
}

impl AttrValue {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null)
    }

    /// Trimmed text form. Whole numbers render without a fractional part so a
    /// drawing number stored as `1203.0` encodes the same as `"1203"`.
    pub fn as_text(&self) -> Option<String> {
        match self {
            AttrValue::Null => None,
            AttrValue::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
            AttrValue::Number(n) if !n.is_finite() => None,
            AttrValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                Some(format!("{}", *n as i64))
            }
            AttrValue::Number(n) => Some(n.to_string()),
        }
    }

    /// Numeric form; non-numeric text and non-finite numbers are missing.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttrValue::Null => None,
            AttrValue::Number(n) if n.is_finite() => Some(*n),
            AttrValue::Number(_) => None,
            AttrValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        }
    }
}

impl From<f64> for AttrValue {
    fn from(n: f64) -> Self {
        AttrValue::Number(n)
    }
}

impl From<i64> for AttrValue {
    fn from(n: i64) -> Self {
        AttrValue::Number(n as f64)
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Text(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Text(s)
    }
}

/// One item-master row: an item code plus its attribute mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub item_code: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttrValue>,
}

impl ItemRecord {
    #[must_use]
    pub fn new(item_code: &str) -> Self {
        Self {
            item_code: normalize_item_code(item_code),
            attributes: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_attr(mut self, name: &str, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<AttrValue>) {
        self.attributes.insert(name.to_string(), value.into());
    }

    /// Exact-name lookup
    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }

    /// Case-insensitive lookup; returns the stored key with the value
    pub fn get_ci(&self, name: &str) -> Option<(&str, &AttrValue)> {
        if let Some((k, v)) = self.attributes.get_key_value(name) {
            return Some((k.as_str(), v));
        }
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_code_normalized() {
        let item = ItemRecord::new("  ab-100 ");
        assert_eq!(item.item_code, "AB-100");
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let item = ItemRecord::new("A").with_attr("OutDiameter", 10.0);
        let (key, value) = item.get_ci("OUTDIAMETER").unwrap();
        assert_eq!(key, "OutDiameter");
        assert_eq!(value.as_number(), Some(10.0));
    }

    #[test]
    fn test_numeric_coercion() {
        assert_eq!(AttrValue::from(" 12.5 ").as_number(), Some(12.5));
        assert_eq!(AttrValue::from("n/a").as_number(), None);
        assert_eq!(AttrValue::Number(f64::NAN).as_number(), None);
        assert_eq!(AttrValue::Null.as_number(), None);
    }

    #[test]
    fn test_text_form() {
        assert_eq!(AttrValue::from("  STS ").as_text(), Some("STS".to_string()));
        assert_eq!(AttrValue::from("   ").as_text(), None);
        assert_eq!(AttrValue::Number(1203.0).as_text(), Some("1203".to_string()));
        assert_eq!(AttrValue::Number(2.5).as_text(), Some("2.5".to_string()));
    }

    #[test]
    fn test_serde_untagged() {
        let item: ItemRecord = serde_json::from_str(
            r#"{"item_code":"A","attributes":{"d":10,"mat":"STS","x":null}}"#,
        )
        .unwrap();
        assert_eq!(item.get("d"), Some(&AttrValue::Number(10.0)));
        assert_eq!(item.get("mat"), Some(&AttrValue::Text("STS".into())));
        assert_eq!(item.get("x"), Some(&AttrValue::Null));
    }
}
