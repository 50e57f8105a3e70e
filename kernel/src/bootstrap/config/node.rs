use serde_json::{Map, Value};

/// Typed, validating view over one mapping of the parsed configuration tree.
///
/// Keys match case-insensitively and ignore underscores, so `time_zone`,
/// `timeZone` and `timezone` all address the same prop.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Node<'a> {
    map: &'a Map<String, Value>,
}

fn normalise(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "double",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl<'a> Node<'a> {
    pub(crate) fn new(map: &'a Map<String, Value>) -> Self {
        Self { map }
    }

    pub(crate) fn from_value(value: &'a Value) -> Option<Self> {
        value.as_object().map(Self::new)
    }

    pub(crate) fn get(&self, prop: &str) -> Option<&'a Value> {
        let wanted = normalise(prop);
        self.map
            .iter()
            .find(|(k, _)| normalise(k) == wanted)
            .map(|(_, v)| v)
            .filter(|v| !v.is_null())
    }

    pub(crate) fn node(&self, prop: &str) -> Option<Node<'a>> {
        self.get(prop).and_then(Node::from_value)
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = (&'a String, &'a Value)> {
        self.map.iter()
    }

    pub(crate) fn string(&self, prop: &str) -> Result<String, String> {
        self.opt_string(prop)?
            .ok_or_else(|| format!("Missing value for prop \"{prop}\""))
    }

    pub(crate) fn opt_string(&self, prop: &str) -> Result<Option<String>, String> {
        match self.get(prop) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(mismatch(prop, "string", other)),
        }
    }

    pub(crate) fn integer(&self, prop: &str) -> Result<i64, String> {
        self.opt_integer(prop)?
            .ok_or_else(|| format!("Missing value for prop \"{prop}\""))
    }

    pub(crate) fn opt_integer(&self, prop: &str) -> Result<Option<i64>, String> {
        match self.get(prop) {
            None => Ok(None),
            Some(Value::Number(n)) => n
                .as_i64()
                .map(Some)
                .ok_or_else(|| mismatch(prop, "integer", &Value::Number(n.clone()))),
            Some(other) => Err(mismatch(prop, "integer", other)),
        }
    }

    pub(crate) fn boolean(&self, prop: &str) -> Result<bool, String> {
        match self.get(prop) {
            None => Err(format!("Missing value for prop \"{prop}\"")),
            Some(Value::Bool(b)) => Ok(*b),
            Some(other) => Err(mismatch(prop, "boolean", other)),
        }
    }

    /// Like [`Node::boolean`] but a missing prop reads as `false`.
    pub(crate) fn flag(&self, prop: &str) -> Result<bool, String> {
        match self.get(prop) {
            None => Ok(false),
            Some(_) => self.boolean(prop),
        }
    }
}

fn mismatch(prop: &str, expected: &str, got: &Value) -> String {
    format!(
        "Value for prop \"{prop}\" must be of type {expected}, got {}",
        type_name(got)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_match_loosely() {
        let v = json!({"timeOut": 5, "http_only": true, "ServerName": "mx"});
        let n = Node::from_value(&v).unwrap();
        assert_eq!(n.integer("time_out").unwrap(), 5);
        assert!(n.boolean("httpOnly").unwrap());
        assert_eq!(n.string("server_name").unwrap(), "mx");
    }

    #[test]
    fn reports_type_mismatch() {
        let v = json!({"port": "abc", "tls": 1});
        let n = Node::from_value(&v).unwrap();
        assert_eq!(
            n.integer("port").unwrap_err(),
            "Value for prop \"port\" must be of type integer, got string"
        );
        assert!(n.boolean("tls").is_err());
        assert_eq!(n.opt_string("missing").unwrap(), None);
        assert!(!n.flag("missing").unwrap());
    }

    #[test]
    fn null_is_absent() {
        let v = json!({"username": null});
        let n = Node::from_value(&v).unwrap();
        assert_eq!(n.opt_string("username").unwrap(), None);
    }
}
