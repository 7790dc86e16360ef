//! DOM-JSON nodes built by the `div` and `button` capabilities

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<Map<String, Value>>,
    /// Name of an exported plugin function
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onclick: Option<String>,
}

/// A node of the plugin UI tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DomJson {
    Element {
        #[serde(rename = "type")]
        tag: String,
        #[serde(default)]
        options: DomOptions,
        #[serde(default)]
        children: Vec<DomJson>,
    },
    Text(String),
}

/// Build an element from plugin call arguments.
///
/// Accepts `(options?, children?)` and `(children?)`. Children that are
/// neither nodes nor strings are dropped; numbers become text.
pub fn element(tag: &str, args: &[Value]) -> anyhow::Result<Value> {
    let (options, children) = match args {
        [] => (Value::Null, Value::Null),
        [Value::Array(_), ..] => (Value::Null, args[0].clone()),
        [options] => (options.clone(), Value::Null),
        [options, children, ..] => (options.clone(), children.clone()),
    };

    let options: DomOptions = match options {
        Value::Null => DomOptions::default(),
        other => serde_json::from_value(other)
            .map_err(|e| anyhow::anyhow!("Invalid {} options: {}", tag, e))?,
    };

    let children = match children {
        Value::Array(items) => items.into_iter().filter_map(child).collect(),
        Value::Null => Vec::new(),
        single => child(single).into_iter().collect(),
    };

    let node = DomJson::Element {
        tag: tag.to_string(),
        options,
        children,
    };
    Ok(serde_json::to_value(node)?)
}

fn child(value: Value) -> Option<DomJson> {
    match value {
        Value::String(s) => Some(DomJson::Text(s)),
        Value::Number(n) => Some(DomJson::Text(n.to_string())),
        Value::Bool(b) => Some(DomJson::Text(b.to_string())),
        other => serde_json::from_value(other).ok(),
    }
}
