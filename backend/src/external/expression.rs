//! Serialized expression graphs for the Earth Engine REST API
//!
//! Requests carry a flat `values` map of nodes that reference each other by
//! key, plus the key of the result node:
//!
//! ```json
//! { "result": "2", "values": { "0": {...}, "1": {...}, "2": {...} } }
//! ```

use serde_json::{json, Map, Value};

/// A value node: constant, reference, argument, array, or inline invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Node(Value);

impl Node {
    pub fn constant(value: impl Into<Value>) -> Self {
        Node(json!({ "constantValue": value.into() }))
    }

    /// Reference to an argument of the enclosing function definition
    pub fn argument(name: &str) -> Self {
        Node(json!({ "argumentReference": name }))
    }

    pub fn array(items: Vec<Node>) -> Self {
        let values: Vec<Value> = items.into_iter().map(|n| n.0).collect();
        Node(json!({ "arrayValue": { "values": values } }))
    }

    pub fn null() -> Self {
        Node(json!({ "constantValue": Value::Null }))
    }

    fn reference_key(&self) -> Option<&str> {
        self.0.get("valueReference").and_then(Value::as_str)
    }
}

/// Builder for one expression graph
#[derive(Debug, Default)]
pub struct Expression {
    values: Map<String, Value>,
}

impl Expression {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invoke a backend function; the call is stored once and referenced
    pub fn call<'a>(&mut self, function: &str, arguments: impl IntoIterator<Item = (&'a str, Node)>) -> Node {
        let arguments: Map<String, Value> = arguments
            .into_iter()
            .map(|(name, node)| (name.to_string(), node.0))
            .collect();
        self.insert(json!({
            "functionInvocationValue": {
                "functionName": function,
                "arguments": arguments,
            }
        }))
    }

    /// Invoke a backend function that takes no arguments
    pub fn call0(&mut self, function: &str) -> Node {
        self.call(function, Vec::<(&str, Node)>::new())
    }

    /// Define an anonymous function whose body may use [`Node::argument`]
    pub fn lambda(&mut self, argument_names: &[&str], body: Node) -> Node {
        let body_key = self.key_of(body);
        Node(json!({
            "functionDefinitionValue": {
                "argumentNames": argument_names,
                "body": body_key,
            }
        }))
    }

    /// Finish the graph with `result` as its output
    pub fn into_json(mut self, result: Node) -> Value {
        let result_key = self.key_of(result);
        json!({ "result": result_key, "values": Value::Object(self.values) })
    }

    fn insert(&mut self, value: Value) -> Node {
        let key = self.values.len().to_string();
        self.values.insert(key.clone(), value);
        Node(json!({ "valueReference": key }))
    }

    fn key_of(&mut self, node: Node) -> String {
        match node.reference_key() {
            Some(key) => key.to_string(),
            None => {
                let inserted = self.insert(node.0);
                inserted.reference_key().unwrap_or_default().to_string()
            }
        }
    }
}
