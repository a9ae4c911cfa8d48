//! The value model shared by statements, parameters and results.
//!
//! Every datum that crosses the wire is a [`Value`]: a tagged union of the
//! primitive types, lists, string-keyed maps, and the graph types the server
//! returns (nodes, relationships and paths, which travel as structures with
//! reserved signatures).

use std::fmt;

use indexmap::IndexMap;

/// An insertion-ordered map with unique string keys.
///
/// Entry order is significant: it is preserved on the wire, and two maps are
/// equal only when their entries match pairwise in order.
#[derive(Debug, Clone, Default)]
pub struct Map(IndexMap<String, Value>);

impl Map {
    /// Create an empty map.
    pub fn new() -> Self {
        Map(IndexMap::new())
    }

    /// Create an empty map with room for `cap` entries.
    pub fn with_capacity(cap: usize) -> Self {
        Map(IndexMap::with_capacity(cap))
    }

    /// Insert an entry, replacing (in place) any previous value for the key.
    pub fn insert<K: Into<String>, V: Into<Value>>(&mut self, key: K, value: V) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Look up an entry by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Iterate keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }
}

impl PartialEq for Map {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .zip(other.0.iter())
                .all(|((ka, va), (kb, vb))| ka == kb && va == vb)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Map {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Map(iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect())
    }
}

impl IntoIterator for Map {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// A generic structure value: an application-defined signature byte plus
/// ordered fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Structure {
    /// Signature byte identifying the structure type.
    pub signature: u8,
    /// The structure's fields, in order.
    pub fields: Vec<Value>,
}

/// A node in the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Server-assigned identity of the node.
    pub id: i64,
    /// Labels attached to the node.
    pub labels: Vec<String>,
    /// The node's properties.
    pub properties: Map,
}

/// A relationship between two nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    /// Server-assigned identity of the relationship.
    pub id: i64,
    /// Identity of the node the relationship starts at.
    pub start: i64,
    /// Identity of the node the relationship ends at.
    pub end: i64,
    /// The relationship type.
    pub typ: String,
    /// The relationship's properties.
    pub properties: Map,
}

/// A relationship as it appears inside a path, without endpoints: the path's
/// sequence supplies them.
#[derive(Debug, Clone, PartialEq)]
pub struct UnboundRelationship {
    /// Server-assigned identity of the relationship.
    pub id: i64,
    /// The relationship type.
    pub typ: String,
    /// The relationship's properties.
    pub properties: Map,
}

/// A path through the graph: alternating nodes and relationships.
///
/// `sequence` holds pairs of indices: a one-based index into `relationships`
/// (negated when the relationship is traversed against its direction)
/// followed by a zero-based index into `nodes`. The path starts at `nodes[0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    /// Every distinct node on the path; the first is the start node.
    pub nodes: Vec<Node>,
    /// Every distinct relationship on the path.
    pub relationships: Vec<UnboundRelationship>,
    /// Traversal order, see the type docs.
    pub sequence: Vec<i64>,
}

impl Path {
    /// Number of relationships traversed.
    pub fn length(&self) -> usize {
        self.sequence.len() / 2
    }
}

/// A single value.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(Map),
    Structure(Structure),
    Node(Box<Node>),
    Relationship(Box<Relationship>),
    UnboundRelationship(Box<UnboundRelationship>),
    Path(Box<Path>),
    /// An opaque entity identifier. Compares equal to an `Int` of the same
    /// value and is transmitted as one.
    Identity(i64),
}

impl Value {
    /// Name of the value's type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::List(_) => "List",
            Value::Map(_) => "Map",
            Value::Structure(_) => "Structure",
            Value::Node(_) => "Node",
            Value::Relationship(_) => "Relationship",
            Value::UnboundRelationship(_) => "UnboundRelationship",
            Value::Path(_) => "Path",
            Value::Identity(_) => "Identity",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// The integer payload of an `Int` or `Identity`.
    pub fn as_int(&self) -> Option<i64> {
        match *self {
            Value::Int(n) | Value::Identity(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match *self {
            Value::Float(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Value::Node(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_relationship(&self) -> Option<&Relationship> {
        match self {
            Value::Relationship(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Value::Path(p) => Some(p),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (String(a), String(b)) => a == b,
            (List(a), List(b)) => a == b,
            (Map(a), Map(b)) => a == b,
            (Structure(a), Structure(b)) => a == b,
            (Node(a), Node(b)) => a == b,
            (Relationship(a), Relationship(b)) => a == b,
            (UnboundRelationship(a), UnboundRelationship(b)) => a == b,
            (Path(a), Path(b)) => a == b,
            // identities are Int-compatible
            (Int(a) | Identity(a), Int(b) | Identity(b)) => a == b,
            _ => false,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! value_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(n: $t) -> Self {
                Value::Int(n as i64)
            }
        })*
    };
}
value_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<Map> for Value {
    fn from(m: Map) -> Self {
        Value::Map(m)
    }
}

impl From<Node> for Value {
    fn from(n: Node) -> Self {
        Value::Node(Box::new(n))
    }
}

impl From<Relationship> for Value {
    fn from(r: Relationship) -> Self {
        Value::Relationship(Box::new(r))
    }
}

impl From<Path> for Value {
    fn from(p: Path) -> Self {
        Value::Path(Box::new(p))
    }
}

// A key that looks like an identifier is rendered bare, anything else quoted.
fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

fn write_quoted(f: &mut fmt::Formatter, s: &str) -> fmt::Result {
    write!(f, "\"")?;
    for c in s.chars() {
        match c {
            '"' | '\\' => write!(f, "\\{}", c)?,
            _ => write!(f, "{}", c)?,
        }
    }
    write!(f, "\"")
}

fn write_map_entries(f: &mut fmt::Formatter, map: &Map) -> fmt::Result {
    write!(f, "{{")?;
    for (i, (key, value)) in map.iter().enumerate() {
        if i > 0 {
            write!(f, ",")?;
        }
        if is_identifier(key) {
            write!(f, "{}:", key)?;
        } else {
            write_quoted(f, key)?;
            write!(f, ":")?;
        }
        write!(f, "{}", value)?;
    }
    write!(f, "}}")
}

fn write_node(f: &mut fmt::Formatter, node: &Node) -> fmt::Result {
    write!(f, "(")?;
    for label in &node.labels {
        write!(f, ":{}", label)?;
    }
    if !node.properties.is_empty() {
        if !node.labels.is_empty() {
            write!(f, " ")?;
        }
        write_map_entries(f, &node.properties)?;
    }
    write!(f, ")")
}

fn write_rel(f: &mut fmt::Formatter, typ: &str, properties: &Map) -> fmt::Result {
    write!(f, "[:{}", typ)?;
    if !properties.is_empty() {
        write!(f, " ")?;
        write_map_entries(f, properties)?;
    }
    write!(f, "]")
}

fn write_path(f: &mut fmt::Formatter, path: &Path) -> fmt::Result {
    match path.nodes.first() {
        Some(start) => write_node(f, start)?,
        None => return write!(f, "()"),
    }
    for hop in path.sequence.chunks(2) {
        let (rel_idx, node_idx) = match *hop {
            [r, n] => (r, n),
            _ => break,
        };
        let reversed = rel_idx < 0;
        let rel = path
            .relationships
            .get((rel_idx.unsigned_abs() as usize).saturating_sub(1));
        let node = path.nodes.get(node_idx as usize);
        let (rel, node) = match (rel, node) {
            (Some(r), Some(n)) => (r, n),
            _ => break,
        };
        if reversed {
            write!(f, "<-")?;
            write_rel(f, &rel.typ, &rel.properties)?;
            write!(f, "-")?;
        } else {
            write!(f, "-")?;
            write_rel(f, &rel.typ, &rel.properties)?;
            write!(f, "->")?;
        }
        write_node(f, node)?;
    }
    Ok(())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(true) => write!(f, "true"),
            Value::Bool(false) => write!(f, "false"),
            Value::Int(n) | Value::Identity(n) => write!(f, "{}", n),
            // Debug formatting keeps a trailing ".0" on round floats
            Value::Float(x) => write!(f, "{:?}", x),
            Value::String(s) => write_quoted(f, s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(map) => write_map_entries(f, map),
            Value::Structure(s) => {
                write!(f, "struct<0x{:02X}>(", s.signature)?;
                for (i, field) in s.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", field)?;
                }
                write!(f, ")")
            }
            Value::Node(n) => write_node(f, n),
            Value::Relationship(r) => write_rel(f, &r.typ, &r.properties),
            Value::UnboundRelationship(r) => write_rel(f, &r.typ, &r.properties),
            Value::Path(p) => write_path(f, p),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(entries: &[(&str, Value)]) -> Map {
        entries.iter().map(|(k, v)| (*k, v.clone())).collect()
    }

    #[test]
    fn primitives_render() {
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(Value::Bool(false).to_string(), "false");
        assert_eq!(Value::Int(-42).to_string(), "-42");
        assert_eq!(Value::Float(1.5).to_string(), "1.5");
        assert_eq!(Value::Float(1.0).to_string(), "1.0");
    }

    #[test]
    fn strings_render_escaped() {
        assert_eq!(Value::from("say \"hi\"").to_string(), r#""say \"hi\"""#);
        assert_eq!(Value::from(r"a\b").to_string(), r#""a\\b""#);
    }

    #[test]
    fn collections_render() {
        let list = Value::List(vec![Value::Int(1), Value::from("two"), Value::Null]);
        assert_eq!(list.to_string(), r#"[1,"two",null]"#);

        let map = Value::Map(props(&[
            ("name", Value::from("Alice")),
            ("has space", Value::Int(1)),
        ]));
        assert_eq!(map.to_string(), r#"{name:"Alice","has space":1}"#);
    }

    #[test]
    fn node_renders_cypher_style() {
        let node = Node {
            id: 1,
            labels: vec!["Person".to_string(), "Actor".to_string()],
            properties: props(&[("name", Value::from("Alice"))]),
        };
        assert_eq!(
            Value::from(node).to_string(),
            r#"(:Person:Actor {name:"Alice"})"#
        );

        let bare = Node {
            id: 2,
            labels: vec![],
            properties: Map::new(),
        };
        assert_eq!(Value::from(bare).to_string(), "()");
    }

    #[test]
    fn relationship_renders_cypher_style() {
        let rel = Relationship {
            id: 3,
            start: 1,
            end: 2,
            typ: "KNOWS".to_string(),
            properties: props(&[("since", Value::Int(1999))]),
        };
        assert_eq!(Value::from(rel).to_string(), "[:KNOWS {since:1999}]");
    }

    #[test]
    fn path_renders_with_directions() {
        let path = Path {
            nodes: vec![
                Node {
                    id: 1,
                    labels: vec!["A".to_string()],
                    properties: Map::new(),
                },
                Node {
                    id: 2,
                    labels: vec!["B".to_string()],
                    properties: Map::new(),
                },
            ],
            relationships: vec![UnboundRelationship {
                id: 9,
                typ: "T".to_string(),
                properties: Map::new(),
            }],
            // forward hop, then back again against the direction
            sequence: vec![1, 1, -1, 0],
        };
        assert_eq!(path.length(), 2);
        assert_eq!(Value::from(path).to_string(), "(:A)-[:T]->(:B)<-[:T]-(:A)");
    }

    #[test]
    fn map_equality_is_order_sensitive() {
        let a = props(&[("x", Value::Int(1)), ("y", Value::Int(2))]);
        let b = props(&[("y", Value::Int(2)), ("x", Value::Int(1))]);
        assert_ne!(Value::Map(a.clone()), Value::Map(b));
        assert_eq!(Value::Map(a.clone()), Value::Map(a));
    }

    #[test]
    fn identity_compares_with_int() {
        assert_eq!(Value::Identity(7), Value::Int(7));
        assert_eq!(Value::Int(7), Value::Identity(7));
        assert_ne!(Value::Identity(7), Value::Int(8));
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut m = Map::new();
        m.insert("a", 1);
        m.insert("b", 2);
        m.insert("a", 3);
        let keys: Vec<&String> = m.keys().collect();
        assert_eq!(keys, ["a", "b"]);
        assert_eq!(m.get("a"), Some(&Value::Int(3)));
    }
}
