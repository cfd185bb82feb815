use bytes::Bytes;
use typed_builder::TypedBuilder;

use crate::fetch::Fetch;

/// Declarative description of one node of the response skeleton.
///
/// Shapes are produced by a planner and consumed immutably by the resolver;
/// one shape serves any number of concurrent requests.
#[derive(Clone, Debug)]
pub enum Node {
    Object(Box<Object>),
    EmptyObject,
    Array(Box<Array>),
    EmptyArray,
    Null,
    String(ScalarField),
    Boolean(ScalarField),
    Integer(ScalarField),
    Float(ScalarField),
}

impl Node {
    pub fn nullable(&self) -> bool {
        match self {
            Node::Object(object) => object.nullable,
            Node::Array(array) => array.nullable,
            Node::Null => true,
            Node::EmptyObject | Node::EmptyArray => false,
            Node::String(field)
            | Node::Boolean(field)
            | Node::Integer(field)
            | Node::Float(field) => field.nullable,
        }
    }
}

impl From<Object> for Node {
    fn from(object: Object) -> Self {
        Node::Object(Box::new(object))
    }
}

impl From<Array> for Node {
    fn from(array: Array) -> Self {
        Node::Array(Box::new(array))
    }
}

#[derive(Clone, Debug, TypedBuilder)]
pub struct Object {
    #[builder(default)]
    pub nullable: bool,
    /// Keys drilled into the ambient data before any field resolves.
    #[builder(default)]
    pub path: Vec<String>,
    pub field_sets: Vec<FieldSet>,
    #[builder(default)]
    pub fetch: Option<Fetch>,
}

/// A group of fields rendered from one data source, optionally gated on
/// the data's `__typename`.
#[derive(Clone, Debug, TypedBuilder)]
pub struct FieldSet {
    #[builder(default)]
    pub on_type_name: Option<Bytes>,
    #[builder(default)]
    pub buffer_id: usize,
    #[builder(default)]
    pub has_buffer: bool,
    pub fields: Vec<Field>,
}

#[derive(Clone, Debug)]
pub struct Field {
    pub name: Bytes,
    pub value: Node,
}

impl Field {
    pub fn new(name: impl Into<Bytes>, value: impl Into<Node>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Clone, Debug, TypedBuilder)]
pub struct Array {
    #[builder(default)]
    pub nullable: bool,
    #[builder(default)]
    pub path: Vec<String>,
    /// Resolve elements concurrently. Output bytes are identical to the
    /// sequential mode; only wall-clock time differs.
    #[builder(default)]
    pub resolve_asynchronous: bool,
    /// Shape shared by every element.
    pub item: Node,
}

/// Path and nullability shared by the scalar leaf kinds.
#[derive(Clone, Debug, Default)]
pub struct ScalarField {
    pub path: Vec<String>,
    pub nullable: bool,
}

impl ScalarField {
    pub fn new(path: &[&str]) -> Self {
        Self {
            path: path.iter().map(|s| s.to_string()).collect(),
            nullable: false,
        }
    }

    pub fn nullable(path: &[&str]) -> Self {
        Self {
            nullable: true,
            ..Self::new(path)
        }
    }
}

/// The root of a planned response.
#[derive(Clone, Debug)]
pub struct GraphQLResponse {
    pub data: Node,
}
