//! Data structures representing the declarations a generator run consumes.
//!
//! They are usually built by [crate::extract] from Rust interface files, but
//! can also be deserialized from JSON produced by another frontend.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a declaration was found, for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: usize,
    pub column: usize,
}
impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// A `@name [value]` tag from a doc comment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Annotation {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
}
impl Annotation {
    pub fn new(name: impl Into<String>, value: Option<&str>) -> Self {
        Annotation {
            name: name.into(),
            value: value.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeReference {
    /// `()`
    Void,
    /// Any named type without type arguments, e.g. `u32` or `models::Person`.
    Primitive { name: String },
    Optional { wrapped: Box<TypeReference> },
    Array { element: Box<TypeReference> },
    Map {
        key: Box<TypeReference>,
        value: Box<TypeReference>,
    },
    Generic {
        name: String,
        arguments: Vec<TypeReference>,
    },
}
impl TypeReference {
    pub fn primitive(name: impl Into<String>) -> Self {
        TypeReference::Primitive { name: name.into() }
    }

    pub fn optional(wrapped: TypeReference) -> Self {
        TypeReference::Optional {
            wrapped: Box::new(wrapped),
        }
    }

    pub fn array(element: TypeReference) -> Self {
        TypeReference::Array {
            element: Box::new(element),
        }
    }

    pub fn map(key: TypeReference, value: TypeReference) -> Self {
        TypeReference::Map {
            key: Box::new(key),
            value: Box::new(value),
        }
    }

    pub fn generic(name: impl Into<String>, arguments: Vec<TypeReference>) -> Self {
        TypeReference::Generic {
            name: name.into(),
            arguments,
        }
    }

    /// Whether a value of this type is a collection of entities.
    pub fn plural(&self) -> bool {
        matches!(self, TypeReference::Array { .. } | TypeReference::Map { .. })
    }
}
impl fmt::Display for TypeReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeReference::Void => f.write_str("()"),
            TypeReference::Primitive { name } => f.write_str(name),
            TypeReference::Optional { wrapped } => write!(f, "Option<{wrapped}>"),
            TypeReference::Array { element } => write!(f, "Vec<{element}>"),
            TypeReference::Map { key, value } => write!(f, "HashMap<{key}, {value}>"),
            TypeReference::Generic { name, arguments } => {
                write!(f, "{name}<")?;
                for (i, argument) in arguments.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{argument}")?;
                }
                f.write_str(">")
            }
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accessibility {
    Public,
    Crate,
    #[default]
    Private,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argument {
    pub name: String,
    pub type_reference: TypeReference,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Method {
    pub name: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub arguments: Vec<Argument>,
    /// `None` when the method declares no return type.
    #[serde(default)]
    pub return_type: Option<TypeReference>,
    #[serde(default)]
    pub location: SourceLocation,
}

/// A trait declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Protocol {
    pub name: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub accessibility: Accessibility,
    #[serde(default)]
    pub methods: Vec<Method>,
    #[serde(default)]
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    pub type_reference: TypeReference,
    #[serde(default)]
    pub location: SourceLocation,
}

/// A struct declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Structure {
    pub name: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub accessibility: Accessibility,
    /// Derived traits, as written.
    #[serde(default)]
    pub inherited_types: Vec<String>,
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default)]
    pub location: SourceLocation,
}

/// Everything one generator run looks at, in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclarationModel {
    #[serde(default)]
    pub protocols: Vec<Protocol>,
    #[serde(default)]
    pub structures: Vec<Structure>,
}
impl DeclarationModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, other: DeclarationModel) {
        self.protocols.extend(other.protocols);
        self.structures.extend(other.structures);
    }

    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty() && self.structures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plural() {
        let person = TypeReference::primitive("Person");
        assert!(TypeReference::array(person.clone()).plural());
        assert!(TypeReference::map(TypeReference::primitive("String"), person.clone()).plural());
        assert!(!TypeReference::optional(TypeReference::array(person.clone())).plural());
        assert!(!TypeReference::generic("Box", vec![person.clone()]).plural());
        assert!(!person.plural());
        assert!(!TypeReference::Void.plural());
    }

    #[test]
    fn test_display_type_reference() {
        let reference = TypeReference::generic(
            "ServiceCall",
            vec![TypeReference::map(
                TypeReference::primitive("String"),
                TypeReference::optional(TypeReference::primitive("Person")),
            )],
        );
        assert_eq!(
            reference.to_string(),
            "ServiceCall<HashMap<String, Option<Person>>>"
        );
    }

    #[test]
    fn test_location_display() {
        let location = SourceLocation {
            file: "src/service.rs".to_string(),
            line: 12,
            column: 4,
        };
        assert_eq!(location.to_string(), "src/service.rs:12:4");
    }
}
