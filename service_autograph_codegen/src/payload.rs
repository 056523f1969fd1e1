use crate::declaration::TypeReference;

/// How the entities parsed from a response become a method's payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PayloadExtraction {
    /// `()` payload; the response body is ignored.
    Nothing,
    /// Every parsed entity. For a map payload `key` is set and the entities
    /// are read from the members of the response object.
    Collection {
        key: Option<TypeReference>,
        element: TypeReference,
    },
    /// The first parsed entity, or `None` when there are none.
    FirstOrNone { element: TypeReference },
    /// The first parsed entity. A response without one aborts the call.
    FirstRequired { element: TypeReference },
}
impl PayloadExtraction {
    pub fn for_payload(payload: &TypeReference) -> Self {
        match payload {
            TypeReference::Void => PayloadExtraction::Nothing,
            TypeReference::Array { element } => PayloadExtraction::Collection {
                key: None,
                element: (**element).clone(),
            },
            TypeReference::Map { key, value } => PayloadExtraction::Collection {
                key: Some((**key).clone()),
                element: (**value).clone(),
            },
            TypeReference::Optional { wrapped } => PayloadExtraction::FirstOrNone {
                element: (**wrapped).clone(),
            },
            other => PayloadExtraction::FirstRequired {
                element: other.clone(),
            },
        }
    }

    /// Whether a response without entities fails the call.
    pub fn is_fatal_when_empty(&self) -> bool {
        matches!(self, PayloadExtraction::FirstRequired { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> TypeReference {
        TypeReference::primitive("Person")
    }

    #[test]
    fn test_plural_payload_is_never_fatal() {
        let extraction = PayloadExtraction::for_payload(&TypeReference::array(person()));
        assert_eq!(
            extraction,
            PayloadExtraction::Collection {
                key: None,
                element: person()
            }
        );
        assert!(!extraction.is_fatal_when_empty());

        let extraction = PayloadExtraction::for_payload(&TypeReference::map(
            TypeReference::primitive("String"),
            person(),
        ));
        assert_eq!(
            extraction,
            PayloadExtraction::Collection {
                key: Some(TypeReference::primitive("String")),
                element: person()
            }
        );
        assert!(!extraction.is_fatal_when_empty());
    }

    #[test]
    fn test_singular_payloads() {
        let required = PayloadExtraction::for_payload(&person());
        assert_eq!(
            required,
            PayloadExtraction::FirstRequired { element: person() }
        );
        assert!(required.is_fatal_when_empty());

        let optional = PayloadExtraction::for_payload(&TypeReference::optional(person()));
        assert_eq!(
            optional,
            PayloadExtraction::FirstOrNone { element: person() }
        );
        assert!(!optional.is_fatal_when_empty());

        // An optional collection is a single optional entity, not a plural one.
        let optional_list =
            PayloadExtraction::for_payload(&TypeReference::optional(TypeReference::array(person())));
        assert_eq!(
            optional_list,
            PayloadExtraction::FirstOrNone {
                element: TypeReference::array(person())
            }
        );
    }

    #[test]
    fn test_void_payload() {
        assert_eq!(
            PayloadExtraction::for_payload(&TypeReference::Void),
            PayloadExtraction::Nothing
        );
    }
}
