use crate::declaration::SourceLocation;

/// Fails the generated unit it occurs in. Sibling units are unaffected.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CompileError {
    #[error("{location}: [ServiceAutograph] Service method must return a ServiceCall<> or a CancelableServiceCall<> (`{method}`)")]
    InvalidReturnType {
        method: String,
        location: SourceLocation,
    },
    #[error("{location}: `{name}` is not a valid Rust type")]
    InvalidTypeName {
        name: String,
        location: SourceLocation,
    },
    #[error("`{path}` is not a valid Rust path")]
    InvalidPath { path: String },
    #[error("{location}: `{name}` is not a valid Rust identifier")]
    InvalidIdentifier {
        name: String,
        location: SourceLocation,
    },
    /// URL placeholders are formatted with `Display`, which `()`, `Option`,
    /// `Vec` and `HashMap` do not implement.
    #[error("{location}: argument `{argument}` of `{method}` fills an endpoint placeholder but its type `{type_name}` cannot be formatted into a URL")]
    InvalidPlaceholderType {
        method: String,
        argument: String,
        type_name: String,
        location: SourceLocation,
    },
    #[error("generated code for `{unit}` does not parse: {message}")]
    Render { unit: String, message: String },
}
impl CompileError {
    pub fn location(&self) -> Option<&SourceLocation> {
        match self {
            CompileError::InvalidReturnType { location, .. }
            | CompileError::InvalidTypeName { location, .. }
            | CompileError::InvalidIdentifier { location, .. }
            | CompileError::InvalidPlaceholderType { location, .. } => Some(location),
            CompileError::InvalidPath { .. } | CompileError::Render { .. } => None,
        }
    }
}

pub type CompileResult<T> = Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_return_type_message() {
        let error = CompileError::InvalidReturnType {
            method: "get".to_string(),
            location: SourceLocation {
                file: "service.rs".to_string(),
                line: 3,
                column: 4,
            },
        };
        assert_eq!(
            error.to_string(),
            "service.rs:3:4: [ServiceAutograph] Service method must return a ServiceCall<> or a CancelableServiceCall<> (`get`)"
        );
        assert_eq!(error.location().map(|x| x.line), Some(3));
    }
}
