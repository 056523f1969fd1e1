use crate::declaration::TypeReference;

/// Return type wrapping a synchronous call.
pub const SERVICE_CALL: &str = "ServiceCall";
/// Return type wrapping a cancelable asynchronous call.
pub const CANCELABLE_SERVICE_CALL: &str = "CancelableServiceCall";

/// What a service method's return type says about the call it makes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ServiceCallShape {
    Sync(TypeReference),
    Cancelable(TypeReference),
    Invalid,
}
impl ServiceCallShape {
    pub fn payload(&self) -> Option<&TypeReference> {
        match self {
            ServiceCallShape::Sync(payload) | ServiceCallShape::Cancelable(payload) => {
                Some(payload)
            }
            ServiceCallShape::Invalid => None,
        }
    }

    pub fn is_cancelable(&self) -> bool {
        matches!(self, ServiceCallShape::Cancelable(_))
    }
}

/// Only a generic type named after one of the two call wrappers, with
/// exactly one type argument, is a valid return type. Paths are compared by
/// their last segment.
pub fn classify(return_type: &TypeReference) -> ServiceCallShape {
    let (name, arguments) = match return_type {
        TypeReference::Generic { name, arguments } => (name, arguments),
        _ => return ServiceCallShape::Invalid,
    };
    let payload = match arguments.as_slice() {
        [payload] => payload.clone(),
        _ => return ServiceCallShape::Invalid,
    };
    match last_segment(name) {
        SERVICE_CALL => ServiceCallShape::Sync(payload),
        CANCELABLE_SERVICE_CALL => ServiceCallShape::Cancelable(payload),
        _ => ServiceCallShape::Invalid,
    }
}

fn last_segment(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path).trim()
}
