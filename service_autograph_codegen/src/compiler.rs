//! Turns declarations into descriptors of the code to generate.
//!
//! Every descriptor depends only on the declaration it is built from, so
//! units can be compiled and emitted in any order.

use tracing::debug;

use crate::annotation::{Annotated, JSON, SERVICE};
use crate::classify::{classify, ServiceCallShape};
use crate::declaration::{
    Accessibility, Argument, DeclarationModel, Method, Protocol, SourceLocation, Structure,
    TypeReference,
};
use crate::error::{CompileError, CompileResult};
use crate::payload::PayloadExtraction;
use crate::request::{synthesize, RequestDescriptor, Segment};

/// Derive naming the capability a model needs for a key map.
pub const DECODABLE: &str = "Deserialize";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub name: String,
    pub protocol_name: String,
    pub comment: Option<String>,
    pub accessibility: Accessibility,
    pub methods: Vec<MethodDescriptor>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub name: String,
    pub comment: Option<String>,
    pub accessibility: Accessibility,
    pub arguments: Vec<Argument>,
    pub return_type: TypeReference,
    pub return_shape: ServiceCallShape,
    pub payload: PayloadExtraction,
    pub request: RequestDescriptor,
    pub location: SourceLocation,
}
impl MethodDescriptor {
    pub fn payload_type(&self) -> &TypeReference {
        static VOID: TypeReference = TypeReference::Void;
        self.return_shape.payload().unwrap_or(&VOID)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyBinding {
    pub property: String,
    pub json_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelDescriptor {
    pub name: String,
    pub key_bindings: Vec<KeyBinding>,
}

pub fn is_service(protocol: &Protocol) -> bool {
    protocol.has_tag(SERVICE)
}

/// Compiles every method of `protocol`. The first method with an invalid
/// return type fails the whole service.
pub fn compile_service(protocol: &Protocol) -> CompileResult<ServiceDescriptor> {
    let name = protocol
        .resolve(SERVICE)
        .unwrap_or_else(|| protocol.default_tag_value());
    let methods = protocol
        .methods
        .iter()
        .map(|method| compile_method(method, protocol.accessibility))
        .collect::<CompileResult<Vec<_>>>()?;
    debug!(service = %name, protocol = %protocol.name, methods = methods.len(), "compiled service");
    Ok(ServiceDescriptor {
        name,
        protocol_name: protocol.name.clone(),
        comment: protocol.comment.clone(),
        accessibility: protocol.accessibility,
        methods,
        location: protocol.location.clone(),
    })
}

pub fn compile_method(method: &Method, accessibility: Accessibility) -> CompileResult<MethodDescriptor> {
    let invalid = || CompileError::InvalidReturnType {
        method: method.name.clone(),
        location: method.location.clone(),
    };
    let return_type = method.return_type.clone().ok_or_else(invalid)?;
    let return_shape = classify(&return_type);
    let payload = match return_shape.payload() {
        Some(payload) => PayloadExtraction::for_payload(payload),
        None => return Err(invalid()),
    };
    let request = synthesize(method);
    check_placeholder_types(method, &request)?;
    Ok(MethodDescriptor {
        name: method.name.clone(),
        comment: method.comment.clone(),
        accessibility,
        arguments: method.arguments.clone(),
        return_type,
        return_shape,
        payload,
        request,
        location: method.location.clone(),
    })
}

/// Endpoint placeholders are filled with `format!`, so their arguments must
/// be `Display`. Only the type forms that never are can be rejected here.
fn check_placeholder_types(method: &Method, request: &RequestDescriptor) -> CompileResult<()> {
    for segment in &request.endpoint.segments {
        let name = match segment {
            Segment::Argument(name) => name,
            Segment::Literal(_) => continue,
        };
        let argument = match method.arguments.iter().find(|x| &x.name == name) {
            Some(argument) => argument,
            None => continue,
        };
        if !matches!(argument.type_reference, TypeReference::Primitive { .. } | TypeReference::Generic { .. }) {
            return Err(CompileError::InvalidPlaceholderType {
                method: method.name.clone(),
                argument: argument.name.clone(),
                type_name: argument.type_reference.to_string(),
                location: method.location.clone(),
            });
        }
    }
    Ok(())
}

pub fn is_decodable(structure: &Structure) -> bool {
    structure
        .inherited_types
        .iter()
        .any(|x| x.rsplit("::").next().map(str::trim) == Some(DECODABLE))
}

/// Key map of a decodable model. `None` when the model is not decodable or
/// none of its properties carries a `@json` tag.
pub fn compile_model(structure: &Structure) -> Option<ModelDescriptor> {
    if !is_decodable(structure) {
        return None;
    }
    let key_bindings: Vec<KeyBinding> = structure
        .properties
        .iter()
        .filter_map(|property| {
            property.resolve(JSON).map(|json_key| KeyBinding {
                property: property.name.clone(),
                json_key,
            })
        })
        .collect();
    if key_bindings.is_empty() {
        return None;
    }
    debug!(model = %structure.name, keys = key_bindings.len(), "compiled key map");
    Some(ModelDescriptor {
        name: structure.name.clone(),
        key_bindings,
    })
}

/// Result of compiling a whole declaration model.
#[derive(Debug, Clone, Default)]
pub struct Compilation {
    /// One entry per `@service` protocol, in declaration order.
    pub services: Vec<CompileResult<ServiceDescriptor>>,
    pub models: Vec<ModelDescriptor>,
}

pub fn compile(model: &DeclarationModel) -> Compilation {
    Compilation {
        services: model
            .protocols
            .iter()
            .filter(|x| is_service(x))
            .map(compile_service)
            .collect(),
        models: model.structures.iter().filter_map(compile_model).collect(),
    }
}
