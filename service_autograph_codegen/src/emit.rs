//! Rendering of compiled descriptors into Rust source.
//!
//! Code is assembled as token trees and printed with `prettyplease`, so the
//! same descriptors always produce the same text.

use heck::ToSnakeCase;
use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::parse_quote;
use tracing::debug;

use crate::classify::ServiceCallShape;
use crate::compiler::{MethodDescriptor, ModelDescriptor, ServiceDescriptor};
use crate::declaration::{Accessibility, SourceLocation, TypeReference};
use crate::error::{CompileError, CompileResult};
use crate::payload::PayloadExtraction;
use crate::request::{Endpoint, ParameterBinding, Segment};

/// First line of every generated file.
pub const HEADER: &str = "// Generated by service-autograph. Do not edit.\n";

pub const RUNTIME_FILE: &str = "service.rs";
pub const TRANSPORT_FILE: &str = "transport.rs";
pub const OBJECT_PARSER_FILE: &str = "object_parser.rs";

/// Source of the runtime shipped next to generated services.
pub const RUNTIME_SOURCE: &str = include_str!("../../service_autograph_lib/src/service.rs");
/// Source of the object parser shipped with the generated key maps.
pub const OBJECT_PARSER_SOURCE: &str =
    include_str!("../../service_autograph_lib/src/object_parser.rs");

/// A generated file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Artifact {
    /// Relative to the output directory.
    pub path: String,
    pub source: String,
}

#[derive(Debug, Clone)]
pub struct EmitOptions {
    /// Where generated code finds the runtime items.
    pub runtime: syn::Path,
    /// Glob-imported into service units when set.
    pub models: Option<syn::Path>,
    /// Whether service units also declare the protocol trait.
    pub emit_protocols: bool,
}
impl Default for EmitOptions {
    fn default() -> Self {
        EmitOptions {
            runtime: parse_quote!(super::service),
            models: Some(parse_quote!(super)),
            emit_protocols: true,
        }
    }
}

pub fn emit_service(service: &ServiceDescriptor, options: &EmitOptions) -> CompileResult<Artifact> {
    let models_import = options.models.as_ref().map(|models| {
        quote! {
            #[allow(unused_imports)]
            use #models::*;
        }
    });
    let body = service_tokens(service, options)?;
    let source = render(&service.name, quote! { #models_import #body })?;
    let path = format!("{}.rs", service.name.to_snake_case());
    debug!(service = %service.name, path = %path, "emitted service");
    Ok(Artifact { path, source })
}

/// The call runtime, always shipped as is.
pub fn emit_runtime() -> Artifact {
    Artifact {
        path: RUNTIME_FILE.to_string(),
        source: format!("{HEADER}\n{RUNTIME_SOURCE}"),
    }
}

/// Re-exports the transport seam the runtime is written against.
pub fn emit_transport(transport: &syn::Path) -> CompileResult<Artifact> {
    let source = render(
        "transport",
        quote! {
            pub use #transport::*;
        },
    )?;
    Ok(Artifact {
        path: TRANSPORT_FILE.to_string(),
        source,
    })
}

/// The object parser followed by the key maps of `models`.
pub fn emit_key_maps(models: &[ModelDescriptor], options: &EmitOptions) -> CompileResult<Artifact> {
    let key_maps = key_map_tokens(models, &parse_quote!(self), options.models.as_ref())?;
    let rendered = render("key maps", key_maps)?;
    let rendered = rendered.strip_prefix(HEADER).unwrap_or(&rendered);
    Ok(Artifact {
        path: OBJECT_PARSER_FILE.to_string(),
        source: format!("{HEADER}\n{OBJECT_PARSER_SOURCE}{rendered}"),
    })
}

fn render(unit: &str, tokens: TokenStream) -> CompileResult<String> {
    let file: syn::File = syn::parse2(tokens).map_err(|e| CompileError::Render {
        unit: unit.to_string(),
        message: e.to_string(),
    })?;
    Ok(format!("{HEADER}\n{}", prettyplease::unparse(&file)))
}

/// `KeyMap` impls for `models` and a `key_maps()` function registering them.
pub fn key_map_tokens(
    models: &[ModelDescriptor],
    runtime: &syn::Path,
    models_path: Option<&syn::Path>,
) -> CompileResult<TokenStream> {
    let mut impls = Vec::new();
    let mut model_types = Vec::new();
    for model in models {
        let name = ident(&model.name, &SourceLocation::default())?;
        let model_type = match models_path {
            Some(path) => quote! { #path::#name },
            None => quote! { #name },
        };
        let bindings = model.key_bindings.iter().map(|binding| {
            let property = &binding.property;
            let json_key = &binding.json_key;
            quote! { (#property, #json_key) }
        });
        impls.push(quote! {
            impl #runtime::KeyMap for #model_type {
                const KEYS: &'static [#runtime::KeyBinding] = &[#(#bindings),*];
            }
        });
        model_types.push(model_type);
    }
    Ok(quote! {
        #(#impls)*

        /// Key maps of every model with `@json` properties.
        pub fn key_maps() -> #runtime::KeyMaps {
            let mut key_maps = #runtime::KeyMaps::new();
            #(key_maps.register::<#model_types>();)*
            key_maps
        }
    })
}

/// The service struct, its protocol impl and, if asked for, the protocol
/// trait itself.
pub fn service_tokens(service: &ServiceDescriptor, options: &EmitOptions) -> CompileResult<TokenStream> {
    let rt = &options.runtime;
    let visibility = visibility(service.accessibility);
    let protocol = ident(&service.protocol_name, &service.location)?;
    let struct_name = ident(&service.name, &service.location)?;

    let mut signatures = Vec::new();
    let mut bodies = Vec::new();
    for method in &service.methods {
        signatures.push(signature_tokens(method, rt)?);
        bodies.push(body_tokens(method, rt)?);
    }

    let protocol_tokens = if options.emit_protocols {
        let protocol_docs = doc_tokens(service.comment.as_deref());
        let method_docs = service
            .methods
            .iter()
            .map(|method| doc_tokens(method.comment.as_deref()));
        Some(quote! {
            #protocol_docs
            #visibility trait #protocol {
                #(
                    #method_docs
                    #signatures;
                )*
            }
        })
    } else {
        None
    };

    let struct_doc = format!(" Implementation of [`{}`] over a web service.", service.protocol_name);
    Ok(quote! {
        #protocol_tokens

        #[doc = #struct_doc]
        #[derive(::std::clone::Clone)]
        #visibility struct #struct_name {
            web_service: #rt::WebService,
        }
        impl #struct_name {
            pub fn new(web_service: #rt::WebService) -> Self {
                Self { web_service }
            }

            pub fn web_service(&self) -> &#rt::WebService {
                &self.web_service
            }
        }
        impl #protocol for #struct_name {
            #(
                #[allow(unused_variables)]
                #signatures {
                    #bodies
                }
            )*
        }
    })
}

fn signature_tokens(method: &MethodDescriptor, rt: &syn::Path) -> CompileResult<TokenStream> {
    let name = ident(&method.name, &method.location)?;
    let arguments = method
        .arguments
        .iter()
        .map(|argument| {
            let name = ident(&argument.name, &method.location)?;
            let ty = type_tokens(&argument.type_reference, &method.location)?;
            Ok(quote! { #name: #ty })
        })
        .collect::<CompileResult<Vec<_>>>()?;
    let payload = type_tokens(method.payload_type(), &method.location)?;
    let wrapper = match method.return_shape {
        ServiceCallShape::Sync(_) => format_ident!("ServiceCall"),
        ServiceCallShape::Cancelable(_) => format_ident!("CancelableServiceCall"),
        ServiceCallShape::Invalid => {
            return Err(CompileError::InvalidReturnType {
                method: method.name.clone(),
                location: method.location.clone(),
            })
        }
    };
    Ok(quote! {
        fn #name(&self, #(#arguments),*) -> #rt::#wrapper<#payload>
    })
}

fn body_tokens(method: &MethodDescriptor, rt: &syn::Path) -> CompileResult<TokenStream> {
    let location = &method.location;
    let request = &method.request;
    let payload_type = type_tokens(method.payload_type(), location)?;

    let json = binding_tokens(&request.json_bindings, rt, location)?;
    let query = binding_tokens(&request.query_bindings, rt, location)?;
    let plist = binding_tokens(&request.plist_bindings, rt, location)?;
    let headers = binding_tokens(&request.header_bindings, rt, location)?;
    let verb = format_ident!("{}", request.http_verb.variant_name());
    let endpoint = endpoint_tokens(&request.endpoint, location)?;
    let request_interceptors = request
        .request_interceptors
        .iter()
        .map(|x| interceptor_tokens(x, quote! { #rt::HttpRequestInterceptor }))
        .collect::<CompileResult<Vec<_>>>()?;
    let response_interceptors = request
        .response_interceptors
        .iter()
        .map(|x| interceptor_tokens(x, quote! { #rt::HttpResponseInterceptor }))
        .collect::<CompileResult<Vec<_>>>()?;

    let build_request = quote! {
        let json_parameters = web_service.fill_request_parameters(
            web_service.json_parameters(),
            ::std::vec![#(#json),*],
        );
        let url_parameters = web_service.fill_request_parameters(
            web_service.url_parameters(),
            ::std::vec![#(#query),*],
        );
        let plist_parameters = web_service.fill_request_parameters(
            web_service.plist_parameters(),
            ::std::vec![#(#plist),*],
        );
        let request = #rt::HttpRequest {
            http_method: #rt::HttpMethod::#verb,
            endpoint: #endpoint,
            headers: web_service.fill_headers(::std::vec![#(#headers),*]),
            parameters: ::std::vec![json_parameters, url_parameters, plist_parameters],
            request_interceptors: ::std::vec![#(#request_interceptors),*],
            response_interceptors: ::std::vec![#(#response_interceptors),*],
            base: ::std::option::Option::Some(::std::boxed::Box::new(web_service.base_request())),
        };
    };

    let (choose_parser, success_arm) = match &method.payload {
        PayloadExtraction::Nothing => (
            None,
            quote! {
                ::std::result::Result::Ok(_) => ::std::result::Result::Ok(()),
            },
        ),
        extraction => {
            let entity = entity_tokens(extraction, location)?;
            let extract = extraction_tokens(extraction, rt, location)?;
            (
                Some(quote! {
                    let parser = web_service.object_parser::<#entity>(&request.endpoint);
                }),
                quote! {
                    ::std::result::Result::Ok(http_response) => {
                        let payload: #payload_type = #extract;
                        ::std::result::Result::Ok(payload)
                    }
                },
            )
        }
    };
    let failure_arm = quote! {
        ::std::result::Result::Err(error) => {
            ::std::result::Result::Err(#rt::ServiceCallError::from(error))
        }
    };

    Ok(match method.return_shape {
        ServiceCallShape::Cancelable(_) => quote! {
            let web_service = self.web_service.clone();
            self.web_service.create_cancelable_call::<#payload_type, _>(move |this, completion| {
                #build_request
                #choose_parser
                let http_call = web_service.transport().send_with_callback(
                    request,
                    ::std::boxed::Box::new(move |result: #rt::TransportResult| {
                        let result: #rt::ServiceCallResult<#payload_type> = match result {
                            #success_arm
                            #failure_arm
                        };
                        completion.complete(result);
                    }),
                );
                this.on_cancel(move || http_call.cancel());
                ::std::result::Result::Ok(())
            })
        },
        _ => quote! {
            let web_service = self.web_service.clone();
            self.web_service.create_call::<#payload_type, _>(move || {
                #build_request
                #choose_parser
                match web_service.transport().send(&request) {
                    #success_arm
                    #failure_arm
                }
            })
        },
    })
}

/// What the object parser looks for in the response.
fn entity_tokens(extraction: &PayloadExtraction, location: &SourceLocation) -> CompileResult<TokenStream> {
    match extraction {
        PayloadExtraction::Nothing => Ok(quote! { () }),
        PayloadExtraction::Collection { element, .. }
        | PayloadExtraction::FirstOrNone { element }
        | PayloadExtraction::FirstRequired { element } => type_tokens(element, location),
    }
}

fn extraction_tokens(
    extraction: &PayloadExtraction,
    rt: &syn::Path,
    location: &SourceLocation,
) -> CompileResult<TokenStream> {
    let parsed = quote! { parser.parse_bytes(&http_response.body) };
    Ok(match extraction {
        PayloadExtraction::Nothing => quote! { () },
        PayloadExtraction::Collection { key: None, .. } => parsed,
        PayloadExtraction::Collection { key: Some(key), .. } => {
            let key = type_tokens(key, location)?;
            quote! {
                parser
                    .parse_entries_bytes::<#key>(&http_response.body)
                    .into_iter()
                    .collect()
            }
        }
        PayloadExtraction::FirstOrNone { .. } => quote! { #parsed.into_iter().next() },
        PayloadExtraction::FirstRequired { .. } => quote! { #rt::first_required(#parsed) },
    })
}

fn binding_tokens(
    bindings: &[ParameterBinding],
    rt: &syn::Path,
    location: &SourceLocation,
) -> CompileResult<Vec<TokenStream>> {
    bindings
        .iter()
        .map(|binding| {
            let key = &binding.key;
            let argument = ident(&binding.argument, location)?;
            Ok(quote! { (#key, #rt::parameter(&#argument)?) })
        })
        .collect()
}

fn endpoint_tokens(endpoint: &Endpoint, location: &SourceLocation) -> CompileResult<TokenStream> {
    if endpoint.is_literal() {
        let text = endpoint.template();
        return Ok(quote! { ::std::string::String::from(#text) });
    }
    let mut format = String::new();
    let mut arguments = Vec::new();
    for segment in &endpoint.segments {
        match segment {
            Segment::Literal(text) => format.push_str(&text.replace('{', "{{").replace('}', "}}")),
            Segment::Argument(argument) => {
                format.push_str("{}");
                arguments.push(ident(argument, location)?);
            }
        }
    }
    Ok(quote! { ::std::format!(#format, #(#arguments),*) })
}

fn interceptor_tokens(path: &str, interface: TokenStream) -> CompileResult<TokenStream> {
    let path: syn::Path = syn::parse_str(path).map_err(|_| CompileError::InvalidPath {
        path: path.to_string(),
    })?;
    Ok(quote! {
        ::std::sync::Arc::new(<#path>::default()) as ::std::sync::Arc<dyn #interface>
    })
}

pub(crate) fn type_tokens(reference: &TypeReference, location: &SourceLocation) -> CompileResult<TokenStream> {
    let named = |name: &str| -> CompileResult<syn::Path> {
        syn::parse_str(name).map_err(|_| CompileError::InvalidTypeName {
            name: name.to_string(),
            location: location.clone(),
        })
    };
    Ok(match reference {
        TypeReference::Void => quote! { () },
        TypeReference::Primitive { name } => {
            let path = named(name)?;
            quote! { #path }
        }
        TypeReference::Optional { wrapped } => {
            let wrapped = type_tokens(wrapped, location)?;
            quote! { ::std::option::Option<#wrapped> }
        }
        TypeReference::Array { element } => {
            let element = type_tokens(element, location)?;
            quote! { ::std::vec::Vec<#element> }
        }
        TypeReference::Map { key, value } => {
            let key = type_tokens(key, location)?;
            let value = type_tokens(value, location)?;
            quote! { ::std::collections::HashMap<#key, #value> }
        }
        TypeReference::Generic { name, arguments } => {
            let path = named(name)?;
            let arguments = arguments
                .iter()
                .map(|x| type_tokens(x, location))
                .collect::<CompileResult<Vec<_>>>()?;
            quote! { #path<#(#arguments),*> }
        }
    })
}

fn ident(name: &str, location: &SourceLocation) -> CompileResult<syn::Ident> {
    syn::parse_str(name).map_err(|_| CompileError::InvalidIdentifier {
        name: name.to_string(),
        location: location.clone(),
    })
}

fn visibility(accessibility: Accessibility) -> TokenStream {
    match accessibility {
        Accessibility::Public => quote! { pub },
        Accessibility::Crate => quote! { pub(crate) },
        Accessibility::Private => quote! {},
    }
}

fn doc_tokens(comment: Option<&str>) -> TokenStream {
    let lines = comment
        .into_iter()
        .flat_map(str::lines)
        .map(|line| format!(" {line}"));
    quote! { #(#[doc = #lines])* }
}
