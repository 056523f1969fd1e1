//! Builds the declaration model from Rust interface files.
//!
//! An interface file is Rust source whose traits are service protocols and
//! whose structs are models. Tags live in doc comments, including doc
//! comments on trait method parameters, which rustc itself does not accept.
//! Such files are therefore read by the generator only; use
//! [strip_argument_attributes] before handing their items to rustc.

use std::collections::HashSet;

use proc_macro2::Span;
use quote::ToTokens;
use syn::punctuated::Punctuated;
use syn::{
    Attribute, Expr, ExprLit, Fields, FnArg, GenericArgument, Item, ItemStruct, ItemTrait, Lit,
    Meta, Pat, PathArguments, ReturnType, Token, TraitItem, TraitItemFn, Type, Visibility,
};
use tracing::debug;

use crate::annotation::parse_doc;
use crate::declaration::{
    Accessibility, Annotation, Argument, DeclarationModel, Method, Property, Protocol, SourceLocation,
    Structure, TypeReference,
};

pub fn declaration_model(file: &syn::File, file_name: &str) -> syn::Result<DeclarationModel> {
    let mut model = DeclarationModel::new();
    collect_items(&file.items, file_name, &mut model)?;
    debug!(
        file = file_name,
        protocols = model.protocols.len(),
        structures = model.structures.len(),
        "extracted declarations"
    );
    Ok(model)
}

/// Parses every `(file name, source)` pair into one model. A file name seen
/// before is skipped, so model and service inputs may overlap.
pub fn extract_sources<'a>(
    sources: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> syn::Result<DeclarationModel> {
    let mut seen = HashSet::new();
    let mut model = DeclarationModel::new();
    for (file_name, source) in sources {
        if !seen.insert(file_name) {
            continue;
        }
        let file = syn::parse_file(source)?;
        model.extend(declaration_model(&file, file_name)?);
    }
    Ok(model)
}

/// Removes the doc comments of trait method parameters, turning an
/// interface file into Rust that compiles.
pub fn strip_argument_attributes(file: &mut syn::File) {
    strip_items(&mut file.items);
}

fn strip_items(items: &mut [Item]) {
    for item in items {
        match item {
            Item::Trait(item) => {
                for trait_item in &mut item.items {
                    if let TraitItem::Fn(method) = trait_item {
                        for input in &mut method.sig.inputs {
                            if let FnArg::Typed(argument) = input {
                                argument.attrs.retain(|x| !x.path().is_ident("doc"));
                            }
                        }
                    }
                }
            }
            Item::Mod(item) => {
                if let Some((_, items)) = &mut item.content {
                    strip_items(items);
                }
            }
            _ => (),
        }
    }
}

fn collect_items(items: &[Item], file_name: &str, model: &mut DeclarationModel) -> syn::Result<()> {
    for item in items {
        match item {
            Item::Trait(item) => model.protocols.push(protocol(item, file_name)?),
            Item::Struct(item) => model.structures.push(structure(item, file_name)?),
            Item::Mod(item) => {
                if let Some((_, items)) = &item.content {
                    collect_items(items, file_name, model)?;
                }
            }
            _ => (),
        }
    }
    Ok(())
}

fn protocol(item: &ItemTrait, file_name: &str) -> syn::Result<Protocol> {
    let (comment, annotations) = docs(&item.attrs);
    let methods = item
        .items
        .iter()
        .filter_map(|x| match x {
            TraitItem::Fn(method) => Some(method),
            _ => None,
        })
        .map(|x| method(x, file_name))
        .collect::<syn::Result<Vec<_>>>()?;
    Ok(Protocol {
        name: item.ident.to_string(),
        comment,
        annotations,
        accessibility: accessibility(&item.vis),
        methods,
        location: location(file_name, item.ident.span()),
    })
}

fn method(item: &TraitItemFn, file_name: &str) -> syn::Result<Method> {
    let (comment, annotations) = docs(&item.attrs);
    let mut arguments = Vec::new();
    for input in &item.sig.inputs {
        let argument = match input {
            FnArg::Receiver(_) => continue,
            FnArg::Typed(argument) => argument,
        };
        let name = match &*argument.pat {
            Pat::Ident(pat) => pat.ident.to_string(),
            other => {
                return Err(syn::Error::new_spanned(
                    other,
                    "service method arguments must be plain identifiers",
                ))
            }
        };
        let (_, argument_annotations) = docs(&argument.attrs);
        arguments.push(Argument {
            name,
            type_reference: type_reference(&argument.ty)?,
            annotations: argument_annotations,
        });
    }
    let return_type = match &item.sig.output {
        ReturnType::Default => None,
        ReturnType::Type(_, ty) => Some(lenient_type_reference(ty)),
    };
    Ok(Method {
        name: item.sig.ident.to_string(),
        comment,
        annotations,
        arguments,
        return_type,
        location: location(file_name, item.sig.ident.span()),
    })
}

fn structure(item: &ItemStruct, file_name: &str) -> syn::Result<Structure> {
    let (comment, annotations) = docs(&item.attrs);
    let mut inherited_types = Vec::new();
    for attr in item.attrs.iter().filter(|x| x.path().is_ident("derive")) {
        let derives =
            attr.parse_args_with(Punctuated::<syn::Path, Token![,]>::parse_terminated)?;
        inherited_types.extend(derives.iter().map(path_name));
    }
    let properties = match &item.fields {
        Fields::Named(fields) => fields
            .named
            .iter()
            .filter_map(|field| {
                let name = field.ident.as_ref()?;
                let (comment, annotations) = docs(&field.attrs);
                Some(Property {
                    name: name.to_string(),
                    comment,
                    annotations,
                    type_reference: lenient_type_reference(&field.ty),
                    location: location(file_name, name.span()),
                })
            })
            .collect(),
        Fields::Unnamed(_) | Fields::Unit => Vec::new(),
    };
    Ok(Structure {
        name: item.ident.to_string(),
        comment,
        annotations,
        accessibility: accessibility(&item.vis),
        inherited_types,
        properties,
        location: location(file_name, item.ident.span()),
    })
}

fn docs(attrs: &[Attribute]) -> (Option<String>, Vec<Annotation>) {
    let lines: Vec<String> = attrs
        .iter()
        .filter(|x| x.path().is_ident("doc"))
        .filter_map(|x| match &x.meta {
            Meta::NameValue(meta) => match &meta.value {
                Expr::Lit(ExprLit {
                    lit: Lit::Str(text),
                    ..
                }) => Some(text.value()),
                _ => None,
            },
            _ => None,
        })
        .collect();
    parse_doc(lines.iter().map(String::as_str))
}

/// Maps a Rust type onto the declaration model.
pub fn type_reference(ty: &Type) -> syn::Result<TypeReference> {
    match ty {
        Type::Tuple(tuple) if tuple.elems.is_empty() => Ok(TypeReference::Void),
        Type::Paren(paren) => type_reference(&paren.elem),
        Type::Group(group) => type_reference(&group.elem),
        Type::Path(path) if path.qself.is_none() => {
            let path = &path.path;
            let last = path
                .segments
                .last()
                .ok_or_else(|| syn::Error::new_spanned(path, "empty type path"))?;
            if let Some(segment) = path.segments.iter().rev().skip(1).find(|x| !x.arguments.is_empty()) {
                return Err(syn::Error::new_spanned(
                    segment,
                    "type arguments are only supported on the last path segment",
                ));
            }
            let arguments = match &last.arguments {
                PathArguments::None => return Ok(TypeReference::primitive(path_name(path))),
                PathArguments::AngleBracketed(arguments) => arguments
                    .args
                    .iter()
                    .map(|x| match x {
                        GenericArgument::Type(ty) => type_reference(ty),
                        other => Err(syn::Error::new_spanned(
                            other,
                            "only type arguments are supported in interface declarations",
                        )),
                    })
                    .collect::<syn::Result<Vec<_>>>()?,
                PathArguments::Parenthesized(arguments) => {
                    return Err(syn::Error::new_spanned(
                        arguments,
                        "function traits are not supported in interface declarations",
                    ))
                }
            };
            let mut arguments = arguments.into_iter();
            Ok(match (last.ident.to_string().as_str(), arguments.len()) {
                ("Option", 1) => TypeReference::optional(arguments.next().unwrap_or(TypeReference::Void)),
                ("Vec", 1) => TypeReference::array(arguments.next().unwrap_or(TypeReference::Void)),
                ("HashMap", 2) => {
                    let key = arguments.next().unwrap_or(TypeReference::Void);
                    let value = arguments.next().unwrap_or(TypeReference::Void);
                    TypeReference::map(key, value)
                }
                _ => TypeReference::generic(path_name(path), arguments.collect()),
            })
        }
        other => Err(syn::Error::new_spanned(
            other,
            "unsupported type in interface declaration; use a named, owned type",
        )),
    }
}

/// Like [type_reference], but keeps an unsupported type as an opaque
/// primitive so that later stages can report it in context.
fn lenient_type_reference(ty: &Type) -> TypeReference {
    type_reference(ty)
        .unwrap_or_else(|_| TypeReference::primitive(ty.to_token_stream().to_string()))
}

/// The path without type arguments, e.g. `std::collections::BTreeMap`.
fn path_name(path: &syn::Path) -> String {
    let segments: Vec<String> = path.segments.iter().map(|x| x.ident.to_string()).collect();
    let name = segments.join("::");
    if path.leading_colon.is_some() {
        format!("::{name}")
    } else {
        name
    }
}

fn accessibility(visibility: &Visibility) -> Accessibility {
    match visibility {
        Visibility::Public(_) => Accessibility::Public,
        Visibility::Restricted(_) => Accessibility::Crate,
        Visibility::Inherited => Accessibility::Private,
    }
}

/// Line and column come from `proc-macro2`'s `span-locations`. Inside a
/// proc-macro, compilers that do not expose span positions to `proc-macro2`
/// yield line 0 and column 1, so macro diagnostics may carry that
/// placeholder location.
fn location(file_name: &str, span: Span) -> SourceLocation {
    let start = span.start();
    SourceLocation {
        file: file_name.to_string(),
        line: start.line,
        column: start.column + 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERFACE: &str = r#"
        use serde::Deserialize;

        /// A passport.
        #[derive(Debug, Clone, serde::Deserialize)]
        pub struct Passport {
            /// @json
            pub number: String,
        }

        pub mod people {
            /// Service serving people.
            ///
            /// @service
            pub trait PersonService {
                /// Get single `Person`.
                ///
                /// @url /{id}
                fn get(
                    &self,
                    /// @url
                    id: u64,
                ) -> ServiceCall<Option<Person>>;

                fn all(&self) -> ServiceCall<std::collections::HashMap<String, Vec<Person>>>;

                fn broken(&self) -> &'static str;
            }
        }
    "#;

    fn model() -> DeclarationModel {
        extract_sources([("people.rs", INTERFACE), ("people.rs", INTERFACE)]).unwrap()
    }

    #[test]
    fn test_extract_structures() {
        let model = model();
        assert_eq!(model.structures.len(), 1);
        let passport = &model.structures[0];
        assert_eq!(passport.name, "Passport");
        assert_eq!(passport.comment.as_deref(), Some("A passport."));
        assert_eq!(
            passport.inherited_types,
            vec!["Debug", "Clone", "serde::Deserialize"]
        );
        assert_eq!(passport.accessibility, Accessibility::Public);
        assert_eq!(passport.properties[0].annotations, vec![Annotation::new("json", None)]);
        assert_eq!(passport.location.file, "people.rs");
    }

    #[test]
    fn test_extract_protocols_in_nested_modules() {
        let model = model();
        assert_eq!(model.protocols.len(), 1);
        let service = &model.protocols[0];
        assert_eq!(service.name, "PersonService");
        assert_eq!(service.comment.as_deref(), Some("Service serving people."));
        assert_eq!(service.annotations, vec![Annotation::new("service", None)]);

        let get = &service.methods[0];
        assert_eq!(get.annotations, vec![Annotation::new("url", Some("/{id}"))]);
        assert_eq!(get.arguments.len(), 1);
        assert_eq!(get.arguments[0].name, "id");
        assert_eq!(get.arguments[0].annotations, vec![Annotation::new("url", None)]);
        assert_eq!(
            get.return_type,
            Some(TypeReference::generic(
                "ServiceCall",
                vec![TypeReference::optional(TypeReference::primitive("Person"))]
            ))
        );

        let all = &service.methods[1];
        assert_eq!(
            all.return_type,
            Some(TypeReference::generic(
                "ServiceCall",
                vec![TypeReference::map(
                    TypeReference::primitive("String"),
                    TypeReference::array(TypeReference::primitive("Person")),
                )]
            ))
        );

        let broken = &service.methods[2];
        assert!(matches!(broken.return_type, Some(TypeReference::Primitive { .. })));
    }

    #[test]
    fn test_unsupported_argument_type() {
        let source = "trait Service { fn get(&self, id: &str) -> ServiceCall<()>; }";
        assert!(extract_sources([("service.rs", source)]).is_err());
    }

    #[test]
    fn test_strip_argument_attributes() {
        let mut file = syn::parse_file(INTERFACE).unwrap();
        strip_argument_attributes(&mut file);
        let stripped = file.to_token_stream().to_string();
        assert!(!stripped.contains("\" @url\""));
        let model = declaration_model(&file, "people.rs").unwrap();
        assert!(model.protocols[0].methods[0].arguments[0].annotations.is_empty());
        // Method docs stay.
        assert_eq!(
            model.protocols[0].methods[0].annotations,
            vec![Annotation::new("url", Some("/{id}"))]
        );
    }
}
