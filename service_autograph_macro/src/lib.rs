use std::{env, fs, path::PathBuf};

use proc_macro2::TokenStream;
use quote::quote;
use syn::{parse, parse_macro_input, parse_quote, LitStr};

use service_autograph_codegen::compiler::compile;
use service_autograph_codegen::emit::{key_map_tokens, service_tokens, EmitOptions};
use service_autograph_codegen::extract::{declaration_model, strip_argument_attributes};

macro_rules! my_compile_error {
    ($span:expr, $msg:expr) => {{
        return parse::Error::new($span, $msg).into_compile_error().into();
    }};
}

/// Macro to be used as a top-level item. It expands to the items of the
/// specified interface file, a client struct for every `@service` trait in
/// it, and the key maps of its models together with a `key_maps()` function.
///
/// The path is relative to the crate root.
///
/// Example: `interface_file!("src/person_service.rs");`
#[proc_macro]
pub fn interface_file(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input = parse_macro_input!(input as LitStr);
    let span = input.span();
    let base_dir = match env::var_os("CARGO_MANIFEST_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => match env::current_dir() {
            Ok(dir) => dir,
            Err(e) => my_compile_error!(span, format!("Unable to locate the crate root: {e}")),
        },
    };
    let interface_file_path = base_dir.join(input.value());
    let interface_file_contents = match fs::read_to_string(&interface_file_path) {
        Ok(s) => s,
        Err(e) => my_compile_error!(
            span,
            format!("Unable to read the specified interface file: {e}")
        ),
    };
    let mut interface = match syn::parse_file(&interface_file_contents) {
        Ok(x) => x,
        Err(e) => my_compile_error!(span, format!("Error parsing the interface file: {e}")),
    };
    let model = match declaration_model(&interface, &input.value()) {
        Ok(x) => x,
        Err(e) => my_compile_error!(span, format!("Error reading the interface file: {e}")),
    };
    strip_argument_attributes(&mut interface);

    // The interface items are emitted as written, so the protocol traits
    // already exist.
    let options = EmitOptions {
        runtime: parse_quote!(::service_autograph_lib::internal_for_macro),
        models: None,
        emit_protocols: false,
    };
    let compilation = compile(&model);
    let all_code_for_services: Vec<TokenStream> = compilation
        .services
        .iter()
        .map(|service| {
            let tokens = match service {
                Ok(service) => service_tokens(service, &options),
                Err(e) => Err(e.clone()),
            };
            tokens.unwrap_or_else(|e| parse::Error::new(span, e.to_string()).into_compile_error())
        })
        .collect();
    let code_for_key_maps = match key_map_tokens(&compilation.models, &options.runtime, None) {
        Ok(x) => x,
        Err(e) => my_compile_error!(span, e.to_string()),
    };

    let path_str = match interface_file_path.to_str() {
        Some(x) => x,
        None => my_compile_error!(span, "The interface file path is not valid UTF-8."),
    };
    let interface_items = &interface.items;
    quote! {
        const _: &str = include_str!(#path_str);
        #(#interface_items)*
        #(#all_code_for_services)*
        #code_for_key_maps
    }
    .into()
}
