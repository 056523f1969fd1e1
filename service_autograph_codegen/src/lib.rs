//! Compiles annotated service traits and model structs into web service
//! clients.
//!
//! The pipeline is: [extract] (Rust interface files to a [DeclarationModel]),
//! [compiler] (declarations to descriptors), then [emit] (descriptors to
//! Rust source). [Generator] runs the last two steps and collects the output
//! files; the `service_autograph_macro` crate runs all three at compile time.

pub mod annotation;
pub mod classify;
pub mod compiler;
pub mod declaration;
pub mod emit;
pub mod error;
pub mod extract;
pub mod payload;
pub mod request;

use serde::Deserialize;
use tracing::{debug, warn};

pub use compiler::{compile, Compilation, ModelDescriptor, ServiceDescriptor};
pub use declaration::DeclarationModel;
pub use emit::{Artifact, EmitOptions};
pub use error::{CompileError, CompileResult};

/// Generator settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GeneratorOptions {
    /// Also emit the object parser with the models' key maps.
    pub write_parser: bool,
    /// Path, as seen from a generated service file, of the runtime module.
    pub runtime_path: String,
    /// Path glob-imported into generated service files to reach the models.
    pub models_path: Option<String>,
    /// Crate providing the transport types the runtime is written against.
    pub transport_path: String,
}
impl Default for GeneratorOptions {
    fn default() -> Self {
        GeneratorOptions {
            write_parser: false,
            runtime_path: "super::service".to_string(),
            models_path: Some("super".to_string()),
            transport_path: "::service_autograph_lib::transport".to_string(),
        }
    }
}
impl GeneratorOptions {
    pub fn emit_options(&self) -> CompileResult<EmitOptions> {
        Ok(EmitOptions {
            runtime: parse_path(&self.runtime_path)?,
            models: self.models_path.as_deref().map(parse_path).transpose()?,
            emit_protocols: true,
        })
    }
}

fn parse_path(path: &str) -> CompileResult<syn::Path> {
    syn::parse_str(path).map_err(|_| CompileError::InvalidPath {
        path: path.to_string(),
    })
}

/// Output of one generator run.
#[derive(Debug, Clone, Default)]
pub struct Generation {
    /// Generated files, in a stable order: services in declaration order,
    /// then the shared runtime files.
    pub artifacts: Vec<Artifact>,
    /// One entry per unit that failed. Failed units have no artifact.
    pub errors: Vec<CompileError>,
}
impl Generation {
    /// The artifacts, or the first error if any unit failed.
    pub fn into_result(self) -> CompileResult<Vec<Artifact>> {
        match self.errors.into_iter().next() {
            Some(error) => Err(error),
            None => Ok(self.artifacts),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Generator {
    options: GeneratorOptions,
}
impl Generator {
    pub fn new(options: GeneratorOptions) -> Self {
        Generator { options }
    }

    pub fn options(&self) -> &GeneratorOptions {
        &self.options
    }

    pub fn generate(&self, model: &DeclarationModel) -> Generation {
        let mut generation = Generation::default();
        let emit_options = match self.options.emit_options() {
            Ok(x) => x,
            Err(e) => {
                generation.errors.push(e);
                return generation;
            }
        };

        let compilation = compile(model);
        for service in compilation.services {
            match service.and_then(|x| emit::emit_service(&x, &emit_options)) {
                Ok(artifact) => generation.artifacts.push(artifact),
                Err(e) => {
                    warn!(error = %e, "service not generated");
                    generation.errors.push(e);
                }
            }
        }

        generation.artifacts.push(emit::emit_runtime());
        match parse_path(&self.options.transport_path).and_then(|x| emit::emit_transport(&x)) {
            Ok(artifact) => generation.artifacts.push(artifact),
            Err(e) => generation.errors.push(e),
        }
        if self.options.write_parser {
            match emit::emit_key_maps(&compilation.models, &emit_options) {
                Ok(artifact) => generation.artifacts.push(artifact),
                Err(e) => generation.errors.push(e),
            }
        }
        debug!(
            artifacts = generation.artifacts.len(),
            errors = generation.errors.len(),
            "generation finished"
        );
        generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_json() {
        let options: GeneratorOptions =
            serde_json::from_str(r#"{ "write_parser": true, "models_path": null }"#).unwrap();
        assert!(options.write_parser);
        assert_eq!(options.models_path, None);
        assert_eq!(options.runtime_path, "super::service");
    }

    #[test]
    fn test_invalid_runtime_path() {
        let generator = Generator::new(GeneratorOptions {
            runtime_path: "not a path".to_string(),
            ..Default::default()
        });
        let generation = generator.generate(&DeclarationModel::new());
        assert!(generation.artifacts.is_empty());
        assert!(matches!(
            generation.into_result(),
            Err(CompileError::InvalidPath { .. })
        ));
    }

    #[test]
    fn test_empty_model_still_ships_runtime() {
        let artifacts = Generator::default()
            .generate(&DeclarationModel::new())
            .into_result()
            .unwrap();
        let paths: Vec<&str> = artifacts.iter().map(|x| x.path.as_str()).collect();
        assert_eq!(paths, vec!["service.rs", "transport.rs"]);
    }
}
