//! Normalized view of the request a service method makes.

use std::fmt;

use tracing::warn;

use crate::annotation::{
    Annotated, HEADER, JSON, PLIST, QUERY, REQUEST_INTERCEPTOR, RESPONSE_INTERCEPTOR, URL,
};
use crate::declaration::Method;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum HttpVerb {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}
impl HttpVerb {
    /// Verb tags in the order they are scanned.
    pub const ALL: [HttpVerb; 7] = [
        HttpVerb::Get,
        HttpVerb::Post,
        HttpVerb::Put,
        HttpVerb::Patch,
        HttpVerb::Delete,
        HttpVerb::Head,
        HttpVerb::Options,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            HttpVerb::Get => "get",
            HttpVerb::Post => "post",
            HttpVerb::Put => "put",
            HttpVerb::Patch => "patch",
            HttpVerb::Delete => "delete",
            HttpVerb::Head => "head",
            HttpVerb::Options => "options",
        }
    }

    /// Name of the matching runtime `HttpMethod` variant.
    pub fn variant_name(&self) -> &'static str {
        match self {
            HttpVerb::Get => "Get",
            HttpVerb::Post => "Post",
            HttpVerb::Put => "Put",
            HttpVerb::Patch => "Patch",
            HttpVerb::Delete => "Delete",
            HttpVerb::Head => "Head",
            HttpVerb::Options => "Options",
        }
    }
}
impl fmt::Display for HttpVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Literal(String),
    /// The value of the named argument.
    Argument(String),
}

/// An endpoint template with its placeholders already bound to arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub segments: Vec<Segment>,
}
impl Endpoint {
    pub fn literal(template: &str) -> Self {
        let mut endpoint = Endpoint::default();
        endpoint.push_literal(template);
        endpoint
    }

    /// Replaces every `{placeholder}` in the literal parts of the endpoint
    /// with a reference to `argument`.
    pub fn substitute(&mut self, placeholder: &str, argument: &str) {
        let token = format!("{{{placeholder}}}");
        let mut substituted = Endpoint::default();
        for segment in self.segments.drain(..) {
            let text = match segment {
                Segment::Literal(text) => text,
                argument_segment => {
                    substituted.segments.push(argument_segment);
                    continue;
                }
            };
            let mut pieces = text.split(token.as_str());
            if let Some(first) = pieces.next() {
                substituted.push_literal(first);
            }
            for piece in pieces {
                substituted
                    .segments
                    .push(Segment::Argument(argument.to_string()));
                substituted.push_literal(piece);
            }
        }
        *self = substituted;
    }

    /// `{name}` tokens left in the literal parts of the endpoint.
    pub fn unresolved_placeholders(&self) -> Vec<String> {
        let mut placeholders = Vec::new();
        for segment in &self.segments {
            let mut text = match segment {
                Segment::Literal(text) => text.as_str(),
                Segment::Argument(_) => continue,
            };
            while let Some(start) = text.find('{') {
                let after = &text[start + 1..];
                match after.find('}') {
                    Some(end) => {
                        placeholders.push(after[..end].to_string());
                        text = &after[end + 1..];
                    }
                    None => break,
                }
            }
        }
        placeholders
    }

    pub fn is_literal(&self) -> bool {
        self.segments
            .iter()
            .all(|x| matches!(x, Segment::Literal(_)))
    }

    /// The endpoint with each argument reference written as `{argument}`.
    pub fn template(&self) -> String {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(text) => text.clone(),
                Segment::Argument(argument) => format!("{{{argument}}}"),
            })
            .collect()
    }

    fn push_literal(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        match self.segments.last_mut() {
            Some(Segment::Literal(last)) => last.push_str(text),
            _ => self.segments.push(Segment::Literal(text.to_string())),
        }
    }
}

/// Puts an argument's value under `key` in a parameter bucket or header.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParameterBinding {
    pub key: String,
    pub argument: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RequestDescriptor {
    pub http_verb: HttpVerb,
    pub endpoint: Endpoint,
    pub header_bindings: Vec<ParameterBinding>,
    pub json_bindings: Vec<ParameterBinding>,
    pub query_bindings: Vec<ParameterBinding>,
    pub plist_bindings: Vec<ParameterBinding>,
    /// Paths of the interceptor types, in the order they apply.
    pub request_interceptors: Vec<String>,
    pub response_interceptors: Vec<String>,
}

/// Builds the request `method` makes from its tags and its arguments' tags.
pub fn synthesize(method: &Method) -> RequestDescriptor {
    let mut endpoint = Endpoint::literal(&method.resolve_last(URL).unwrap_or_default());
    for argument in &method.arguments {
        if let Some(placeholder) = argument.resolve_last(URL) {
            endpoint.substitute(&placeholder, &argument.name);
        }
    }
    for placeholder in endpoint.unresolved_placeholders() {
        warn!(
            method = %method.name,
            location = %method.location,
            placeholder = %placeholder,
            "endpoint placeholder has no matching argument and is kept as written"
        );
    }

    let bindings = |tag: &str| -> Vec<ParameterBinding> {
        method
            .arguments
            .iter()
            .filter_map(|argument| {
                argument.resolve(tag).map(|key| ParameterBinding {
                    key,
                    argument: argument.name.clone(),
                })
            })
            .collect()
    };

    RequestDescriptor {
        http_verb: resolve_verb(method),
        endpoint,
        header_bindings: bindings(HEADER),
        json_bindings: bindings(JSON),
        query_bindings: bindings(QUERY),
        plist_bindings: bindings(PLIST),
        request_interceptors: method.resolve_all(REQUEST_INTERCEPTOR),
        response_interceptors: method.resolve_all(RESPONSE_INTERCEPTOR),
    }
}

/// Scans the verb tags in [HttpVerb::ALL] order; the last one present wins.
fn resolve_verb(method: &Method) -> HttpVerb {
    let mut verb = HttpVerb::default();
    for candidate in HttpVerb::ALL {
        if method.has_tag(candidate.tag()) {
            verb = candidate;
        }
    }
    verb
}
