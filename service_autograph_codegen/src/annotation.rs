/*
Grammar for tags inside doc comments, applied line by line:

// x? means x is optional
// "abcd" means literal string "abcd"

doc-line := tag-line | comment-line
tag-line := space* "@" tag-name ( space+ value? )?
tag-name := alphabetic ( alphanumeric | "_" )*
value := any text up to the end of the line, trimmed; a value wrapped in
         double quotes has them removed

Every line that is not a tag-line is part of the declaration's comment.
*/

use nom::{
    bytes::complete::take_while,
    character::complete::{char, satisfy, space0, space1},
    combinator::{all_consuming, map, opt, recognize, rest},
    sequence::{pair, preceded, tuple},
    IResult,
};

use crate::declaration::{Annotation, Argument, Method, Property, Protocol, Structure};

pub const SERVICE: &str = "service";
pub const URL: &str = "url";
pub const JSON: &str = "json";
pub const QUERY: &str = "query";
pub const PLIST: &str = "plist";
pub const HEADER: &str = "header";
pub const REQUEST_INTERCEPTOR: &str = "requestInterceptor";
pub const RESPONSE_INTERCEPTOR: &str = "responseInterceptor";

/// Appended to a protocol's name when `@service` carries no explicit name.
pub const SERVICE_NAME_SUFFIX: &str = "Gen";

/// Splits doc comment lines into the comment text and the tags.
pub fn parse_doc<'a>(lines: impl IntoIterator<Item = &'a str>) -> (Option<String>, Vec<Annotation>) {
    let mut comment = Vec::new();
    let mut annotations = Vec::new();
    let lines = lines
        .into_iter()
        .flat_map(|x| x.split('\n'))
        .map(|line| line.trim_end_matches('\r'));
    for line in lines {
        match parse_tag_line(line) {
            Ok((_, annotation)) => annotations.push(annotation),
            Err(_) => comment.push(line.strip_prefix(' ').unwrap_or(line).trim_end()),
        }
    }

    while comment.last().map_or(false, |line| line.is_empty()) {
        comment.pop();
    }
    let first_text = comment
        .iter()
        .position(|line| !line.is_empty())
        .unwrap_or(comment.len());
    let comment = &comment[first_text..];
    if comment.is_empty() {
        (None, annotations)
    } else {
        (Some(comment.join("\n")), annotations)
    }
}

fn parse_tag_line(input: &str) -> IResult<&str, Annotation> {
    all_consuming(map(
        tuple((
            space0,
            char('@'),
            parse_tag_name,
            opt(preceded(space1, rest)),
        )),
        |(_, _, name, value)| Annotation {
            name: name.to_string(),
            value: value.and_then(parse_value),
        },
    ))(input)
}

fn parse_tag_name(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|ch| ch.is_ascii_alphabetic()),
        take_while(|ch: char| ch.is_ascii_alphanumeric() || ch == '_'),
    ))(input)
}

fn parse_value(raw: &str) -> Option<String> {
    let value = raw.trim();
    let value = match value.strip_prefix('"').and_then(|x| x.strip_suffix('"')) {
        Some(unquoted) => unquoted,
        None => value,
    };
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// A declaration carrying tags.
///
/// Tags present without a value resolve to [Annotated::default_tag_value].
pub trait Annotated {
    fn annotations(&self) -> &[Annotation];

    fn default_tag_value(&self) -> String;

    fn has_tag(&self, name: &str) -> bool {
        self.annotations().iter().any(|x| x.name == name)
    }

    /// Value of the first `name` tag.
    fn resolve(&self, name: &str) -> Option<String> {
        let annotation = self.annotations().iter().find(|x| x.name == name)?;
        Some(
            annotation
                .value
                .clone()
                .unwrap_or_else(|| self.default_tag_value()),
        )
    }

    /// Value of the last `name` tag. Used for tags that should appear once
    /// but where duplicates must not fail the build.
    fn resolve_last(&self, name: &str) -> Option<String> {
        let annotation = self.annotations().iter().rev().find(|x| x.name == name)?;
        Some(
            annotation
                .value
                .clone()
                .unwrap_or_else(|| self.default_tag_value()),
        )
    }

    /// Values of every `name` tag, in source order. Tags without a value are
    /// skipped.
    fn resolve_all(&self, name: &str) -> Vec<String> {
        self.annotations()
            .iter()
            .filter(|x| x.name == name)
            .filter_map(|x| x.value.clone())
            .collect()
    }
}

impl Annotated for Argument {
    fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    fn default_tag_value(&self) -> String {
        self.name.clone()
    }
}

impl Annotated for Property {
    fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    fn default_tag_value(&self) -> String {
        self.name.clone()
    }
}

impl Annotated for Method {
    fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    fn default_tag_value(&self) -> String {
        self.name.clone()
    }
}

impl Annotated for Protocol {
    fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    fn default_tag_value(&self) -> String {
        format!("{}{SERVICE_NAME_SUFFIX}", self.name)
    }
}

impl Annotated for Structure {
    fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    fn default_tag_value(&self) -> String {
        self.name.clone()
    }
}
