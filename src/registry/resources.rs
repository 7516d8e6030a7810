use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::Error;
use crate::types::resources::{ Resource, ResourceContents, ResourceTemplate };

/// Payload produced by a resource resolver
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceBody {
    Text(String),
    Blob(Vec<u8>),
}

impl From<String> for ResourceBody {
    fn from(text: String) -> Self {
        ResourceBody::Text(text)
    }
}

impl From<&str> for ResourceBody {
    fn from(text: &str) -> Self {
        ResourceBody::Text(text.to_string())
    }
}

/// Produces the content behind a resource URI
#[async_trait]
pub trait ResourceResolver: Send + Sync {
    /// `variables` holds the values captured by a URI template, empty for fixed resources
    async fn read(&self, uri: &str, variables: &HashMap<String, String>) -> Result<ResourceBody, Error>;
}

struct FnResolver<F> {
    resolver: F,
}

#[async_trait]
impl<F, Fut> ResourceResolver
    for FnResolver<F>
    where
        F: Fn(String, HashMap<String, String>) -> Fut + Send + Sync,
        Fut: Future<Output = Result<ResourceBody, Error>> + Send
{
    async fn read(&self, uri: &str, variables: &HashMap<String, String>) -> Result<ResourceBody, Error> {
        (self.resolver)(uri.to_string(), variables.clone()).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Variable(String),
}

/// A URI pattern with `{name}` placeholders, e.g. `resource://crypto_price/{symbol}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl UriTemplate {
    pub fn parse(template: &str) -> Result<Self, Error> {
        let invalid = |reason: &str| Error::Other(format!("Invalid URI template '{}': {}", template, reason));

        let mut segments = Vec::new();
        let mut rest = template;
        while !rest.is_empty() {
            match rest.find('{') {
                Some(0) => {
                    let end = rest.find('}').ok_or_else(|| invalid("unclosed '{'"))?;
                    let name = &rest[1..end];
                    if name.is_empty() || name.contains('{') {
                        return Err(invalid("empty or nested variable"));
                    }
                    if matches!(segments.last(), Some(Segment::Variable(_))) {
                        return Err(invalid("adjacent variables are ambiguous"));
                    }
                    segments.push(Segment::Variable(name.to_string()));
                    rest = &rest[end + 1..];
                }
                Some(start) => {
                    if rest[..start].contains('}') {
                        return Err(invalid("unmatched '}'"));
                    }
                    segments.push(Segment::Literal(rest[..start].to_string()));
                    rest = &rest[start..];
                }
                None => {
                    if rest.contains('}') {
                        return Err(invalid("unmatched '}'"));
                    }
                    segments.push(Segment::Literal(rest.to_string()));
                    rest = "";
                }
            }
        }

        Ok(Self {
            raw: template.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| {
            match s {
                Segment::Variable(name) => Some(name.as_str()),
                Segment::Literal(_) => None,
            }
        })
    }

    /// Match a concrete URI, returning the percent-decoded variable values.
    ///
    /// A variable matches one or more characters up to the next literal and
    /// never spans a `/`.
    pub fn matches(&self, uri: &str) -> Option<HashMap<String, String>> {
        let mut captured = HashMap::new();
        let mut rest = uri;

        for (index, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Literal(literal) => {
                    rest = rest.strip_prefix(literal.as_str())?;
                }
                Segment::Variable(name) => {
                    let end = match self.segments.get(index + 1) {
                        Some(Segment::Literal(next)) => rest.find(next.as_str())?,
                        _ => rest.len(),
                    };
                    let raw = &rest[..end];
                    if raw.is_empty() || raw.contains('/') {
                        return None;
                    }
                    let value = urlencoding::decode(raw).ok()?.into_owned();
                    captured.insert(name.clone(), value);
                    rest = &rest[end..];
                }
            }
        }

        if rest.is_empty() { Some(captured) } else { None }
    }
}

impl fmt::Display for UriTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn guess_mime_type(uri: &str) -> Option<String> {
    let path = uri.split_once("://").map_or(uri, |(_, path)| path);
    mime_guess::from_path(path).first().map(|m| m.essence_str().to_string())
}

/// A resource with a fixed URI
#[derive(Clone)]
pub struct ResourceSpec {
    pub uri: String,
    pub name: String,
    pub description: Option<String>,
    pub mime_type: Option<String>,
    resolver: Arc<dyn ResourceResolver>,
}

impl ResourceSpec {
    pub fn new(uri: impl Into<String>, name: impl Into<String>, resolver: impl ResourceResolver + 'static) -> Self {
        let uri = uri.into();
        Self {
            mime_type: guess_mime_type(&uri),
            uri,
            name: name.into(),
            description: None,
            resolver: Arc::new(resolver),
        }
    }

    pub fn from_fn<F, Fut>(uri: impl Into<String>, name: impl Into<String>, resolver: F) -> Self
        where
            F: Fn(String, HashMap<String, String>) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = Result<ResourceBody, Error>> + Send + 'static
    {
        Self::new(uri, name, FnResolver { resolver })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn resolver(&self) -> Arc<dyn ResourceResolver> {
        Arc::clone(&self.resolver)
    }

    pub fn to_resource(&self) -> Resource {
        Resource {
            uri: self.uri.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            mime_type: self.mime_type.clone(),
        }
    }
}

impl fmt::Debug for ResourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceSpec").field("uri", &self.uri).field("name", &self.name).finish_non_exhaustive()
    }
}

/// A family of resources addressed through a [`UriTemplate`]
#[derive(Clone)]
pub struct ResourceTemplateSpec {
    pub template: UriTemplate,
    pub name: String,
    pub description: Option<String>,
    pub mime_type: Option<String>,
    resolver: Arc<dyn ResourceResolver>,
}

impl ResourceTemplateSpec {
    pub fn new(
        template: &str,
        name: impl Into<String>,
        resolver: impl ResourceResolver + 'static
    ) -> Result<Self, Error> {
        Ok(Self {
            template: UriTemplate::parse(template)?,
            name: name.into(),
            description: None,
            mime_type: None,
            resolver: Arc::new(resolver),
        })
    }

    pub fn from_fn<F, Fut>(template: &str, name: impl Into<String>, resolver: F) -> Result<Self, Error>
        where
            F: Fn(String, HashMap<String, String>) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = Result<ResourceBody, Error>> + Send + 'static
    {
        Self::new(template, name, FnResolver { resolver })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn resolver(&self) -> Arc<dyn ResourceResolver> {
        Arc::clone(&self.resolver)
    }

    pub fn to_template(&self) -> ResourceTemplate {
        ResourceTemplate {
            uri_template: self.template.as_str().to_string(),
            name: self.name.clone(),
            description: self.description.clone(),
            mime_type: self.mime_type.clone(),
        }
    }
}

impl fmt::Debug for ResourceTemplateSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceTemplateSpec")
            .field("template", &self.template.as_str())
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Convert a resolver's payload into wire contents
pub(crate) fn into_contents(uri: &str, mime_type: Option<String>, body: ResourceBody) -> ResourceContents {
    match body {
        ResourceBody::Text(text) => ResourceContents::text(uri, mime_type, text),
        ResourceBody::Blob(bytes) => ResourceContents::blob(uri, mime_type, &bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_captures_variable() {
        let template = UriTemplate::parse("resource://crypto_price/{symbol}").unwrap();
        let vars = template.matches("resource://crypto_price/BTCUSDT").unwrap();
        assert_eq!(vars.get("symbol").map(String::as_str), Some("BTCUSDT"));
        assert_eq!(template.variables().collect::<Vec<_>>(), vec!["symbol"]);
    }

    #[test]
    fn test_template_decodes_percent_escapes() {
        let template = UriTemplate::parse("search://{query}/results").unwrap();
        let vars = template.matches("search://hello%20world/results").unwrap();
        assert_eq!(vars["query"], "hello world");
    }

    #[test]
    fn test_template_rejects_mismatches() {
        let template = UriTemplate::parse("resource://crypto_price/{symbol}").unwrap();
        assert!(template.matches("resource://crypto_price/").is_none());
        assert!(template.matches("resource://crypto_price/a/b").is_none());
        assert!(template.matches("resource://other/BTC").is_none());
    }

    #[test]
    fn test_invalid_templates_fail_to_parse() {
        assert!(UriTemplate::parse("resource://{unclosed").is_err());
        assert!(UriTemplate::parse("resource://{a}{b}").is_err());
        assert!(UriTemplate::parse("resource://x}").is_err());
    }

    #[test]
    fn test_mime_type_is_guessed_from_uri() {
        let spec = ResourceSpec::from_fn("file://notes.txt", "notes", |_, _| async {
            Ok(ResourceBody::from(""))
        });
        assert_eq!(spec.mime_type.as_deref(), Some("text/plain"));
    }
}
