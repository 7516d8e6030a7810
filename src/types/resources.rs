//! Resource Types
//!
//! This module defines types related to resources: the fixed resources and URI
//! templates a server advertises, and the contents returned by `resources/read`.

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use serde::{ Deserialize, Serialize };

/// Represents a resource with a fixed URI
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// Unique identifier for the resource
    pub uri: String,
    /// Human-readable name for the resource
    pub name: String,
    /// Optional description of the resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// MIME type of the resource content (e.g., "text/plain")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// A family of resources addressed through a URI template such as `resource://crypto_price/{symbol}`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTemplate {
    pub uri_template: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Result of listing resources
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ListResourcesResult {
    pub resources: Vec<Resource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Result of listing resource templates
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ListResourceTemplatesResult {
    pub resource_templates: Vec<ResourceTemplate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Parameters for reading a resource
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ReadResourceParams {
    /// URI of the resource to read
    pub uri: String,
}

/// Result of reading a resource
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ReadResourceResult {
    pub contents: Vec<ResourceContents>,
}

/// The content of a single resource, either text or base64 encoded bytes
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContents {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob: Option<String>,
}

impl ResourceContents {
    pub fn text(uri: impl Into<String>, mime_type: Option<String>, text: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            mime_type,
            text: Some(text.into()),
            blob: None,
        }
    }

    pub fn blob(uri: impl Into<String>, mime_type: Option<String>, bytes: &[u8]) -> Self {
        Self {
            uri: uri.into(),
            mime_type,
            text: None,
            blob: Some(BASE64_STANDARD.encode(bytes)),
        }
    }

    /// Decode the blob payload, if this is binary content
    pub fn decode_blob(&self) -> Option<Vec<u8>> {
        self.blob.as_ref().and_then(|b| BASE64_STANDARD.decode(b).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_contents_are_base64() {
        let contents = ResourceContents::blob("file://x.bin", None, &[0, 1, 2, 255]);
        assert_eq!(contents.blob.as_deref(), Some("AAEC/w=="));
        assert_eq!(contents.decode_blob(), Some(vec![0, 1, 2, 255]));
    }

    #[test]
    fn test_template_serializes_camel_case() {
        let template = ResourceTemplate {
            uri_template: "resource://crypto_price/{symbol}".into(),
            name: "crypto_price".into(),
            description: None,
            mime_type: Some("text/plain".into()),
        };
        let wire = serde_json::to_value(&template).unwrap();
        assert_eq!(wire["uriTemplate"], "resource://crypto_price/{symbol}");
        assert_eq!(wire["mimeType"], "text/plain");
    }
}
