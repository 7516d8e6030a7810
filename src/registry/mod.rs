//! Capability Registry
//!
//! The registry holds everything a server offers: tools, fixed resources,
//! resource templates and prompts. It is assembled once through
//! [`RegistryBuilder`] and then shared read-only by every session, so lookups
//! need no locking. Each kind has its own namespace and keeps registration
//! order for listing.

mod prompts;
mod resources;
mod tools;

use std::collections::HashMap;

use indexmap::IndexMap;
use indexmap::map::Entry;
use tracing::debug;

use crate::errors::{ Error, ItemKind };
use crate::types::initialize::{
    PromptsCapability,
    ResourcesCapability,
    ServerCapabilities,
    ToolsCapability,
};
use crate::types::prompts::GetPromptResult;
use crate::types::resources::ReadResourceResult;

pub use prompts::{ PromptRenderer, PromptSpec };
pub use resources::{ ResourceBody, ResourceResolver, ResourceSpec, ResourceTemplateSpec, UriTemplate };
pub use tools::{ ParamType, ParameterSchema, ParameterSpec, ToolHandler, ToolParams, ToolSpec };

fn insert_unique<T>(map: &mut IndexMap<String, T>, kind: ItemKind, name: String, item: T) -> Result<(), Error> {
    match map.entry(name) {
        Entry::Occupied(entry) => Err(Error::DuplicateName { kind, name: entry.key().clone() }),
        Entry::Vacant(entry) => {
            debug!("Registered {} '{}'", kind, entry.key());
            entry.insert(item);
            Ok(())
        }
    }
}

/// Mutable registry under construction
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    tools: IndexMap<String, ToolSpec>,
    resources: IndexMap<String, ResourceSpec>,
    templates: IndexMap<String, ResourceTemplateSpec>,
    prompts: IndexMap<String, PromptSpec>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_tool(&mut self, tool: ToolSpec) -> Result<&mut Self, Error> {
        insert_unique(&mut self.tools, ItemKind::Tool, tool.name.clone(), tool)?;
        Ok(self)
    }

    /// Register a fixed resource, keyed by its URI
    pub fn register_resource(&mut self, resource: ResourceSpec) -> Result<&mut Self, Error> {
        insert_unique(&mut self.resources, ItemKind::Resource, resource.uri.clone(), resource)?;
        Ok(self)
    }

    /// Register a resource template, keyed by its template string
    pub fn register_resource_template(&mut self, template: ResourceTemplateSpec) -> Result<&mut Self, Error> {
        let key = template.template.as_str().to_string();
        insert_unique(&mut self.templates, ItemKind::Resource, key, template)?;
        Ok(self)
    }

    pub fn register_prompt(&mut self, prompt: PromptSpec) -> Result<&mut Self, Error> {
        insert_unique(&mut self.prompts, ItemKind::Prompt, prompt.name.clone(), prompt)?;
        Ok(self)
    }

    pub fn build(self) -> Registry {
        Registry {
            tools: self.tools,
            resources: self.resources,
            templates: self.templates,
            prompts: self.prompts,
        }
    }
}

/// Immutable set of tools, resources and prompts served to clients
#[derive(Debug, Default)]
pub struct Registry {
    tools: IndexMap<String, ToolSpec>,
    resources: IndexMap<String, ResourceSpec>,
    templates: IndexMap<String, ResourceTemplateSpec>,
    prompts: IndexMap<String, PromptSpec>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Tools in registration order
    pub fn list_tools(&self) -> impl Iterator<Item = &ToolSpec> {
        self.tools.values()
    }

    pub fn get_tool(&self, name: &str) -> Result<&ToolSpec, Error> {
        self.tools.get(name).ok_or_else(|| Error::NotFound {
            kind: ItemKind::Tool,
            name: name.to_string(),
        })
    }

    pub fn list_resources(&self) -> impl Iterator<Item = &ResourceSpec> {
        self.resources.values()
    }

    pub fn list_resource_templates(&self) -> impl Iterator<Item = &ResourceTemplateSpec> {
        self.templates.values()
    }

    /// Read a resource by URI, trying fixed resources before templates
    pub async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, Error> {
        if let Some(resource) = self.resources.get(uri) {
            let body = resource.resolver().read(uri, &HashMap::new()).await?;
            return Ok(ReadResourceResult {
                contents: vec![resources::into_contents(uri, resource.mime_type.clone(), body)],
            });
        }

        for template in self.templates.values() {
            if let Some(variables) = template.template.matches(uri) {
                let body = template.resolver().read(uri, &variables).await?;
                return Ok(ReadResourceResult {
                    contents: vec![resources::into_contents(uri, template.mime_type.clone(), body)],
                });
            }
        }

        Err(Error::NotFound {
            kind: ItemKind::Resource,
            name: uri.to_string(),
        })
    }

    pub fn list_prompts(&self) -> impl Iterator<Item = &PromptSpec> {
        self.prompts.values()
    }

    pub fn get_prompt(&self, name: &str) -> Result<&PromptSpec, Error> {
        self.prompts.get(name).ok_or_else(|| Error::NotFound {
            kind: ItemKind::Prompt,
            name: name.to_string(),
        })
    }

    /// Validate arguments and render a prompt
    pub async fn render_prompt(
        &self,
        name: &str,
        arguments: &HashMap<String, String>
    ) -> Result<GetPromptResult, Error> {
        let prompt = self.get_prompt(name)?;
        prompt.validate(arguments)?;
        let messages = prompt.renderer().render(arguments).await?;
        Ok(GetPromptResult {
            description: prompt.description.clone(),
            messages,
        })
    }

    /// Advertise a feature only when something is registered for it
    pub fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            tools: (!self.tools.is_empty()).then(ToolsCapability::default),
            resources: (!self.resources.is_empty() || !self.templates.is_empty()).then(
                ResourcesCapability::default
            ),
            prompts: (!self.prompts.is_empty()).then(PromptsCapability::default),
            experimental: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::prompts::PromptArgument;
    use serde_json::Value;

    fn tool(name: &str) -> ToolSpec {
        ToolSpec::from_fn(name, "test tool", ParameterSchema::new(), |_| async { Ok(Value::Null) })
    }

    #[test]
    fn test_duplicate_tool_is_rejected() {
        let mut builder = Registry::builder();
        builder.register_tool(tool("echo")).unwrap();
        let err = builder.register_tool(tool("echo")).unwrap_err();
        assert!(matches!(err, Error::DuplicateName { kind: ItemKind::Tool, ref name } if name == "echo"));
    }

    #[test]
    fn test_namespaces_are_separate() {
        let mut builder = Registry::builder();
        builder.register_tool(tool("summary")).unwrap();
        builder
            .register_prompt(PromptSpec::from_text("summary", "same name", vec![], |_| Ok(String::new())))
            .unwrap();
        let registry = builder.build();
        assert!(registry.get_tool("summary").is_ok());
        assert!(registry.get_prompt("summary").is_ok());
    }

    #[test]
    fn test_listing_keeps_registration_order() {
        let mut builder = Registry::builder();
        for name in ["zeta", "alpha", "mid"] {
            builder.register_tool(tool(name)).unwrap();
        }
        let registry = builder.build();
        let names: Vec<_> = registry.list_tools().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_unknown_tool_is_not_found() {
        let registry = Registry::builder().build();
        let err = registry.get_tool("bogus").unwrap_err();
        assert_eq!(err.to_string(), "Unknown tool: bogus");
    }

    #[test]
    fn test_capabilities_follow_contents() {
        let empty = Registry::builder().build().capabilities();
        assert!(empty.tools.is_none() && empty.resources.is_none() && empty.prompts.is_none());

        let mut builder = Registry::builder();
        builder.register_tool(tool("echo")).unwrap();
        let caps = builder.build().capabilities();
        assert!(caps.tools.is_some());
        assert!(caps.prompts.is_none());
    }

    #[tokio::test]
    async fn test_template_resource_is_resolved() {
        let mut builder = Registry::builder();
        builder
            .register_resource_template(
                ResourceTemplateSpec::from_fn("resource://price/{symbol}", "price", |_, vars| async move {
                    Ok(ResourceBody::Text(format!("price of {}", vars["symbol"])))
                }).unwrap()
            )
            .unwrap();
        let registry = builder.build();

        let result = registry.read_resource("resource://price/ETH").await.unwrap();
        assert_eq!(result.contents[0].text.as_deref(), Some("price of ETH"));

        let err = registry.read_resource("resource://other").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: ItemKind::Resource, .. }));
    }

    #[tokio::test]
    async fn test_prompt_requires_declared_arguments() {
        let mut builder = Registry::builder();
        builder
            .register_prompt(
                PromptSpec::from_text(
                    "crypto_summary",
                    "Summarize a coin",
                    vec![PromptArgument::required("crypto", "Coin name")],
                    |args| Ok(format!("Summarize {}", args["crypto"]))
                )
            )
            .unwrap();
        let registry = builder.build();

        let err = registry.render_prompt("crypto_summary", &HashMap::new()).await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));

        let mut args = HashMap::new();
        args.insert("crypto".to_string(), "bitcoin".to_string());
        let rendered = registry.render_prompt("crypto_summary", &args).await.unwrap();
        assert_eq!(rendered.messages.len(), 1);
    }
}
