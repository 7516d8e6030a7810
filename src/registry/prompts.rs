use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::{ Error, FieldError };
use crate::types::prompts::{ Prompt, PromptArgument, PromptMessage };

/// Renders a prompt template into messages
#[async_trait]
pub trait PromptRenderer: Send + Sync {
    async fn render(&self, arguments: &HashMap<String, String>) -> Result<Vec<PromptMessage>, Error>;
}

/// Adapter for synchronous closures producing a single user message
struct TextRenderer<F> {
    render: F,
}

#[async_trait]
impl<F> PromptRenderer
    for TextRenderer<F>
    where F: Fn(&HashMap<String, String>) -> Result<String, Error> + Send + Sync
{
    async fn render(&self, arguments: &HashMap<String, String>) -> Result<Vec<PromptMessage>, Error> {
        Ok(vec![PromptMessage::user((self.render)(arguments)?)])
    }
}

/// A named prompt template with its declared arguments
#[derive(Clone)]
pub struct PromptSpec {
    pub name: String,
    pub description: Option<String>,
    pub arguments: Vec<PromptArgument>,
    renderer: Arc<dyn PromptRenderer>,
}

impl PromptSpec {
    pub fn new(
        name: impl Into<String>,
        description: Option<String>,
        arguments: Vec<PromptArgument>,
        renderer: impl PromptRenderer + 'static
    ) -> Self {
        Self {
            name: name.into(),
            description,
            arguments,
            renderer: Arc::new(renderer),
        }
    }

    /// Build a prompt whose text is produced by a closure over its arguments
    pub fn from_text<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        arguments: Vec<PromptArgument>,
        render: F
    ) -> Self
        where F: Fn(&HashMap<String, String>) -> Result<String, Error> + Send + Sync + 'static
    {
        Self::new(name, Some(description.into()), arguments, TextRenderer { render })
    }

    /// Check that every required argument was supplied
    pub fn validate(&self, arguments: &HashMap<String, String>) -> Result<(), Error> {
        let fields: Vec<FieldError> = self.arguments
            .iter()
            .filter(|arg| arg.required && !arguments.contains_key(&arg.name))
            .map(|arg| FieldError::new(&arg.name, "missing required argument"))
            .collect();

        if fields.is_empty() { Ok(()) } else { Err(Error::Validation { fields }) }
    }

    pub fn renderer(&self) -> Arc<dyn PromptRenderer> {
        Arc::clone(&self.renderer)
    }

    pub fn to_prompt(&self) -> Prompt {
        Prompt {
            name: self.name.clone(),
            description: self.description.clone(),
            arguments: self.arguments.clone(),
        }
    }
}

impl fmt::Debug for PromptSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromptSpec")
            .field("name", &self.name)
            .field("arguments", &self.arguments)
            .finish_non_exhaustive()
    }
}
