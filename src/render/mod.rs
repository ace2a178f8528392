use std::collections::BTreeMap;

use crate::blocks::builtin;
use crate::compiler::{CompileError, Scope};

mod rules;

/// Binding strength of a value fragment. Prompt text never needs
/// parenthesizing, so this is carried through but never acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Atomic,
    None,
}

/// Output of rendering a single block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Statement(String),
    Value(String, Order),
}

impl Fragment {
    pub fn as_str(&self) -> &str {
        match self {
            Fragment::Statement(s) | Fragment::Value(s, _) => s,
        }
    }

    /// Drops the order tag; value blocks used as statements go through here.
    pub fn into_text(self) -> String {
        match self {
            Fragment::Statement(s) | Fragment::Value(s, _) => s,
        }
    }
}

/// Render rule for a block kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Renderer {
    Persona,
    Task,
    Context,
    Attachment,
    KnowledgeBase,
    Constraint,
    OutputFormat,
    Optimizer,
    Text,
    VariableInput,
    Custom { name: String },
}

#[derive(Debug, Clone, Default)]
pub struct RendererTable {
    renderers: BTreeMap<String, Renderer>,
}

impl RendererTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut table = Self::new();
        for (id, r) in [
            (builtin::PERSONA, Renderer::Persona),
            (builtin::TASK, Renderer::Task),
            (builtin::CONTEXT, Renderer::Context),
            (builtin::ATTACHMENT, Renderer::Attachment),
            (builtin::KNOWLEDGE_BASE, Renderer::KnowledgeBase),
            (builtin::CONSTRAINT, Renderer::Constraint),
            (builtin::OUTPUT_FORMAT, Renderer::OutputFormat),
            (builtin::OPTIMIZER, Renderer::Optimizer),
            (builtin::TEXT, Renderer::Text),
            (builtin::TEXT_MULTILINE, Renderer::Text),
            (builtin::VARIABLE_INPUT, Renderer::VariableInput),
        ] {
            table.set_renderer(id, r);
        }
        table
    }

    pub fn set_renderer(&mut self, kind_id: impl Into<String>, renderer: Renderer) {
        self.renderers.insert(kind_id.into(), renderer);
    }

    pub fn get(&self, kind_id: &str) -> Option<&Renderer> {
        self.renderers.get(kind_id)
    }
}

pub fn render(renderer: &Renderer, scope: &mut Scope<'_, '_>) -> Result<Fragment, CompileError> {
    let fragment = match renderer {
        Renderer::Persona => Fragment::Statement(rules::persona(scope)),
        Renderer::Task => Fragment::Statement(rules::task(scope)?),
        Renderer::Context => Fragment::Statement(rules::context(scope)?),
        Renderer::Attachment => Fragment::Statement(rules::attachment(scope)?),
        Renderer::KnowledgeBase => Fragment::Statement(rules::knowledge_base(scope)),
        Renderer::Constraint => Fragment::Statement(rules::constraint(scope)),
        Renderer::OutputFormat => Fragment::Statement(rules::output_format(scope)),
        Renderer::Optimizer => Fragment::Value(rules::optimizer(scope)?, Order::Atomic),
        Renderer::Text => Fragment::Value(scope.text("TEXT"), Order::Atomic),
        Renderer::VariableInput => {
            Fragment::Value(format!("{{{}}}", scope.text("VAR_NAME")), Order::Atomic)
        }
        Renderer::Custom { name } => Fragment::Statement(rules::custom(name, scope)?),
    };
    Ok(fragment)
}
