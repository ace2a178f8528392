use std::fmt;
use thiserror::Error;

use crate::blocks::custom::CustomBlockDefinition;
use crate::blocks::{BlockKind, Registry};
use crate::graph::{BlockInstance, FieldValue, Workspace};
use crate::render::{self, Renderer, RendererTable};

pub mod assemble;

pub use assemble::assemble;

/// Maximum slot nesting depth before a graph is treated as malformed.
pub const MAX_DEPTH: usize = 256;

const STATEMENT_INDENT: &str = "  ";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("malformed graph: block {block_id:?} nested deeper than {max} levels")]
    DepthExceeded { block_id: String, max: usize },
}

/// An anomaly absorbed while compiling; the affected fragment was omitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    UnknownKind { block_id: String, kind: String },
    DepthExceeded { block_id: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UnknownKind { block_id, kind } => {
                write!(f, "block {block_id:?}: unknown kind {kind:?}, omitted")
            }
            Diagnostic::DepthExceeded { block_id } => {
                write!(f, "block {block_id:?}: nesting exceeds {MAX_DEPTH} levels, chain omitted")
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Compilation {
    pub prompt: String,
    pub diagnostics: Vec<Diagnostic>,
}

/// Block kinds plus their render rules for one session. Compiling only
/// borrows `self`, so a compiler can be shared across threads.
#[derive(Debug, Clone)]
pub struct Compiler {
    registry: Registry,
    renderers: RendererTable,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        Self { registry: Registry::builtin(), renderers: RendererTable::builtin() }
    }

    pub fn with_custom_blocks(defs: &[CustomBlockDefinition]) -> Self {
        let mut compiler = Self::new();
        for def in defs {
            compiler.register_custom(def);
        }
        compiler
    }

    pub fn register(&mut self, kind: BlockKind, renderer: Renderer) {
        self.renderers.set_renderer(kind.id.clone(), renderer);
        self.registry.register(kind);
    }

    /// (Re)registers a user-defined kind; later calls with the same id win.
    pub fn register_custom(&mut self, def: &CustomBlockDefinition) {
        self.register(def.to_kind(), Renderer::Custom { name: def.name.clone() });
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn compile(&self, blocks: &[BlockInstance]) -> String {
        self.compile_blocks(blocks).prompt
    }

    pub fn compile_workspace(&self, ws: &Workspace) -> Compilation {
        self.compile_blocks(&ws.blocks)
    }

    /// Like [`Compiler::compile`] but fails on over-deep nesting instead of
    /// omitting the affected chain.
    pub fn try_compile(&self, blocks: &[BlockInstance]) -> Result<String, CompileError> {
        let mut walker = Walker::new(self);
        let mut chains = Vec::with_capacity(blocks.len());
        for top in blocks {
            chains.push(walker.chain(top.chain().collect(), 0)?);
        }
        Ok(assemble(chains))
    }

    fn compile_blocks(&self, blocks: &[BlockInstance]) -> Compilation {
        let mut walker = Walker::new(self);
        let mut chains = Vec::with_capacity(blocks.len());
        for top in blocks {
            match walker.chain(top.chain().collect(), 0) {
                Ok(text) => chains.push(text),
                Err(CompileError::DepthExceeded { block_id, .. }) => {
                    tracing::warn!(block = %top.id, deepest = %block_id, "dropping over-nested chain");
                    walker.diagnostics.push(Diagnostic::DepthExceeded { block_id: top.id.clone() });
                }
            }
        }
        Compilation { prompt: assemble(chains), diagnostics: walker.diagnostics }
    }
}

struct Walker<'c> {
    compiler: &'c Compiler,
    diagnostics: Vec<Diagnostic>,
}

impl<'c> Walker<'c> {
    fn new(compiler: &'c Compiler) -> Self {
        Self { compiler, diagnostics: Vec::new() }
    }

    fn chain(&mut self, blocks: Vec<&BlockInstance>, depth: usize) -> Result<String, CompileError> {
        let mut parts = Vec::with_capacity(blocks.len());
        for block in blocks {
            if let Some(fragment) = self.block(block, depth)? {
                parts.push(fragment.into_text());
            }
        }
        Ok(assemble(parts))
    }

    /// `None` when the block is disabled or of an unknown kind.
    fn block(
        &mut self,
        block: &BlockInstance,
        depth: usize,
    ) -> Result<Option<render::Fragment>, CompileError> {
        if depth > MAX_DEPTH {
            return Err(CompileError::DepthExceeded { block_id: block.id.clone(), max: MAX_DEPTH });
        }
        if !block.enabled {
            return Ok(None);
        }
        let compiler = self.compiler;
        let (Some(kind), Some(renderer)) =
            (compiler.registry.lookup(&block.kind), compiler.renderers.get(&block.kind))
        else {
            tracing::debug!(block = %block.id, kind = %block.kind, "unregistered block kind");
            self.diagnostics.push(Diagnostic::UnknownKind {
                block_id: block.id.clone(),
                kind: block.kind.clone(),
            });
            return Ok(None);
        };
        let mut scope = Scope { walker: self, block, kind, depth };
        render::render(renderer, &mut scope).map(Some)
    }
}

/// A block being rendered: field access with defaults, plus slot resolution.
pub struct Scope<'s, 'c> {
    walker: &'s mut Walker<'c>,
    block: &'s BlockInstance,
    kind: &'c BlockKind,
    depth: usize,
}

impl Scope<'_, '_> {
    fn field(&self, name: &str) -> Option<&FieldValue> {
        self.block
            .fields
            .get(name)
            .or_else(|| self.kind.field(name).map(|spec| &spec.default))
    }

    pub fn text(&self, name: &str) -> String {
        self.field(name).map(FieldValue::as_text).unwrap_or_default()
    }

    pub fn checked(&self, name: &str) -> bool {
        self.field(name).map(FieldValue::as_bool).unwrap_or(false)
    }

    pub fn int(&self, name: &str) -> i64 {
        self.field(name).map(FieldValue::as_int).unwrap_or(0)
    }

    /// Rendered text of the child bound to a value slot, `""` when unbound.
    pub fn value(&mut self, slot: &str) -> Result<String, CompileError> {
        let block = self.block;
        let Some(child) = block.slots.get(slot).and_then(|b| b.first()) else {
            return Ok(String::new());
        };
        let fragment = self.walker.block(child, self.depth + 1)?;
        Ok(fragment.map(render::Fragment::into_text).unwrap_or_default())
    }

    /// Indented chain bound to a statement slot, `""` when unbound or empty.
    pub fn statement(&mut self, slot: &str) -> Result<String, CompileError> {
        let block = self.block;
        let Some(binding) = block.slots.get(slot) else {
            return Ok(String::new());
        };
        let code = self.walker.chain(binding.blocks(), self.depth + 1)?;
        if code.is_empty() {
            return Ok(code);
        }
        Ok(assemble::prefix_lines(&code, STATEMENT_INDENT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::BlockInstance as B;

    fn text(s: &str) -> B {
        B::new("text").field("TEXT", s)
    }

    #[test]
    fn statement_slot_is_indented_chain() {
        let task = B::new("ai_task").chain_slot(
            "TASK_DESCRIPTION",
            vec![
                B::new("ai_context").slot("CONTEXT", text("第一段")),
                B::new("ai_knowledge_base").field("KB_ID", "kb-7"),
            ],
        );
        let out = Compiler::new().compile(&[task]);
        assert_eq!(
            out,
            "請協助完成以下任務：\n\n詳細說明：\n  情境/輸入資料：\n  第一段\n  \n  請優先使用知識庫資料：kb-7"
        );
    }

    #[test]
    fn disabled_block_is_skipped_but_chain_continues() {
        let chain = B::new("ai_knowledge_base")
            .field("KB_ID", "a")
            .then(B::new("ai_output_format").field("FORMAT", "json").disabled().then(
                B::new("ai_output_format").field("FORMAT", "table"),
            ));
        assert_eq!(Compiler::new().compile(&[chain]), "請優先使用知識庫資料：a\n\n請以表格格式輸出");
    }

    #[test]
    fn unknown_kind_is_omitted_and_reported() {
        let ws = Workspace::new(vec![
            B::new("controls_if").with_id("x1"),
            B::new("ai_output_format").field("FORMAT", "json"),
        ]);
        let c = Compiler::new().compile_workspace(&ws);
        assert_eq!(c.prompt, "請以JSON格式輸出");
        assert_eq!(
            c.diagnostics,
            vec![Diagnostic::UnknownKind { block_id: "x1".into(), kind: "controls_if".into() }]
        );
    }

    #[test]
    fn unknown_kind_in_slot_resolves_empty() {
        let ctx = B::new("ai_context").slot("CONTEXT", B::new("logic_boolean"));
        assert_eq!(Compiler::new().compile(&[ctx]), "");
    }

    #[test]
    fn field_defaults_apply_when_missing() {
        let out = Compiler::new().compile(&[B::new("ai_persona")]);
        assert_eq!(out, "你是資深程式專家。請使用專業嚴謹的語氣。");
    }

    fn nested_optimizers(levels: usize) -> B {
        let mut node = text("core");
        for _ in 0..levels {
            node = B::new("ai_optimizer").field("AUTO_OPTIMIZE", false).slot("ORIGINAL_PROMPT", node);
        }
        B::new("ai_context").with_id("root").slot("CONTEXT", node)
    }

    #[test]
    fn depth_guard_fails_fast_or_omits() {
        let compiler = Compiler::new();
        let deep = nested_optimizers(MAX_DEPTH + 5);
        let err = compiler.try_compile(std::slice::from_ref(&deep)).unwrap_err();
        assert!(matches!(err, CompileError::DepthExceeded { max: MAX_DEPTH, .. }));

        let ws = Workspace::new(vec![deep, B::new("ai_output_format").field("FORMAT", "plain")]);
        let c = compiler.compile_workspace(&ws);
        assert_eq!(c.prompt, "請以純文字格式輸出");
        assert_eq!(c.diagnostics, vec![Diagnostic::DepthExceeded { block_id: "root".into() }]);
    }

    #[test]
    fn shallow_nesting_is_fine() {
        let ok = nested_optimizers(10);
        assert_eq!(Compiler::new().try_compile(&[ok]).unwrap(), "情境/輸入資料：\ncore");
    }

    #[test]
    fn custom_block_renders_name_and_content() {
        let def = CustomBlockDefinition::create("語氣調整", None, None).unwrap();
        let compiler = Compiler::with_custom_blocks(std::slice::from_ref(&def));
        let with = B::new(def.kind_id()).slot("CONTENT", text("更幽默"));
        let without = B::new(def.kind_id());
        assert_eq!(compiler.compile(&[with]), "語氣調整：更幽默");
        assert_eq!(compiler.compile(&[without]), "語氣調整");
    }

    #[test]
    fn re_registering_custom_block_replaces_name() {
        let def = CustomBlockDefinition::create("舊", None, None).unwrap();
        let mut compiler = Compiler::with_custom_blocks(std::slice::from_ref(&def));
        compiler.register_custom(&CustomBlockDefinition { name: "新".into(), ..def.clone() });
        assert_eq!(compiler.compile(&[B::new(def.kind_id())]), "新");
    }

    #[test]
    fn deleted_custom_block_falls_back_to_omission() {
        let def = CustomBlockDefinition::create("已刪除", None, None).unwrap();
        let c = Compiler::new().compile_workspace(&Workspace::new(vec![B::new(def.kind_id())]));
        assert_eq!(c.prompt, "");
        assert_eq!(c.diagnostics.len(), 1);
    }

    #[test]
    fn attachment_and_variables() {
        let att = B::new("ai_attachment")
            .field("SOURCE_TYPE", "url")
            .slot("ATTACHMENT", B::new("ai_variable_input").field("VAR_NAME", "連結"));
        let odd = B::new("ai_attachment").field("SOURCE_TYPE", "ftp").slot("ATTACHMENT", text("x"));
        let empty = B::new("ai_attachment");
        let compiler = Compiler::new();
        assert_eq!(compiler.compile(&[att]), "附件（網址）：\n{連結}");
        assert_eq!(compiler.compile(&[odd]), "附件（ftp）：\nx");
        assert_eq!(compiler.compile(&[empty]), "");
    }

    #[test]
    fn persona_custom_expertise_override() {
        let p = B::new("ai_persona")
            .field("ROLE", "顧問")
            .field("EXPERTISE_PRESET", "custom")
            .field("EXPERTISE", "財務規劃")
            .field("TONE", "friendly");
        assert_eq!(Compiler::new().compile(&[p]), "你是顧問，擅長財務規劃。請使用親切友善的語氣。");

        let no_tone = B::new("ai_persona").field("ROLE", "助理").field("TONE", "sarcastic");
        assert_eq!(Compiler::new().compile(&[no_tone]), "你是助理");
    }

    #[test]
    fn top_level_value_block_is_kept_as_text() {
        let out = Compiler::new().compile(&[text("裸文字"), B::new("ai_variable_input").field("VAR_NAME", "v")]);
        assert_eq!(out, "裸文字\n\n{v}");
    }
}
