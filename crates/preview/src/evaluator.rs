//! fixed-point evaluation of a module tree
//!
//! The evaluator walks the blocks of the root module (and of every local module it calls) and
//! evaluates their attributes against a [ContextTree]. Evaluated `data` and `resource` blocks
//! are merged back into their module's context, so later passes can resolve references that
//! were unknown before. After every pass the registered [EvalHook]s may inject more values.
//! Passes repeat until no module context changes or the pass limit is reached.
//!
//! Only what is needed to preview parameters is modelled: `variable`, `locals`, `data`,
//! `resource`, `module` and `output` blocks, `count`/`for_each` expansion and `dynamic` nested
//! blocks. Everything else is ignored.
use crate::context::{evaluate_in, ContextId, ContextTree, InstanceKey, PathSegment};
use crate::diagnostics::{Diagnostic, Diagnostics, PassDiagnostics, SourceRange};
use crate::document::{self, AttributeDecl, BlockDecl};
use crate::hooks::EvalHook;
use crate::merge::MAX_INSTANCES;
use crate::source_tree::{self, SourceTree};
use crate::value::{Value, ValueType};
use crate::valued::Valued;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const DEFAULT_MAX_PASSES: usize = 32;
const MAX_MODULE_DEPTH: usize = 16;

/// Attributes of `data`/`resource` blocks that configure the block itself
const META_ATTRIBUTES: [&str; 4] = ["count", "for_each", "depends_on", "provider"];
/// Attributes of `module` blocks that are not inputs
const MODULE_META_ATTRIBUTES: [&str; 6] = [
    "source",
    "version",
    "count",
    "for_each",
    "providers",
    "depends_on",
];

/// Input variables of the root module
pub type InputVars = IndexMap<String, Value>;

/// One evaluated instance of a block
#[derive(Debug, Clone)]
pub struct Block {
    pub decl: Rc<BlockDecl>,
    /// names of the module calls leading to the module of this block, empty for the root
    pub module: Vec<String>,
    /// context the block's values are merged into
    pub module_context: ContextId,
    /// context the block's expressions are evaluated in
    pub context: ContextId,
    pub instance: Option<InstanceKey>,
    /// declared with `count` or `for_each`
    pub repeated: bool,
    /// `count`/`for_each` could be resolved
    pub expanded: bool,
    /// e.g. `module.a.data.coder_parameter.region[0]`
    pub address: String,
    pub values: IndexMap<String, Value>,
    pub errors: IndexMap<String, Diagnostics>,
    pub blocks: Vec<Block>,
}

impl Block {
    pub fn kind(&self) -> &str {
        &self.decl.kind
    }

    pub fn type_label(&self) -> &str {
        self.decl.label(0).unwrap_or_default()
    }

    pub fn name_label(&self) -> &str {
        self.decl.label(1).unwrap_or_default()
    }

    pub fn is_data(&self, ty: &str) -> bool {
        self.kind() == "data" && self.type_label() == ty
    }

    pub fn range(&self) -> &SourceRange {
        &self.decl.range
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDecl> {
        self.decl.attribute(name)
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Value of an attribute with its diagnostics and source text
    pub fn valued(&self, name: &str) -> Valued {
        let mut valued = Valued::new(self.values.get(name).cloned().unwrap_or_default());
        if let Some(errors) = self.errors.get(name) {
            valued = valued.with_diagnostics(errors.clone());
        }
        if let Some(attr) = self.attribute(name) {
            valued = valued.with_source(attr.source.clone());
        }
        valued
    }

    pub fn nested<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Block> {
        self.blocks.iter().filter(move |block| block.kind() == kind)
    }

    /// Path of the collection holding all instances of this block, e.g. `data.type.name`
    pub fn reference_path(&self) -> Vec<PathSegment> {
        reference_path(&self.decl).unwrap_or_default()
    }

    /// Object of all known attribute values and nested blocks
    ///
    /// Unknown attributes are left out so they never replace a value loaded from elsewhere.
    pub fn object(&self) -> Value {
        let mut object: IndexMap<String, Value> = self
            .values
            .iter()
            .filter(|(_, value)| value.is_known())
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        for nested in &self.blocks {
            let entry = object
                .entry(nested.kind().to_string())
                .or_insert_with(|| Value::Tuple(vec![]));
            if let Value::Tuple(elements) = entry {
                elements.push(nested.object());
            }
        }
        Value::Object(object)
    }
}

fn reference_path(decl: &BlockDecl) -> Option<Vec<PathSegment>> {
    let ty = decl.label(0)?;
    let name = decl.label(1)?;
    match decl.kind.as_str() {
        "data" => Some(vec!["data".into(), ty.into(), name.into()]),
        "resource" => Some(vec![ty.into(), name.into()]),
        _ => None,
    }
}

/// Result of evaluating a module tree
#[derive(Debug)]
pub struct Evaluated {
    pub ctx: ContextTree,
    /// `data` and `resource` blocks of all modules from the last pass
    pub blocks: Vec<Block>,
    /// outputs of the root module
    pub module_output: Value,
    pub diagnostics: Diagnostics,
    pub passes: usize,
}

pub struct Evaluator<'a> {
    sources: &'a SourceTree,
    hooks: Vec<Box<dyn EvalHook + 'a>>,
    input_vars: InputVars,
    max_passes: usize,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a> Evaluator<'a> {
    pub fn new(sources: &'a SourceTree) -> Self {
        Self {
            sources,
            hooks: vec![],
            input_vars: InputVars::new(),
            max_passes: DEFAULT_MAX_PASSES,
            cancel: None,
        }
    }

    pub fn with_hook(mut self, hook: impl EvalHook + 'a) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    pub fn with_input_vars(mut self, input_vars: InputVars) -> Self {
        self.input_vars = input_vars;
        self
    }

    pub fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = max_passes.max(1);
        self
    }

    pub fn with_cancel(mut self, cancel: Option<Arc<AtomicBool>>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Parses the root module (and the local modules it calls) and runs the pass loop
    ///
    /// Fails with the parse errors if any file cannot be parsed.
    #[tracing::instrument(level = "debug", skip(self), fields(max_passes = self.max_passes))]
    pub fn evaluate(mut self) -> Result<Evaluated, Diagnostics> {
        let mut ctx = ContextTree::new();
        let (modules, warnings) = Loader::load(self.sources, &mut ctx)?;

        let mut state = State {
            ctx,
            pass: PassDiagnostics::default(),
            instances: HashMap::new(),
            inputs: vec![InputVars::new(); modules.len()],
            outputs: vec![IndexMap::new(); modules.len()],
        };
        state.inputs[0] = self.input_vars.clone();

        let mut blocks = vec![];
        let mut previous = None;
        let mut converged = false;
        let mut passes = 0;
        while passes < self.max_passes {
            if self
                .cancel
                .as_ref()
                .is_some_and(|cancel| cancel.load(Ordering::Relaxed))
            {
                tracing::info!(passes, "evaluation cancelled");
                return Err(Diagnostic::error("Evaluation cancelled")
                    .with_detail("The preview was cancelled before evaluation finished.")
                    .into());
            }
            passes += 1;

            blocks.clear();
            self.run_module(&modules, 0, &mut state, &mut blocks);
            for hook in &mut self.hooks {
                hook.on_pass(&mut state.ctx, &blocks, &self.input_vars, &mut state.pass);
            }

            let snapshot = snapshot(&modules, &state.ctx);
            tracing::trace!(passes, blocks = blocks.len(), "pass finished");
            if previous.as_ref() == Some(&snapshot) {
                converged = true;
                break;
            }
            previous = Some(snapshot);
        }

        let mut diagnostics = warnings;
        if !converged {
            tracing::warn!(passes, "evaluation did not converge");
            diagnostics.push(
                Diagnostic::warning("Evaluation did not converge").with_detail(format!(
                    "Values were still changing after {passes} passes, some may be incomplete."
                )),
            );
        }
        diagnostics.extend(state.pass.into_diagnostics());
        tracing::debug!(passes, "evaluation finished");

        Ok(Evaluated {
            module_output: Value::Object(state.outputs.first().cloned().unwrap_or_default()),
            ctx: state.ctx,
            blocks,
            diagnostics,
            passes,
        })
    }

    fn run_module(&self, modules: &[Module], index: usize, state: &mut State, blocks: &mut Vec<Block>) {
        let module = &modules[index];
        let module_ctx = module.context;
        let prefix = module.prefix();

        for decl in &module.variables {
            let Some(name) = decl.label(0) else {
                continue;
            };
            let value = match state.inputs[index].get(name) {
                Some(value) => value.clone(),
                None => match decl.attribute("default") {
                    Some(default) => {
                        let hcl_ctx = state.ctx.eval_context(module_ctx);
                        let address = format!("{prefix}var.{name}");
                        state.evaluate_recorded(&hcl_ctx, module_ctx, &address, default)
                    }
                    None => Value::Unknown(ValueType::Dynamic),
                },
            };
            state
                .ctx
                .set(module_ctx, &["var".into(), name.into()], value);
        }

        for local in &module.locals {
            let hcl_ctx = state.ctx.eval_context(module_ctx);
            let address = format!("{prefix}local.{}", local.name);
            let value = state.evaluate_recorded(&hcl_ctx, module_ctx, &address, local);
            if value.is_known() {
                state
                    .ctx
                    .set(module_ctx, &["local".into(), local.name.as_str().into()], value);
            }
        }

        for decl in &module.resources {
            self.run_block(module, index, decl, state, blocks);
        }

        for call in &module.calls {
            let Some(name) = call.decl.label(0) else {
                continue;
            };
            let Some(child) = call.child else {
                continue;
            };

            let hcl_ctx = state.ctx.eval_context(module_ctx);
            let address = format!("{prefix}module.{name}");
            let mut inputs = InputVars::new();
            for (attr_name, attr) in &call.decl.attributes {
                if MODULE_META_ATTRIBUTES.contains(&attr_name.as_str()) {
                    continue;
                }
                let value = state.evaluate_recorded(&hcl_ctx, module_ctx, &address, attr);
                inputs.insert(attr_name.clone(), value);
            }
            state.inputs[child] = inputs;

            self.run_module(modules, child, state, blocks);
            let outputs = Value::Object(state.outputs[child].clone());
            state
                .ctx
                .set(module_ctx, &["module".into(), name.into()], outputs);
        }

        let hcl_ctx = state.ctx.eval_context(module_ctx);
        for decl in &module.outputs {
            let (Some(name), Some(attr)) = (decl.label(0), decl.attribute("value")) else {
                continue;
            };
            let address = format!("{prefix}output.{name}");
            let value = state.evaluate_recorded(&hcl_ctx, module_ctx, &address, attr);
            state.outputs[index].insert(name.to_string(), value);
        }
    }

    fn run_block(
        &self,
        module: &Module,
        index: usize,
        decl: &Rc<BlockDecl>,
        state: &mut State,
        blocks: &mut Vec<Block>,
    ) {
        let Some(base) = reference_path(decl) else {
            return;
        };
        let module_ctx = module.context;
        let address = format!(
            "{}{}",
            module.prefix(),
            base.iter()
                .map(|segment| match segment {
                    PathSegment::Attr(name) | PathSegment::Key(name) => name.clone(),
                    PathSegment::Index(index) => index.to_string(),
                })
                .collect::<Vec<_>>()
                .join(".")
        );

        let expansion = expand(state, module_ctx, decl, &address);
        let repeated = !matches!(expansion, Expansion::Single);
        let expanded = !matches!(expansion, Expansion::Unexpanded(_));

        let instances: Vec<(Option<InstanceKey>, Option<(PathSegment, Value)>)> = match expansion {
            Expansion::Single => vec![(None, None)],
            Expansion::Unexpanded(Repetition::Count) => vec![(
                None,
                Some(("count".into(), Value::object([("index", Value::from(0))]))),
            )],
            Expansion::Unexpanded(Repetition::ForEach) => vec![(None, None)],
            Expansion::Count(count) => (0..count)
                .map(|i| {
                    (
                        Some(InstanceKey::Index(i)),
                        Some(("count".into(), Value::object([("index", Value::from(i))]))),
                    )
                })
                .collect(),
            Expansion::ForEach(entries) => entries
                .into_iter()
                .map(|(key, value)| {
                    let each = Value::object([("key", Value::from(key.as_str())), ("value", value)]);
                    (Some(InstanceKey::Key(key)), Some(("each".into(), each)))
                })
                .collect(),
        };

        if instances.is_empty() {
            let empty = match decl.attribute("count") {
                Some(_) => Value::Tuple(vec![]),
                None => Value::Object(IndexMap::new()),
            };
            // drops whatever an earlier pass left when the expansion was unknown
            state.ctx.set(module_ctx, &base, empty);
            return;
        }

        for (key, iteration) in instances {
            let instance_address = match &key {
                Some(key) => format!("{address}{key}"),
                None => address.clone(),
            };
            let context = state.instance_context(module_ctx, &format!("{index}:{instance_address}"));
            if let Some((name, value)) = iteration {
                state.ctx.set(context, &[name], value);
            }

            let (values, errors, nested) = self.evaluate_body(
                state,
                module,
                index,
                context,
                decl,
                &instance_address,
            );
            let block = Block {
                decl: decl.clone(),
                module: module.path.clone(),
                module_context: module_ctx,
                context,
                instance: key,
                repeated,
                expanded,
                address: instance_address,
                values,
                errors,
                blocks: nested,
            };

            state
                .ctx
                .merge_instance(module_ctx, &base, block.instance.as_ref(), block.object());
            blocks.push(block);
        }
    }

    /// Evaluates the attributes and nested blocks of one block instance
    fn evaluate_body(
        &self,
        state: &mut State,
        module: &Module,
        index: usize,
        context: ContextId,
        decl: &BlockDecl,
        address: &str,
    ) -> (IndexMap<String, Value>, IndexMap<String, Diagnostics>, Vec<Block>) {
        let hcl_ctx = state.ctx.eval_context(context);
        let mut values = IndexMap::new();
        let mut errors = IndexMap::new();
        for (name, attr) in &decl.attributes {
            if META_ATTRIBUTES.contains(&name.as_str()) {
                continue;
            }
            match evaluate_in(&hcl_ctx, &attr.expr) {
                Ok(value) => {
                    state.pass.resolve(address, name);
                    values.insert(name.clone(), value);
                }
                Err(err) if err.is_unresolved() => {
                    state.pass.resolve(address, name);
                    values.insert(name.clone(), Value::Unknown(ValueType::Dynamic));
                }
                Err(err) => {
                    let diagnostic = evaluation_error(context, attr, &err.message());
                    state.pass.record(address, name, diagnostic.clone());
                    errors.insert(name.clone(), Diagnostics::from(diagnostic));
                    values.insert(name.clone(), Value::Unknown(ValueType::Dynamic));
                }
            }
        }

        let mut nested = vec![];
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for child in &decl.blocks {
            match child.kind.as_str() {
                "lifecycle" => {}
                "dynamic" => nested.extend(self.expand_dynamic(
                    state, module, index, context, child, address,
                )),
                kind => {
                    let position = counts.entry(kind).or_default();
                    let child_address = format!("{address}.{kind}[{position}]");
                    *position += 1;

                    let (values, errors, blocks) =
                        self.evaluate_body(state, module, index, context, child, &child_address);
                    nested.push(Block {
                        decl: child.clone(),
                        module: module.path.clone(),
                        module_context: module.context,
                        context,
                        instance: None,
                        repeated: false,
                        expanded: true,
                        address: child_address,
                        values,
                        errors,
                        blocks,
                    });
                }
            }
        }

        (values, errors, nested)
    }

    /// Expands `dynamic "<label>" { for_each = ..., content { ... } }`
    fn expand_dynamic(
        &self,
        state: &mut State,
        module: &Module,
        index: usize,
        context: ContextId,
        decl: &BlockDecl,
        address: &str,
    ) -> Vec<Block> {
        let (Some(label), Some(content), Some(for_each)) = (
            decl.label(0),
            decl.blocks_of("content").next(),
            decl.attribute("for_each"),
        ) else {
            return vec![];
        };
        let iterator = match decl.attribute("iterator").map(|attr| &attr.expr) {
            Some(hcl::Expression::Variable(variable)) => variable.as_str().to_string(),
            _ => label.to_string(),
        };

        let dynamic_address = format!("{address}.dynamic.{label}");
        let collection = match state.ctx.evaluate(context, &for_each.expr) {
            Ok(value) => {
                state.pass.resolve(&dynamic_address, "for_each");
                value
            }
            Err(err) => {
                if !err.is_unresolved() {
                    state.pass.record(
                        &dynamic_address,
                        "for_each",
                        evaluation_error(context, for_each, &err.message()),
                    );
                }
                return vec![];
            }
        };

        let decl = Rc::new(BlockDecl {
            kind: label.to_string(),
            labels: vec![],
            range: content.range.clone(),
            type_range: decl.type_range.clone(),
            attributes: content.attributes.clone(),
            blocks: content.blocks.clone(),
        });

        let entries = iteration_entries(&collection);
        if entries.len() > MAX_INSTANCES {
            state.pass.record(
                &dynamic_address,
                "for_each",
                too_many_instances(for_each, "for_each", entries.len()),
            );
            return vec![];
        }

        let mut blocks = vec![];
        for (key, value) in entries {
            let instance_address = format!("{dynamic_address}[{key}]");
            let child = state.instance_context(context, &format!("{index}:{instance_address}"));
            state.ctx.set(
                child,
                &[iterator.as_str().into()],
                Value::object([("key", key), ("value", value)]),
            );

            let (values, errors, nested) =
                self.evaluate_body(state, module, index, child, &decl, &instance_address);
            blocks.push(Block {
                decl: decl.clone(),
                module: module.path.clone(),
                module_context: module.context,
                context: child,
                instance: None,
                repeated: false,
                expanded: true,
                address: instance_address,
                values,
                errors,
                blocks: nested,
            });
        }
        blocks
    }
}

fn evaluation_error(context: ContextId, attr: &AttributeDecl, message: &str) -> Diagnostic {
    Diagnostic::error("Failed to evaluate expression")
        .with_detail(format!("{}: {message}", attr.name))
        .with_subject(attr.expr_range.clone())
        .with_eval_context(context)
}

/// Evaluation state shared by all modules of one run
struct State {
    ctx: ContextTree,
    pass: PassDiagnostics,
    /// instance contexts by module index and instance address, reused across passes
    instances: HashMap<String, ContextId>,
    inputs: Vec<InputVars>,
    outputs: Vec<IndexMap<String, Value>>,
}

impl State {
    fn instance_context(&mut self, parent: ContextId, key: &str) -> ContextId {
        match self.instances.get(key) {
            Some(id) => {
                self.ctx.clear(*id);
                *id
            }
            None => {
                let id = self.ctx.child(parent);
                self.instances.insert(key.to_string(), id);
                id
            }
        }
    }

    /// Evaluates `attr`, unknown if it cannot be resolved yet
    ///
    /// Failures other than unresolved references are recorded for `address`.
    fn evaluate_recorded(
        &mut self,
        hcl_ctx: &hcl::eval::Context<'_>,
        context: ContextId,
        address: &str,
        attr: &AttributeDecl,
    ) -> Value {
        match evaluate_in(hcl_ctx, &attr.expr) {
            Ok(value) => {
                self.pass.resolve(address, &attr.name);
                value
            }
            Err(err) => {
                if err.is_unresolved() {
                    self.pass.resolve(address, &attr.name);
                } else {
                    self.pass.record(
                        address,
                        &attr.name,
                        evaluation_error(context, attr, &err.message()),
                    );
                }
                Value::Unknown(ValueType::Dynamic)
            }
        }
    }
}

enum Repetition {
    Count,
    ForEach,
}

enum Expansion {
    Single,
    Count(usize),
    ForEach(Vec<(String, Value)>),
    Unexpanded(Repetition),
}

fn expand(state: &mut State, module_ctx: ContextId, decl: &BlockDecl, address: &str) -> Expansion {
    if let Some(count) = decl.attribute("count") {
        let value = match state.ctx.evaluate(module_ctx, &count.expr) {
            Ok(value) => value,
            Err(err) => {
                if !err.is_unresolved() {
                    state.pass.record(
                        address,
                        "count",
                        evaluation_error(module_ctx, count, &err.message()),
                    );
                }
                return Expansion::Unexpanded(Repetition::Count);
            }
        };
        return match count_of(&value) {
            Some(n) if n > MAX_INSTANCES => {
                state
                    .pass
                    .record(address, "count", too_many_instances(count, "count", n));
                Expansion::Unexpanded(Repetition::Count)
            }
            Some(n) => {
                state.pass.resolve(address, "count");
                Expansion::Count(n)
            }
            None => {
                state.pass.record(
                    address,
                    "count",
                    Diagnostic::error("Invalid count argument")
                        .with_detail(format!(
                            "The count argument must be a whole number of zero or more, got {}.",
                            describe(&value)
                        ))
                        .with_subject(count.expr_range.clone()),
                );
                Expansion::Unexpanded(Repetition::Count)
            }
        };
    }

    if let Some(for_each) = decl.attribute("for_each") {
        let value = match state.ctx.evaluate(module_ctx, &for_each.expr) {
            Ok(value) => value,
            Err(err) => {
                if !err.is_unresolved() {
                    state.pass.record(
                        address,
                        "for_each",
                        evaluation_error(module_ctx, for_each, &err.message()),
                    );
                }
                return Expansion::Unexpanded(Repetition::ForEach);
            }
        };
        return match for_each_entries(&value) {
            Some(entries) if entries.len() > MAX_INSTANCES => {
                state.pass.record(
                    address,
                    "for_each",
                    too_many_instances(for_each, "for_each", entries.len()),
                );
                Expansion::Unexpanded(Repetition::ForEach)
            }
            Some(entries) => {
                state.pass.resolve(address, "for_each");
                Expansion::ForEach(entries)
            }
            None => {
                state.pass.record(
                    address,
                    "for_each",
                    Diagnostic::error("Invalid for_each argument")
                        .with_detail(format!(
                            "The for_each argument must be a map or a set of strings, got {}.",
                            value.friendly_type_name()
                        ))
                        .with_subject(for_each.expr_range.clone()),
                );
                Expansion::Unexpanded(Repetition::ForEach)
            }
        };
    }

    Expansion::Single
}

/// Number of `count` instances, none unless `value` is a whole number of zero or more
fn count_of(value: &Value) -> Option<usize> {
    let Value::Number(number) = value else {
        return None;
    };
    if let Some(n) = number.as_u64() {
        return Some(usize::try_from(n).unwrap_or(usize::MAX));
    }
    let f = number.as_f64()?;
    (f >= 0.0 && f.fract() == 0.0).then(|| {
        if f >= usize::MAX as f64 {
            usize::MAX
        } else {
            f as usize
        }
    })
}

fn describe(value: &Value) -> String {
    match value {
        Value::Number(number) => number.to_string(),
        other => other.friendly_type_name(),
    }
}

fn too_many_instances(attr: &AttributeDecl, argument: &str, n: usize) -> Diagnostic {
    Diagnostic::error(format!("Too many instances for {argument}"))
        .with_detail(format!(
            "The {argument} argument asks for {n} instances, at most {MAX_INSTANCES} are evaluated."
        ))
        .with_subject(attr.expr_range.clone())
}

/// Instances of a `for_each`: map entries, or the elements of a set of strings keyed by value
fn for_each_entries(value: &Value) -> Option<Vec<(String, Value)>> {
    if let Some(object) = value.as_object() {
        return Some(
            object
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        );
    }

    value
        .elements()?
        .iter()
        .map(|element| match element {
            Value::String(key) => Some((key.clone(), element.clone())),
            _ => None,
        })
        .collect()
}

/// Iterations of a `dynamic` block, lists are keyed by index
fn iteration_entries(value: &Value) -> Vec<(Value, Value)> {
    if let Some(object) = value.as_object() {
        return object
            .iter()
            .map(|(key, value)| (Value::from(key.as_str()), value.clone()))
            .collect();
    }

    value
        .elements()
        .unwrap_or_default()
        .iter()
        .enumerate()
        .map(|(index, value)| (Value::from(index), value.clone()))
        .collect()
}

fn snapshot(modules: &[Module], ctx: &ContextTree) -> Vec<IndexMap<String, Value>> {
    modules
        .iter()
        .map(|module| ctx.locals(module.context).cloned().unwrap_or_default())
        .collect()
}

#[derive(Debug)]
struct Module {
    path: Vec<String>,
    context: ContextId,
    variables: Vec<Rc<BlockDecl>>,
    locals: Vec<AttributeDecl>,
    resources: Vec<Rc<BlockDecl>>,
    calls: Vec<ModuleCall>,
    outputs: Vec<Rc<BlockDecl>>,
}

impl Module {
    /// Address prefix of the blocks of this module, e.g. `module.a.module.b.`
    fn prefix(&self) -> String {
        self.path
            .iter()
            .map(|name| format!("module.{name}."))
            .collect()
    }
}

#[derive(Debug)]
struct ModuleCall {
    decl: Rc<BlockDecl>,
    /// index of the loaded module, none for remote modules
    child: Option<usize>,
}

struct Loader<'s, 'c> {
    sources: &'s SourceTree,
    ctx: &'c mut ContextTree,
    modules: Vec<Module>,
    errors: Diagnostics,
    warnings: Diagnostics,
}

impl<'s, 'c> Loader<'s, 'c> {
    fn load(
        sources: &'s SourceTree,
        ctx: &'c mut ContextTree,
    ) -> Result<(Vec<Module>, Diagnostics), Diagnostics> {
        let mut loader = Loader {
            sources,
            ctx,
            modules: vec![],
            errors: Diagnostics::new(),
            warnings: Diagnostics::new(),
        };
        loader.load_module("", vec![]);

        if loader.errors.has_errors() {
            return Err(loader.errors);
        }
        Ok((loader.modules, loader.warnings))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    fn load_module(&mut self, dir: &str, path: Vec<String>) -> usize {
        let context = match path.is_empty() {
            true => self.ctx.root(),
            false => self.ctx.detached(),
        };
        let index = self.modules.len();
        self.modules.push(Module {
            path: path.clone(),
            context,
            variables: vec![],
            locals: vec![],
            resources: vec![],
            calls: vec![],
            outputs: vec![],
        });

        let sources = self.sources;
        let mut calls = vec![];
        for (filename, contents) in sources.module_files(dir) {
            let document = match document::parse(filename, contents) {
                Ok(document) => document,
                Err(diagnostic) => {
                    self.errors.push(diagnostic);
                    continue;
                }
            };

            let module = &mut self.modules[index];
            for decl in document.blocks {
                match decl.kind.as_str() {
                    "variable" => module.variables.push(decl),
                    "locals" => module.locals.extend(decl.attributes.values().cloned()),
                    "data" | "resource" => module.resources.push(decl),
                    "output" => module.outputs.push(decl),
                    "module" => calls.push(decl),
                    _ => {}
                }
            }
        }

        for decl in calls {
            let child = self.load_call(dir, &path, &decl);
            self.modules[index].calls.push(ModuleCall { decl, child });
        }
        index
    }

    fn load_call(&mut self, dir: &str, path: &[String], decl: &BlockDecl) -> Option<usize> {
        let name = decl.label(0)?;
        let source = match decl.attribute("source").map(|attr| &attr.expr) {
            Some(hcl::Expression::String(source)) => source.clone(),
            _ => return None,
        };
        if !(source.starts_with("./") || source.starts_with("../")) {
            tracing::debug!(name, source, "remote module is not evaluated");
            return None;
        }
        if path.len() >= MAX_MODULE_DEPTH {
            self.warnings.push(
                Diagnostic::warning("Module nesting too deep")
                    .with_detail(format!(
                        "Module {name:?} is nested more than {MAX_MODULE_DEPTH} levels deep and is not evaluated."
                    ))
                    .with_subject(decl.range.clone()),
            );
            return None;
        }

        let child_dir = source_tree::join(dir, &source);
        if !self.sources.has_module(&child_dir) {
            self.warnings.push(
                Diagnostic::warning("Module not found")
                    .with_detail(format!("No files found for module {name:?} at {source:?}."))
                    .with_subject(decl.range.clone()),
            );
            return None;
        }

        let mut child_path = path.to_vec();
        child_path.push(name.to_string());
        Some(self.load_module(&child_dir, child_path))
    }
}
