//! hierarchical evaluation context
//!
//! A [ContextTree] is an arena of scopes. Each scope owns a map of root names (`var`, `local`,
//! `data`, `count`, ...) to [Value]s and optionally points at a parent scope. Reads fall back
//! to the parent, writes only ever touch the addressed scope.
//!
//! Before an expression is evaluated the chain from the root scope down to the addressed scope
//! is flattened into one [hcl::eval::Context]. Unknown values are left out of that context, so
//! an expression that depends on them fails to resolve instead of producing a wrong value.
use crate::functions;
use crate::merge::{merge_object_entry, merge_objects, merge_tuple_element};
use crate::value::Value;
use hcl::eval::{ErrorKind, Evaluate};
use indexmap::IndexMap;
use std::fmt;

/// One step of a context path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// object attribute
    Attr(String),
    /// tuple element, used by `count` instances
    Index(usize),
    /// object key, used by `for_each` instances
    Key(String),
}

impl PathSegment {
    pub fn attr(name: impl Into<String>) -> Self {
        PathSegment::Attr(name.into())
    }

    fn name(&self) -> String {
        match self {
            PathSegment::Attr(name) | PathSegment::Key(name) => name.clone(),
            PathSegment::Index(index) => index.to_string(),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(value: &str) -> Self {
        PathSegment::Attr(value.to_string())
    }
}

/// Builds a path of plain attribute segments
pub fn path<'a>(segments: impl IntoIterator<Item = &'a str>) -> Vec<PathSegment> {
    segments.into_iter().map(PathSegment::from).collect()
}

/// Selects one instance of a repeated block
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InstanceKey {
    Index(usize),
    Key(String),
}

impl InstanceKey {
    pub fn segment(&self) -> PathSegment {
        match self {
            InstanceKey::Index(index) => PathSegment::Index(*index),
            InstanceKey::Key(key) => PathSegment::Key(key.clone()),
        }
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceKey::Index(index) => write!(f, "[{index}]"),
            InstanceKey::Key(key) => write!(f, "[{key:?}]"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(usize);

#[derive(Debug, Default)]
struct Scope {
    parent: Option<ContextId>,
    values: IndexMap<String, Value>,
}

#[derive(Debug)]
pub struct ContextTree {
    scopes: Vec<Scope>,
}

impl Default for ContextTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextTree {
    /// Creates a tree with an empty root scope
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
        }
    }

    pub fn root(&self) -> ContextId {
        ContextId(0)
    }

    /// New scope without a parent
    pub fn detached(&mut self) -> ContextId {
        self.scopes.push(Scope::default());
        ContextId(self.scopes.len() - 1)
    }

    /// New scope that falls back to `parent` on reads
    pub fn child(&mut self, parent: ContextId) -> ContextId {
        self.scopes.push(Scope {
            parent: Some(parent),
            values: IndexMap::new(),
        });
        ContextId(self.scopes.len() - 1)
    }

    pub fn parent(&self, id: ContextId) -> Option<ContextId> {
        self.scope(id).and_then(|scope| scope.parent)
    }

    /// Values owned by this scope (parents are not included)
    pub fn locals(&self, id: ContextId) -> Option<&IndexMap<String, Value>> {
        self.scope(id).map(|scope| &scope.values)
    }

    pub fn clear(&mut self, id: ContextId) {
        if let Some(scope) = self.scopes.get_mut(id.0) {
            scope.values.clear();
        }
    }

    fn scope(&self, id: ContextId) -> Option<&Scope> {
        self.scopes.get(id.0)
    }

    /// Looks up `path`, searching this scope first and then its parents
    pub fn lookup(&self, id: ContextId, path: &[PathSegment]) -> Option<Value> {
        let (first, rest) = path.split_first()?;
        let mut current = Some(id);
        while let Some(scope) = current.and_then(|id| self.scope(id)) {
            if let Some(value) = scope.values.get(&first.name()) {
                return descend(value, rest).cloned();
            }
            current = scope.parent;
        }
        None
    }

    /// Like [ContextTree::lookup], but `null` if any segment is absent
    pub fn get(&self, id: ContextId, path: &[PathSegment]) -> Value {
        self.lookup(id, path).unwrap_or_default()
    }

    fn get_local(&self, id: ContextId, path: &[PathSegment]) -> Value {
        let Some((first, rest)) = path.split_first() else {
            return Value::Null;
        };
        self.scope(id)
            .and_then(|scope| scope.values.get(&first.name()))
            .and_then(|value| descend(value, rest))
            .cloned()
            .unwrap_or_default()
    }

    /// Writes `value` at `path` in this scope, creating intermediate objects as needed
    pub fn set(&mut self, id: ContextId, path: &[PathSegment], value: Value) {
        let Some((first, rest)) = path.split_first() else {
            return;
        };
        let Some(scope) = self.scopes.get_mut(id.0) else {
            return;
        };

        let name = first.name();
        let existing = scope.values.get(&name).cloned().unwrap_or_default();
        scope.values.insert(name, replace_at(&existing, rest, value));
    }

    /// Merges the value of one block instance into the collection at `base`
    ///
    /// Without an instance key the objects are merged directly. Sibling instances are kept.
    pub fn merge_instance(
        &mut self,
        id: ContextId,
        base: &[PathSegment],
        instance: Option<&InstanceKey>,
        value: Value,
    ) {
        let existing = self.get_local(id, base);
        let merged = match instance {
            Some(InstanceKey::Index(index)) => match merge_tuple_element(&existing, *index, value) {
                Ok(merged) => merged,
                Err(err) => {
                    tracing::warn!(%err, "instance not merged");
                    return;
                }
            },
            Some(InstanceKey::Key(key)) => merge_object_entry(&existing, key, value),
            None => match merge_objects(&existing, &value) {
                Ok(merged) => merged,
                Err(err) => {
                    tracing::trace!(%err, "replacing value instead of merging");
                    value
                }
            },
        };
        self.set(id, base, merged);
    }

    /// Flattens the scope chain into an evaluation context
    ///
    /// Names of inner scopes shadow the same name of outer scopes.
    pub fn eval_context(&self, id: ContextId) -> hcl::eval::Context<'static> {
        let mut chain = vec![];
        let mut current = Some(id);
        while let Some(scope) = current.and_then(|id| self.scope(id)) {
            chain.push(scope);
            current = scope.parent;
        }

        let mut variables: IndexMap<&str, &Value> = IndexMap::new();
        for scope in chain.into_iter().rev() {
            for (name, value) in &scope.values {
                variables.insert(name, value);
            }
        }

        let mut ctx = hcl::eval::Context::new();
        for (name, value) in variables {
            if let Some(value) = value.to_hcl() {
                ctx.declare_var(hcl::Identifier::unchecked(name), value);
            }
        }
        functions::declare(&mut ctx);
        ctx
    }

    pub fn evaluate(&self, id: ContextId, expr: &hcl::Expression) -> Result<Value, EvalError> {
        evaluate_in(&self.eval_context(id), expr)
    }
}

/// Evaluates `expr` in a prepared context
pub fn evaluate_in(
    ctx: &hcl::eval::Context<'_>,
    expr: &hcl::Expression,
) -> Result<Value, EvalError> {
    expr.evaluate(ctx)
        .map(Value::from)
        .map_err(|errors| EvalError {
            errors: errors.into(),
        })
}

fn descend<'v>(value: &'v Value, path: &[PathSegment]) -> Option<&'v Value> {
    let Some((first, rest)) = path.split_first() else {
        return Some(value);
    };

    let next = match first {
        PathSegment::Attr(key) | PathSegment::Key(key) => value.as_object()?.get(key)?,
        PathSegment::Index(index) => value.elements()?.get(*index)?,
    };
    descend(next, rest)
}

fn replace_at(current: &Value, path: &[PathSegment], value: Value) -> Value {
    let Some((first, rest)) = path.split_first() else {
        return value;
    };

    match first {
        PathSegment::Attr(key) | PathSegment::Key(key) => {
            let mut entries = current.as_object().cloned().unwrap_or_default();
            let child = entries.get(key).cloned().unwrap_or_default();
            entries.insert(key.clone(), replace_at(&child, rest, value));
            Value::Object(entries)
        }
        PathSegment::Index(index) => {
            let child = current
                .elements()
                .and_then(|elements| elements.get(*index))
                .cloned()
                .unwrap_or_default();
            crate::merge::insert_or_grow_tuple(current, *index, replace_at(&child, rest, value))
                .unwrap_or_else(|err| {
                    tracing::warn!(%err, "value not written");
                    current.clone()
                })
        }
    }
}

/// Expression evaluation failed
#[derive(thiserror::Error, Debug)]
#[error("{errors}")]
pub struct EvalError {
    pub errors: hcl::eval::Errors,
}

impl EvalError {
    /// True when the expression only failed because something it references has no value yet
    pub fn is_unresolved(&self) -> bool {
        self.errors.iter().all(|error| {
            matches!(
                error.kind(),
                ErrorKind::UndefinedVar(_)
                    | ErrorKind::NoSuchKey(_)
                    | ErrorKind::Index(_)
                    | ErrorKind::Unexpected(hcl::Value::Null, _)
            )
        })
    }

    /// Message of the first error, used as diagnostic detail
    pub fn message(&self) -> String {
        self.errors
            .iter()
            .next()
            .map(|error| error.to_string())
            .unwrap_or_else(|| self.errors.to_string())
    }
}
