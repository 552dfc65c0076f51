//! Per-type behavior registry.
//!
//! Data payloads are arbitrary JSON, recognized structurally by
//! required-field presence rather than a type tag. The registry maps a type
//! tag to a fixed set of behavior implementations, resolved once per entity
//! by `classify` and dispatched explicitly. Everything is passed in by the
//! caller; there is no ambient/global registry.

use crate::error::{EveesError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// A stable key naming a recognized data type.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeTag(pub String);

impl TypeTag {
    pub fn new(name: impl Into<String>) -> Self {
        TypeTag(name.into())
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordered-list merge callback handed to [`Mergeable`] implementations.
///
/// The merge strategy controls link semantics (the recursive strategy
/// translates perspective links to contexts and back), so behaviors never
/// merge link lists themselves.
#[async_trait]
pub trait LinkMerger: Send + Sync {
    async fn merge_links(
        &self,
        original: &[String],
        modifications: &[Vec<String>],
    ) -> Result<Vec<String>>;
}

/// Object-level three-way merge for one data type.
///
/// `original` is the common-ancestor data (absent for independent-root
/// merges), `modifications` the divergent versions ordered `[to, from]`.
#[async_trait]
pub trait Mergeable: Send + Sync {
    async fn merge(
        &self,
        original: Option<&Value>,
        modifications: &[Value],
        links: &dyn LinkMerger,
    ) -> Result<Value>;
}

/// Child-link access for one data type.
pub trait HasChildren: Send + Sync {
    /// The ordered child links of a data object.
    fn children_links(&self, data: &Value) -> Vec<String>;

    /// The same data object with its child links replaced.
    fn replace_children_links(&self, data: &Value, links: Vec<String>) -> Value;
}

/// The behavior set registered for one type tag.
#[derive(Clone, Default)]
pub struct Behaviors {
    pub merge: Option<Arc<dyn Mergeable>>,
    pub children: Option<Arc<dyn HasChildren>>,
}

/// Structural recognizer for a data type.
pub type Recognizer = fn(&Value) -> bool;

/// Explicit type registry: recognizers tried in registration order, first
/// match wins.
#[derive(Clone, Default)]
pub struct BehaviorRegistry {
    entries: Vec<(TypeTag, Recognizer, Behaviors)>,
}

impl BehaviorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type with its recognizer and behaviors.
    pub fn register(
        &mut self,
        tag: TypeTag,
        recognizer: Recognizer,
        behaviors: Behaviors,
    ) -> &mut Self {
        self.entries.push((tag, recognizer, behaviors));
        self
    }

    /// Resolve the type tag of an object, if any recognizer matches.
    pub fn classify(&self, object: &Value) -> Option<&TypeTag> {
        self.entries
            .iter()
            .find(|(_, recognizer, _)| recognizer(object))
            .map(|(tag, _, _)| tag)
    }

    /// The behaviors registered for a tag.
    pub fn behaviors(&self, tag: &TypeTag) -> Option<&Behaviors> {
        self.entries
            .iter()
            .find(|(t, _, _)| t == tag)
            .map(|(_, _, b)| b)
    }

    /// The merge behavior for an object. Missing registration is fatal:
    /// `entity_id` is only used to give the error a useful context.
    pub fn merge_behavior(
        &self,
        object: &Value,
        entity_id: evees_cas::Cid,
    ) -> Result<Arc<dyn Mergeable>> {
        let tag = self
            .classify(object)
            .ok_or(EveesError::UnrecognizedType(entity_id))?;
        self.behaviors(tag)
            .and_then(|b| b.merge.clone())
            .ok_or_else(|| EveesError::MergeableNotImplemented(tag.clone()))
    }

    /// The children behavior for an object, if its type has one.
    pub fn children_behavior(&self, object: &Value) -> Option<Arc<dyn HasChildren>> {
        let tag = self.classify(object)?;
        self.behaviors(tag).and_then(|b| b.children.clone())
    }
}

/// Deterministic three-way resolution of a scalar slot.
///
/// If no modification changed the slot, the original stands. If exactly one
/// side changed it, the change wins. If several sides changed it, the later
/// modification wins. The tie-break is intentionally permissive rather than
/// a hard conflict; callers that care record it separately.
pub fn merge_result<T: Clone + PartialEq>(original: Option<&T>, modifications: &[T]) -> Option<T> {
    let changed = modifications
        .iter()
        .rev()
        .find(|m| Some(*m) != original);
    match changed {
        Some(value) => Some(value.clone()),
        None => original.cloned().or_else(|| modifications.first().cloned()),
    }
}
