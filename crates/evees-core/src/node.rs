//! Built-in behavior for `{ text, links }` document nodes.
//!
//! This is the reference data type the engine ships with: a text field
//! merged three-way (later modification wins on conflict) and an ordered
//! link list merged through the strategy's [`LinkMerger`].

use crate::behavior::{
    merge_result, BehaviorRegistry, Behaviors, HasChildren, LinkMerger, Mergeable, TypeTag,
};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

/// Tag for `{ text, links }` nodes.
pub fn node_type_tag() -> TypeTag {
    TypeTag::new("text-node")
}

/// Recognizer: an object with a string `text` and an array `links`.
pub fn node_recognizer(value: &Value) -> bool {
    value.get("text").map_or(false, Value::is_string)
        && value.get("links").map_or(false, Value::is_array)
}

fn node_text(value: &Value) -> String {
    value
        .get("text")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn node_links(value: &Value) -> Vec<String> {
    value
        .get("links")
        .and_then(Value::as_array)
        .map(|links| {
            links
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Merge and children behavior for document nodes.
#[derive(Clone, Debug, Default)]
pub struct NodeBehavior;

#[async_trait]
impl Mergeable for NodeBehavior {
    async fn merge(
        &self,
        original: Option<&Value>,
        modifications: &[Value],
        links: &dyn LinkMerger,
    ) -> Result<Value> {
        let original_text = original.map(node_text);
        let mod_texts: Vec<String> = modifications.iter().map(node_text).collect();
        let text = merge_result(original_text.as_ref(), &mod_texts).unwrap_or_default();

        let original_links = original.map(node_links).unwrap_or_default();
        let mod_links: Vec<Vec<String>> = modifications.iter().map(node_links).collect();
        let merged_links = links.merge_links(&original_links, &mod_links).await?;

        Ok(json!({ "text": text, "links": merged_links }))
    }
}

impl HasChildren for NodeBehavior {
    fn children_links(&self, data: &Value) -> Vec<String> {
        node_links(data)
    }

    fn replace_children_links(&self, data: &Value, links: Vec<String>) -> Value {
        let mut out = data.clone();
        if let Some(object) = out.as_object_mut() {
            object.insert("links".to_string(), json!(links));
        }
        out
    }
}

/// A registry with the document-node behavior pre-registered.
pub fn default_registry() -> BehaviorRegistry {
    let behavior = Arc::new(NodeBehavior);
    let mut registry = BehaviorRegistry::new();
    registry.register(
        node_type_tag(),
        node_recognizer,
        Behaviors {
            merge: Some(behavior.clone()),
            children: Some(behavior),
        },
    );
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Link merger that keeps the first modification list, for isolating
    /// the text merge in tests.
    struct KeepFirst;

    #[async_trait]
    impl LinkMerger for KeepFirst {
        async fn merge_links(
            &self,
            _original: &[String],
            modifications: &[Vec<String>],
        ) -> Result<Vec<String>> {
            Ok(modifications.first().cloned().unwrap_or_default())
        }
    }

    #[tokio::test]
    async fn test_text_one_side_changed() {
        let ancestor = json!({"text": "A", "links": []});
        let to = json!({"text": "A", "links": []});
        let from = json!({"text": "B", "links": []});
        let merged = NodeBehavior
            .merge(Some(&ancestor), &[to, from], &KeepFirst)
            .await
            .unwrap();
        assert_eq!(merged["text"], "B");
    }

    #[tokio::test]
    async fn test_text_conflict_later_wins() {
        let ancestor = json!({"text": "A", "links": []});
        let to = json!({"text": "B", "links": []});
        let from = json!({"text": "C", "links": []});
        let merged = NodeBehavior
            .merge(Some(&ancestor), &[to, from], &KeepFirst)
            .await
            .unwrap();
        assert_eq!(merged["text"], "C");
    }

    #[test]
    fn test_children_roundtrip() {
        let data = json!({"text": "t", "links": ["a", "b"]});
        let behavior = NodeBehavior;
        assert_eq!(behavior.children_links(&data), vec!["a", "b"]);
        let replaced = behavior.replace_children_links(&data, vec!["c".to_string()]);
        assert_eq!(behavior.children_links(&replaced), vec!["c"]);
        assert_eq!(replaced["text"], "t");
    }

    #[test]
    fn test_default_registry_recognizes_nodes() {
        let registry = default_registry();
        let data = json!({"text": "t", "links": []});
        assert_eq!(registry.classify(&data), Some(&node_type_tag()));
        assert!(registry.children_behavior(&data).is_some());
    }
}
