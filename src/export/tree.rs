//! Render targets and the print-ready tree.
//!
//! A render target is the serialized preview of one document: an element tree
//! the way the browser laid it out. Capturing it never touches the original;
//! [`build_print_tree`] returns a fresh tree with the print overrides applied.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// Id of the preview element the forms render into.
pub const DEFAULT_ELEMENT_ID: &str = "printable-document";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct RenderNode {
    #[schema(example = "div")]
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub style: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, String>,
    /// Text rendered before the children.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[schema(value_type = Vec<Object>)]
    pub children: Vec<RenderNode>,
}

impl RenderNode {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            ..Default::default()
        }
    }

    pub fn text_node(tag: &str, text: &str) -> Self {
        Self {
            tag: tag.to_string(),
            text: Some(text.to_string()),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_class(mut self, class: &str) -> Self {
        self.classes.push(class.to_string());
        self
    }

    pub fn with_style(mut self, property: &str, value: &str) -> Self {
        self.style.insert(property.to_string(), value.to_string());
        self
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_child(mut self, child: RenderNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn tag_name(&self) -> String {
        self.tag.to_ascii_lowercase()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    pub fn style_value(&self, property: &str) -> Option<&str> {
        self.style.get(property).map(|v| v.trim())
    }

    pub fn is_flex_container(&self) -> bool {
        self.has_class("flex")
            || self.has_class("inline-flex")
            || matches!(self.style_value("display"), Some("flex") | Some("inline-flex"))
    }

    /// Depth-first search for the element carrying `id`, including `self`.
    pub fn find_by_id(&self, id: &str) -> Option<&RenderNode> {
        if self.id.as_deref() == Some(id) {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find_by_id(id))
    }

    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(RenderNode::node_count).sum::<usize>()
    }
}

/// Which elements a style rule targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    /// The captured element itself.
    Root,
    /// Descendants laid out as flex containers.
    FlexContainer,
    /// Descendants with one of these tag names.
    Tags(&'static [&'static str]),
}

impl Selector {
    fn matches(&self, node: &RenderNode, is_root: bool) -> bool {
        match self {
            Selector::Root => is_root,
            Selector::FlexContainer => !is_root && node.is_flex_container(),
            Selector::Tags(tags) => !is_root && tags.contains(&node.tag_name().as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleRule {
    pub selector: Selector,
    pub declarations: Vec<(&'static str, &'static str)>,
}

/// Immutable set of style rules applied while building the print tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleOverrides {
    rules: Vec<StyleRule>,
}

impl StyleOverrides {
    pub fn new(rules: Vec<StyleRule>) -> Self {
        Self { rules }
    }

    /// Theme-neutral A4 capture: white page, black ink, fixed print width,
    /// flex rows centered on the cross axis.
    pub fn print_defaults() -> Self {
        Self::new(vec![
            StyleRule {
                selector: Selector::Root,
                declarations: vec![
                    ("background", "white"),
                    ("color", "black"),
                    ("width", "210mm"),
                    ("padding", "10mm"),
                    ("box-sizing", "border-box"),
                ],
            },
            StyleRule {
                selector: Selector::FlexContainer,
                declarations: vec![("align-items", "center")],
            },
            StyleRule {
                selector: Selector::Tags(&["span", "div"]),
                declarations: vec![("line-height", "1.5"), ("vertical-align", "middle")],
            },
            StyleRule {
                selector: Selector::Tags(&["td", "th"]),
                declarations: vec![("vertical-align", "middle"), ("line-height", "1.5")],
            },
        ])
    }

    pub fn rules(&self) -> &[StyleRule] {
        &self.rules
    }

    fn apply_to(&self, node: &RenderNode, is_root: bool) -> BTreeMap<String, String> {
        let mut style = node.style.clone();
        for rule in self.rules.iter().filter(|r| r.selector.matches(node, is_root)) {
            for (property, value) in &rule.declarations {
                style.insert(property.to_string(), value.to_string());
            }
        }
        style
    }
}

impl Default for StyleOverrides {
    fn default() -> Self {
        Self::print_defaults()
    }
}

/// Copy `target` with `overrides` applied. The input tree is left untouched.
pub fn build_print_tree(target: &RenderNode, overrides: &StyleOverrides) -> RenderNode {
    build_node(target, overrides, true)
}

fn build_node(node: &RenderNode, overrides: &StyleOverrides, is_root: bool) -> RenderNode {
    RenderNode {
        tag: node.tag.clone(),
        id: node.id.clone(),
        classes: node.classes.clone(),
        style: overrides.apply_to(node, is_root),
        attrs: node.attrs.clone(),
        text: node.text.clone(),
        children: node
            .children
            .iter()
            .map(|child| build_node(child, overrides, false))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_target() -> RenderNode {
        RenderNode::new("div")
            .with_id(DEFAULT_ELEMENT_ID)
            .with_style("background", "#1e1e1e")
            .with_child(
                RenderNode::new("div")
                    .with_class("flex")
                    .with_child(RenderNode::text_node("span", "Name:"))
                    .with_child(
                        RenderNode::text_node("span", "Rina")
                            .with_style("display", "inline-flex"),
                    ),
            )
            .with_child(
                RenderNode::new("table").with_child(
                    RenderNode::new("tr")
                        .with_child(RenderNode::text_node("th", "Item"))
                        .with_child(RenderNode::text_node("td", "Cement")),
                ),
            )
    }

    #[test]
    fn test_root_is_forced_to_print_colors_and_width() {
        let tree = build_print_tree(&sample_target(), &StyleOverrides::print_defaults());
        assert_eq!(tree.style_value("background"), Some("white"));
        assert_eq!(tree.style_value("color"), Some("black"));
        assert_eq!(tree.style_value("width"), Some("210mm"));
        assert_eq!(tree.style_value("padding"), Some("10mm"));
    }

    #[test]
    fn test_flex_containers_are_centered() {
        let tree = build_print_tree(&sample_target(), &StyleOverrides::print_defaults());
        let row = &tree.children[0];
        assert_eq!(row.style_value("align-items"), Some("center"));
        let inline_flex = &row.children[1];
        assert_eq!(inline_flex.style_value("align-items"), Some("center"));
        assert_eq!(inline_flex.style_value("line-height"), Some("1.5"));
        let plain_span = &row.children[0];
        assert_eq!(plain_span.style_value("align-items"), None);
    }

    #[test]
    fn test_table_cells_are_vertically_centered() {
        let tree = build_print_tree(&sample_target(), &StyleOverrides::print_defaults());
        let row = &tree.children[1].children[0];
        for cell in &row.children {
            assert_eq!(cell.style_value("vertical-align"), Some("middle"));
            assert_eq!(cell.style_value("line-height"), Some("1.5"));
        }
    }

    #[test]
    fn test_source_tree_is_not_mutated() {
        let target = sample_target();
        let before = target.clone();
        let _ = build_print_tree(&target, &StyleOverrides::print_defaults());
        assert_eq!(target, before);
    }

    #[test]
    fn test_root_rules_do_not_leak_to_descendants() {
        let tree = build_print_tree(&sample_target(), &StyleOverrides::print_defaults());
        assert_eq!(tree.children[0].style_value("width"), None);
        assert_eq!(tree.style_value("align-items"), None);
    }

    #[test]
    fn test_find_by_id_searches_descendants() {
        let page = RenderNode::new("main").with_child(sample_target());
        let found = page.find_by_id(DEFAULT_ELEMENT_ID).map(|n| n.tag.as_str());
        assert_eq!(found, Some("div"));
        assert!(page.find_by_id("missing").is_none());
    }

    #[test]
    fn test_render_node_deserializes_with_defaults() {
        let json = r#"{"tag": "p", "text": "Hello"}"#;
        let node: RenderNode = serde_json::from_str(json).unwrap();
        assert_eq!(node.tag, "p");
        assert!(node.children.is_empty());
        assert!(node.style.is_empty());
    }
}
