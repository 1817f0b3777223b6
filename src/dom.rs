use quick_xml::Reader;
use quick_xml::events::Event;

/// Index of a node in its document's arena. Detached nodes keep their id;
/// the arena never reclaims slots within a document's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
enum NodeKind {
    Element { name: String, attrs: Vec<(String, String)> },
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// One compound selector: `tag`, `#id`, `.class`, or any combination
/// like `figure.wide`. No combinators; matching is per-element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selector {
    pub tag: Option<String>,
    pub id: Option<String>,
    pub classes: Vec<String>,
}

impl Selector {
    pub fn parse(input: &str) -> Result<Self, String> {
        let input = input.trim();
        if input.is_empty() {
            return Err("empty selector".to_string());
        }

        let mut sel = Selector::default();
        let mut rest = input;
        if !rest.starts_with('.') && !rest.starts_with('#') {
            let end = rest.find(['.', '#']).unwrap_or(rest.len());
            sel.tag = Some(rest[..end].to_string());
            rest = &rest[end..];
        }
        while !rest.is_empty() {
            let marker = rest.as_bytes()[0];
            let body = &rest[1..];
            let end = body.find(['.', '#']).unwrap_or(body.len());
            let part = &body[..end];
            if part.is_empty() {
                return Err(format!("dangling '{}' in selector '{}'", marker as char, input));
            }
            match marker {
                b'.' => sel.classes.push(part.to_string()),
                b'#' => sel.id = Some(part.to_string()),
                _ => return Err(format!("unexpected token in selector '{}'", input)),
            }
            rest = &body[end..];
        }
        Ok(sel)
    }
}

/// Comma list of compound selectors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectorList(Vec<Selector>);

impl SelectorList {
    pub fn parse(input: &str) -> Result<Self, String> {
        let selectors = input
            .split(',')
            .map(Selector::parse)
            .collect::<Result<Vec<_>, _>>()?;
        if selectors.is_empty() {
            return Err("empty selector list".to_string());
        }
        Ok(SelectorList(selectors))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Selector> {
        self.0.iter()
    }
}

/// Arena-backed element tree for already-rendered, sanitized markup.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Document {
    pub fn new() -> Self {
        let root = Node {
            kind: NodeKind::Element {
                name: "#root".to_string(),
                attrs: Vec::new(),
            },
            parent: None,
            children: Vec::new(),
        };
        Self {
            nodes: vec![root],
            root: NodeId(0),
        }
    }

    /// Parse well-formed XHTML-ish markup. The document provider is
    /// responsible for sanitization; anything malformed is a hard error.
    pub fn parse(markup: &str) -> Result<Self, String> {
        let mut doc = Document::new();
        let mut stack = vec![doc.root];
        let mut reader = Reader::from_str(markup);

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let node = doc.element_from_tag(
                        &String::from_utf8_lossy(e.name().as_ref()),
                        &e,
                    )?;
                    let parent = *stack.last().ok_or("unbalanced markup")?;
                    doc.append_child(parent, node);
                    stack.push(node);
                }
                Ok(Event::Empty(e)) => {
                    let node = doc.element_from_tag(
                        &String::from_utf8_lossy(e.name().as_ref()),
                        &e,
                    )?;
                    let parent = *stack.last().ok_or("unbalanced markup")?;
                    doc.append_child(parent, node);
                }
                Ok(Event::End(_)) => {
                    if stack.len() <= 1 {
                        return Err("unbalanced closing tag".to_string());
                    }
                    stack.pop();
                }
                Ok(Event::Text(t)) => {
                    let decoded = t
                        .decode()
                        .map_err(|e| format!("bad text content: {}", e))?;
                    let text = quick_xml::escape::unescape(&decoded)
                        .map_err(|e| format!("bad text content: {}", e))?
                        .into_owned();
                    if !text.is_empty() {
                        let parent = *stack.last().ok_or("unbalanced markup")?;
                        doc.append_text(parent, &text);
                    }
                }
                Ok(Event::GeneralRef(e)) => {
                    let name = e
                        .decode()
                        .map_err(|e| format!("bad entity reference: {}", e))?;
                    let resolved = quick_xml::escape::unescape(&format!("&{};", name))
                        .map_err(|e| format!("unresolvable entity '&{};': {}", name, e))?
                        .into_owned();
                    let parent = *stack.last().ok_or("unbalanced markup")?;
                    doc.append_text(parent, &resolved);
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(format!(
                        "malformed markup at offset {}: {}",
                        reader.buffer_position(),
                        e
                    ));
                }
            }
        }

        if stack.len() != 1 {
            return Err("unclosed element at end of input".to_string());
        }
        Ok(doc)
    }

    fn element_from_tag(
        &mut self,
        name: &str,
        e: &quick_xml::events::BytesStart,
    ) -> Result<NodeId, String> {
        let mut attrs = Vec::new();
        for attr in e.attributes() {
            let attr = attr.map_err(|e| format!("bad attribute on <{}>: {}", name, e))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
            let value = attr
                .unescape_value()
                .map_err(|e| format!("bad attribute value on <{}>: {}", name, e))?
                .to_string();
            attrs.push((key, value));
        }
        Ok(self.push_node(NodeKind::Element {
            name: name.to_string(),
            attrs,
        }))
    }

    fn push_node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn create_element(&mut self, name: &str) -> NodeId {
        self.push_node(NodeKind::Element {
            name: name.to_string(),
            attrs: Vec::new(),
        })
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push_node(NodeKind::Text(text.to_string()))
    }

    /// Append text under `parent`, merging into a trailing text node so
    /// entity references do not fragment their surrounding run.
    fn append_text(&mut self, parent: NodeId, text: &str) {
        if let Some(&last) = self.nodes[parent.0].children.last() {
            if let NodeKind::Text(t) = &mut self.nodes[last.0].kind {
                t.push_str(text);
                return;
            }
        }
        let node = self.create_text(text);
        self.append_child(parent, node);
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    pub fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.0].parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != node);
        }
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    pub fn name(&self, node: NodeId) -> Option<&str> {
        match &self.nodes[node.0].kind {
            NodeKind::Element { name, .. } => Some(name),
            NodeKind::Text(_) => None,
        }
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        matches!(self.nodes[node.0].kind, NodeKind::Element { .. })
    }

    pub fn as_text(&self, node: NodeId) -> Option<&str> {
        match &self.nodes[node.0].kind {
            NodeKind::Text(t) => Some(t),
            NodeKind::Element { .. } => None,
        }
    }

    pub fn attr(&self, node: NodeId, key: &str) -> Option<&str> {
        match &self.nodes[node.0].kind {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str()),
            NodeKind::Text(_) => None,
        }
    }

    pub fn set_attr(&mut self, node: NodeId, key: &str, value: &str) {
        if let NodeKind::Element { attrs, .. } = &mut self.nodes[node.0].kind {
            if let Some(slot) = attrs.iter_mut().find(|(k, _)| k == key) {
                slot.1 = value.to_string();
            } else {
                attrs.push((key.to_string(), value.to_string()));
            }
        }
    }

    pub fn remove_attr(&mut self, node: NodeId, key: &str) {
        if let NodeKind::Element { attrs, .. } = &mut self.nodes[node.0].kind {
            attrs.retain(|(k, _)| k != key);
        }
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.attr(node, "class")
            .map(|c| c.split_ascii_whitespace().any(|p| p == class))
            .unwrap_or(false)
    }

    pub fn add_class(&mut self, node: NodeId, class: &str) {
        if self.has_class(node, class) {
            return;
        }
        let merged = match self.attr(node, "class") {
            Some(existing) if !existing.is_empty() => format!("{} {}", existing, class),
            _ => class.to_string(),
        };
        self.set_attr(node, "class", &merged);
    }

    pub fn remove_class(&mut self, node: NodeId, class: &str) {
        if let Some(existing) = self.attr(node, "class") {
            let remaining: Vec<&str> = existing
                .split_ascii_whitespace()
                .filter(|p| *p != class)
                .collect();
            if remaining.is_empty() {
                self.remove_attr(node, "class");
            } else {
                self.set_attr(node, "class", &remaining.join(" "));
            }
        }
    }

    /// Set one property in the inline `style` attribute, preserving others.
    pub fn set_style(&mut self, node: NodeId, prop: &str, value: &str) {
        let mut props: Vec<(String, String)> = self
            .attr(node, "style")
            .map(|s| {
                s.split(';')
                    .filter_map(|decl| {
                        let (k, v) = decl.split_once(':')?;
                        Some((k.trim().to_string(), v.trim().to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();
        if let Some(slot) = props.iter_mut().find(|(k, _)| k == prop) {
            slot.1 = value.to_string();
        } else {
            props.push((prop.to_string(), value.to_string()));
        }
        let rendered = props
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect::<Vec<_>>()
            .join("; ");
        self.set_attr(node, "style", &rendered);
    }

    pub fn style(&self, node: NodeId, prop: &str) -> Option<String> {
        self.attr(node, "style")?.split(';').find_map(|decl| {
            let (k, v) = decl.split_once(':')?;
            (k.trim() == prop).then(|| v.trim().to_string())
        })
    }

    /// Elements under `scope` (inclusive) in document order.
    pub fn descendant_elements(&self, scope: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![scope];
        while let Some(node) = stack.pop() {
            if self.is_element(node) {
                out.push(node);
            }
            for &child in self.nodes[node.0].children.iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    pub fn matches(&self, node: NodeId, selector: &Selector) -> bool {
        let Some(name) = self.name(node) else {
            return false;
        };
        if let Some(tag) = &selector.tag {
            if !tag.eq_ignore_ascii_case(name) {
                return false;
            }
        }
        if let Some(id) = &selector.id {
            if self.attr(node, "id") != Some(id.as_str()) {
                return false;
            }
        }
        selector.classes.iter().all(|c| self.has_class(node, c))
    }

    pub fn matches_any(&self, node: NodeId, selectors: &SelectorList) -> bool {
        selectors.iter().any(|s| self.matches(node, s))
    }

    pub fn select(&self, scope: NodeId, selectors: &SelectorList) -> Vec<NodeId> {
        self.descendant_elements(scope)
            .into_iter()
            .filter(|&n| self.matches_any(n, selectors))
            .collect()
    }

    pub fn find_by_id(&self, id: &str) -> Option<NodeId> {
        self.descendant_elements(self.root)
            .into_iter()
            .find(|&n| self.attr(n, "id") == Some(id))
    }

    pub fn self_or_ancestor_has_class(&self, node: NodeId, class: &str) -> bool {
        let mut cursor = Some(node);
        while let Some(n) = cursor {
            if self.is_element(n) && self.has_class(n, class) {
                return true;
            }
            cursor = self.parent(n);
        }
        false
    }

    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    fn collect_text(&self, node: NodeId, out: &mut String) {
        match &self.nodes[node.0].kind {
            NodeKind::Text(t) => out.push_str(t),
            NodeKind::Element { .. } => {
                for &child in &self.nodes[node.0].children {
                    self.collect_text(child, out);
                }
            }
        }
    }

    /// Clone `src`'s children under `dst`, skipping any subtree the
    /// predicate rejects.
    pub fn clone_children_into(
        &mut self,
        src: NodeId,
        dst: NodeId,
        skip: &dyn Fn(&Document, NodeId) -> bool,
    ) {
        let templates: Vec<Template> = self.nodes[src.0]
            .children
            .clone()
            .into_iter()
            .filter_map(|child| self.snapshot(child, skip))
            .collect();
        for template in templates {
            self.materialize(template, dst);
        }
    }

    fn snapshot(&self, node: NodeId, skip: &dyn Fn(&Document, NodeId) -> bool) -> Option<Template> {
        if skip(self, node) {
            return None;
        }
        match &self.nodes[node.0].kind {
            NodeKind::Text(t) => Some(Template::Text(t.clone())),
            NodeKind::Element { name, attrs } => Some(Template::Element {
                name: name.clone(),
                attrs: attrs.clone(),
                children: self.nodes[node.0]
                    .children
                    .iter()
                    .filter_map(|&c| self.snapshot(c, skip))
                    .collect(),
            }),
        }
    }

    fn materialize(&mut self, template: Template, parent: NodeId) {
        match template {
            Template::Text(t) => {
                let node = self.create_text(&t);
                self.append_child(parent, node);
            }
            Template::Element {
                name,
                attrs,
                children,
            } => {
                let node = self.create_element(&name);
                for (k, v) in attrs {
                    self.set_attr(node, &k, &v);
                }
                self.append_child(parent, node);
                for child in children {
                    self.materialize(child, node);
                }
            }
        }
    }

    pub fn to_markup(&self) -> String {
        let mut out = String::new();
        for &child in &self.nodes[self.root.0].children {
            self.write_node(child, &mut out);
        }
        out
    }

    fn write_node(&self, node: NodeId, out: &mut String) {
        match &self.nodes[node.0].kind {
            NodeKind::Text(t) => push_escaped(out, t),
            NodeKind::Element { name, attrs } => {
                out.push('<');
                out.push_str(name);
                for (k, v) in attrs {
                    out.push(' ');
                    out.push_str(k);
                    out.push_str("=\"");
                    push_escaped(out, v);
                    out.push('"');
                }
                if self.nodes[node.0].children.is_empty() {
                    out.push_str("/>");
                } else {
                    out.push('>');
                    for &child in &self.nodes[node.0].children {
                        self.write_node(child, out);
                    }
                    out.push_str("</");
                    out.push_str(name);
                    out.push('>');
                }
            }
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
enum Template {
    Element {
        name: String,
        attrs: Vec<(String, String)>,
        children: Vec<Template>,
    },
    Text(String),
}

/// Append text with markup-significant characters escaped. Control
/// characters XML 1.0 forbids, and the two trailing non-characters, are
/// dropped; surrogates cannot occur in a `str`.
fn push_escaped(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\t' | '\n' | '\r' => out.push(c),
            _ if (c as u32) < 0x20 || matches!(c as u32, 0xFFFE | 0xFFFF) => {}
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Document {
        Document::parse(concat!(
            r#"<article id="main"><p class="intro first">Hello "#,
            r##"<sup class="footnote-ref" id="fnref1"><a href="#fn1">1</a></sup></p>"##,
            r#"<figure class="wide" id="fig"><img src="x.png"/></figure>"#,
            r#"<section id="footnotes"><ol><li class="footnote" id="fn1">"#,
            r##"<p>Note text <a class="footnote-back" href="#fnref1">&#8617;</a></p>"##,
            r#"</li></ol></section></article>"#,
        ))
        .expect("sample parses")
    }

    #[test]
    fn parse_and_find_by_id() {
        let doc = sample();
        assert!(doc.find_by_id("fnref1").is_some());
        assert!(doc.find_by_id("fn1").is_some());
        assert!(doc.find_by_id("nope").is_none());
    }

    #[test]
    fn entity_references_resolve_into_text() {
        let doc = Document::parse("<p>a &amp; b &#8617; c</p>").unwrap();
        let p = doc.select(doc.root(), &SelectorList::parse("p").unwrap())[0];
        assert_eq!(doc.text_content(p), "a & b \u{21a9} c");
        // Resolved references merge into the surrounding text run.
        assert_eq!(doc.children(p).len(), 1);
    }

    #[test]
    fn parse_rejects_unbalanced_markup() {
        assert!(Document::parse("<p><em>text</p>").is_err());
        assert!(Document::parse("<p>text").is_err());
    }

    #[test]
    fn selector_parsing() {
        let sel = Selector::parse("figure.wide").unwrap();
        assert_eq!(sel.tag.as_deref(), Some("figure"));
        assert_eq!(sel.classes, vec!["wide".to_string()]);

        let sel = Selector::parse("#footnotes").unwrap();
        assert_eq!(sel.id.as_deref(), Some("footnotes"));
        assert!(sel.tag.is_none());

        assert!(Selector::parse("").is_err());
        assert!(Selector::parse("p.").is_err());
    }

    #[test]
    fn select_with_comma_list() {
        let doc = sample();
        let list = SelectorList::parse(".wide, table").unwrap();
        let hits = doc.select(doc.root(), &list);
        assert_eq!(hits.len(), 1);
        assert_eq!(doc.attr(hits[0], "id"), Some("fig"));
    }

    #[test]
    fn class_mutation_roundtrip() {
        let mut doc = sample();
        let p = doc.select(doc.root(), &SelectorList::parse("p.intro").unwrap())[0];
        assert!(doc.has_class(p, "first"));
        doc.add_class(p, "highlighted");
        doc.add_class(p, "highlighted");
        assert_eq!(doc.attr(p, "class"), Some("intro first highlighted"));
        doc.remove_class(p, "first");
        assert_eq!(doc.attr(p, "class"), Some("intro highlighted"));
    }

    #[test]
    fn style_property_updates_preserve_others() {
        let mut doc = Document::new();
        let el = doc.create_element("aside");
        let root = doc.root();
        doc.append_child(root, el);
        doc.set_style(el, "top", "40px");
        doc.set_style(el, "left", "0px");
        doc.set_style(el, "top", "55.5px");
        assert_eq!(doc.style(el, "top").as_deref(), Some("55.5px"));
        assert_eq!(doc.style(el, "left").as_deref(), Some("0px"));
    }

    #[test]
    fn clone_children_skips_rejected_subtrees() {
        let mut doc = sample();
        let footnote = doc.find_by_id("fn1").unwrap();
        let target = doc.create_element("aside");
        let root = doc.root();
        doc.append_child(root, target);
        doc.clone_children_into(footnote, target, &|d, n| {
            d.is_element(n) && d.has_class(n, "footnote-back")
        });
        let text = doc.text_content(target);
        assert!(text.contains("Note text"));
        assert!(!text.contains('\u{21a9}'));
    }

    #[test]
    fn detach_removes_from_parent_children() {
        let mut doc = sample();
        let fig = doc.find_by_id("fig").unwrap();
        let parent = doc.parent(fig).unwrap();
        doc.detach(fig);
        assert!(!doc.children(parent).contains(&fig));
        assert!(doc.parent(fig).is_none());
    }

    #[test]
    fn serialization_escapes_text() {
        let mut doc = Document::new();
        let p = doc.create_element("p");
        let root = doc.root();
        doc.append_child(root, p);
        let t = doc.create_text("a < b & c");
        doc.append_child(p, t);
        assert_eq!(doc.to_markup(), "<p>a &lt; b &amp; c</p>");
    }

    #[test]
    fn serialization_drops_forbidden_control_chars() {
        let mut doc = Document::new();
        let p = doc.create_element("p");
        let root = doc.root();
        doc.append_child(root, p);
        doc.set_attr(p, "title", "a\u{0007}\"b");
        let t = doc.create_text("x\u{0008}y\tz");
        doc.append_child(p, t);
        assert_eq!(doc.to_markup(), "<p title=\"a&quot;b\">xy\tz</p>");
    }

    #[test]
    fn ancestor_class_walk() {
        let mut doc = sample();
        let a = doc
            .select(doc.root(), &SelectorList::parse(".footnote-back").unwrap())[0];
        let article = doc.find_by_id("main").unwrap();
        doc.add_class(article, "hidden");
        assert!(doc.self_or_ancestor_has_class(a, "hidden"));
        doc.remove_class(article, "hidden");
        assert!(!doc.self_or_ancestor_has_class(a, "hidden"));
    }
}
