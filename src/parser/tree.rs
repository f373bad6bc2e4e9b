use scraper::{ElementRef, Html};

/// Elements whose text never counts as content.
const SKIPPED_TAGS: [&str; 4] = ["script", "style", "noscript", "template"];

pub type NodeId = usize;

#[derive(Debug)]
enum NodeKind {
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
}

#[derive(Debug)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    /// One past the last descendant. Ids are assigned in document order.
    end: NodeId,
}

/// Owned, parser-agnostic snapshot of an HTML document.
///
/// Nodes are stored in document (pre-)order, so a node's descendants are the
/// contiguous id range `id + 1 .. end`. Unlike `scraper::Html` the tree is
/// `Send` and can be handed across threads.
#[derive(Debug)]
pub struct DocTree {
    nodes: Vec<Node>,
}

impl DocTree {
    #[cfg(test)]
    pub fn parse(html: &str) -> Self {
        Self::from_html(&Html::parse_document(html))
    }

    pub fn from_html(doc: &Html) -> Self {
        let mut tree = DocTree { nodes: Vec::new() };
        tree.push_element(doc.root_element(), None);
        tree
    }

    fn push_element(&mut self, root: ElementRef<'_>, parent: Option<NodeId>) {
        // Explicit stack: deeply nested pages must not blow the call stack.
        enum Visit<'a> {
            Enter(ElementRef<'a>, Option<NodeId>),
            Text(String, NodeId),
            Leave(NodeId),
        }

        let mut stack = vec![Visit::Enter(root, parent)];
        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Enter(el, parent) => {
                    let value = el.value();
                    let id = self.add(
                        NodeKind::Element {
                            tag: value.name().to_ascii_lowercase(),
                            attrs: value
                                .attrs()
                                .map(|(k, v)| (k.to_string(), v.to_string()))
                                .collect(),
                        },
                        parent,
                    );
                    stack.push(Visit::Leave(id));
                    let mut pending = Vec::new();
                    for child in el.children() {
                        if let Some(child_el) = ElementRef::wrap(child) {
                            if !SKIPPED_TAGS.contains(&child_el.value().name()) {
                                pending.push(Visit::Enter(child_el, Some(id)));
                            }
                        } else if let Some(text) = child.value().as_text() {
                            pending.push(Visit::Text(text.to_string(), id));
                        }
                    }
                    stack.extend(pending.into_iter().rev());
                }
                Visit::Text(text, parent) => {
                    self.add(NodeKind::Text(text), Some(parent));
                }
                Visit::Leave(id) => self.nodes[id].end = self.nodes.len(),
            }
        }
    }

    fn add(&mut self, kind: NodeKind, parent: Option<NodeId>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            kind,
            parent,
            children: Vec::new(),
            end: id + 1,
        });
        if let Some(p) = parent {
            self.nodes[p].children.push(id);
        }
        id
    }

    pub fn root(&self) -> NodeId {
        0
    }

    /// Lowercased tag name; `None` for text nodes.
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id].kind {
            NodeKind::Element { tag, .. } => Some(tag),
            NodeKind::Text(_) => None,
        }
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        match &self.nodes[id].kind {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str()),
            NodeKind::Text(_) => None,
        }
    }

    pub fn classes(&self, id: NodeId) -> impl Iterator<Item = &str> {
        self.attr(id, "class").unwrap_or("").split_whitespace()
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.classes(id).any(|c| c == class)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    /// Siblings after `id`, in document order.
    pub fn next_siblings(&self, id: NodeId) -> &[NodeId] {
        let Some(parent) = self.parent(id) else {
            return &[];
        };
        let siblings = self.children(parent);
        match siblings.iter().position(|&s| s == id) {
            Some(pos) => &siblings[pos + 1..],
            None => &[],
        }
    }

    /// Every node below `id`, in document order.
    pub fn descendants(&self, id: NodeId) -> impl Iterator<Item = NodeId> {
        id + 1..self.nodes[id].end
    }

    /// Descendant elements with one of `tags`, in document order.
    pub fn elements<'a>(
        &'a self,
        id: NodeId,
        tags: &'a [&'a str],
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.descendants(id)
            .filter(move |&n| self.tag(n).is_some_and(|t| tags.contains(&t)))
    }

    /// 1 for `h1` through 6 for `h6`.
    pub fn heading_level(&self, id: NodeId) -> Option<u8> {
        let tag = self.tag(id)?;
        let level = tag.strip_prefix('h')?.parse::<u8>().ok()?;
        (1..=6).contains(&level).then_some(level)
    }

    /// Text of the subtree: trimmed fragments joined by single spaces.
    pub fn text(&self, id: NodeId) -> String {
        let own = std::iter::once(id).chain(self.descendants(id));
        let mut out = String::new();
        for n in own {
            if let NodeKind::Text(t) = &self.nodes[n].kind {
                let t = t.trim();
                if !t.is_empty() {
                    if !out.is_empty() {
                        out.push(' ');
                    }
                    out.push_str(t);
                }
            }
        }
        out
    }
}
