/*!
Node storage of the arena document tree.

Nodes are addressed by [`NodeId`], an index into the owning
[`Document`](super::Document)'s arena. All structural links (parent,
children, siblings) are ids as well, never pointers, so a `Document` is a
plain owned value without any self-references.
*/
use crate::parser::NamespaceName;
use crate::strings::{CData, NCName};

/// Compact node identifier; an index into the document's node arena.
pub type NodeId = u32;

/// Kind of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
	/// The document node; exactly one per [`Document`](super::Document),
	/// always at id 0.
	Document,
	/// An element.
	Element,
	/// A run of character data.
	Text,
	/// A run of character data which serializes as a CDATA section.
	CData,
	/// A comment.
	Comment,
}

/// An attribute as stored on an element node.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
	/// Prefix under which the attribute appeared, if any.
	pub prefix: Option<NCName>,
	/// Localname of the attribute.
	pub localname: NCName,
	/// Resolved namespace name; `None` for unprefixed attributes.
	pub nsuri: Option<NamespaceName>,
	/// Normalized attribute value.
	pub value: CData,
}

/// A namespace declaration as stored on an element node.
///
/// A `None` prefix declares (or, with an empty URI, undeclares) the
/// default namespace.
#[derive(Debug, Clone, PartialEq)]
pub struct NamespaceDecl {
	pub prefix: Option<NCName>,
	pub uri: CData,
}

/// One slot of the node arena.
#[derive(Debug, Clone)]
pub(super) struct Node {
	pub(super) kind: NodeKind,
	/// Element name parts; `None` for non-element nodes.
	pub(super) prefix: Option<NCName>,
	pub(super) localname: Option<NCName>,
	pub(super) nsuri: Option<NamespaceName>,
	/// Content of text-ish nodes.
	pub(super) value: Option<CData>,
	pub(super) attributes: Vec<Attribute>,
	pub(super) nsdecl: Vec<NamespaceDecl>,
	pub(super) parent: Option<NodeId>,
	pub(super) first_child: Option<NodeId>,
	pub(super) last_child: Option<NodeId>,
	pub(super) prev_sibling: Option<NodeId>,
	pub(super) next_sibling: Option<NodeId>,
}

impl Node {
	fn blank(kind: NodeKind) -> Node {
		Node {
			kind,
			prefix: None,
			localname: None,
			nsuri: None,
			value: None,
			attributes: Vec::new(),
			nsdecl: Vec::new(),
			parent: None,
			first_child: None,
			last_child: None,
			prev_sibling: None,
			next_sibling: None,
		}
	}

	pub(super) fn document() -> Node {
		Self::blank(NodeKind::Document)
	}

	pub(super) fn element(
		prefix: Option<NCName>,
		localname: NCName,
		nsuri: Option<NamespaceName>,
	) -> Node {
		let mut n = Self::blank(NodeKind::Element);
		n.prefix = prefix;
		n.localname = Some(localname);
		n.nsuri = nsuri;
		n
	}

	pub(super) fn text(kind: NodeKind, value: CData) -> Node {
		debug_assert!(matches!(
			kind,
			NodeKind::Text | NodeKind::CData | NodeKind::Comment
		));
		let mut n = Self::blank(kind);
		n.value = Some(value);
		n
	}

	/// Consume the node, clearing all structural links.
	pub(super) fn unlinked(mut self) -> Node {
		self.parent = None;
		self.first_child = None;
		self.last_child = None;
		self.prev_sibling = None;
		self.next_sibling = None;
		self
	}

	/// Copy of this node without any structural links.
	pub(super) fn content_copy(&self) -> Node {
		Node {
			kind: self.kind,
			prefix: self.prefix.clone(),
			localname: self.localname.clone(),
			nsuri: self.nsuri.clone(),
			value: self.value.clone(),
			attributes: self.attributes.clone(),
			nsdecl: self.nsdecl.clone(),
			parent: None,
			first_child: None,
			last_child: None,
			prev_sibling: None,
			next_sibling: None,
		}
	}
}
