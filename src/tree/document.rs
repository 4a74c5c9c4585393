/*!
The arena document and its mutation and traversal surface.
*/
use std::error;
use std::fmt;

#[cfg(feature = "mt")]
use std::sync::{Mutex, MutexGuard};

#[cfg(not(feature = "mt"))]
use std::cell::{RefCell, RefMut};

use std::collections::HashMap;

use crate::parser::{NamespaceName, XMLVersion, XMLNS_XML};
use crate::strings::{CData, CDataStr, NCName};
use crate::{RcPtr, WeakPtr};

use super::node::{Attribute, NamespaceDecl, Node, NodeId, NodeKind};

/// Errors from tree construction and mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeError {
	/// The node id does not refer to a live node of this document (it
	/// never existed, or its node has been moved out of the document).
	StaleNode,
	/// The child of an append operation already has a parent.
	///
	/// Nodes cannot be moved between positions or trees in one step;
	/// detach the node first, or copy it.
	AlreadyAttached,
	/// Attribute or namespace operation on a node which is not an
	/// element.
	NotAnElement,
	/// The node kind is not allowed at the requested position (e.g. text
	/// directly under the document node), or the parent cannot hold
	/// children.
	InvalidChild,
	/// The document node already has a root element.
	MultipleRoots,
	/// The operation would make a node its own ancestor.
	CycleProhibited,
	/// The operation is not applicable to the document node.
	DocumentNode,
}

impl fmt::Display for TreeError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::StaleNode => f.write_str("node id does not refer to a live node"),
			Self::AlreadyAttached => {
				f.write_str("node already has a parent; detach or copy it first")
			}
			Self::NotAnElement => f.write_str("node is not an element"),
			Self::InvalidChild => f.write_str("node kind not allowed at this position"),
			Self::MultipleRoots => f.write_str("document already has a root element"),
			Self::CycleProhibited => f.write_str("operation would create a cycle"),
			Self::DocumentNode => f.write_str("operation not applicable to the document node"),
		}
	}
}

impl error::Error for TreeError {}

pub type TreeResult<T> = std::result::Result<T, TreeError>;

type HandleMap = weak_table::WeakValueHashMap<NodeId, WeakPtr<NodeId>>;

/**
# Stable handle to a node

Handles are identity tokens: requesting a handle for the same live node
twice yields the *same* shared allocation, so handle equality is node
identity. The document keeps a weak side table from node id to handle;
entries expire when the last handle is dropped and are purged when the
node is moved out of the document.
*/
#[derive(Clone, Debug)]
pub struct NodeHandle(RcPtr<NodeId>);

impl NodeHandle {
	/// Id of the node this handle refers to.
	pub fn id(&self) -> NodeId {
		*self.0
	}
}

impl PartialEq for NodeHandle {
	fn eq(&self, other: &Self) -> bool {
		RcPtr::ptr_eq(&self.0, &other.0)
	}
}

impl Eq for NodeHandle {}

/**
# An XML document tree

The document owns all of its nodes in an arena; nodes refer to each other
by [`NodeId`]. Nodes live exactly as long as their document, except when
they are moved out with [`Document::extract`].

A fresh document consists of a single document node (id 0) and nothing
else. Nodes created through the `create_*` methods start out unattached
and are placed with [`Document::append_child`].
*/
pub struct Document {
	version: Option<XMLVersion>,
	encoding: Option<CData>,
	standalone: Option<bool>,
	nodes: Vec<Option<Node>>,
	#[cfg(feature = "mt")]
	handles: Mutex<HandleMap>,
	#[cfg(not(feature = "mt"))]
	handles: RefCell<HandleMap>,
}

/// Id of the document node of every [`Document`].
pub const DOCUMENT_NODE: NodeId = 0;

impl Document {
	/// Create a new, empty document.
	pub fn new() -> Document {
		Document {
			version: None,
			encoding: None,
			standalone: None,
			nodes: vec![Some(Node::document())],
			#[cfg(feature = "mt")]
			handles: Mutex::new(HandleMap::new()),
			#[cfg(not(feature = "mt"))]
			handles: RefCell::new(HandleMap::new()),
		}
	}

	#[cfg(feature = "mt")]
	fn lock_handles<'a>(&'a self) -> MutexGuard<'a, HandleMap> {
		self.handles.lock().unwrap()
	}

	#[cfg(not(feature = "mt"))]
	fn lock_handles<'a>(&'a self) -> RefMut<'a, HandleMap> {
		self.handles.borrow_mut()
	}

	/// Declared XML version, if the document carried a declaration.
	pub fn version(&self) -> Option<XMLVersion> {
		self.version
	}

	pub fn set_version(&mut self, version: Option<XMLVersion>) {
		self.version = version;
	}

	/// Declared encoding.
	pub fn encoding(&self) -> Option<&CDataStr> {
		self.encoding.as_deref()
	}

	pub fn set_encoding(&mut self, encoding: Option<CData>) {
		self.encoding = encoding;
	}

	/// Declared standalone flag.
	pub fn standalone(&self) -> Option<bool> {
		self.standalone
	}

	pub fn set_standalone(&mut self, standalone: Option<bool>) {
		self.standalone = standalone;
	}

	fn get(&self, id: NodeId) -> TreeResult<&Node> {
		self.nodes
			.get(id as usize)
			.and_then(|slot| slot.as_ref())
			.ok_or(TreeError::StaleNode)
	}

	fn get_mut(&mut self, id: NodeId) -> TreeResult<&mut Node> {
		self.nodes
			.get_mut(id as usize)
			.and_then(|slot| slot.as_mut())
			.ok_or(TreeError::StaleNode)
	}

	fn alloc(&mut self, node: Node) -> NodeId {
		let id = self.nodes.len() as NodeId;
		self.nodes.push(Some(node));
		id
	}

	/// Number of live nodes, including the document node.
	pub fn node_count(&self) -> usize {
		self.nodes.iter().filter(|n| n.is_some()).count()
	}

	/// The root element, if one has been attached yet.
	pub fn root_element(&self) -> Option<NodeId> {
		let mut cur = self.get(DOCUMENT_NODE).ok()?.first_child;
		while let Some(id) = cur {
			let node = self.get(id).ok()?;
			if node.kind == NodeKind::Element {
				return Some(id);
			}
			cur = node.next_sibling;
		}
		None
	}

	/// Create an unattached element node.
	pub fn create_element(
		&mut self,
		prefix: Option<NCName>,
		localname: NCName,
		nsuri: Option<NamespaceName>,
	) -> NodeId {
		self.alloc(Node::element(prefix, localname, nsuri))
	}

	/// Create an unattached text node.
	pub fn create_text(&mut self, value: CData) -> NodeId {
		self.alloc(Node::text(NodeKind::Text, value))
	}

	/// Create an unattached CDATA-section node.
	pub fn create_cdata(&mut self, value: CData) -> NodeId {
		self.alloc(Node::text(NodeKind::CData, value))
	}

	/// Create an unattached comment node.
	pub fn create_comment(&mut self, value: CData) -> NodeId {
		self.alloc(Node::text(NodeKind::Comment, value))
	}

	/// Kind of the node.
	pub fn kind(&self, id: NodeId) -> TreeResult<NodeKind> {
		Ok(self.get(id)?.kind)
	}

	/// Localname of an element node.
	pub fn localname(&self, id: NodeId) -> TreeResult<Option<&NCName>> {
		Ok(self.get(id)?.localname.as_ref())
	}

	/// Prefix under which an element appeared, if any.
	pub fn prefix(&self, id: NodeId) -> TreeResult<Option<&NCName>> {
		Ok(self.get(id)?.prefix.as_ref())
	}

	/// Resolved namespace name of an element, if any.
	pub fn nsuri(&self, id: NodeId) -> TreeResult<Option<&NamespaceName>> {
		Ok(self.get(id)?.nsuri.as_ref())
	}

	/// Content of a text, CDATA or comment node.
	pub fn value(&self, id: NodeId) -> TreeResult<Option<&CDataStr>> {
		Ok(self.get(id)?.value.as_deref())
	}

	pub fn parent(&self, id: NodeId) -> TreeResult<Option<NodeId>> {
		Ok(self.get(id)?.parent)
	}

	pub fn first_child(&self, id: NodeId) -> TreeResult<Option<NodeId>> {
		Ok(self.get(id)?.first_child)
	}

	pub fn last_child(&self, id: NodeId) -> TreeResult<Option<NodeId>> {
		Ok(self.get(id)?.last_child)
	}

	pub fn next_sibling(&self, id: NodeId) -> TreeResult<Option<NodeId>> {
		Ok(self.get(id)?.next_sibling)
	}

	pub fn prev_sibling(&self, id: NodeId) -> TreeResult<Option<NodeId>> {
		Ok(self.get(id)?.prev_sibling)
	}

	/// Iterate over the children of a node, in document order.
	pub fn children<'d>(&'d self, id: NodeId) -> TreeResult<Children<'d>> {
		Ok(Children {
			doc: self,
			next: self.get(id)?.first_child,
		})
	}

	/// Attributes of an element.
	pub fn attributes(&self, id: NodeId) -> TreeResult<&[Attribute]> {
		Ok(&self.get(id)?.attributes[..])
	}

	/// Namespace declarations made on an element.
	pub fn namespace_decls(&self, id: NodeId) -> TreeResult<&[NamespaceDecl]> {
		Ok(&self.get(id)?.nsdecl[..])
	}

	/// Set an attribute on an element.
	///
	/// An existing attribute with the same resolved (namespace,
	/// localname) pair is replaced; this is a mutation API, not the
	/// parser's duplicate check.
	pub fn set_attribute(&mut self, id: NodeId, attr: Attribute) -> TreeResult<()> {
		let node = self.get_mut(id)?;
		if node.kind != NodeKind::Element {
			return Err(TreeError::NotAnElement);
		}
		for existing in node.attributes.iter_mut() {
			if existing.localname == attr.localname && existing.nsuri == attr.nsuri {
				*existing = attr;
				return Ok(());
			}
		}
		node.attributes.push(attr);
		Ok(())
	}

	/// Look up an attribute value by localname, ignoring namespaces.
	pub fn attribute(&self, id: NodeId, localname: &str) -> TreeResult<Option<&CDataStr>> {
		Ok(self
			.get(id)?
			.attributes
			.iter()
			.find(|a| a.localname == *localname)
			.map(|a| &*a.value))
	}

	/// Look up an attribute value by namespace name and localname.
	pub fn attribute_ns(
		&self,
		id: NodeId,
		nsuri: Option<&CDataStr>,
		localname: &str,
	) -> TreeResult<Option<&CDataStr>> {
		Ok(self
			.get(id)?
			.attributes
			.iter()
			.find(|a| {
				a.localname == *localname
					&& a.nsuri.as_ref().map(|u| &***u) == nsuri
			})
			.map(|a| &*a.value))
	}

	/// Record a namespace declaration on an element.
	///
	/// A declaration for the same prefix is replaced.
	pub fn declare_namespace(&mut self, id: NodeId, decl: NamespaceDecl) -> TreeResult<()> {
		let node = self.get_mut(id)?;
		if node.kind != NodeKind::Element {
			return Err(TreeError::NotAnElement);
		}
		for existing in node.nsdecl.iter_mut() {
			if existing.prefix == decl.prefix {
				*existing = decl;
				return Ok(());
			}
		}
		node.nsdecl.push(decl);
		Ok(())
	}

	/// Resolve a prefix (or the default namespace, for `None`) at the
	/// position of the given node, walking the ancestor chain.
	pub fn lookup_namespace(
		&self,
		id: NodeId,
		prefix: Option<&str>,
	) -> TreeResult<Option<&CDataStr>> {
		if prefix == Some("xml") {
			return Ok(Some(XMLNS_XML));
		}
		let mut cur = Some(id);
		while let Some(c) = cur {
			let node = self.get(c)?;
			for decl in node.nsdecl.iter() {
				if decl.prefix.as_ref().map(|p| p.as_str()) == prefix {
					if decl.uri.len() == 0 {
						// explicit undeclaring of the default namespace
						return Ok(None);
					}
					return Ok(Some(&*decl.uri));
				}
			}
			cur = node.parent;
		}
		Ok(None)
	}

	/// Find a prefix which is bound to the given namespace name in the
	/// scope of the given node.
	pub(crate) fn prefix_for_uri(
		&self,
		id: NodeId,
		nsuri: &CDataStr,
	) -> TreeResult<Option<NCName>> {
		let mut cur = Some(id);
		while let Some(c) = cur {
			let node = self.get(c)?;
			for decl in node.nsdecl.iter() {
				if decl.prefix.is_some() && decl.uri == *nsuri {
					return Ok(decl.prefix.clone());
				}
			}
			cur = node.parent;
		}
		Ok(None)
	}

	/// Internal child linking; all validation must have happened.
	fn link_child(&mut self, parent: NodeId, child: NodeId) {
		let old_last = {
			let p = self.get_mut(parent).expect("live parent");
			let old_last = p.last_child;
			p.last_child = Some(child);
			if p.first_child.is_none() {
				p.first_child = Some(child);
			}
			old_last
		};
		if let Some(prev) = old_last {
			self.get_mut(prev).expect("live sibling").next_sibling = Some(child);
		}
		let c = self.get_mut(child).expect("live child");
		c.parent = Some(parent);
		c.prev_sibling = old_last;
		c.next_sibling = None;
	}

	/// Append an unattached node as the last child of `parent`.
	///
	/// The child must belong to this document and must not currently
	/// have a parent; attached nodes cannot be moved in one step (detach
	/// or copy them first).
	pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> TreeResult<()> {
		if parent == child {
			return Err(TreeError::CycleProhibited);
		}
		let parent_kind = self.get(parent)?.kind;
		{
			let c = self.get(child)?;
			if c.kind == NodeKind::Document {
				return Err(TreeError::DocumentNode);
			}
			if c.parent.is_some() {
				return Err(TreeError::AlreadyAttached);
			}
		}
		match parent_kind {
			NodeKind::Element => (),
			NodeKind::Document => match self.get(child)?.kind {
				NodeKind::Element => {
					if self.root_element().is_some() {
						return Err(TreeError::MultipleRoots);
					}
				}
				NodeKind::Comment => (),
				_ => return Err(TreeError::InvalidChild),
			},
			_ => return Err(TreeError::InvalidChild),
		}
		// `parent` hanging somewhere below the (unattached) child would
		// produce a loop
		let mut cur = self.get(parent)?.parent;
		while let Some(c) = cur {
			if c == child {
				return Err(TreeError::CycleProhibited);
			}
			cur = self.get(c)?.parent;
		}
		self.link_child(parent, child);
		Ok(())
	}

	/// Append character data under `parent`.
	///
	/// If the last child of `parent` is a text node, the data is merged
	/// into it (as a parser would); otherwise a new text node is created.
	/// Returns the id of the node holding the data.
	pub fn append_text(&mut self, parent: NodeId, data: &CDataStr) -> TreeResult<NodeId> {
		if let Some(last) = self.get(parent)?.last_child {
			let node = self.get_mut(last)?;
			if node.kind == NodeKind::Text {
				node.value
					.as_mut()
					.expect("text node without value")
					.push_cdata(data);
				return Ok(last);
			}
		}
		let id = self.create_text(data.to_owned());
		self.append_child(parent, id)?;
		Ok(id)
	}

	/// Unlink a node from its parent and siblings in one step.
	///
	/// The node stays in the document as an unattached subtree root and
	/// can be re-attached with [`Document::append_child`]. Detaching an
	/// already-detached node is a no-op.
	pub fn detach(&mut self, id: NodeId) -> TreeResult<()> {
		if id == DOCUMENT_NODE {
			return Err(TreeError::DocumentNode);
		}
		let (parent, prev, next) = {
			let node = self.get(id)?;
			(node.parent, node.prev_sibling, node.next_sibling)
		};
		let parent = match parent {
			None => return Ok(()),
			Some(p) => p,
		};
		match prev {
			Some(prev) => self.get_mut(prev)?.next_sibling = next,
			None => self.get_mut(parent)?.first_child = next,
		}
		match next {
			Some(next) => self.get_mut(next)?.prev_sibling = prev,
			None => self.get_mut(parent)?.last_child = prev,
		}
		let node = self.get_mut(id)?;
		node.parent = None;
		node.prev_sibling = None;
		node.next_sibling = None;
		Ok(())
	}

	/// Ids of the subtree rooted at `id`, in document order.
	fn subtree_order(&self, id: NodeId) -> TreeResult<Vec<NodeId>> {
		let mut order = Vec::new();
		let mut stack = vec![id];
		while let Some(cur) = stack.pop() {
			order.push(cur);
			let mut children = Vec::new();
			let mut c = self.get(cur)?.first_child;
			while let Some(cid) = c {
				children.push(cid);
				c = self.get(cid)?.next_sibling;
			}
			stack.extend(children.into_iter().rev());
		}
		Ok(order)
	}

	/// Move the subtree rooted at `id` into its own document.
	///
	/// The subtree is detached first; afterwards, the node ids of the
	/// moved subtree are only meaningful in the returned document, and
	/// any outstanding handles for them are stale.
	pub fn extract(&mut self, id: NodeId) -> TreeResult<Document> {
		self.detach(id)?;
		let order = self.subtree_order(id)?;
		let mut dst = Document::new();
		let mut map: HashMap<NodeId, NodeId> = HashMap::with_capacity(order.len());
		for old in order.iter() {
			let node = self.nodes[*old as usize]
				.take()
				.expect("live subtree node");
			self.lock_handles().remove(old);
			let parent_old = node.parent;
			let new_id = dst.alloc(node.unlinked());
			map.insert(*old, new_id);
			match parent_old.and_then(|p| map.get(&p)) {
				Some(parent_new) => {
					let parent_new = *parent_new;
					dst.link_child(parent_new, new_id)
				}
				// subtree root; hang it off the new document node
				None => dst.link_child(DOCUMENT_NODE, new_id),
			}
		}
		Ok(dst)
	}

	/// Copy a single node (attributes included for elements, children
	/// excluded). The copy is always new and unattached.
	pub fn copy_shallow(&mut self, id: NodeId) -> TreeResult<NodeId> {
		if id == DOCUMENT_NODE {
			return Err(TreeError::DocumentNode);
		}
		let copy = self.get(id)?.content_copy();
		Ok(self.alloc(copy))
	}

	/// Copy the full subtree rooted at `id`. The copy is always new and
	/// unattached.
	pub fn copy_deep(&mut self, id: NodeId) -> TreeResult<NodeId> {
		if id == DOCUMENT_NODE {
			return Err(TreeError::DocumentNode);
		}
		let order = self.subtree_order(id)?;
		let mut map: HashMap<NodeId, NodeId> = HashMap::with_capacity(order.len());
		for old in order.iter() {
			let (copy, parent_old) = {
				let node = self.get(*old)?;
				(node.content_copy(), node.parent)
			};
			let new_id = self.alloc(copy);
			map.insert(*old, new_id);
			if let Some(parent_new) = parent_old.and_then(|p| map.get(&p)).copied() {
				self.link_child(parent_new, new_id);
			}
		}
		Ok(map[&id])
	}

	/// Copy a node (or, with `deep`, a whole subtree) from another
	/// document into this one. The copy is new and unattached.
	///
	/// This is the supported way of moving content between documents;
	/// direct moves are rejected by [`Document::append_child`].
	pub fn copy_into(&mut self, src: &Document, id: NodeId, deep: bool) -> TreeResult<NodeId> {
		if id == DOCUMENT_NODE {
			return Err(TreeError::DocumentNode);
		}
		if !deep {
			let copy = src.get(id)?.content_copy();
			return Ok(self.alloc(copy));
		}
		let order = src.subtree_order(id)?;
		let mut map: HashMap<NodeId, NodeId> = HashMap::with_capacity(order.len());
		for old in order.iter() {
			let node = src.get(*old)?;
			let new_id = self.alloc(node.content_copy());
			map.insert(*old, new_id);
			if let Some(parent_new) = node.parent.and_then(|p| map.get(&p)).copied() {
				self.link_child(parent_new, new_id);
			}
		}
		Ok(map[&id])
	}

	/// Concatenated text content of the subtree rooted at `id`, in
	/// document order. Comments do not contribute.
	pub fn text_content(&self, id: NodeId) -> TreeResult<CData> {
		let mut out = unsafe { CData::from_unchecked("") };
		for cur in self.subtree_order(id)? {
			let node = self.get(cur)?;
			match node.kind {
				NodeKind::Text | NodeKind::CData => {
					out.push_cdata(node.value.as_deref().expect("text node without value"));
				}
				_ => (),
			}
		}
		Ok(out)
	}

	/// Return the stable [`NodeHandle`] for a live node.
	///
	/// The same node yields the same handle for as long as at least one
	/// handle to it is alive; see [`NodeHandle`].
	pub fn handle(&self, id: NodeId) -> TreeResult<NodeHandle> {
		self.get(id)?;
		let mut handles = self.lock_handles();
		match handles.get(&id) {
			Some(existing) => Ok(NodeHandle(existing)),
			None => {
				let fresh = RcPtr::new(id);
				handles.insert(id, fresh.clone());
				Ok(NodeHandle(fresh))
			}
		}
	}
}

impl Default for Document {
	fn default() -> Document {
		Document::new()
	}
}

impl fmt::Debug for Document {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("Document")
			.field("version", &self.version)
			.field("nodes", &self.node_count())
			.field("root_element", &self.root_element())
			.finish()
	}
}

/// Iterator over the children of a node.
pub struct Children<'d> {
	doc: &'d Document,
	next: Option<NodeId>,
}

impl<'d> Iterator for Children<'d> {
	type Item = NodeId;

	fn next(&mut self) -> Option<NodeId> {
		let id = self.next?;
		self.next = self.doc.get(id).ok().and_then(|n| n.next_sibling);
		Some(id)
	}
}
