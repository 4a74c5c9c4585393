/*!
Tree construction from parse events.

[`TreeBuilder`] is an ordinary [`SaxHandler`]: plugged into a
[`SaxParser`](crate::SaxParser) it builds the document incrementally as
chunks arrive; the batch entry points on [`Document`] drive it from a
[`PullParser`](crate::PullParser) instead.
*/
use std::io;

use crate::driver::{EventRead, PullParser};
use crate::error::{Error, Result};
use crate::parser::{ElementFoot, ElementHead, XMLVersion};
use crate::sax::{route_event, HandlerResult, SaxHandler};
use crate::strings::CDataStr;

use super::document::{Document, DOCUMENT_NODE};
use super::node::{Attribute, NamespaceDecl, NodeId};

const ENCODING_UTF8: &'static CDataStr = unsafe { std::mem::transmute("utf-8") };

/**
# SAX handler which builds a [`Document`]

The builder keeps a stack of open elements; events append to the element
on top. Adjacent character data is merged into a single text node, the
way parsers conventionally do.
*/
pub struct TreeBuilder {
	doc: Document,
	stack: Vec<NodeId>,
	complete: bool,
}

impl TreeBuilder {
	pub fn new() -> Self {
		Self {
			doc: Document::new(),
			stack: vec![DOCUMENT_NODE],
			complete: false,
		}
	}

	/// The document built so far.
	///
	/// Before [`SaxHandler::end_document`] has fired this is a partial,
	/// best-effort view.
	pub fn document(&self) -> &Document {
		&self.doc
	}

	/// True once `end_document` has been observed.
	pub fn is_complete(&self) -> bool {
		self.complete
	}

	/// Consume the builder and take the document out.
	pub fn into_document(self) -> Document {
		self.doc
	}

	fn top(&self) -> NodeId {
		*self.stack.last().expect("builder stack underflow")
	}

	fn tree_failure(e: super::document::TreeError) -> crate::error::HandlerError {
		crate::error::HandlerError::new(format!("tree construction failed: {}", e))
	}
}

impl Default for TreeBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl SaxHandler for TreeBuilder {
	fn declaration(&mut self, version: XMLVersion) -> HandlerResult {
		self.doc.set_version(Some(version));
		// the parser only accepts utf-8 input, so a declared encoding
		// can only have been utf-8
		self.doc.set_encoding(Some(ENCODING_UTF8.to_owned()));
		Ok(())
	}

	fn start_element(&mut self, head: &ElementHead) -> HandlerResult {
		let parent = self.top();
		let el = self.doc.create_element(
			head.prefix.clone(),
			head.localname.clone(),
			head.nsuri.clone(),
		);
		self.doc
			.append_child(parent, el)
			.map_err(Self::tree_failure)?;
		for (prefix, uri) in head.nsdecl.iter() {
			self.doc
				.declare_namespace(
					el,
					NamespaceDecl {
						prefix: prefix.clone(),
						uri: (**uri).clone(),
					},
				)
				.map_err(Self::tree_failure)?;
		}
		for ((nsuri, localname), value) in head.attributes.iter() {
			// recover the prefix from the declarations in scope; the
			// event only carries the resolved name
			let prefix = match nsuri {
				Some(uri) => self
					.doc
					.prefix_for_uri(el, uri)
					.map_err(Self::tree_failure)?,
				None => None,
			};
			self.doc
				.set_attribute(
					el,
					Attribute {
						prefix,
						localname: localname.clone(),
						nsuri: nsuri.clone(),
						value: value.clone(),
					},
				)
				.map_err(Self::tree_failure)?;
		}
		self.stack.push(el);
		Ok(())
	}

	fn end_element(&mut self, _foot: &ElementFoot) -> HandlerResult {
		debug_assert!(self.stack.len() > 1);
		self.stack.pop();
		Ok(())
	}

	fn characters(&mut self, data: &CDataStr) -> HandlerResult {
		let parent = self.top();
		self.doc
			.append_text(parent, data)
			.map_err(Self::tree_failure)?;
		Ok(())
	}

	fn comment(&mut self, data: &CDataStr) -> HandlerResult {
		let parent = self.top();
		let node = self.doc.create_comment(data.to_owned());
		self.doc
			.append_child(parent, node)
			.map_err(Self::tree_failure)?;
		Ok(())
	}

	fn end_document(&mut self) -> HandlerResult {
		self.complete = true;
		Ok(())
	}
}

impl Document {
	/// Parse a complete document from a [`io::BufRead`], without
	/// deferral.
	pub fn parse_reader<R: io::BufRead>(r: R) -> Result<Document> {
		let mut pp = PullParser::new(r);
		let mut builder = TreeBuilder::new();
		builder.start_document().map_err(Error::from)?;
		loop {
			match pp.read()? {
				Some(ev) => route_event(&mut builder, &ev).map_err(Error::from)?,
				None => break,
			}
		}
		builder.end_document().map_err(Error::from)?;
		Ok(builder.into_document())
	}

	/// Parse a complete document from a byte slice.
	pub fn parse_bytes(data: &[u8]) -> Result<Document> {
		Self::parse_reader(data)
	}

	/// Parse a complete document from a string.
	pub fn parse_str(s: &str) -> Result<Document> {
		Self::parse_reader(s.as_bytes())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::tree::NodeKind;

	#[test]
	fn builds_simple_document() {
		let doc = Document::parse_str("<?xml version='1.0'?><a><b>x</b></a>").unwrap();
		assert_eq!(doc.version(), Some(XMLVersion::V1_0));
		assert_eq!(doc.encoding().unwrap(), "utf-8");
		let root = doc.root_element().unwrap();
		assert_eq!(doc.localname(root).unwrap().unwrap(), "a");
		let b = doc.first_child(root).unwrap().unwrap();
		assert_eq!(doc.localname(b).unwrap().unwrap(), "b");
		assert_eq!(doc.text_content(b).unwrap(), "x");
	}

	#[test]
	fn merges_split_character_data() {
		// the entity forces the lexer to split the text run
		let doc = Document::parse_str("<a>x&amp;y</a>").unwrap();
		let root = doc.root_element().unwrap();
		assert_eq!(doc.children(root).unwrap().count(), 1);
		assert_eq!(doc.text_content(root).unwrap(), "x&y");
	}

	#[test]
	fn stores_namespace_information() {
		let doc = Document::parse_str(
			"<p:root xmlns:p='urn:one' p:k='v'><child xmlns='urn:two'/></p:root>",
		)
		.unwrap();
		let root = doc.root_element().unwrap();
		assert_eq!(doc.prefix(root).unwrap().unwrap(), "p");
		assert_eq!(doc.nsuri(root).unwrap().unwrap().as_str(), "urn:one");
		let attrs = doc.attributes(root).unwrap();
		assert_eq!(attrs.len(), 1);
		assert_eq!(attrs[0].prefix.as_ref().unwrap(), "p");
		assert_eq!(attrs[0].nsuri.as_ref().unwrap().as_str(), "urn:one");
		assert_eq!(
			doc.attribute_ns(
				root,
				Some(doc.nsuri(root).unwrap().unwrap()),
				"k"
			)
			.unwrap()
			.unwrap()
			.as_str(),
			"v"
		);
		let child = doc.first_child(root).unwrap().unwrap();
		assert_eq!(doc.nsuri(child).unwrap().unwrap().as_str(), "urn:two");
		assert_eq!(
			doc.lookup_namespace(child, None).unwrap().unwrap(),
			"urn:two"
		);
	}

	#[test]
	fn keeps_comments_in_the_tree() {
		let doc = Document::parse_str("<a><!-- note -->x</a>").unwrap();
		let root = doc.root_element().unwrap();
		let kinds: Vec<_> = doc
			.children(root)
			.unwrap()
			.map(|c| doc.kind(c).unwrap())
			.collect();
		assert_eq!(kinds, vec![NodeKind::Comment, NodeKind::Text]);
	}

	#[test]
	fn rejects_malformed_batch_input() {
		assert!(Document::parse_str("<a><b></a></b>").is_err());
		assert!(Document::parse_str("<a>").is_err());
		assert!(Document::parse_str("").is_err());
	}

	#[test]
	fn builder_reports_partial_document_before_completion() {
		use crate::sax::SaxParser;
		let mut p = SaxParser::new(TreeBuilder::new());
		p.receive(b"<a><b>x</b>").unwrap();
		assert!(!p.handler().is_complete());
		let doc = p.handler().document();
		let root = doc.root_element().unwrap();
		assert_eq!(doc.localname(root).unwrap().unwrap(), "a");
		p.receive(b"</a>").unwrap();
		p.close().unwrap();
		assert!(p.handler().is_complete());
	}
}
