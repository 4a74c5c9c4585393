/*!
# Namespace resolution

Implements prefix resolution as described in Namespaces in XML 1.0,
converting [`RawEvent`]s into [`ResolvedEvent`]s. This stage also enforces
attribute uniqueness, both verbatim and after prefix expansion.
*/
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::context::Context;
use crate::error::{
	add_context, Error, NWFError, Result, WFError, ERRCTX_ATTNAME, ERRCTX_NAME, ERRCTX_UNKNOWN,
};
use crate::strings::{CData, NCName};
use crate::RcPtr;

use super::raw::{RawEvent, RawQName};
use super::{NamespaceName, QName, XMLVersion, XMLNS_XML};

/// Fully resolved name and contents of an element header.
#[derive(Clone, PartialEq, Debug)]
pub struct ElementHead {
	/// Localname of the element, without prefix.
	pub localname: NCName,
	/// Prefix under which the element appeared in the document, if any.
	pub prefix: Option<NCName>,
	/// Namespace name the prefix (or the default namespace) resolved to,
	/// if any.
	pub nsuri: Option<NamespaceName>,
	/// Attributes, keyed by resolved (namespace name, localname) pairs.
	/// Namespace declarations are not included.
	pub attributes: HashMap<QName, CData>,
	/// Namespace declarations made on this very element; the `None` key
	/// holds the default-namespace declaration. An empty value for the
	/// `None` key undeclares the default namespace.
	pub nsdecl: HashMap<Option<NCName>, NamespaceName>,
}

/// Name triple of the element being closed.
#[derive(Clone, PartialEq, Debug)]
pub struct ElementFoot {
	pub localname: NCName,
	pub prefix: Option<NCName>,
	pub nsuri: Option<NamespaceName>,
}

/**
# Namespace-resolved XML document parts

In contrast to [`RawEvent`], observing a [`ResolvedEvent`] guarantees
that the document has been well-formed and namespace-well-formed up to
this point.
*/
#[derive(Clone, PartialEq, Debug)]
pub enum ResolvedEvent {
	/// The XML declaration.
	XMLDeclaration(XMLVersion),

	/// A document type declaration was encountered and skipped.
	///
	/// The declaration is not validated against; frontends surface this
	/// as a warning.
	Doctype,

	/// The start of an element, with attributes resolved and the
	/// namespace declarations of the element captured.
	StartElement(ElementHead),

	/// The end of an element. Start/end events nest properly.
	EndElement(ElementFoot),

	/// Text character data.
	///
	/// **Note:** A single logical run of text may be split into multiple
	/// `Text` events; consumers need to concatenate.
	Text(CData),

	/// A comment's content.
	Comment(CData),
}

enum State {
	/// Outside of any element header.
	Content,
	/// Accumulating the event run of an element header.
	ElementHead,
}

struct ElementScratchpad {
	phyqname: RawQName,
	attributes: Vec<(RawQName, CData)>,
	default_decl: Option<NamespaceName>,
	nsdecl: HashMap<NCName, NamespaceName>,
}

impl ElementScratchpad {
	fn new(phyqname: RawQName) -> Self {
		Self {
			phyqname,
			attributes: Vec::new(),
			default_decl: None,
			nsdecl: HashMap::new(),
		}
	}
}

/**
# Namespace/attribute resolver

Takes [`RawEvent`]s and combines/converts them into [`ResolvedEvent`]s.

This struct does *not* validate that the sequence of raw events is a
well-formed document; that is the [`RawParser`](super::RawParser)'s job,
and the two are not meant to be used separately.
*/
pub struct NamespaceResolver {
	ctx: RcPtr<Context>,
	fixed_xml_namespace: NamespaceName,
	scope_stack: Vec<(Option<NamespaceName>, HashMap<NCName, NamespaceName>)>,
	foot_stack: Vec<ElementFoot>,
	scratchpad: Option<ElementScratchpad>,
	state: State,
	poison: Option<Error>,
}

impl NamespaceResolver {
	/// Create a new namespace resolver with its own (unshared)
	/// [`Context`].
	pub fn new() -> Self {
		Self::with_context(RcPtr::new(Context::new()))
	}

	/// Create a new namespace resolver with the given [`Context`].
	pub fn with_context(ctx: RcPtr<Context>) -> Self {
		let fixed_xml_namespace = ctx.intern_cdata(XMLNS_XML);
		Self {
			ctx,
			fixed_xml_namespace,
			scope_stack: Vec::new(),
			foot_stack: Vec::new(),
			scratchpad: None,
			state: State::Content,
			poison: None,
		}
	}

	fn check_poison(&self) -> Result<()> {
		if let Some(poison) = self.poison.as_ref() {
			return Err(poison.clone());
		}
		Ok(())
	}

	fn start_element(&mut self, phyqn: RawQName) {
		debug_assert!(self.scratchpad.is_none());
		self.scratchpad = Some(ElementScratchpad::new(phyqn));
	}

	fn push_attribute(&mut self, phyqn: RawQName, value: CData) -> Result<()> {
		let scratchpad = self.scratchpad.as_mut().unwrap();
		if let Some(prefix) = phyqn.0.as_ref() {
			if prefix == "xmlns" {
				return match scratchpad.nsdecl.entry(phyqn.1) {
					// XML 1.0
					// Well-formedness constraint: Unique Att Spec
					Entry::Occupied(_) => {
						Err(Error::NotWellFormed(WFError::DuplicateAttribute))
					}
					Entry::Vacant(e) => {
						e.insert(self.ctx.intern_cdata(value));
						Ok(())
					}
				};
			}
		} else if phyqn.1 == "xmlns" {
			if scratchpad.default_decl.is_some() {
				return Err(Error::NotWellFormed(WFError::DuplicateAttribute));
			}
			scratchpad.default_decl = Some(self.ctx.intern_cdata(value));
			return Ok(());
		}
		scratchpad.attributes.push((phyqn, value));
		Ok(())
	}

	fn lookup_prefix<'x>(&self, prefix: Option<&'x str>) -> Result<Option<&NamespaceName>> {
		match prefix {
			None => {
				for (default_decl, _) in self.scope_stack.iter().rev() {
					if let Some(nsuri) = default_decl.as_ref() {
						if nsuri.len() > 0 {
							return Ok(Some(nsuri));
						} else {
							// empty URI == default namespace undeclared
							return Ok(None);
						}
					}
				}
				Ok(None)
			}
			Some(prefix) => {
				if prefix == "xml" {
					return Ok(Some(&self.fixed_xml_namespace));
				}
				for (_, decls) in self.scope_stack.iter().rev() {
					if let Some(nsuri) = decls.get(prefix) {
						return Ok(Some(nsuri));
					}
				}
				// Namespaces in XML 1.0
				// Namespace constraint: Prefix Declared
				Err(Error::NotNamespaceWellFormed(
					NWFError::UndeclaredNamespacePrefix(ERRCTX_UNKNOWN),
				))
			}
		}
	}

	fn finish_element(&mut self) -> Result<ResolvedEvent> {
		let ElementScratchpad {
			phyqname,
			attributes: mut phyattributes,
			default_decl,
			nsdecl,
		} = self.scratchpad.take().unwrap();

		let mut decl_event = HashMap::with_capacity(
			nsdecl.len() + if default_decl.is_some() { 1 } else { 0 },
		);
		if let Some(uri) = default_decl.as_ref() {
			decl_event.insert(None, uri.clone());
		}
		for (prefix, uri) in nsdecl.iter() {
			decl_event.insert(Some(prefix.clone()), uri.clone());
		}

		// the element's own declarations are in scope for its name and
		// its attributes, so the stack is pushed first
		self.scope_stack.push((default_decl, nsdecl));

		let mut attributes = HashMap::with_capacity(phyattributes.len());
		for (phyqn, value) in phyattributes.drain(..) {
			let nsuri = match phyqn.0 {
				Some(prefix) => {
					add_context(self.lookup_prefix(Some(&prefix)), ERRCTX_ATTNAME)?.cloned()
				}
				// unprefixed attributes are in no namespace
				None => None,
			};
			match attributes.entry((nsuri, phyqn.1)) {
				// XML 1.0: Well-formedness constraint: Unique Att Spec
				// Namespaces in XML 1.0: Namespace constraint:
				// Attributes Unique
				// The two cannot be distinguished at this point anymore,
				// and the difference is in most cases irrelevant.
				Entry::Occupied(_) => {
					return Err(Error::NotWellFormed(WFError::DuplicateAttribute))
				}
				Entry::Vacant(e) => e.insert(value),
			};
		}

		let nsuri = add_context(
			self.lookup_prefix(phyqname.0.as_ref().map(|x| x.as_str())),
			ERRCTX_NAME,
		)?
		.cloned();
		let (prefix, localname) = phyqname;
		self.foot_stack.push(ElementFoot {
			localname: localname.clone(),
			prefix: prefix.clone(),
			nsuri: nsuri.clone(),
		});
		Ok(ResolvedEvent::StartElement(ElementHead {
			localname,
			prefix,
			nsuri,
			attributes,
			nsdecl: decl_event,
		}))
	}

	fn process_event(&mut self, ev: RawEvent) -> Result<Option<ResolvedEvent>> {
		// Ok(None) does not signal EOF here, but "read more"
		match ev {
			RawEvent::ElementHeadOpen(phyqn) => match self.state {
				State::Content => {
					self.state = State::ElementHead;
					self.start_element(phyqn);
					Ok(None)
				}
				_ => unreachable!("element head open inside element head"),
			},
			RawEvent::Attribute(phyqn, value) => match self.state {
				State::ElementHead => {
					self.push_attribute(phyqn, value)?;
					Ok(None)
				}
				_ => unreachable!("attribute outside element head"),
			},
			RawEvent::ElementHeadClose => match self.state {
				State::ElementHead => {
					let ev = self.finish_element()?;
					self.state = State::Content;
					Ok(Some(ev))
				}
				_ => unreachable!("element head close outside element head"),
			},
			RawEvent::ElementFoot => {
				self.scope_stack.pop();
				let foot = self
					.foot_stack
					.pop()
					.expect("element foot without matching head");
				Ok(Some(ResolvedEvent::EndElement(foot)))
			}
			RawEvent::XMLDeclaration(v) => Ok(Some(ResolvedEvent::XMLDeclaration(v))),
			RawEvent::Doctype => Ok(Some(ResolvedEvent::Doctype)),
			RawEvent::Text(v) => Ok(Some(ResolvedEvent::Text(v))),
			RawEvent::Comment(v) => Ok(Some(ResolvedEvent::Comment(v))),
		}
	}

	/// Read [`RawEvent`]s from the given function until either an error
	/// occurs or a complete [`ResolvedEvent`] can be emitted.
	///
	/// Errors detected by the resolver (such as a duplicate attribute)
	/// poison it: the same error is returned from all future calls.
	/// Errors returned by `f` are forwarded without poisoning.
	pub fn next<F: FnMut() -> Result<Option<RawEvent>>>(
		&mut self,
		mut f: F,
	) -> Result<Option<ResolvedEvent>> {
		self.check_poison()?;
		loop {
			let ev = match f() {
				Ok(None) => return Ok(None),
				Err(e) => return Err(e),
				Ok(Some(ev)) => ev,
			};
			match self.process_event(ev) {
				Err(e) => {
					self.poison = Some(e.clone());
					return Err(e);
				}
				Ok(Some(v)) => return Ok(Some(v)),
				// not EOF, just "need more raw events"
				Ok(None) => (),
			}
		}
	}

	/// Access the inner context.
	pub fn context(&self) -> &RcPtr<Context> {
		&self.ctx
	}
}
