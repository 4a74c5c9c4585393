/*!
# XML 1.0 document grammar, sans namespacing
*/
use std::collections::VecDeque;
use std::fmt;

use crate::error::*;
use crate::lexer::Token;
use crate::strings::{CData, Name, NCName};

use super::{Parse, TokenRead, XMLVersion, XMLNS_XML, XMLNS_XMLNS};

/// Pair of an optional namespace prefix and a localname, as it appears
/// physically in the document.
pub type RawQName = (Option<NCName>, NCName);

/**
# Logical XML document parts, before namespace resolution

The term *Event* is borrowed from SAX terminology. Each [`RawEvent`]
refers to a bit of the XML document which has been parsed.

Note that observing a sequence of [`RawEvent`]s does not imply that the
document is namespace-well-formed; duplicate attributes and undeclared
prefixes are only detected by the
[`NamespaceResolver`](super::NamespaceResolver) sitting on top.

## Document event sequence

A well-formed document generates the following sequence:

1. Zero or one [`Self::XMLDeclaration`]
2. Zero or more [`Self::Comment`], at most one [`Self::Doctype`]
3. One *element sequence*
4. Zero or more [`Self::Comment`]

An *element sequence* consists of:

1. [`Self::ElementHeadOpen`]
2. Zero or more [`Self::Attribute`]
3. [`Self::ElementHeadClose`]
4. Zero or more element sequences, [`Self::Text`] or [`Self::Comment`],
   mixed arbitrarily
5. [`Self::ElementFoot`]
*/
#[derive(Clone, PartialEq, Debug)]
pub enum RawEvent {
	/// The XML declaration.
	///
	/// As encoding and standalone flag are forced to be `utf-8` and `yes`
	/// respectively (or absent), those values are not reported.
	XMLDeclaration(XMLVersion),

	/// A document type declaration was encountered and skipped.
	Doctype,

	/// Start of an XML element header
	ElementHeadOpen(RawQName),

	/// Attribute key/value pair
	///
	/// Namespace declarations are still attributes at this level; no
	/// resolution has taken place. The following local constraints are
	/// enforced nonetheless:
	///
	/// - Reserved prefixes and namespace names
	///   ([Namespaces in XML 1.0 § 3](https://www.w3.org/TR/REC-xml-names/#xmlReserved)):
	///   the `xml` prefix may only be bound to its fixed namespace name,
	///   that name may not be bound to any other prefix, and the `xmlns`
	///   prefix can never be bound.
	/// - No prefix undeclaring
	///   ([Namespaces in XML 1.0 § 6.2](https://www.w3.org/TR/REC-xml-names/#defaulting)):
	///   `xmlns:foo=''` is rejected, while `xmlns=''` is valid and
	///   undeclares the default namespace.
	Attribute(RawQName, CData),

	/// End of an XML element header
	ElementHeadClose,

	/// The end of an XML element.
	///
	/// Proper nesting is enforced by the parser, so the event does not
	/// need to repeat the name.
	ElementFoot,

	/// Text character data.
	///
	/// **Note:** A single logical run of text may be split into multiple
	/// `Text` events.
	Text(CData),

	/// A comment's content, without the `<!--`/`-->` markers.
	Comment(CData),
}

#[derive(Clone, Copy, PartialEq, Debug)]
enum DeclSt {
	VersionName,
	VersionEq,
	VersionValue,
	EncodingName,
	EncodingEq,
	EncodingValue,
	StandaloneName,
	StandaloneEq,
	StandaloneValue,
	Close,
}

#[derive(Clone, Copy, PartialEq, Debug)]
enum ElementSt {
	AttrName,
	AttrEq,
	AttrValue,
}

#[derive(Clone, Copy, PartialEq, Debug)]
enum DocSt {
	Element(ElementSt),
	CData,
	ElementFoot,
}

#[derive(Clone, Copy, PartialEq, Debug)]
enum State {
	/// Nothing has been read yet; the XML declaration is only valid here.
	Initial,
	Decl {
		substate: DeclSt,
		version: Option<XMLVersion>,
	},
	/// Before the root element, after any XML declaration.
	Prolog,
	Document(DocSt),
	/// Root element closed; only trailing whitespace and comments remain.
	End,
	Eof,
}

/**
# Low-level XML 1.0 parser

The [`RawParser`] converts [`Token`]s into [`RawEvent`]s, enforcing the
document grammar (prolog structure, matching element nesting) but not
namespace-well-formedness.

It is a low-level interface which expects to be driven from a
[`TokenRead`] source.
*/
pub struct RawParser {
	state: State,
	element_stack: Vec<Name>,
	attribute_scratchpad: Option<RawQName>,
	doctype_seen: bool,
	/// Queue for events which will be returned from the current and
	/// future calls to `parse()`.
	///
	/// Unlike the lexer, the parser can get into situations where a
	/// single token produces more than one event, hence the queue.
	eventq: VecDeque<RawEvent>,
	err: Option<Box<Error>>,
}

impl RawParser {
	/// Create a new parser.
	pub fn new() -> Self {
		Self {
			state: State::Initial,
			element_stack: Vec::new(),
			attribute_scratchpad: None,
			doctype_seen: false,
			eventq: VecDeque::new(),
			err: None,
		}
	}

	/// Number of elements which are currently open.
	pub fn depth(&self) -> usize {
		self.element_stack.len()
	}

	fn emit_event(&mut self, ev: RawEvent) {
		self.eventq.push_back(ev);
	}

	/// Poison the parser, making it return the same error for all
	/// eternity.
	fn poison(&mut self, e: Error) {
		self.err = Some(Box::new(e))
	}

	fn check_poison(&self) -> Result<()> {
		if let Some(e) = self.err.as_ref() {
			Err((**e).clone())
		} else {
			Ok(())
		}
	}

	fn is_whitespace(s: &CData) -> bool {
		s.as_bytes()
			.iter()
			.all(|&c| c == b' ' || c == b'\t' || c == b'\n' || c == b'\r')
	}

	/// Push the element name onto the stack and emit the corresponding
	/// head-open event.
	///
	/// Fails if the name is not namespace-well-formed.
	fn start_processing_element(&mut self, name: Name) -> Result<State> {
		self.element_stack.push(name.clone());
		let (prefix, localname) = add_context(name.split_name(), ERRCTX_ELEMENT)?;
		self.emit_event(RawEvent::ElementHeadOpen((prefix, localname)));
		Ok(State::Document(DocSt::Element(ElementSt::AttrName)))
	}

	/// Pop an element off the stack and emit the corresponding foot
	/// event.
	fn pop_element(&mut self) -> Result<State> {
		self.emit_event(RawEvent::ElementFoot);
		debug_assert!(!self.element_stack.is_empty());
		self.element_stack.pop();
		if self.element_stack.is_empty() {
			Ok(State::End)
		} else {
			Ok(State::Document(DocSt::CData))
		}
	}

	fn process_doctype(&mut self) -> Result<()> {
		if self.doctype_seen {
			return Err(Error::NotWellFormed(WFError::InvalidSyntax(
				"multiple document type declarations",
			)));
		}
		self.doctype_seen = true;
		self.emit_event(RawEvent::Doctype);
		Ok(())
	}

	/// Initial document state.
	///
	/// See [`State::Initial`] and [`State::Prolog`]; the two only differ
	/// in whether an XML declaration is still admissible.
	fn parse_prolog<R: TokenRead>(&mut self, allow_decl: bool, r: &mut R) -> Result<State> {
		match r.read()? {
			Some(Token::XMLDeclStart(_)) => {
				if allow_decl {
					Ok(State::Decl {
						substate: DeclSt::VersionName,
						version: None,
					})
				} else {
					Err(Error::NotWellFormed(WFError::InvalidSyntax(
						"XML declaration must be at the start of the document",
					)))
				}
			}
			Some(Token::Doctype(_)) => {
				self.process_doctype()?;
				Ok(State::Prolog)
			}
			Some(Token::Comment(_, data)) => {
				self.emit_event(RawEvent::Comment(data));
				Ok(State::Prolog)
			}
			// whitespace between prolog constructs carries no meaning
			Some(Token::Text(_, s)) if Self::is_whitespace(&s) => Ok(State::Prolog),
			Some(Token::ElementHeadStart(_, name)) => self.start_processing_element(name),
			Some(tok) => Err(Error::NotWellFormed(WFError::UnexpectedToken(
				ERRCTX_DOCBEGIN,
				tok.name(),
				Some(&[
					Token::NAME_ELEMENTHEADSTART,
					Token::NAME_XMLDECLSTART,
					Token::NAME_COMMENT,
					Token::NAME_DOCTYPE,
				]),
			))),
			None => Err(Error::wfeof(ERRCTX_DOCBEGIN)),
		}
	}

	/// XML declaration state.
	///
	/// See [`State::Decl`].
	fn parse_decl<R: TokenRead>(
		&mut self,
		state: DeclSt,
		version: Option<XMLVersion>,
		r: &mut R,
	) -> Result<State> {
		match r.read()? {
			None => Err(Error::wfeof(ERRCTX_XML_DECL)),
			Some(Token::Name(_, name)) => match state {
				DeclSt::VersionName => {
					if name == "version" {
						Ok(State::Decl {
							substate: DeclSt::VersionEq,
							version,
						})
					} else {
						Err(Error::NotWellFormed(WFError::InvalidSyntax(
							"'<?xml' must be followed by version attribute",
						)))
					}
				}
				DeclSt::EncodingName => {
					if name == "encoding" {
						Ok(State::Decl {
							substate: DeclSt::EncodingEq,
							version,
						})
					} else {
						Err(Error::NotWellFormed(WFError::InvalidSyntax(
							"'version' attribute must be followed by '?>' or 'encoding' attribute",
						)))
					}
				}
				DeclSt::StandaloneName => {
					if name == "standalone" {
						Ok(State::Decl {
							substate: DeclSt::StandaloneEq,
							version,
						})
					} else {
						Err(Error::NotWellFormed(WFError::InvalidSyntax(
							"'encoding' attribute must be followed by '?>' or 'standalone' attribute",
						)))
					}
				}
				_ => Err(Error::NotWellFormed(WFError::UnexpectedToken(
					ERRCTX_XML_DECL,
					Token::NAME_NAME,
					None,
				))),
			},
			Some(Token::Eq(_)) => Ok(State::Decl {
				substate: match state {
					DeclSt::VersionEq => Ok(DeclSt::VersionValue),
					DeclSt::EncodingEq => Ok(DeclSt::EncodingValue),
					DeclSt::StandaloneEq => Ok(DeclSt::StandaloneValue),
					_ => Err(Error::NotWellFormed(WFError::UnexpectedToken(
						ERRCTX_XML_DECL,
						Token::NAME_EQ,
						None,
					))),
				}?,
				version,
			}),
			Some(Token::AttributeValue(_, v)) => match state {
				DeclSt::VersionValue => {
					if v == "1.0" {
						Ok(State::Decl {
							substate: DeclSt::EncodingName,
							version: Some(XMLVersion::V1_0),
						})
					} else {
						Err(Error::RestrictedXml("only XML version 1.0 is allowed"))
					}
				}
				DeclSt::EncodingValue => {
					if v.eq_ignore_ascii_case("utf-8") {
						Ok(State::Decl {
							substate: DeclSt::StandaloneName,
							version,
						})
					} else {
						Err(Error::RestrictedXml("only utf-8 encoding is allowed"))
					}
				}
				DeclSt::StandaloneValue => {
					if v.eq_ignore_ascii_case("yes") {
						Ok(State::Decl {
							substate: DeclSt::Close,
							version,
						})
					} else {
						Err(Error::RestrictedXml("only standalone documents are allowed"))
					}
				}
				_ => Err(Error::NotWellFormed(WFError::UnexpectedToken(
					ERRCTX_XML_DECL,
					Token::NAME_ATTRIBUTEVALUE,
					None,
				))),
			},
			Some(Token::XMLDeclEnd(_)) => match state {
				DeclSt::EncodingName | DeclSt::StandaloneName | DeclSt::Close => {
					let ev = RawEvent::XMLDeclaration(version.unwrap());
					self.emit_event(ev);
					Ok(State::Prolog)
				}
				_ => Err(Error::NotWellFormed(WFError::UnexpectedToken(
					ERRCTX_XML_DECL,
					Token::NAME_XMLDECLEND,
					None,
				))),
			},
			Some(other) => Err(Error::NotWellFormed(WFError::UnexpectedToken(
				ERRCTX_XML_DECL,
				other.name(),
				None,
			))),
		}
	}

	/// Finalize a single attribute and return the event.
	fn finalize_attribute(&mut self, val: CData) -> Result<RawEvent> {
		let (prefix, localname) = self.attribute_scratchpad.take().unwrap();
		if let Some(prefix) = prefix.as_ref() {
			if prefix == "xmlns" {
				// Namespaces in XML 1.0
				// Namespace constraint: Reserved Prefixes and Namespace
				// Names
				if localname == "xml" {
					if val != XMLNS_XML {
						return Err(Error::NotNamespaceWellFormed(
							NWFError::ReservedNamespacePrefix,
						));
					}
				} else {
					if val == XMLNS_XML || val == XMLNS_XMLNS {
						return Err(Error::NotNamespaceWellFormed(
							NWFError::ReservedNamespaceName,
						));
					}
				}
				// Namespaces in XML 1.0
				// Namespace constraint: No Prefix Undeclaring
				if val.len() == 0 {
					return Err(Error::NotNamespaceWellFormed(NWFError::EmptyNamespaceUri));
				}
			}
		}
		Ok(RawEvent::Attribute((prefix, localname), val))
	}

	/// Element header state.
	///
	/// See [`DocSt::Element`].
	fn parse_element<R: TokenRead>(&mut self, state: ElementSt, r: &mut R) -> Result<State> {
		match r.read()? {
			None => Err(Error::wfeof(ERRCTX_ELEMENT)),
			Some(Token::ElementHFEnd(_)) => match state {
				ElementSt::AttrName => {
					self.emit_event(RawEvent::ElementHeadClose);
					Ok(State::Document(DocSt::CData))
				}
				_ => Err(Error::NotWellFormed(WFError::UnexpectedToken(
					ERRCTX_ELEMENT,
					Token::NAME_ELEMENTHFEND,
					None,
				))),
			},
			Some(Token::ElementHeadClose(_)) => match state {
				ElementSt::AttrName => {
					self.emit_event(RawEvent::ElementHeadClose);
					self.pop_element()
				}
				_ => Err(Error::NotWellFormed(WFError::UnexpectedToken(
					ERRCTX_ELEMENT,
					Token::NAME_ELEMENTHEADCLOSE,
					None,
				))),
			},
			Some(Token::Name(_, name)) => match state {
				ElementSt::AttrName => {
					let (prefix, localname) = add_context(name.split_name(), ERRCTX_ATTNAME)?;
					if let Some(prefix) = prefix.as_ref() {
						if prefix == "xmlns" && localname == "xmlns" {
							return Err(Error::NotNamespaceWellFormed(
								NWFError::ReservedNamespacePrefix,
							));
						}
					}
					self.attribute_scratchpad = Some((prefix, localname));
					Ok(State::Document(DocSt::Element(ElementSt::AttrEq)))
				}
				_ => Err(Error::NotWellFormed(WFError::UnexpectedToken(
					ERRCTX_ELEMENT,
					Token::NAME_NAME,
					None,
				))),
			},
			Some(Token::Eq(_)) => match state {
				ElementSt::AttrEq => Ok(State::Document(DocSt::Element(ElementSt::AttrValue))),
				_ => Err(Error::NotWellFormed(WFError::UnexpectedToken(
					ERRCTX_ELEMENT,
					Token::NAME_EQ,
					None,
				))),
			},
			Some(Token::AttributeValue(_, val)) => match state {
				ElementSt::AttrValue => {
					let ev = self.finalize_attribute(val)?;
					self.emit_event(ev);
					Ok(State::Document(DocSt::Element(ElementSt::AttrName)))
				}
				_ => Err(Error::NotWellFormed(WFError::UnexpectedToken(
					ERRCTX_ELEMENT,
					Token::NAME_ATTRIBUTEVALUE,
					None,
				))),
			},
			Some(tok) => Err(Error::NotWellFormed(WFError::UnexpectedToken(
				ERRCTX_ELEMENT,
				tok.name(),
				None,
			))),
		}
	}

	/// Document content state.
	///
	/// See [`State::Document`].
	fn parse_document<R: TokenRead>(&mut self, state: DocSt, r: &mut R) -> Result<State> {
		match state {
			DocSt::Element(substate) => self.parse_element(substate, r),
			DocSt::CData => match r.read()? {
				Some(Token::Text(_, s)) => {
					self.emit_event(RawEvent::Text(s));
					Ok(State::Document(DocSt::CData))
				}
				Some(Token::Comment(_, data)) => {
					self.emit_event(RawEvent::Comment(data));
					Ok(State::Document(DocSt::CData))
				}
				Some(Token::ElementHeadStart(_, name)) => self.start_processing_element(name),
				Some(Token::ElementFootStart(_, name)) => {
					if self.element_stack[self.element_stack.len() - 1] != name {
						Err(Error::NotWellFormed(WFError::ElementMismatch))
					} else {
						Ok(State::Document(DocSt::ElementFoot))
					}
				}
				Some(tok) => Err(Error::NotWellFormed(WFError::UnexpectedToken(
					ERRCTX_TEXT,
					tok.name(),
					Some(&[
						Token::NAME_TEXT,
						Token::NAME_COMMENT,
						Token::NAME_ELEMENTHEADSTART,
						Token::NAME_ELEMENTFOOTSTART,
					]),
				))),
				None => Err(Error::wfeof(ERRCTX_TEXT)),
			},
			DocSt::ElementFoot => match r.read()? {
				Some(Token::ElementHFEnd(_)) => self.pop_element(),
				Some(other) => Err(Error::NotWellFormed(WFError::UnexpectedToken(
					ERRCTX_ELEMENT_FOOT,
					other.name(),
					Some(&[Token::NAME_ELEMENTHFEND]),
				))),
				None => Err(Error::wfeof(ERRCTX_ELEMENT_FOOT)),
			},
		}
	}

	/// Trailing section, after the root element has been closed.
	///
	/// See [`State::End`].
	fn parse_end<R: TokenRead>(&mut self, r: &mut R) -> Result<State> {
		match r.read()? {
			None => Ok(State::Eof),
			// whitespace and comments after the root element are
			// explicitly allowed
			Some(Token::Text(_, s)) if Self::is_whitespace(&s) => Ok(State::End),
			Some(Token::Comment(_, data)) => {
				self.emit_event(RawEvent::Comment(data));
				Ok(State::End)
			}
			Some(tok) => Err(Error::NotWellFormed(WFError::UnexpectedToken(
				ERRCTX_DOCEND,
				tok.name(),
				Some(&["end-of-file", Token::NAME_COMMENT]),
			))),
		}
	}
}

impl Parse for RawParser {
	type Output = RawEvent;

	fn parse<R: TokenRead>(&mut self, r: &mut R) -> Result<Option<Self::Output>> {
		self.check_poison()?;
		loop {
			if let Some(ev) = self.eventq.pop_front() {
				return Ok(Some(ev));
			}

			let result = match self.state {
				State::Initial => self.parse_prolog(true, r),
				State::Decl { substate, version } => self.parse_decl(substate, version, r),
				State::Prolog => self.parse_prolog(false, r),
				State::Document(substate) => self.parse_document(substate, r),
				State::End => self.parse_end(r),
				State::Eof => return Ok(None),
			};
			self.state = match result {
				Ok(st) => st,
				// pass through I/O errors without poisoning the parser
				Err(Error::IO(ioerr)) => return Err(Error::IO(ioerr)),
				// poison the parser for everything else to avoid emitting
				// illegal data
				Err(other) => {
					self.poison(other.clone());
					return Err(other);
				}
			};
		}
	}

	fn release_temporaries(&mut self) {
		self.eventq.shrink_to_fit();
		self.element_stack.shrink_to_fit();
	}
}

impl fmt::Debug for RawParser {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("RawParser")
			.field("state", &self.state)
			.finish()
	}
}
