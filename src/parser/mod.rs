/*!
# Token-to-event parsers

This module converts [`Token`]s into document events in two stages:

1. [`RawParser`] enforces the XML 1.0 document grammar (prolog structure,
   element nesting) and emits [`RawEvent`]s in which names are still
   prefix/localname pairs.
2. [`NamespaceResolver`] applies Namespaces in XML 1.0 on top: it resolves
   prefixes against the in-scope declarations, enforces attribute
   uniqueness and combines the per-element event run into a single
   [`ResolvedEvent::StartElement`].

[`Parser`] composes the two and is what the drivers and the SAX frontend
use.
*/
use std::io;

use crate::context::Context;
use crate::error::Result;
use crate::lexer::{Lexer, Token};
use crate::strings::{CData, CDataStr, NCName};
use crate::RcPtr;

mod raw;
mod resolve;

pub use raw::{RawEvent, RawParser, RawQName};
pub use resolve::{ElementFoot, ElementHead, NamespaceResolver, ResolvedEvent};

/**
# XML version number

Only version 1.0 is supported.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XMLVersion {
	/// XML Version 1.0
	V1_0,
}

/// Shared namespace URI
pub type NamespaceName = RcPtr<CData>;

/// Pair of an optional namespace name (URI) and a localname, as used for
/// resolved element and attribute names.
pub type QName = (Option<NamespaceName>, NCName);

/// XML core namespace URI (for the `xml:` prefix)
pub const XMLNS_XML: &'static CDataStr =
	unsafe { std::mem::transmute("http://www.w3.org/XML/1998/namespace") };
/// XML namespace URI (for the `xmlns:` prefix)
pub const XMLNS_XMLNS: &'static CDataStr =
	unsafe { std::mem::transmute("http://www.w3.org/2000/xmlns/") };

/**
# Read individual tokens from a source

Analogously to [`std::io::Read`] and intended as a wrapper around
[`crate::Lexer`], this trait provides individual tokens.
*/
pub trait TokenRead {
	/// Return a single token from the source.
	///
	/// If the EOF has been reached without errors, None is returned.
	///
	/// Lexer errors and I/O errors from the underlying data source are
	/// passed through.
	fn read(&mut self) -> Result<Option<Token>>;
}

/// Wrapper around [`Lexer`] and [`std::io::BufRead`] to provide a
/// [`TokenRead`].
pub struct LexerAdapter<R: io::BufRead> {
	lexer: Lexer,
	src: R,
}

impl<R: io::BufRead> LexerAdapter<R> {
	/// Wrap a lexer and a byte source.
	pub fn new(lexer: Lexer, src: R) -> Self {
		Self { lexer, src }
	}

	/// Consume self and return the wrapped lexer and byte source.
	pub fn into_inner(self) -> (Lexer, R) {
		(self.lexer, self.src)
	}

	/// Return a reference to the byte source.
	pub fn get_ref(&self) -> &R {
		&self.src
	}

	/// Return a mutable reference to the byte source.
	pub fn get_mut(&mut self) -> &mut R {
		&mut self.src
	}

	/// Return a reference to the lexer.
	pub fn get_lexer(&self) -> &Lexer {
		&self.lexer
	}

	/// Return a mutable reference to the lexer.
	pub fn get_lexer_mut(&mut self) -> &mut Lexer {
		&mut self.lexer
	}
}

impl<R: io::BufRead> TokenRead for LexerAdapter<R> {
	fn read(&mut self) -> Result<Option<Token>> {
		self.lexer.lex(&mut self.src)
	}
}

/**
Trait for parser-like structs.
*/
pub trait Parse {
	type Output;

	/// Parse a single event using tokens from `r`.
	///
	/// If the end of file has been reached after a complete document,
	/// `None` is returned.
	///
	/// If the document violates a constraint, such as the XML 1.0 grammar
	/// or namespacing rules, the corresponding error is returned. Errors
	/// from the token source (such as I/O errors) are forwarded.
	fn parse<R: TokenRead>(&mut self, r: &mut R) -> Result<Option<Self::Output>>;

	/// Release all temporary buffers or other ephemeral allocations.
	fn release_temporaries(&mut self);
}

/**
Trait for things which can be constructed with a shared [`Context`].
*/
pub trait WithContext {
	/// Create a new instance using the given shared context.
	fn with_context(ctx: RcPtr<Context>) -> Self;
}

/**
# Namespace-aware XML 1.0 parser

The composition of a [`RawParser`] and a [`NamespaceResolver`]: tokens go
in, namespace-resolved, well-formedness-checked [`ResolvedEvent`]s come
out.
*/
pub struct Parser {
	raw: RawParser,
	resolver: NamespaceResolver,
}

impl Parser {
	/// Create a new parser with its own (unshared) [`Context`].
	pub fn new() -> Self {
		Self {
			raw: RawParser::new(),
			resolver: NamespaceResolver::new(),
		}
	}

	/// Access the shared context of the resolver.
	pub fn context(&self) -> &RcPtr<Context> {
		self.resolver.context()
	}
}

impl Default for Parser {
	fn default() -> Self {
		Self::new()
	}
}

impl WithContext for Parser {
	fn with_context(ctx: RcPtr<Context>) -> Self {
		Self {
			raw: RawParser::new(),
			resolver: NamespaceResolver::with_context(ctx),
		}
	}
}

impl Parse for Parser {
	type Output = ResolvedEvent;

	fn parse<R: TokenRead>(&mut self, r: &mut R) -> Result<Option<Self::Output>> {
		let Self { raw, resolver } = self;
		resolver.next(|| raw.parse(r))
	}

	fn release_temporaries(&mut self) {
		self.raw.release_temporaries();
	}
}
