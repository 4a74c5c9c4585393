/*!
# Incremental push parsing for XML 1.0

This crate provides restricted parsing of XML 1.0 documents with
namespacing, built around an incremental, push-capable tokenizer. The
same event pipeline is exposed through three access models:

* **Push / SAX**: a [`SaxParser`] accepts byte chunks of arbitrary size
  through [`SaxParser::receive`] and invokes the callbacks of a
  caller-supplied [`SaxHandler`] as constructs complete —
  synchronously, in document order, exactly once per construct.
  [`SaxParser::close`] finishes the stream and delivers `end_document`
  or the error which prevented it.
* **Pull / cursor**: [`FeedParser`] and [`PullParser`] yield
  [`ResolvedEvent`]s one at a time through the [`EventRead`] trait,
  non-blocking and blocking respectively.
* **Tree**: [`Document`] is an arena-backed DOM with a small mutation
  surface; [`TreeBuilder`] builds it from parse events (push or batch
  via [`Document::parse_str`] and friends), and [`writer`] serializes
  it back out.

## Features (some call them restrictions)

* No external resources, no custom entities, no processing instructions
* Document type declarations are skipped, not interpreted
* UTF-8 input only, XML 1.0 only
* Namespacing-well-formedness enforced
* Bounded intermediate buffers even for pathological input chunking

## Example

```
use pushxml::{SaxParser, SaxHandler, HandlerResult, ElementHead};

#[derive(Default)]
struct Counter(usize);

impl SaxHandler for Counter {
	fn start_element(&mut self, _head: &ElementHead) -> HandlerResult {
		self.0 += 1;
		Ok(())
	}
}

let mut p = SaxParser::new(Counter::default());
// chunk boundaries may fall anywhere, even inside tags
p.receive(b"<doc><item/><it").unwrap();
p.receive(b"em/></doc>").unwrap();
p.close().unwrap();
assert_eq!(p.handler().0, 3);
```
*/

/// Refcounted shared pointer used for namespace names and handles.
///
/// In builds with the `mt` feature, this is a [`std::sync::Arc`]; in
/// non-`mt` builds, it is a [`std::rc::Rc`].
#[cfg(feature = "mt")]
pub type RcPtr<T> = std::sync::Arc<T>;
/// Refcounted shared pointer used for namespace names and handles.
///
/// In builds with the `mt` feature, this is a [`std::sync::Arc`]; in
/// non-`mt` builds, it is a [`std::rc::Rc`].
#[cfg(not(feature = "mt"))]
pub type RcPtr<T> = std::rc::Rc<T>;

#[cfg(feature = "mt")]
pub(crate) type WeakPtr<T> = std::sync::Weak<T>;
#[cfg(not(feature = "mt"))]
pub(crate) type WeakPtr<T> = std::rc::Weak<T>;

mod bufq;
mod context;
pub mod driver;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod sax;
pub mod selectors;
pub mod strings;
pub mod tree;
pub mod writer;

#[cfg(test)]
mod tests;

#[doc(inline)]
pub use bufq::BufferQueue;
#[doc(inline)]
pub use context::Context;
#[doc(inline)]
pub use driver::{as_eof_flag, EventRead, FeedParser, PullParser, PushDriver, PullDriver};
#[doc(inline)]
pub use error::{Error, HandlerError, NWFError, Result, Severity, WFError};
#[doc(inline)]
pub use lexer::{Lexer, LexerOptions, TextPosition};
#[doc(inline)]
pub use parser::{
	ElementFoot, ElementHead, NamespaceName, Parser, QName, RawParser, ResolvedEvent,
	XMLVersion, XMLNS_XML, XMLNS_XMLNS,
};
#[doc(inline)]
pub use sax::{HandlerResult, SaxConfig, SaxHandler, SaxParser};
#[doc(inline)]
pub use strings::{CData, CDataStr, NCName, NCNameStr, Name, NameStr};
#[doc(inline)]
pub use tree::{
	Attribute, Document, NamespaceDecl, NodeHandle, NodeId, NodeKind, TreeBuilder, TreeError,
};

pub const VERSION: &'static str = env!("CARGO_PKG_VERSION");
