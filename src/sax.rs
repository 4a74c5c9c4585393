/*!
# Push-based SAX frontend

[`SaxParser`] is the callback-driven entry point of this crate: the
application pushes byte chunks into [`SaxParser::receive`] as they arrive
and a [`SaxHandler`] implementation gets called back, synchronously and in
document order, as constructs complete. [`SaxParser::close`] announces the
end of the stream, flushes all pending state and delivers
[`SaxHandler::end_document`] — or the error which explains why the
document never completed.

Incoming buffers are re-chunked to a bounded size before they are handed
to the tokenizer, so a single huge `receive` call cannot force unbounded
intermediate buffers; see [`SaxConfig::chunk_limit`].
*/
use bytes::Bytes;

use crate::driver::{EventRead, FeedParser, PushDriver};
use crate::error::{Error, HandlerError, Result, Severity};
use crate::lexer::{Lexer, LexerOptions, TextPosition};
use crate::parser::{
	ElementFoot, ElementHead, Parser, ResolvedEvent, WithContext, XMLVersion,
};
use crate::strings::CDataStr;
use crate::Context;
use crate::RcPtr;

/// Result type of [`SaxHandler`] callbacks.
///
/// Returning an `Err` aborts the session: the error is wrapped in
/// [`Error::Handler`] and propagated out of the `receive` or `close`
/// call which triggered the callback.
pub type HandlerResult = std::result::Result<(), HandlerError>;

/**
# Event sink for the push parser

All methods have default no-op implementations; a consumer implements
exactly the subset of callbacks it cares about. Unimplemented callbacks
are silently skipped, never an error.
*/
pub trait SaxHandler {
	/// Called once, before the first other callback of the document.
	fn start_document(&mut self) -> HandlerResult {
		Ok(())
	}

	/// Called exactly once, on a successful [`SaxParser::close`].
	///
	/// This callback does **not** fire when the document is malformed or
	/// truncated.
	fn end_document(&mut self) -> HandlerResult {
		Ok(())
	}

	/// Called for the XML declaration, if the document carries one.
	fn declaration(&mut self, _version: XMLVersion) -> HandlerResult {
		Ok(())
	}

	/// Called for each element header, after all its attributes and
	/// namespace declarations have been processed.
	fn start_element(&mut self, _head: &ElementHead) -> HandlerResult {
		Ok(())
	}

	/// Called for each element end; starts and ends nest properly.
	fn end_element(&mut self, _foot: &ElementFoot) -> HandlerResult {
		Ok(())
	}

	/// Called for runs of character data.
	///
	/// A single logical text run may be delivered in any number of
	/// pieces; consumers must concatenate.
	fn characters(&mut self, _data: &CDataStr) -> HandlerResult {
		Ok(())
	}

	/// Called for each comment.
	fn comment(&mut self, _data: &CDataStr) -> HandlerResult {
		Ok(())
	}

	/// Called for parse-level conditions, fatal and non-fatal alike; the
	/// severity tag tells them apart.
	///
	/// For [`Severity::Fatal`] conditions the session is already doomed
	/// when this fires; the same error is also returned from the
	/// `receive`/`close` call.
	fn error(&mut self, _severity: Severity, _err: &Error) -> HandlerResult {
		Ok(())
	}
}

/// Configuration for a [`SaxParser`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SaxConfig {
	/// Upper bound for the size of the sub-chunks which a single
	/// [`SaxParser::receive`] call forwards to the tokenizer.
	///
	/// This is a tuning parameter bounding intermediate buffer growth,
	/// not an architectural constant; any non-zero value is legal.
	pub chunk_limit: usize,

	/// Options passed on to the lexer.
	pub lexer: LexerOptions,
}

impl SaxConfig {
	/// Set the [`SaxConfig::chunk_limit`] value.
	pub fn chunk_limit(mut self, v: usize) -> SaxConfig {
		self.chunk_limit = v;
		self
	}

	/// Set the lexer options.
	pub fn lexer_options(mut self, v: LexerOptions) -> SaxConfig {
		self.lexer = v;
		self
	}
}

impl Default for SaxConfig {
	fn default() -> Self {
		Self {
			chunk_limit: 4096,
			lexer: LexerOptions::default(),
		}
	}
}

/// Route a single event to the matching handler callback.
///
/// This is shared between the streaming session and the batch parsing
/// path so that both deliver identical callback sequences.
pub(crate) fn route_event<H: SaxHandler>(handler: &mut H, ev: &ResolvedEvent) -> HandlerResult {
	match ev {
		ResolvedEvent::XMLDeclaration(v) => handler.declaration(*v),
		ResolvedEvent::Doctype => handler.error(
			Severity::Warning,
			&Error::RestrictedXml("document type declaration is not validated"),
		),
		ResolvedEvent::StartElement(head) => handler.start_element(head),
		ResolvedEvent::EndElement(foot) => handler.end_element(foot),
		ResolvedEvent::Text(data) => handler.characters(data),
		ResolvedEvent::Comment(data) => handler.comment(data),
	}
}

/**
# Push-based streaming parse session

One `SaxParser` corresponds to one document. Bytes go in through
[`receive`], callbacks come out synchronously on the way; [`close`]
finishes the session. After `close` (successful or not) or after any
fatal error the session is terminal: further calls are rejected with the
original error, or [`Error::SessionClosed`] after a clean close.

Dropping the session without closing it releases all buffers and any
partially built state without firing further callbacks.

## Example

```
use pushxml::{SaxParser, SaxHandler, HandlerResult, ElementHead};

#[derive(Default)]
struct NameSink(Vec<String>);

impl SaxHandler for NameSink {
	fn start_element(&mut self, head: &ElementHead) -> HandlerResult {
		self.0.push(head.localname.to_string());
		Ok(())
	}
}

let mut p = SaxParser::new(NameSink::default());
p.receive(b"<a><b/><").unwrap();
p.receive(b"/a>").unwrap();
p.close().unwrap();
assert_eq!(p.handler().0, vec!["a", "b"]);
```

   [`receive`]: SaxParser::receive
   [`close`]: SaxParser::close
*/
pub struct SaxParser<H: SaxHandler> {
	driver: FeedParser,
	handler: H,
	chunk_limit: usize,
	started: bool,
	closed: bool,
	poison: Option<Error>,
}

impl<H: SaxHandler> SaxParser<H> {
	/// Create a new session with default configuration.
	pub fn new(handler: H) -> Self {
		Self::with_config(SaxConfig::default(), handler)
	}

	/// Create a new session with the given configuration.
	pub fn with_config(config: SaxConfig, handler: H) -> Self {
		assert!(config.chunk_limit > 0);
		Self {
			driver: PushDriver::wrap(Lexer::with_options(config.lexer), Parser::new()),
			handler,
			chunk_limit: config.chunk_limit,
			started: false,
			closed: false,
			poison: None,
		}
	}

	/// Create a new session sharing the given [`Context`] between
	/// sessions.
	pub fn with_context(ctx: RcPtr<Context>, config: SaxConfig, handler: H) -> Self {
		assert!(config.chunk_limit > 0);
		Self {
			driver: PushDriver::wrap(
				Lexer::with_options(config.lexer),
				Parser::with_context(ctx),
			),
			handler,
			chunk_limit: config.chunk_limit,
			started: false,
			closed: false,
			poison: None,
		}
	}

	/// Access the handler.
	pub fn handler(&self) -> &H {
		&self.handler
	}

	/// Access the handler, mutably.
	pub fn handler_mut(&mut self) -> &mut H {
		&mut self.handler
	}

	/// Consume the session and return the handler.
	pub fn into_handler(self) -> H {
		self.handler
	}

	/// Current position in the input stream, for diagnostics.
	pub fn position(&self) -> TextPosition {
		self.driver.position()
	}

	/// True once the session has terminated, successfully or not.
	pub fn is_closed(&self) -> bool {
		self.closed
	}

	fn check_open(&self) -> Result<()> {
		if let Some(e) = self.poison.as_ref() {
			return Err(e.clone());
		}
		if self.closed {
			return Err(Error::SessionClosed);
		}
		Ok(())
	}

	fn abort(&mut self, e: Error) -> Error {
		self.poison = Some(e.clone());
		self.closed = true;
		e
	}

	fn dispatch(&mut self, ev: &ResolvedEvent) -> HandlerResult {
		if !self.started {
			self.started = true;
			self.handler.start_document()?;
		}
		route_event(&mut self.handler, ev)
	}

	/// Drain the driver, dispatching every completed event.
	///
	/// Stops cleanly when more input is required; any other error aborts
	/// the session.
	fn pump(&mut self) -> Result<()> {
		loop {
			match self.driver.read() {
				Ok(Some(ev)) => {
					if let Err(he) = self.dispatch(&ev) {
						return Err(self.abort(Error::Handler(he)));
					}
				}
				Ok(None) => {
					// end of document; only reachable after feed_eof
					self.closed = true;
					if let Err(he) = self.handler.end_document() {
						return Err(self.abort(Error::Handler(he)));
					}
					return Ok(());
				}
				Err(Error::IO(ioerr)) if ioerr.kind() == std::io::ErrorKind::WouldBlock => {
					return Ok(())
				}
				Err(e) => {
					let e = self.abort(e);
					// the error callback is best-effort; the session is
					// failing with `e` regardless
					let _ = self.handler.error(Severity::Fatal, &e);
					return Err(e);
				}
			}
		}
	}

	/// Feed a chunk of document data into the session.
	///
	/// The data is split into sub-chunks of at most
	/// [`SaxConfig::chunk_limit`] bytes; after each sub-chunk, all events
	/// which completed are dispatched to the handler before the next
	/// sub-chunk is fed. Callbacks therefore run synchronously within
	/// this call.
	///
	/// Needing more data to finish a token is not an error; the partial
	/// token stays buffered for the next `receive`.
	pub fn receive(&mut self, mut data: &[u8]) -> Result<()> {
		self.check_open()?;
		while data.len() > self.chunk_limit {
			let (chunk, rest) = data.split_at(self.chunk_limit);
			self.driver.feed(Bytes::copy_from_slice(chunk));
			data = rest;
			self.pump()?;
		}
		if !data.is_empty() {
			self.driver.feed(Bytes::copy_from_slice(data));
		}
		self.pump()
	}

	/// Announce the end of the document stream.
	///
	/// Flushes all pending state. On success, the handler's
	/// [`SaxHandler::end_document`] fires and `Ok(())` is returned. A
	/// buffered incomplete token or a non-empty open-element stack is a
	/// well-formedness error: [`SaxHandler::error`] fires with
	/// [`Severity::Fatal`] and the error is returned.
	///
	/// In either case the session is terminal afterwards.
	pub fn close(&mut self) -> Result<()> {
		self.check_open()?;
		self.driver.feed_eof();
		self.pump()?;
		// a clean pump after eof always reaches the end of the document,
		// so reaching this point means the session is closed
		debug_assert!(self.closed);
		Ok(())
	}
}

impl SaxParser<crate::tree::TreeBuilder> {
	/// Create a push session which builds a [`Document`](crate::Document).
	pub fn tree_builder() -> Self {
		Self::new(crate::tree::TreeBuilder::new())
	}

	/// The document built so far; partial until the session has closed
	/// successfully.
	pub fn document(&self) -> &crate::tree::Document {
		self.handler.document()
	}

	/// Finish the session and hand the completed document to the caller.
	///
	/// If the session has not been closed yet, this closes it first.
	/// Errors which prevented the document from completing are returned
	/// here like they would be from [`SaxParser::close`].
	pub fn finish(mut self) -> Result<crate::tree::Document> {
		if let Some(e) = self.poison.as_ref() {
			return Err(e.clone());
		}
		if !self.closed {
			self.close()?;
		}
		Ok(self.handler.into_document())
	}
}

impl<H: SaxHandler> std::fmt::Debug for SaxParser<H> {
	fn fmt<'f>(&self, f: &'f mut std::fmt::Formatter) -> std::fmt::Result {
		f.debug_struct("SaxParser")
			.field("started", &self.started)
			.field("closed", &self.closed)
			.field("position", &self.position())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	/// Records callback invocations in a comparable form.
	#[derive(Default)]
	pub(crate) struct Recorder {
		pub(crate) log: Vec<String>,
	}

	impl SaxHandler for Recorder {
		fn start_document(&mut self) -> HandlerResult {
			self.log.push("start-document".into());
			Ok(())
		}

		fn end_document(&mut self) -> HandlerResult {
			self.log.push("end-document".into());
			Ok(())
		}

		fn declaration(&mut self, _version: XMLVersion) -> HandlerResult {
			self.log.push("declaration".into());
			Ok(())
		}

		fn start_element(&mut self, head: &ElementHead) -> HandlerResult {
			self.log.push(format!("start({})", head.localname));
			Ok(())
		}

		fn end_element(&mut self, foot: &ElementFoot) -> HandlerResult {
			self.log.push(format!("end({})", foot.localname));
			Ok(())
		}

		fn characters(&mut self, data: &CDataStr) -> HandlerResult {
			self.log.push(format!("chars({})", data));
			Ok(())
		}

		fn comment(&mut self, data: &CDataStr) -> HandlerResult {
			self.log.push(format!("comment({})", data));
			Ok(())
		}

		fn error(&mut self, severity: Severity, err: &Error) -> HandlerResult {
			self.log.push(format!("error({}, {})", severity, err));
			Ok(())
		}
	}

	#[test]
	fn delivers_canonical_event_sequence() {
		let mut p = SaxParser::new(Recorder::default());
		p.receive(b"<a><b>x</b></a>").unwrap();
		p.close().unwrap();
		assert_eq!(
			p.handler().log,
			vec![
				"start-document",
				"start(a)",
				"start(b)",
				"chars(x)",
				"end(b)",
				"end(a)",
				"end-document",
			]
		);
	}

	#[test]
	fn end_document_requires_close() {
		let mut p = SaxParser::new(Recorder::default());
		p.receive(b"<a/>").unwrap();
		assert!(!p.handler().log.contains(&"end-document".to_string()));
		p.close().unwrap();
		assert!(p.handler().log.contains(&"end-document".to_string()));
	}

	#[test]
	fn unbalanced_document_fails_on_close_without_end_document() {
		let mut p = SaxParser::new(Recorder::default());
		p.receive(b"<a><b>x</b>").unwrap();
		let err = p.close().err().unwrap();
		assert!(matches!(err, Error::NotWellFormed(_)));
		let log = &p.handler().log;
		assert!(!log.contains(&"end-document".to_string()));
		assert!(log.iter().any(|l| l.starts_with("error(fatal")));
	}

	#[test]
	fn receive_after_close_is_rejected() {
		let mut p = SaxParser::new(Recorder::default());
		p.receive(b"<a/>").unwrap();
		p.close().unwrap();
		let n = p.handler().log.len();
		assert!(matches!(
			p.receive(b"<b/>").err().unwrap(),
			Error::SessionClosed
		));
		assert!(matches!(p.close().err().unwrap(), Error::SessionClosed));
		// and no further events fired
		assert_eq!(p.handler().log.len(), n);
	}

	#[test]
	fn receive_after_fatal_error_returns_the_same_error() {
		let mut p = SaxParser::new(Recorder::default());
		let first = p.receive(b"<a x='1' x='2'/>").err().unwrap();
		let again = p.receive(b"more").err().unwrap();
		assert_eq!(first, again);
	}

	#[test]
	fn handler_failure_aborts_the_session() {
		struct Aborter;

		impl SaxHandler for Aborter {
			fn start_element(&mut self, _head: &ElementHead) -> HandlerResult {
				Err(HandlerError::new("no elements for me"))
			}
		}

		let mut p = SaxParser::new(Aborter);
		let err = p.receive(b"<a>").err().unwrap();
		assert!(matches!(err, Error::Handler(_)));
		assert!(matches!(
			p.receive(b"x").err().unwrap(),
			Error::Handler(_)
		));
	}

	#[test]
	fn doctype_is_reported_as_warning() {
		let mut p = SaxParser::new(Recorder::default());
		p.receive(b"<!DOCTYPE a [ <!ELEMENT a EMPTY> ]><a/>").unwrap();
		p.close().unwrap();
		assert!(p
			.handler()
			.log
			.iter()
			.any(|l| l.starts_with("error(warning")));
		assert!(p.handler().log.contains(&"end-document".to_string()));
	}

	#[test]
	fn oversized_receive_is_rechunked() {
		let mut doc = Vec::new();
		doc.extend_from_slice(b"<a>");
		doc.extend_from_slice(&[b'y'; 20000]);
		doc.extend_from_slice(b"</a>");
		let mut p = SaxParser::new(Recorder::default());
		p.receive(&doc[..]).unwrap();
		p.close().unwrap();
		let text: String = p
			.handler()
			.log
			.iter()
			.filter_map(|l| {
				l.strip_prefix("chars(")
					.and_then(|s| s.strip_suffix(")"))
					.map(|s| s.to_string())
			})
			.collect();
		assert_eq!(text.len(), 20000);
	}

	#[test]
	fn empty_receive_is_a_no_op() {
		let mut p = SaxParser::new(Recorder::default());
		p.receive(b"").unwrap();
		p.receive(b"<a/>").unwrap();
		p.close().unwrap();
	}
}
