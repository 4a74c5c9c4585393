/*!
Wrappers around lexers and parsers to drive them.

For cursor-style reading, [`FeedParser`] and [`PullParser`] are the things
to look at; the callback-driven push frontend lives in [`crate::sax`].
*/
use std::io;

use bytes::Bytes;

use crate::bufq::BufferQueue;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::lexer::{Lexer, LexerOptions, TextPosition};
use crate::parser::{LexerAdapter, Parse, Parser, WithContext};
use crate::RcPtr;

/**
# Source for individual XML events

This trait is implemented by the different parser frontends. It is
analogous to the [`std::io::Read`] trait, but for XML document events
instead of bytes.
*/
pub trait EventRead {
	type Output;

	/// Read a single event from the parser.
	///
	/// If the EOF has been reached with a valid document, `None` is
	/// returned.
	///
	/// I/O errors may be retried, all other errors are fatal (and will be
	/// returned again by the parser on the next invocation without
	/// reading further data from the source).
	fn read(&mut self) -> Result<Option<Self::Output>>;

	/// Read all events which can be produced from the data source (at
	/// this point in time).
	///
	/// The given `cb` is invoked for each event.
	///
	/// I/O errors may be retried, all other errors are fatal (and will be
	/// returned again by the parser on the next invocation without
	/// reading further data from the source).
	fn read_all<F>(&mut self, mut cb: F) -> Result<()>
	where
		F: FnMut(Self::Output) -> (),
	{
		loop {
			match self.read()? {
				None => return Ok(()),
				Some(ev) => cb(ev),
			}
		}
	}

	/// Read all events which can be produced from the data source (at
	/// this point in time).
	///
	/// The given `cb` is invoked for each event.
	///
	/// If the data source indicates that it needs to block to read
	/// further data, `false` is returned. If the EOF is reached
	/// successfully, `true` is returned.
	fn read_all_eof<F>(&mut self, cb: F) -> Result<bool>
	where
		F: FnMut(Self::Output) -> (),
	{
		as_eof_flag(self.read_all(cb))
	}
}

/// Convert end-of-file-ness of a result to a boolean flag.
///
/// If the result is ok, return true (EOF). If the result is not ok, but
/// the error is an I/O error indicating that the data source would have
/// to block to read further data, return false ("Ok, but not at eof
/// yet").
///
/// All other errors are passed through.
pub fn as_eof_flag(r: Result<()>) -> Result<bool> {
	match r {
		Err(Error::IO(ioerr)) if ioerr.kind() == io::ErrorKind::WouldBlock => Ok(false),
		Err(e) => Err(e),
		Ok(()) => Ok(true),
	}
}

/**
# Non-blocking driver for parsers

This is a generic non-blocking push-based driver for objects implementing
the [`Parse`] trait: data is fed with [`PushDriver::feed`] and events are
read back with the [`EventRead`] methods. A read with insufficient
buffered data fails with a [`std::io::ErrorKind::WouldBlock`] I/O error,
which is retryable.

In general, it is advised to use the [`FeedParser`] alias which
specializes this struct for use with the default [`Parser`].
*/
pub struct PushDriver<P: Parse> {
	token_source: LexerAdapter<BufferQueue>,
	parser: P,
}

impl<P: Parse + Default> Default for PushDriver<P> {
	/// Create a new push driver using the defaults for its parser and
	/// lexer.
	fn default() -> Self {
		Self::wrap(Lexer::new(), P::default())
	}
}

impl<P: Parse + Default> PushDriver<P> {
	/// Create a new push driver with the given lexer options.
	pub fn with_options(options: LexerOptions) -> Self {
		Self::wrap(Lexer::with_options(options), P::default())
	}
}

impl<P: Parse + WithContext> PushDriver<P> {
	/// Create a new push driver, using the given shared context for the
	/// parser.
	pub fn with_context(ctx: RcPtr<Context>) -> Self {
		Self::wrap(Lexer::new(), P::with_context(ctx))
	}
}

impl<P: Parse> PushDriver<P> {
	/// Compose a new push driver from parts.
	pub fn wrap(lexer: Lexer, parser: P) -> Self {
		Self {
			token_source: LexerAdapter::new(lexer, BufferQueue::new()),
			parser,
		}
	}

	/// Feed a chunk of data to the parser.
	///
	/// This enqueues the data for processing, but does not process it
	/// right away. To process data, call [`EventRead::read`] or
	/// [`EventRead::read_all`].
	///
	/// # Panics
	///
	/// If [`PushDriver::feed_eof`] has been called before.
	pub fn feed<T: Into<Bytes>>(&mut self, data: T) {
		self.token_source.get_mut().push(data);
	}

	/// Feed the eof marker to the parser.
	///
	/// This is a prerequisite for parsing to terminate with an eof signal
	/// (returning `true` from [`EventRead::read_all_eof`]). Otherwise,
	/// `false` will be returned indefinitely without emitting any events.
	///
	/// After the eof marker has been fed to the parser, no further data
	/// can be fed.
	pub fn feed_eof(&mut self) {
		self.token_source.get_mut().push_eof();
	}

	/// Return the number of bytes which have been fed but not processed
	/// yet.
	pub fn buffered(&self) -> usize {
		self.token_source.get_ref().len()
	}

	/// Return a mutable reference to the internal buffer queue.
	///
	/// This can be used to force dropping of all unprocessed data in
	/// case of error conditions.
	pub fn get_buffer_mut(&mut self) -> &mut BufferQueue {
		self.token_source.get_mut()
	}

	/// Current position of the lexer in the input stream.
	pub fn position(&self) -> TextPosition {
		self.token_source.get_lexer().position()
	}

	/// Access the lexer.
	pub fn get_lexer(&self) -> &Lexer {
		self.token_source.get_lexer()
	}

	/// Access the parser.
	pub fn get_parser(&self) -> &P {
		&self.parser
	}

	/// Access the parser, mutably.
	pub fn get_parser_mut(&mut self) -> &mut P {
		&mut self.parser
	}

	/// Release all temporary buffers.
	pub fn release_temporaries(&mut self) {
		self.token_source.get_lexer_mut().release_temporaries();
		self.parser.release_temporaries();
	}
}

impl<P: Parse> EventRead for PushDriver<P> {
	type Output = P::Output;

	/// Read a single event from the parser.
	///
	/// If the buffered data is not sufficient to produce an event, an
	/// I/O error of [`std::io::ErrorKind::WouldBlock`] is returned.
	fn read(&mut self) -> Result<Option<Self::Output>> {
		self.parser.parse(&mut self.token_source)
	}
}

/**
# Blocking driver for parsers

This is a generic blocking pull-based driver for objects implementing the
[`Parse`] trait. The driver will block until the backing [`io::BufRead`]
has enough data available (or returns an error).

In general, it is advised to use the [`PullParser`] alias which
specializes this struct for use with the default [`Parser`].
*/
pub struct PullDriver<T: io::BufRead, P: Parse> {
	parser: P,
	token_source: LexerAdapter<T>,
}

impl<T: io::BufRead, P: Parse + Default> PullDriver<T, P> {
	/// Create a new parser with default options, wrapping the given
	/// reader.
	///
	/// **Note:** It is highly recommended to wrap a common reader into
	/// [`std::io::BufReader`], as the implementation will do lots of
	/// small `read()` calls. Those would be terribly inefficient without
	/// buffering.
	pub fn new(inner: T) -> Self {
		Self::with_options(inner, LexerOptions::default())
	}

	/// Create a new parser while configuring the lexer with the given
	/// options.
	pub fn with_options(inner: T, options: LexerOptions) -> Self {
		Self::wrap(inner, Lexer::with_options(options), P::default())
	}
}

impl<T: io::BufRead, P: Parse> PullDriver<T, P> {
	/// Create a fully customized parser from a lexer and a parser
	/// component.
	pub fn wrap(inner: T, lexer: Lexer, parser: P) -> Self {
		Self {
			token_source: LexerAdapter::new(lexer, inner),
			parser,
		}
	}

	/// Access the inner BufRead.
	pub fn get_inner(&self) -> &T {
		self.token_source.get_ref()
	}

	/// Access the inner BufRead, mutably.
	pub fn get_inner_mut(&mut self) -> &mut T {
		self.token_source.get_mut()
	}

	/// Current position of the lexer in the input stream.
	pub fn position(&self) -> TextPosition {
		self.token_source.get_lexer().position()
	}

	/// Access the parser.
	pub fn get_parser(&self) -> &P {
		&self.parser
	}

	/// Access the parser, mutably.
	pub fn get_parser_mut(&mut self) -> &mut P {
		&mut self.parser
	}
}

impl<T: io::BufRead, P: Parse> EventRead for PullDriver<T, P> {
	type Output = P::Output;

	/// Read a single event from the parser.
	///
	/// All I/O errors from the source are passed on without modification.
	fn read(&mut self) -> Result<Option<Self::Output>> {
		self.parser.parse(&mut self.token_source)
	}
}

/**
# Non-blocking cursor-style parsing

The [`FeedParser`] allows parsing XML documents as they arrive in the
application, giving back control to the caller immediately when not
enough data is available for processing. This is especially useful when
streaming data from sockets.

To read events from the `FeedParser` after feeding data, use its
[`EventRead`] trait.

## Example

```
use pushxml::{FeedParser, EventRead, ResolvedEvent};
let doc = b"<?xml version='1.0'?><hello>World!</hello>";
let mut fp = FeedParser::default();
fp.feed(&doc[..]);
fp.feed_eof();
let result = fp.read_all_eof(|ev| {
	println!("got event: {:?}", ev);
});
// true indicates eof
assert_eq!(result.unwrap(), true);
```
*/
pub type FeedParser = PushDriver<Parser>;

/**
# Blocking cursor-style parsing

The [`PullParser`] reads an XML document from a [`io::BufRead`],
blocking until the source has data available.

## Example

```
use pushxml::{PullParser, EventRead, ResolvedEvent, XMLVersion};
let mut doc: &[u8] = b"<?xml version='1.0'?><hello>World!</hello>";
let mut pp = PullParser::new(&mut doc);
let ev = pp.read();
assert!(matches!(
	ev.unwrap().unwrap(),
	ResolvedEvent::XMLDeclaration(XMLVersion::V1_0)
));
```
*/
pub type PullParser<T> = PullDriver<T, Parser>;
