/*!
# XML 1.0 lexer

The lexer turns bytes into [`Token`]s. It is resumable at any byte
position: when the input window runs dry in the middle of a token, the
partial token is buffered in an internal scratchpad and lexing continues
seamlessly on the next call. The end of the current window is only treated
as the end of the document when the caller says so, which is what makes
the push-based frontends work.
*/
use std::convert::TryInto;
use std::fmt;
use std::io;

pub(crate) mod ranges;
mod read;

use crate::error::{ErrorWithContext, Result as CrateResult, WFError};
use crate::error::{
	ERRCTX_ATTVAL, ERRCTX_CDATA_SECTION, ERRCTX_COMMENT, ERRCTX_DOCTYPE, ERRCTX_ELEMENT,
	ERRCTX_ELEMENT_CLOSE, ERRCTX_ELEMENT_FOOT, ERRCTX_MARKUP_DECL, ERRCTX_NAME,
	ERRCTX_NAMESTART, ERRCTX_REF, ERRCTX_TEXT, ERRCTX_UNKNOWN, ERRCTX_XML_DECL,
	ERRCTX_XML_DECL_END,
};
use crate::selectors::{CharSelector, ValidationError, CLASS_XML_NONCHAR};
use crate::strings::{CData, Name};
use ranges::*;
use read::{copy_matched_bytes, skip_matched_bytes, Endbyte};

/// Position of the lexer in the input stream, for diagnostics.
///
/// The byte offset is a plain wrapping counter; line and column are
/// saturating. Columns count codepoints, not bytes, and both line and
/// column are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextPosition {
	pub offset: usize,
	pub line: u32,
	pub column: u32,
}

impl TextPosition {
	fn new() -> TextPosition {
		TextPosition {
			offset: 0,
			line: 1,
			column: 1,
		}
	}

	fn account_byte(&mut self, b: u8) {
		self.offset = self.offset.wrapping_add(1);
		if b == b'\n' {
			self.line = self.line.saturating_add(1);
			self.column = 1;
		} else if b & 0xc0 != 0x80 {
			// utf-8 continuation bytes do not advance the column
			self.column = self.column.saturating_add(1);
		}
	}

	fn account(&mut self, bytes: &[u8]) {
		for b in bytes {
			self.account_byte(*b);
		}
	}
}

impl fmt::Display for TextPosition {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		write!(f, "line {}, column {}", self.line, self.column)
	}
}

/// Byte range in the input stream from which a token was derived.
///
/// Ranges of consecutive tokens are not necessarily adjacent: whitespace
/// inside element headers and footers does not generate tokens.
#[derive(Copy, Debug, Clone, PartialEq, Eq)]
pub struct TokenMetrics {
	start: usize,
	end: usize,
}

impl TokenMetrics {
	/// Length of the token in input bytes, taking a potential counter
	/// wrap-around into account.
	pub fn len(&self) -> usize {
		self.end.wrapping_sub(self.start)
	}

	/// Start byte in the stream.
	pub fn start(&self) -> usize {
		self.start
	}

	/// End byte of the token in the stream (exclusive).
	pub fn end(&self) -> usize {
		self.end
	}

	#[cfg(test)]
	pub(crate) const fn new(start: usize, end: usize) -> TokenMetrics {
		TokenMetrics { start, end }
	}
}

/**
A single XML token.

Tokens do not map one-to-one to concepts of the XML 1.0 specification;
they are shaped to be a convenient input for the parser sitting on top of
the lexer.
*/
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
	/// A freestanding (i.e. not the element name) XML `Name`.
	///
	/// Only emitted inside element headers/footers and the XML
	/// declaration.
	Name(TokenMetrics, Name),

	/// An equals sign inside an element header or the XML declaration.
	Eq(TokenMetrics),

	/// An attribute value, with delimiters stripped, references expanded
	/// and whitespace normalized.
	AttributeValue(TokenMetrics, CData),

	/// The `?>` sequence closing the XML declaration.
	XMLDeclEnd(TokenMetrics),

	/// The `/>` sequence closing a self-closing element header.
	ElementHeadClose(TokenMetrics),

	/// The `>` sequence closing an element header or footer.
	ElementHFEnd(TokenMetrics),

	/// The `<?xml` sequence.
	XMLDeclStart(TokenMetrics),

	/// A `<` followed by an element name.
	ElementHeadStart(TokenMetrics, Name),

	/// A `</` followed by an element name.
	ElementFootStart(TokenMetrics, Name),

	/// A piece of character data inside an element.
	///
	/// References are expanded and CDATA sections decoded. There is no
	/// guarantee about segmentation: a single logical run of character
	/// data may be emitted as any number of `Text` tokens.
	Text(TokenMetrics, CData),

	/// A comment; the token carries the content between the `<!--` and
	/// `-->` markers.
	Comment(TokenMetrics, CData),

	/// A document type declaration, skipped in its entirety (including
	/// any internal subset). Only the fact that it occurred is reported.
	Doctype(TokenMetrics),
}

impl Token {
	pub const NAME_NAME: &'static str = "Name";
	pub const NAME_EQ: &'static str = "'='";
	pub const NAME_ATTRIBUTEVALUE: &'static str = "AttValue";
	pub const NAME_XMLDECLEND: &'static str = "'?>'";
	pub const NAME_ELEMENTHEADCLOSE: &'static str = "'/>'";
	pub const NAME_ELEMENTHFEND: &'static str = "'>'";
	pub const NAME_XMLDECLSTART: &'static str = "'<?xml'";
	pub const NAME_ELEMENTHEADSTART: &'static str = "'<'";
	pub const NAME_ELEMENTFOOTSTART: &'static str = "'</'";
	pub const NAME_TEXT: &'static str = "Text";
	pub const NAME_COMMENT: &'static str = "Comment";
	pub const NAME_DOCTYPE: &'static str = "'<!DOCTYPE'";

	/// Return a static string describing the token type, for error
	/// messages.
	pub fn name(&self) -> &'static str {
		match self {
			Self::Name(..) => Self::NAME_NAME,
			Self::Eq(..) => Self::NAME_EQ,
			Self::AttributeValue(..) => Self::NAME_ATTRIBUTEVALUE,
			Self::XMLDeclEnd(..) => Self::NAME_XMLDECLEND,
			Self::ElementHeadClose(..) => Self::NAME_ELEMENTHEADCLOSE,
			Self::ElementHFEnd(..) => Self::NAME_ELEMENTHFEND,
			Self::XMLDeclStart(..) => Self::NAME_XMLDECLSTART,
			Self::ElementHeadStart(..) => Self::NAME_ELEMENTHEADSTART,
			Self::ElementFootStart(..) => Self::NAME_ELEMENTFOOTSTART,
			Self::Text(..) => Self::NAME_TEXT,
			Self::Comment(..) => Self::NAME_COMMENT,
			Self::Doctype(..) => Self::NAME_DOCTYPE,
		}
	}

	/// Return a reference to this token's [`TokenMetrics`].
	pub fn metrics(&self) -> &TokenMetrics {
		match self {
			Self::Name(m, ..) => m,
			Self::Eq(m) => m,
			Self::AttributeValue(m, ..) => m,
			Self::XMLDeclEnd(m) => m,
			Self::ElementHeadClose(m) => m,
			Self::ElementHFEnd(m) => m,
			Self::XMLDeclStart(m) => m,
			Self::ElementHeadStart(m, ..) => m,
			Self::ElementFootStart(m, ..) => m,
			Self::Text(m, ..) => m,
			Self::Comment(m, ..) => m,
			Self::Doctype(m) => m,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CharRefRadix {
	Decimal,
	Hexadecimal,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum RefKind {
	Entity,
	Char(CharRefRadix),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ElementState {
	Start,
	/// Only used after `<?xml`
	SpaceRequired,
	Blank,
	Name,
	Eq,
	Close,
	/// Delimiter, selector and whether a CR was just read (CRLF
	/// normalization)
	AttributeValue(u8, &'static [ByteRange], bool),
	/// Encountered `?`
	MaybeXMLDeclEnd,
	/// Encountered `/`
	MaybeHeadClose,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ElementKind {
	/// Element head, e.g. `<foo>`
	Header,
	/// Element foot, e.g. `</foo>`
	Footer,
	/// XML declaration, e.g. `<?xml version='1.0'?>`
	XMLDecl,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum MaybeElementState {
	Initial,
	/// `<!` read; comment, CDATA section or doctype follows
	Bang,
	/// Number of correct comment start bytes
	CommentStart(usize),
	/// Number of correct CDATA section start bytes
	CDataSectionStart(usize),
	/// Number of correct doctype start bytes
	DoctypeStart(usize),
	/// Number of correct XML decl start bytes
	XMLDeclStart(usize),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ContentState {
	Initial,
	/// Within a CDATA section
	CDataSection,
	/// Encountered `<`
	MaybeElement(MaybeElementState),
	/// Only whitespace allowed, e.g. between `?>` and `<`
	Whitespace,
	/// Part of a `]]>` sequence read; the flag indicates whether we are
	/// inside a CDATA section (where the sequence terminates the section;
	/// outside it is illegal)
	MaybeCDataEnd(bool, usize),
	/// `\r` read; one byte of lookahead decides how it is folded. The
	/// flag indicates whether we are inside a CDATA section.
	MaybeCRLF(bool),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CommentState {
	Content,
	/// Number of `-` of the closing `-->` read
	MaybeEnd(usize),
	/// `\r` read inside the comment
	MaybeCRLF,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DoctypeState {
	/// Skipping declaration contents; the value is the bracket depth of
	/// the internal subset
	Scan(usize),
	/// Skipping a quoted literal (delimiter, bracket depth to return to)
	Literal(u8, usize),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum RefReturnState {
	AttributeValue(ElementKind, u8, &'static [ByteRange]),
	Text,
}

impl RefReturnState {
	fn to_state(self) -> State {
		match self {
			Self::AttributeValue(kind, delim, selector) => State::Element {
				kind,
				state: ElementState::AttributeValue(delim, selector, false),
			},
			Self::Text => State::Content(ContentState::Initial),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
	Content(ContentState),
	Element {
		kind: ElementKind,
		state: ElementState,
	},
	Comment(CommentState),
	Doctype(DoctypeState),
	/// Encountered `&`
	Reference {
		ctx: &'static str,
		ret: RefReturnState,
		kind: RefKind,
	},
	Eof,
}

// longest named entity is 4 bytes, longest valid decimal reference is 7,
// longest valid hexadecimal reference is 6
const MAX_REFERENCE_LENGTH: usize = 8usize;

const TOK_XML_DECL_START: &'static [u8] = b"<?xml";
const TOK_COMMENT_START: &'static [u8] = b"<!--";
const TOK_CDATA_START: &'static [u8] = b"<![CDATA[";
const TOK_CDATA_END: &'static [u8] = b"]]>";
const TOK_DOCTYPE_START: &'static [u8] = b"<!DOCTYPE";

/// Hold options to configure a [`Lexer`].
///
/// See also [`Lexer::with_options()`].
#[derive(Debug, Clone, PartialEq, Copy)]
pub struct LexerOptions {
	/// Maximum number of bytes which can form a token.
	///
	/// This limits the memory used for tokens whose data has to be
	/// buffered (most notably [`Token::Text`] and
	/// [`Token::AttributeValue`]). Text tokens exceeding the limit are
	/// split and emitted in parts; any other token exceeding it fails
	/// with [`Error::RestrictedXml`](crate::Error::RestrictedXml).
	pub max_token_length: usize,
}

impl LexerOptions {
	/// Set the [`LexerOptions::max_token_length`] value.
	pub fn max_token_length(mut self, v: usize) -> LexerOptions {
		self.max_token_length = v;
		self
	}
}

impl Default for LexerOptions {
	/// Constructs default lexer options.
	///
	/// The defaults are implementation-defined and should not be relied
	/// upon.
	fn default() -> Self {
		Self {
			max_token_length: 8192,
		}
	}
}

fn resolve_named_entity(name: &[u8]) -> Result<u8> {
	// amp, lt, gt, apos, quot
	match name {
		b"amp" => Ok(b'&'),
		b"lt" => Ok(b'<'),
		b"gt" => Ok(b'>'),
		b"apos" => Ok(b'\''),
		b"quot" => Ok(b'"'),
		_ => Err(Error::NotWellFormed(WFError::UndeclaredEntity)),
	}
}

fn resolve_char_reference(s: &str, radix: CharRefRadix, into: &mut Vec<u8>) -> Result<()> {
	let radix = match radix {
		CharRefRadix::Decimal => 10,
		CharRefRadix::Hexadecimal => 16,
	};
	// cannot fail: the string was validated against the digit alphabet and
	// is limited in length
	let codepoint = u32::from_str_radix(s, radix).unwrap();
	let ch = match std::char::from_u32(codepoint) {
		Some(ch) => ch,
		None => {
			return Err(Error::NotWellFormed(WFError::InvalidChar(
				ERRCTX_UNKNOWN,
				codepoint,
				true,
			)))
		}
	};
	if CLASS_XML_NONCHAR.select(ch) {
		return Err(Error::NotWellFormed(WFError::InvalidChar(
			ERRCTX_UNKNOWN,
			codepoint,
			true,
		)));
	}
	let mut buf = [0u8; 4];
	into.extend_from_slice(ch.encode_utf8(&mut buf[..]).as_bytes());
	Ok(())
}

fn add_context<T>(r: Result<T>, ctx: &'static str) -> Result<T> {
	r.map_err(|e| e.with_context(ctx))
}

fn handle_eof<T>(v: Option<T>, ctx: &'static str) -> Result<T> {
	v.ok_or_else(|| Error::wfeof(ctx))
}

/// Pending state transition plus the token it produced, if any.
struct ST(State, Option<Token>);

impl ST {
	fn splice<'a>(self, st: &'a mut State) -> Option<Token> {
		*st = self.0;
		self.1
	}
}

/// Lexer-internal error type; converted to [`crate::Error`] at the
/// `lex_bytes` boundary, where `EndOfBuffer` becomes a `WouldBlock` I/O
/// error.
#[derive(Debug, Clone, PartialEq, Copy)]
enum Error {
	EndOfBuffer,
	NotWellFormed(WFError),
	InvalidUtf8Byte(u8),
	RestrictedXml(&'static str),
}

impl Error {
	fn wfeof(ctx: &'static str) -> Error {
		Error::NotWellFormed(WFError::InvalidEof(ctx))
	}

	fn utf8err(src: &[u8], e: &std::str::Utf8Error) -> Error {
		Error::InvalidUtf8Byte(src[e.valid_up_to()])
	}
}

impl ErrorWithContext for Error {
	fn with_context(self, ctx: &'static str) -> Self {
		match self {
			Self::NotWellFormed(e) => Self::NotWellFormed(e.with_context(ctx)),
			other => other,
		}
	}
}

impl From<WFError> for Error {
	fn from(other: WFError) -> Self {
		Self::NotWellFormed(other)
	}
}

impl From<ValidationError> for Error {
	fn from(other: ValidationError) -> Self {
		let e: WFError = other.into();
		e.into()
	}
}

impl From<Error> for crate::Error {
	fn from(other: Error) -> Self {
		match other {
			Error::EndOfBuffer => {
				io::Error::new(io::ErrorKind::WouldBlock, "end of current buffer reached").into()
			}
			Error::NotWellFormed(e) => Self::NotWellFormed(e),
			Error::RestrictedXml(what) => Self::RestrictedXml(what),
			Error::InvalidUtf8Byte(b) => Self::InvalidUtf8Byte(b),
		}
	}
}

type Result<T> = std::result::Result<T, Error>;

/**
# Restricted XML 1.0 lexer

This lexer handles a restricted subset of XML 1.0: processing
instructions, custom entities and non-UTF-8 input are rejected. Document
type declarations are tolerated but skipped wholesale; comments and CDATA
sections are processed.
*/
pub struct Lexer {
	state: State,
	scratchpad: Vec<u8>,
	swap: Vec<u8>,
	pos: TextPosition,
	last_token_end: usize,
	opts: LexerOptions,
	err: Option<Error>,
	has_eof: bool,
}

impl Lexer {
	/// Construct a new Lexer based on [`LexerOptions::default()`].
	pub fn new() -> Self {
		Self::with_options(LexerOptions::default())
	}

	/// Construct a new Lexer with the given options.
	pub fn with_options(opts: LexerOptions) -> Self {
		Self {
			state: State::Content(ContentState::Initial),
			scratchpad: Vec::new(),
			swap: Vec::new(),
			pos: TextPosition::new(),
			last_token_end: 0,
			opts,
			err: None,
			has_eof: false,
		}
	}

	/// Current position of the lexer in the input stream.
	pub fn position(&self) -> TextPosition {
		self.pos
	}

	fn token_length_error() -> Error {
		Error::RestrictedXml("token length limit exceeded")
	}

	fn demote_eof(&self, ep: Endbyte) -> Result<Endbyte> {
		match ep {
			Endbyte::Eof => {
				if self.has_eof {
					Ok(Endbyte::Eof)
				} else {
					Err(Error::EndOfBuffer)
				}
			}
			other => Ok(other),
		}
	}

	#[inline]
	fn prep_scratchpad(&mut self) {
		if self.scratchpad.capacity() < self.opts.max_token_length {
			// tokens never exceed max_token_length, so reserve_exact is
			// the right call
			self.scratchpad
				.reserve_exact(self.opts.max_token_length - self.scratchpad.capacity())
		}
	}

	fn read_validated<B: ByteSelect>(
		&mut self,
		r: &mut &[u8],
		selector: &B,
		limit: usize,
	) -> Result<Endbyte> {
		let remaining = match limit.checked_sub(self.scratchpad.len()) {
			None => return Ok(Endbyte::Limit),
			Some(v) => v,
		};
		self.prep_scratchpad();
		let before = *r;
		let ep = copy_matched_bytes(r, selector, remaining, &mut self.scratchpad);
		let consumed = before.len() - r.len();
		self.pos.account(&before[..consumed]);
		self.demote_eof(ep)
	}

	#[inline]
	fn read_single(&mut self, r: &mut &[u8]) -> Result<Option<u8>> {
		match r.split_first() {
			Some((v, tail)) => {
				self.pos.account_byte(*v);
				*r = tail;
				Ok(Some(*v))
			}
			None => {
				if self.has_eof {
					Ok(None)
				} else {
					Err(Error::EndOfBuffer)
				}
			}
		}
	}

	#[inline]
	fn skip_matching<B: ByteSelect>(
		&mut self,
		r: &mut &[u8],
		selector: &B,
	) -> (usize, Result<Endbyte>) {
		let before = *r;
		let (nread, ep) = skip_matched_bytes(r, selector);
		let consumed = before.len() - r.len();
		self.pos.account(&before[..consumed]);
		(nread, self.demote_eof(ep))
	}

	fn drop_scratchpad(&mut self) {
		self.scratchpad.clear();
	}

	fn swap_scratchpad(&mut self) {
		std::mem::swap(&mut self.scratchpad, &mut self.swap);
	}

	fn read_swap(&mut self) -> Vec<u8> {
		let mut tmp = Vec::new();
		std::mem::swap(&mut tmp, &mut self.swap);
		tmp
	}

	/// Account the bytes up to the current position (minus `without`
	/// trailing bytes) to the gap between tokens.
	fn eat_whitespace_metrics(&mut self, without: usize) {
		self.last_token_end = self.pos.offset.wrapping_sub(without);
	}

	fn metrics(&mut self, without: usize) -> TokenMetrics {
		let start = self.last_token_end;
		let end = self.pos.offset.wrapping_sub(without);
		self.last_token_end = end;
		TokenMetrics { start, end }
	}

	fn flush_scratchpad<U, T: FnOnce(&[u8]) -> Result<U>>(&mut self, conv: T) -> Result<U> {
		let result = conv(&self.scratchpad);
		self.scratchpad.clear();
		result
	}

	fn flush_scratchpad_as_name(&mut self) -> Result<Name> {
		self.flush_scratchpad(|bytes| {
			let s = std::str::from_utf8(bytes).map_err(|e| Error::utf8err(bytes, &e))?;
			Ok(s.try_into()?)
		})
	}

	fn flush_scratchpad_as_complete_cdata(&mut self) -> Result<CData> {
		self.flush_scratchpad(|bytes| {
			let s = std::str::from_utf8(bytes).map_err(|e| Error::utf8err(bytes, &e))?;
			Ok(s.try_into()?)
		})
	}

	/// Drain as much of the scratchpad as forms valid UTF-8 into a CData,
	/// leaving an incomplete trailing sequence in place for the next
	/// call.
	fn flush_scratchpad_as_partial_cdata(&mut self) -> Result<CData> {
		let valid = match std::str::from_utf8(&self.scratchpad[..]) {
			Ok(s) => s,
			Err(e) => {
				let valid_up_to = e.valid_up_to();
				if valid_up_to == 0 {
					// a truly broken sequence, not merely a split one
					return Err(Error::InvalidUtf8Byte(self.scratchpad[0]));
				}
				unsafe { std::str::from_utf8_unchecked(&self.scratchpad[..valid_up_to]) }
			}
		};
		let result: CData = valid.try_into()?;
		let to_drop = valid.len();
		self.scratchpad.drain(..to_drop);
		Ok(result)
	}

	fn maybe_flush_scratchpad_as_text(&mut self, without: usize) -> Result<Option<Token>> {
		if self.scratchpad.is_empty() {
			self.eat_whitespace_metrics(without);
			Ok(None)
		} else {
			Ok(Some(Token::Text(
				self.metrics(without),
				self.flush_scratchpad_as_complete_cdata()?,
			)))
		}
	}

	fn flush_limited_scratchpad_as_text(&mut self) -> Result<Option<Token>> {
		if self.scratchpad.len() >= self.opts.max_token_length {
			Ok(Some(Token::Text(
				self.metrics(0),
				self.flush_scratchpad_as_partial_cdata()?,
			)))
		} else {
			Ok(None)
		}
	}

	/// Interpret a delimiter byte found in text content.
	///
	/// If the byte has no special interpretation, an Ok result without a
	/// next state is returned; the byte may still be entirely invalid.
	fn lex_posttext_char(&mut self, b: u8) -> Result<Option<ST>> {
		match b {
			b'<' => Ok(Some(ST(
				State::Content(ContentState::MaybeElement(MaybeElementState::Initial)),
				self.maybe_flush_scratchpad_as_text(1)?, // 1 == len("<")
			))),
			// start of the forbidden CDATA section end sequence
			// (XML 1.0 § 2.4 [14])
			b']' => Ok(Some(ST(
				State::Content(ContentState::MaybeCDataEnd(false, 1)),
				// no flush to avoid needless reallocations on false alarm
				None,
			))),
			b'&' => {
				// the flush must happen before the swap, otherwise the
				// empty text would clobber the entity lookup buffer
				let tok = self.maybe_flush_scratchpad_as_text(1)?; // 1 == len("&")
				self.swap_scratchpad();
				Ok(Some(ST(
					State::Reference {
						ctx: ERRCTX_TEXT,
						ret: RefReturnState::Text,
						kind: RefKind::Entity,
					},
					tok,
				)))
			}
			b'\r' => Ok(Some(ST(
				State::Content(ContentState::MaybeCRLF(false)),
				None,
			))),
			_ => Ok(None),
		}
	}

	fn lex_maybe_element(&mut self, state: MaybeElementState, r: &mut &[u8]) -> Result<ST> {
		match state {
			MaybeElementState::Initial => match self.read_single(r)? {
				Some(b'?') => {
					self.drop_scratchpad();
					Ok(ST(
						State::Content(ContentState::MaybeElement(
							MaybeElementState::XMLDeclStart(2),
						)),
						None,
					))
				}
				Some(b'!') => {
					self.drop_scratchpad();
					Ok(ST(
						State::Content(ContentState::MaybeElement(MaybeElementState::Bang)),
						None,
					))
				}
				Some(b'/') => {
					self.drop_scratchpad();
					Ok(ST(
						State::Element {
							kind: ElementKind::Footer,
							state: ElementState::Start,
						},
						None,
					))
				}
				Some(b) => {
					if CLASS_NAMESTART_BYTE.select(b) {
						// the first byte goes to the scratchpad here,
						// because read_single does not do that
						self.prep_scratchpad();
						self.scratchpad.push(b);
						Ok(ST(
							State::Element {
								kind: ElementKind::Header,
								state: ElementState::Start,
							},
							None,
						))
					} else {
						self.drop_scratchpad();
						Err(Error::NotWellFormed(WFError::UnexpectedByte(
							ERRCTX_NAMESTART,
							b,
							None,
						)))
					}
				}
				None => Err(Error::wfeof(ERRCTX_ELEMENT)),
			},
			MaybeElementState::Bang => {
				let b = handle_eof(self.read_single(r)?, ERRCTX_MARKUP_DECL)?;
				match b {
					b'-' => Ok(ST(
						State::Content(ContentState::MaybeElement(
							MaybeElementState::CommentStart(3),
						)),
						None,
					)),
					b'[' => Ok(ST(
						State::Content(ContentState::MaybeElement(
							MaybeElementState::CDataSectionStart(3),
						)),
						None,
					)),
					b'D' => Ok(ST(
						State::Content(ContentState::MaybeElement(
							MaybeElementState::DoctypeStart(3),
						)),
						None,
					)),
					b => Err(Error::NotWellFormed(WFError::UnexpectedByte(
						ERRCTX_MARKUP_DECL,
						b,
						Some(&["--", "[CDATA[", "DOCTYPE"]),
					))),
				}
			}
			MaybeElementState::CommentStart(i) => {
				debug_assert!(i < TOK_COMMENT_START.len());
				let b = handle_eof(self.read_single(r)?, ERRCTX_COMMENT)?;
				if b != TOK_COMMENT_START[i] {
					return Err(Error::NotWellFormed(WFError::InvalidSyntax(
						"malformed comment start",
					)));
				}
				let next = i + 1;
				if next == TOK_COMMENT_START.len() {
					let tok = self.maybe_flush_scratchpad_as_text(TOK_COMMENT_START.len())?;
					Ok(ST(State::Comment(CommentState::Content), tok))
				} else {
					Ok(ST(
						State::Content(ContentState::MaybeElement(
							MaybeElementState::CommentStart(next),
						)),
						None,
					))
				}
			}
			MaybeElementState::CDataSectionStart(i) => {
				debug_assert!(i < TOK_CDATA_START.len());
				let b = handle_eof(self.read_single(r)?, ERRCTX_CDATA_SECTION)?;
				if b != TOK_CDATA_START[i] {
					return Err(Error::NotWellFormed(WFError::InvalidSyntax(
						"malformed cdata section start",
					)));
				}
				let next = i + 1;
				if next == TOK_CDATA_START.len() {
					let tok = self.maybe_flush_scratchpad_as_text(TOK_CDATA_START.len())?;
					Ok(ST(State::Content(ContentState::CDataSection), tok))
				} else {
					Ok(ST(
						State::Content(ContentState::MaybeElement(
							MaybeElementState::CDataSectionStart(next),
						)),
						None,
					))
				}
			}
			MaybeElementState::DoctypeStart(i) => {
				debug_assert!(i < TOK_DOCTYPE_START.len());
				let b = handle_eof(self.read_single(r)?, ERRCTX_DOCTYPE)?;
				if b != TOK_DOCTYPE_START[i] {
					return Err(Error::NotWellFormed(WFError::InvalidSyntax(
						"malformed document type declaration",
					)));
				}
				let next = i + 1;
				if next == TOK_DOCTYPE_START.len() {
					self.drop_scratchpad();
					Ok(ST(State::Doctype(DoctypeState::Scan(0)), None))
				} else {
					Ok(ST(
						State::Content(ContentState::MaybeElement(
							MaybeElementState::DoctypeStart(next),
						)),
						None,
					))
				}
			}
			MaybeElementState::XMLDeclStart(i) => {
				debug_assert!(i < TOK_XML_DECL_START.len());
				// exploiting that the xml decl start only consists of
				// ASCII here
				let b = handle_eof(self.read_single(r)?, ERRCTX_XML_DECL)?;
				if b != TOK_XML_DECL_START[i] {
					return Err(Error::RestrictedXml("processing instructions"));
				}
				let next = i + 1;
				if next == TOK_XML_DECL_START.len() {
					self.drop_scratchpad();
					Ok(ST(
						State::Element {
							kind: ElementKind::XMLDecl,
							state: ElementState::SpaceRequired,
						},
						Some(Token::XMLDeclStart(self.metrics(0))),
					))
				} else {
					Ok(ST(
						State::Content(ContentState::MaybeElement(
							MaybeElementState::XMLDeclStart(next),
						)),
						None,
					))
				}
			}
		}
	}

	fn lex_resume_text(&mut self, b: u8) -> Result<ST> {
		match self.lex_posttext_char(b)? {
			// delimiter byte, state transition
			Some(st) => Ok(st),
			// no special meaning; check validity and append to scratchpad
			None => {
				if CLASS_FORBIDDEN_BYTE.select(b) {
					Err(Error::NotWellFormed(WFError::InvalidChar(
						ERRCTX_TEXT,
						b as u32,
						false,
					)))
				} else {
					self.prep_scratchpad();
					self.scratchpad.push(b);
					Ok(ST(State::Content(ContentState::Initial), None))
				}
			}
		}
	}

	fn lex_maybe_cdata_end(&mut self, in_cdata: bool, nend: usize, r: &mut &[u8]) -> Result<ST> {
		debug_assert!(nend < TOK_CDATA_END.len());
		let ctx = if in_cdata {
			ERRCTX_CDATA_SECTION
		} else {
			ERRCTX_TEXT
		};
		let b = handle_eof(self.read_single(r)?, ctx)?;
		if b == TOK_CDATA_END[nend] {
			match nend {
				1 => Ok(ST(
					State::Content(ContentState::MaybeCDataEnd(in_cdata, 2)),
					None,
				)),
				// ]]> complete
				2 => {
					if in_cdata {
						// the CDATA section ends; the closing delimiter is
						// not part of the character data
						Ok(ST(
							State::Content(ContentState::Initial),
							self.maybe_flush_scratchpad_as_text(0)?,
						))
					} else {
						Err(Error::NotWellFormed(WFError::InvalidSyntax(
							"unescaped ']]>' forbidden in text",
						)))
					}
				}
				_ => unreachable!("cdata end state exceeds delimiter length"),
			}
		} else if b == b']' {
			// this may still be a `]]]]>`-style sequence; the surplus `]`
			// goes to the scratchpad and we stay in this state
			self.prep_scratchpad();
			self.scratchpad.push(b']');
			Ok(ST(
				State::Content(ContentState::MaybeCDataEnd(in_cdata, nend)),
				self.flush_limited_scratchpad_as_text()?,
			))
		} else {
			// sequence broken; replay the consumed prefix
			self.prep_scratchpad();
			self.scratchpad.extend_from_slice(&TOK_CDATA_END[..nend]);
			if in_cdata {
				if CLASS_FORBIDDEN_BYTE.select(b) {
					Err(Error::NotWellFormed(WFError::InvalidChar(
						ERRCTX_CDATA_SECTION,
						b as u32,
						false,
					)))
				} else if b == b'\r' {
					Ok(ST(State::Content(ContentState::MaybeCRLF(true)), None))
				} else {
					self.scratchpad.push(b);
					Ok(ST(
						State::Content(ContentState::CDataSection),
						self.flush_limited_scratchpad_as_text()?,
					))
				}
			} else {
				self.lex_resume_text(b)
			}
		}
	}

	fn lex_content(&mut self, state: ContentState, r: &mut &[u8]) -> Result<ST> {
		match state {
			ContentState::MaybeElement(substate) => self.lex_maybe_element(substate, r),
			ContentState::MaybeCDataEnd(in_cdata, nend) => {
				self.lex_maybe_cdata_end(in_cdata, nend, r)
			}

			ContentState::MaybeCRLF(in_cdata) => {
				let ctx = if in_cdata {
					ERRCTX_CDATA_SECTION
				} else {
					ERRCTX_TEXT
				};
				let b = handle_eof(self.read_single(r)?, ctx)?;
				match b {
					b'\n' => {
						// CRLF folded to LF
						self.prep_scratchpad();
						self.scratchpad.push(b'\n');
						Ok(ST(
							if in_cdata {
								State::Content(ContentState::CDataSection)
							} else {
								State::Content(ContentState::Initial)
							},
							None,
						))
					}
					b'\r' => {
						// double CR: the first folds to LF, the second may
						// still be part of a CRLF pair
						self.prep_scratchpad();
						self.scratchpad.push(b'\n');
						Ok(ST(State::Content(ContentState::MaybeCRLF(in_cdata)), None))
					}
					b => {
						// lone CR folded to LF, then the next byte is
						// interpreted normally
						self.prep_scratchpad();
						self.scratchpad.push(b'\n');
						if in_cdata {
							if b == b']' {
								Ok(ST(
									State::Content(ContentState::MaybeCDataEnd(true, 1)),
									None,
								))
							} else if CLASS_FORBIDDEN_BYTE.select(b) {
								Err(Error::NotWellFormed(WFError::InvalidChar(
									ERRCTX_CDATA_SECTION,
									b as u32,
									false,
								)))
							} else {
								self.scratchpad.push(b);
								Ok(ST(State::Content(ContentState::CDataSection), None))
							}
						} else {
							self.lex_resume_text(b)
						}
					}
				}
			}

			// scan until one of `<`, `&`, `]`, `\r` interrupts the run
			ContentState::Initial => {
				match self.read_validated(r, &CLASS_TEXT_BYTE, self.opts.max_token_length)? {
					Endbyte::Eof => Ok(ST(State::Eof, self.maybe_flush_scratchpad_as_text(0)?)),
					Endbyte::Limit => Ok(ST(
						State::Content(ContentState::Initial),
						self.maybe_flush_scratchpad_as_text(0)?,
					)),
					Endbyte::Delimiter(b) => match self.lex_posttext_char(b)? {
						Some(st) => Ok(st),
						None => Err(Error::NotWellFormed(WFError::InvalidChar(
							ERRCTX_TEXT,
							b as u32,
							false,
						))),
					},
				}
			}

			ContentState::CDataSection => {
				match self.read_validated(
					r,
					&CLASS_CDATA_SECTION_BYTE,
					self.opts.max_token_length,
				)? {
					Endbyte::Eof => Err(Error::wfeof(ERRCTX_CDATA_SECTION)),
					Endbyte::Limit => Ok(ST(
						State::Content(ContentState::CDataSection),
						self.maybe_flush_scratchpad_as_text(0)?,
					)),
					Endbyte::Delimiter(b) => match b {
						b']' => Ok(ST(
							State::Content(ContentState::MaybeCDataEnd(true, 1)),
							None,
						)),
						b'\r' => Ok(ST(State::Content(ContentState::MaybeCRLF(true)), None)),
						_ => Err(Error::NotWellFormed(WFError::InvalidChar(
							ERRCTX_CDATA_SECTION,
							b as u32,
							false,
						))),
					},
				}
			}

			ContentState::Whitespace => match self.skip_matching(r, &CLASS_SPACE_BYTE) {
				(_, Ok(Endbyte::Eof)) => Ok(ST(State::Eof, None)),
				(_, Ok(Endbyte::Limit)) => unreachable!("skip_matching has no limit"),
				(_, Ok(Endbyte::Delimiter(b))) => match b {
					b'<' => Ok(ST(
						State::Content(ContentState::MaybeElement(MaybeElementState::Initial)),
						None,
					)),
					_ => Err(Error::NotWellFormed(WFError::UnexpectedByte(
						ERRCTX_XML_DECL_END,
						b,
						Some(&["spaces", "<"]),
					))),
				},
				(_, Err(e)) => Err(e),
			},
		}
	}

	fn lex_comment(&mut self, state: CommentState, r: &mut &[u8]) -> Result<ST> {
		match state {
			CommentState::Content => {
				match self.read_validated(r, &CLASS_COMMENT_BYTE, self.opts.max_token_length)? {
					Endbyte::Eof => Err(Error::wfeof(ERRCTX_COMMENT)),
					Endbyte::Limit => Err(Self::token_length_error()),
					Endbyte::Delimiter(b) => match b {
						b'-' => Ok(ST(State::Comment(CommentState::MaybeEnd(1)), None)),
						b'\r' => Ok(ST(State::Comment(CommentState::MaybeCRLF), None)),
						_ => Err(Error::NotWellFormed(WFError::InvalidChar(
							ERRCTX_COMMENT,
							b as u32,
							false,
						))),
					},
				}
			}
			CommentState::MaybeEnd(nend) => {
				debug_assert!(nend == 1 || nend == 2);
				let b = handle_eof(self.read_single(r)?, ERRCTX_COMMENT)?;
				if nend == 1 {
					match b {
						b'-' => Ok(ST(State::Comment(CommentState::MaybeEnd(2)), None)),
						b'\r' => {
							self.prep_scratchpad();
							self.scratchpad.push(b'-');
							Ok(ST(State::Comment(CommentState::MaybeCRLF), None))
						}
						b => {
							if CLASS_FORBIDDEN_BYTE.select(b) {
								Err(Error::NotWellFormed(WFError::InvalidChar(
									ERRCTX_COMMENT,
									b as u32,
									false,
								)))
							} else {
								self.prep_scratchpad();
								self.scratchpad.push(b'-');
								self.scratchpad.push(b);
								Ok(ST(State::Comment(CommentState::Content), None))
							}
						}
					}
				} else if b == b'>' {
					let data = self.flush_scratchpad_as_complete_cdata()?;
					Ok(ST(
						State::Content(ContentState::Initial),
						Some(Token::Comment(self.metrics(0), data)),
					))
				} else {
					// XML 1.0 § 2.5: `--` must not occur inside a comment
					Err(Error::NotWellFormed(WFError::InvalidSyntax(
						"'--' is not allowed inside a comment",
					)))
				}
			}
			CommentState::MaybeCRLF => {
				let b = handle_eof(self.read_single(r)?, ERRCTX_COMMENT)?;
				self.prep_scratchpad();
				self.scratchpad.push(b'\n');
				match b {
					b'\n' => Ok(ST(State::Comment(CommentState::Content), None)),
					b'\r' => Ok(ST(State::Comment(CommentState::MaybeCRLF), None)),
					b'-' => Ok(ST(State::Comment(CommentState::MaybeEnd(1)), None)),
					b => {
						if CLASS_FORBIDDEN_BYTE.select(b) {
							Err(Error::NotWellFormed(WFError::InvalidChar(
								ERRCTX_COMMENT,
								b as u32,
								false,
							)))
						} else {
							self.scratchpad.push(b);
							Ok(ST(State::Comment(CommentState::Content), None))
						}
					}
				}
			}
		}
	}

	fn lex_doctype(&mut self, state: DoctypeState, r: &mut &[u8]) -> Result<ST> {
		match state {
			DoctypeState::Scan(depth) => match self.skip_matching(r, &CLASS_DOCTYPE_BYTE) {
				(_, Ok(Endbyte::Eof)) => Err(Error::wfeof(ERRCTX_DOCTYPE)),
				(_, Ok(Endbyte::Limit)) => unreachable!("skip_matching has no limit"),
				(_, Ok(Endbyte::Delimiter(b))) => match b {
					b'>' => {
						if depth == 0 {
							Ok(ST(
								State::Content(ContentState::Initial),
								Some(Token::Doctype(self.metrics(0))),
							))
						} else {
							// `>` of a markup declaration inside the
							// internal subset
							Ok(ST(State::Doctype(DoctypeState::Scan(depth)), None))
						}
					}
					b'[' => Ok(ST(State::Doctype(DoctypeState::Scan(depth + 1)), None)),
					b']' => {
						if depth > 0 {
							Ok(ST(State::Doctype(DoctypeState::Scan(depth - 1)), None))
						} else {
							Err(Error::NotWellFormed(WFError::UnexpectedByte(
								ERRCTX_DOCTYPE,
								b,
								None,
							)))
						}
					}
					b'"' | b'\'' => Ok(ST(State::Doctype(DoctypeState::Literal(b, depth)), None)),
					_ => Err(Error::NotWellFormed(WFError::InvalidChar(
						ERRCTX_DOCTYPE,
						b as u32,
						false,
					))),
				},
				(_, Err(e)) => Err(e),
			},
			DoctypeState::Literal(delim, depth) => {
				let selector = if delim == b'"' {
					&CLASS_DOCTYPE_QUOT_BYTE
				} else {
					&CLASS_DOCTYPE_APOS_BYTE
				};
				match self.skip_matching(r, selector) {
					(_, Ok(Endbyte::Eof)) => Err(Error::wfeof(ERRCTX_DOCTYPE)),
					(_, Ok(Endbyte::Limit)) => unreachable!("skip_matching has no limit"),
					(_, Ok(Endbyte::Delimiter(b))) if b == delim => {
						Ok(ST(State::Doctype(DoctypeState::Scan(depth)), None))
					}
					(_, Ok(Endbyte::Delimiter(b))) => Err(Error::NotWellFormed(
						WFError::InvalidChar(ERRCTX_DOCTYPE, b as u32, false),
					)),
					(_, Err(e)) => Err(e),
				}
			}
		}
	}

	fn lex_element_postblank(&mut self, kind: ElementKind, b: u8) -> Result<ElementState> {
		match b {
			b' ' | b'\t' | b'\r' | b'\n' => Ok(ElementState::Blank),
			b'"' => Ok(ElementState::AttributeValue(b'"', CLASS_ATT_QUOT_BYTE, false)),
			b'\'' => Ok(ElementState::AttributeValue(
				b'\'',
				CLASS_ATT_APOS_BYTE,
				false,
			)),
			b'=' => Ok(ElementState::Eq),
			b'>' => match kind {
				ElementKind::Footer | ElementKind::Header => Ok(ElementState::Close),
				ElementKind::XMLDecl => Err(Error::NotWellFormed(WFError::UnexpectedChar(
					ERRCTX_XML_DECL,
					'>',
					Some(&["?"]),
				))),
			},
			b'?' => match kind {
				ElementKind::XMLDecl => Ok(ElementState::MaybeXMLDeclEnd),
				_ => Err(Error::NotWellFormed(WFError::UnexpectedChar(
					ERRCTX_ELEMENT,
					'?',
					None,
				))),
			},
			b'/' => match kind {
				ElementKind::Header => Ok(ElementState::MaybeHeadClose),
				ElementKind::Footer => Err(Error::NotWellFormed(WFError::UnexpectedChar(
					ERRCTX_ELEMENT_FOOT,
					'/',
					None,
				))),
				ElementKind::XMLDecl => Err(Error::NotWellFormed(WFError::UnexpectedChar(
					ERRCTX_XML_DECL,
					'/',
					None,
				))),
			},
			b if CLASS_NAMESTART_BYTE.select(b) => {
				// the byte is needed for the name
				self.prep_scratchpad();
				self.scratchpad.push(b);
				Ok(ElementState::Name)
			}
			_ => Err(Error::NotWellFormed(WFError::UnexpectedByte(
				match kind {
					ElementKind::XMLDecl => ERRCTX_XML_DECL,
					_ => ERRCTX_ELEMENT,
				},
				b,
				Some(&["whitespace", "\"", "'", "=", ">", "?", "/", "start of name"]),
			))),
		}
	}

	fn lex_attval_next(
		&mut self,
		delim: u8,
		selector: &'static [ByteRange],
		b: u8,
		element_kind: ElementKind,
	) -> Result<ST> {
		match b {
			b'<' => Err(Error::NotWellFormed(WFError::UnexpectedChar(
				ERRCTX_ATTVAL,
				'<',
				None,
			))),
			b'&' => {
				// swap the scratchpad to avoid clobbering the attribute
				// value during the entity lookup
				self.swap_scratchpad();
				Ok(ST(
					State::Reference {
						ctx: ERRCTX_ATTVAL,
						ret: RefReturnState::AttributeValue(element_kind, delim, selector),
						kind: RefKind::Entity,
					},
					None,
				))
			}
			// attribute value normalization (XML 1.0 § 3.3.3)
			b'\t' | b'\n' => {
				self.prep_scratchpad();
				self.scratchpad.push(b' ');
				Ok(ST(
					State::Element {
						kind: element_kind,
						state: ElementState::AttributeValue(delim, selector, false),
					},
					None,
				))
			}
			b'\r' => Ok(ST(
				State::Element {
					kind: element_kind,
					state: ElementState::AttributeValue(delim, selector, true),
				},
				None,
			)),
			d if d == delim => Ok(ST(
				State::Element {
					kind: element_kind,
					// the grammar requires whitespace after an attribute
					state: ElementState::SpaceRequired,
				},
				Some(Token::AttributeValue(
					self.metrics(0),
					self.flush_scratchpad_as_complete_cdata()?,
				)),
			)),
			other => Err(Error::NotWellFormed(WFError::InvalidChar(
				ERRCTX_ATTVAL,
				other as u32,
				false,
			))),
		}
	}

	fn lex_element(&mut self, kind: ElementKind, state: ElementState, r: &mut &[u8]) -> Result<ST> {
		match state {
			ElementState::Start | ElementState::Name => {
				if self.scratchpad.is_empty() {
					// the first char is special: it must match the
					// NameStart class, not just the Name class
					let b = handle_eof(self.read_single(r)?, ERRCTX_NAME)?;
					if !CLASS_NAMESTART_BYTE.select(b) {
						Err(Error::NotWellFormed(WFError::UnexpectedByte(
							ERRCTX_NAME,
							b,
							None,
						)))
					} else {
						self.prep_scratchpad();
						self.scratchpad.push(b);
						// stay in the same state; the other branch takes
						// over on the next iteration
						Ok(ST(State::Element { kind, state }, None))
					}
				} else {
					match self.read_validated(r, &CLASS_NAME_BYTE, self.opts.max_token_length)? {
						Endbyte::Eof => Err(Error::wfeof(ERRCTX_NAME)),
						Endbyte::Limit => Err(Self::token_length_error()),
						Endbyte::Delimiter(b) => {
							let next_state = self.lex_element_postblank(kind, b)?;
							let name = self.flush_scratchpad_as_name()?;
							let metrics = self.metrics(1);
							Ok(ST(
								State::Element {
									kind,
									state: next_state,
								},
								Some(if state == ElementState::Name {
									Token::Name(metrics, name)
								} else {
									match kind {
										ElementKind::Header => {
											Token::ElementHeadStart(metrics, name)
										}
										ElementKind::Footer => {
											Token::ElementFootStart(metrics, name)
										}
										ElementKind::XMLDecl => {
											unreachable!("xml decl has no freestanding names")
										}
									}
								}),
							))
						}
					}
				}
			}
			ElementState::SpaceRequired | ElementState::Blank => {
				match self.skip_matching(r, &CLASS_SPACE_BYTE) {
					(_, Ok(Endbyte::Eof)) | (_, Ok(Endbyte::Limit)) => {
						Err(Error::wfeof(ERRCTX_ELEMENT))
					}
					(nmatching, Err(Error::EndOfBuffer))
						if nmatching > 0 && state == ElementState::SpaceRequired =>
					{
						// the space requirement is satisfied; transition
						// to Blank so that a retry after the buffer
						// underrun does not demand more whitespace
						Ok(ST(
							State::Element {
								kind,
								state: ElementState::Blank,
							},
							None,
						))
					}
					(nmatching, Ok(Endbyte::Delimiter(b))) => {
						self.eat_whitespace_metrics(1);
						let next_state = self.lex_element_postblank(kind, b)?;
						if next_state == ElementState::Name
							&& state == ElementState::SpaceRequired
							&& nmatching == 0
						{
							Err(Error::NotWellFormed(WFError::InvalidSyntax(
								"space required before attribute names",
							)))
						} else {
							Ok(ST(
								State::Element {
									kind,
									state: next_state,
								},
								None,
							))
						}
					}
					(_, Err(e)) => Err(e),
				}
			}
			// XML 1.0 § 2.3 [10] AttValue
			ElementState::AttributeValue(delim, selector, false) => {
				match self.read_validated(r, &selector, self.opts.max_token_length)? {
					Endbyte::Eof => Err(Error::wfeof(ERRCTX_ATTVAL)),
					Endbyte::Limit => Err(Self::token_length_error()),
					Endbyte::Delimiter(b) => self.lex_attval_next(delim, selector, b, kind),
				}
			}
			// CRLF normalization inside attribute values; separate from
			// the text mechanism because the delimiter needs to be
			// carried along
			ElementState::AttributeValue(delim, selector, true) => {
				let b = handle_eof(self.read_single(r)?, ERRCTX_ATTVAL)?;
				match b {
					// CRLF folds into a single space
					b'\n' => {
						self.prep_scratchpad();
						self.scratchpad.push(b' ');
						Ok(ST(
							State::Element {
								kind,
								state: ElementState::AttributeValue(delim, selector, false),
							},
							None,
						))
					}
					// the pending CR becomes a space, the new CR keeps
					// the lookahead going
					b'\r' => {
						self.prep_scratchpad();
						self.scratchpad.push(b' ');
						Ok(ST(
							State::Element {
								kind,
								state: ElementState::AttributeValue(delim, selector, true),
							},
							None,
						))
					}
					b => {
						self.prep_scratchpad();
						self.scratchpad.push(b' ');
						self.lex_attval_next(delim, selector, b, kind)
					}
				}
			}
			ElementState::MaybeXMLDeclEnd => match self.read_single(r)? {
				Some(b'>') => {
					self.drop_scratchpad();
					Ok(ST(
						State::Content(ContentState::Whitespace),
						Some(Token::XMLDeclEnd(self.metrics(0))),
					))
				}
				Some(b) => Err(Error::NotWellFormed(WFError::UnexpectedByte(
					ERRCTX_XML_DECL_END,
					b,
					Some(&[">"]),
				))),
				None => Err(Error::wfeof(ERRCTX_XML_DECL_END)),
			},
			ElementState::MaybeHeadClose => match self.read_single(r)? {
				Some(b'>') => {
					self.drop_scratchpad();
					Ok(ST(
						State::Content(ContentState::Initial),
						Some(Token::ElementHeadClose(self.metrics(0))),
					))
				}
				Some(b) => Err(Error::NotWellFormed(WFError::UnexpectedByte(
					ERRCTX_ELEMENT_CLOSE,
					b,
					Some(&[">"]),
				))),
				None => Err(Error::wfeof(ERRCTX_ELEMENT_CLOSE)),
			},
			// no read here: this state is entered when another state has
			// already consumed the `=`
			ElementState::Eq => Ok(ST(
				State::Element {
					kind,
					state: ElementState::Blank,
				},
				Some(Token::Eq(self.metrics(0))),
			)),
			// like Eq, no read
			ElementState::Close => Ok(ST(
				State::Content(ContentState::Initial),
				Some(Token::ElementHFEnd(self.metrics(0))),
			)),
		}
	}

	fn lex_reference(
		&mut self,
		ctx: &'static str,
		ret: RefReturnState,
		kind: RefKind,
		r: &mut &[u8],
	) -> Result<ST> {
		let result = match kind {
			RefKind::Entity => self.read_validated(r, &CLASS_NAME_BYTE, MAX_REFERENCE_LENGTH)?,
			RefKind::Char(CharRefRadix::Decimal) => {
				self.read_validated(r, &CLASS_DECIMAL_DIGIT_BYTE, MAX_REFERENCE_LENGTH)?
			}
			RefKind::Char(CharRefRadix::Hexadecimal) => {
				self.read_validated(r, &CLASS_HEXADECIMAL_DIGIT_BYTE, MAX_REFERENCE_LENGTH)?
			}
		};
		let result = match result {
			Endbyte::Eof => return Err(Error::wfeof(ERRCTX_REF)),
			Endbyte::Limit => return Err(Error::NotWellFormed(WFError::UndeclaredEntity)),
			Endbyte::Delimiter(b) => match b {
				b'#' => {
					if !self.scratchpad.is_empty() {
						Err(b'#')
					} else {
						match kind {
							RefKind::Entity => {
								return Ok(ST(
									State::Reference {
										ctx,
										ret,
										kind: RefKind::Char(CharRefRadix::Decimal),
									},
									None,
								))
							}
							_ => Err(b'#'),
						}
					}
				}
				b'x' => {
					if !self.scratchpad.is_empty() {
						Err(b'x')
					} else {
						match kind {
							RefKind::Char(CharRefRadix::Decimal) => {
								return Ok(ST(
									State::Reference {
										ctx,
										ret,
										kind: RefKind::Char(CharRefRadix::Hexadecimal),
									},
									None,
								))
							}
							_ => Err(b'x'),
						}
					}
				}
				b';' => {
					if self.scratchpad.is_empty() {
						return Err(Error::NotWellFormed(WFError::InvalidSyntax(
							"empty reference",
						)));
					}
					// return to the main scratchpad; the reference is now
					// in the swap, which is cleared by read_swap
					self.swap_scratchpad();
					let reference = self.read_swap();
					match kind {
						RefKind::Entity => {
							let b = add_context(resolve_named_entity(&reference[..]), ctx)?;
							self.prep_scratchpad();
							self.scratchpad.push(b);
							Ok(())
						}
						RefKind::Char(radix) => {
							// safe: the digit classes are all plain ascii
							let reference =
								unsafe { std::str::from_utf8_unchecked(&reference[..]) };
							self.prep_scratchpad();
							add_context(
								resolve_char_reference(reference, radix, &mut self.scratchpad),
								ctx,
							)
						}
					}
				}
				b => Err(b),
			},
		};
		match result {
			Ok(()) => Ok(ST(ret.to_state(), None)),
			Err(b) => Err(Error::NotWellFormed(WFError::UnexpectedByte(
				ERRCTX_REF,
				b,
				Some(&[";"]),
			))),
		}
	}

	fn lex_bytes_raw(&mut self, r: &mut &[u8]) -> Result<Option<Token>> {
		if let Some(e) = self.err {
			return Err(e);
		}

		loop {
			let stresult = match self.state {
				State::Content(substate) => self.lex_content(substate, r),
				State::Element {
					kind,
					state: substate,
				} => self.lex_element(kind, substate, r),
				State::Comment(substate) => self.lex_comment(substate, r),
				State::Doctype(substate) => self.lex_doctype(substate, r),
				State::Reference { ctx, ret, kind } => self.lex_reference(ctx, ret, kind, r),
				State::Eof => return Ok(None),
			};
			let st = match stresult {
				// buffer underruns are not cached; they are retried
				Err(Error::EndOfBuffer) => return Err(Error::EndOfBuffer),
				// everything else poisons the lexer so that no invalid
				// data can be emitted after the error
				Err(other) => {
					self.err = Some(other);
					return Err(other);
				}
				Ok(st) => st,
			};
			if let Some(tok) = st.splice(&mut self.state) {
				return Ok(Some(tok));
			}
		}
	}

	/// Lex bytes from the window, advancing the slice for each byte
	/// consumed, until either an error occurs, a token is produced or the
	/// window is exhausted.
	///
	/// **Note:** The lexer keeps internal state which may cause a token
	/// to be emitted even for an empty window. Callers should keep
	/// invoking this function with an empty window and the appropriate
	/// eof flag until a non-token result is returned.
	///
	/// # End-of-file handling
	///
	/// If `at_eof` is false, exhausting the window is treated as a
	/// temporary situation and signalled with a
	/// [`std::io::ErrorKind::WouldBlock`] I/O error. Otherwise it is
	/// treated as the end of the document.
	#[inline]
	pub fn lex_bytes(&mut self, r: &mut &[u8], at_eof: bool) -> CrateResult<Option<Token>> {
		self.has_eof = at_eof;
		Ok(self.lex_bytes_raw(r)?)
	}

	/// Lex bytes from the reader until either an error occurs, a token is
	/// produced or a valid end-of-file situation is encountered.
	///
	/// This issues exactly one call to the `fill_buf()` method of the
	/// reader. An empty buffer from `fill_buf()` is treated as the end of
	/// file; a [`std::io::ErrorKind::WouldBlock`] error from the reader
	/// still invokes the lexer with an empty window, because internal
	/// state may allow a token to be emitted without further input (this
	/// matters most for the `>` of a closing element tag).
	pub fn lex<R: io::BufRead + ?Sized>(&mut self, r: &mut R) -> CrateResult<Option<Token>> {
		let (mut buf, eof): (&[u8], bool) = match r.fill_buf() {
			Err(e) if e.kind() == io::ErrorKind::WouldBlock => (&[], false),
			Err(e) => return Err(e.into()),
			Ok(b) => (b, b.is_empty()),
		};
		let orig_len = buf.len();
		let result = self.lex_bytes(&mut buf, eof);
		let new_len = buf.len();
		r.consume(orig_len - new_len);
		Ok(result?)
	}

	/// Release all temporary buffers.
	///
	/// This is sensible to call when it is expected that no more data
	/// will be processed for a while and the memory is better used
	/// elsewhere.
	pub fn release_temporaries(&mut self) {
		self.scratchpad.shrink_to_fit();
		self.swap.shrink_to_fit();
	}
}

impl fmt::Debug for Lexer {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("Lexer")
			.field("state", &self.state)
			.field("pos", &self.pos)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::bufq::BufferQueue;
	use crate::error::Error as CrateError;

	fn lex_window(data: &[u8], token_limit: usize) -> (Vec<Token>, CrateResult<()>) {
		let mut lexer = Lexer::new();
		let mut out = Vec::new();
		let mut window = data;
		let result = loop {
			if out.len() > token_limit {
				panic!("token limit exceeded: {}", token_limit);
			}
			match lexer.lex_bytes(&mut window, true) {
				Ok(Some(tok)) => out.push(tok),
				Ok(None) => break Ok(()),
				Err(e) => break Err(e),
			}
		};
		(out, result)
	}

	fn lex(data: &[u8]) -> (Vec<Token>, CrateResult<()>) {
		lex_window(data, 128)
	}

	fn lex_err(data: &[u8]) -> Option<CrateError> {
		let (_, r) = lex(data);
		r.err()
	}

	fn lex_chunked(chunks: &[&[u8]]) -> (Vec<Token>, CrateResult<()>) {
		let mut bq = BufferQueue::new();
		let mut lexer = Lexer::new();
		let mut out = Vec::new();
		for chunk in chunks.iter() {
			bq.push(chunk.to_vec());
			loop {
				match lexer.lex(&mut bq) {
					Ok(Some(tok)) => out.push(tok),
					Ok(None) => panic!("unexpected eof"),
					Err(CrateError::IO(e)) if e.kind() == io::ErrorKind::WouldBlock => break,
					Err(e) => return (out, Err(e)),
				}
			}
		}
		bq.push_eof();
		loop {
			match lexer.lex(&mut bq) {
				Ok(Some(tok)) => out.push(tok),
				Ok(None) => return (out, Ok(())),
				Err(e) => return (out, Err(e)),
			}
		}
	}

	#[test]
	fn lexes_xml_declaration() {
		let (toks, r) = lex(b"<?xml version='1.0'?><r/>");
		r.unwrap();
		assert!(matches!(toks[0], Token::XMLDeclStart(_)));
		assert!(matches!(&toks[1], Token::Name(_, name) if name == "version"));
		assert!(matches!(toks[2], Token::Eq(_)));
		assert!(matches!(&toks[3], Token::AttributeValue(_, v) if v == "1.0"));
		assert!(matches!(toks[4], Token::XMLDeclEnd(_)));
	}

	#[test]
	fn lexes_simple_element_with_text() {
		let (toks, r) = lex(b"<hello>World!</hello>");
		r.unwrap();
		assert!(matches!(&toks[0], Token::ElementHeadStart(_, name) if name == "hello"));
		assert!(matches!(toks[1], Token::ElementHFEnd(_)));
		assert!(matches!(&toks[2], Token::Text(_, t) if t == "World!"));
		assert!(matches!(&toks[3], Token::ElementFootStart(_, name) if name == "hello"));
		assert!(matches!(toks[4], Token::ElementHFEnd(_)));
		assert_eq!(toks.len(), 5);
	}

	#[test]
	fn lexes_attributes_with_both_quote_kinds() {
		let (toks, r) = lex(b"<e a='x' b=\"y\"/>");
		r.unwrap();
		assert!(matches!(&toks[0], Token::ElementHeadStart(_, name) if name == "e"));
		assert!(matches!(&toks[1], Token::Name(_, name) if name == "a"));
		assert!(matches!(toks[2], Token::Eq(_)));
		assert!(matches!(&toks[3], Token::AttributeValue(_, v) if v == "x"));
		assert!(matches!(&toks[4], Token::Name(_, name) if name == "b"));
		assert!(matches!(toks[5], Token::Eq(_)));
		assert!(matches!(&toks[6], Token::AttributeValue(_, v) if v == "y"));
		assert!(matches!(toks[7], Token::ElementHeadClose(_)));
	}

	#[test]
	fn expands_entities_in_text() {
		let (toks, r) = lex(b"<e>&lt;&amp;&gt;&apos;&quot;</e>");
		r.unwrap();
		let texts: Vec<_> = toks
			.iter()
			.filter_map(|t| match t {
				Token::Text(_, s) => Some(s.as_str().to_string()),
				_ => None,
			})
			.collect();
		assert_eq!(texts.join(""), "<&>'\"");
	}

	#[test]
	fn expands_character_references() {
		let (toks, r) = lex(b"<e>&#60;&#x3e;</e>");
		r.unwrap();
		let texts: Vec<_> = toks
			.iter()
			.filter_map(|t| match t {
				Token::Text(_, s) => Some(s.as_str().to_string()),
				_ => None,
			})
			.collect();
		assert_eq!(texts.join(""), "<>");
	}

	#[test]
	fn expands_entities_in_attribute_values() {
		let (toks, r) = lex(b"<e a='&amp;&lt;'/>");
		r.unwrap();
		assert!(matches!(&toks[3], Token::AttributeValue(_, v) if v == "&<"));
	}

	#[test]
	fn rejects_undeclared_entity() {
		assert!(matches!(
			lex_err(b"<e>&nbsp;</e>"),
			Some(CrateError::NotWellFormed(WFError::UndeclaredEntity))
		));
	}

	#[test]
	fn rejects_char_reference_to_invalid_codepoint() {
		assert!(matches!(
			lex_err(b"<e>&#x0;</e>"),
			Some(CrateError::NotWellFormed(WFError::InvalidChar(_, 0, true)))
		));
	}

	#[test]
	fn decodes_cdata_section() {
		let (toks, r) = lex(b"<e><![CDATA[<not> &markup;]]></e>");
		r.unwrap();
		assert!(matches!(&toks[2], Token::Text(_, t) if t == "<not> &markup;"));
	}

	#[test]
	fn cdata_section_with_embedded_brackets() {
		let (toks, r) = lex(b"<e><![CDATA[a]]b]]]></e>");
		r.unwrap();
		let texts: Vec<_> = toks
			.iter()
			.filter_map(|t| match t {
				Token::Text(_, s) => Some(s.as_str().to_string()),
				_ => None,
			})
			.collect();
		assert_eq!(texts.join(""), "a]]b]");
	}

	#[test]
	fn rejects_cdata_end_in_plain_text() {
		assert!(matches!(
			lex_err(b"<e>a]]>b</e>"),
			Some(CrateError::NotWellFormed(WFError::InvalidSyntax(_)))
		));
	}

	#[test]
	fn lexes_comment() {
		let (toks, r) = lex(b"<e><!-- a comment --></e>");
		r.unwrap();
		assert!(matches!(&toks[2], Token::Comment(_, c) if c == " a comment "));
	}

	#[test]
	fn comment_with_single_dashes() {
		let (toks, r) = lex(b"<e><!-- a - b - c --></e>");
		r.unwrap();
		assert!(matches!(&toks[2], Token::Comment(_, c) if c == " a - b - c "));
	}

	#[test]
	fn rejects_double_dash_inside_comment() {
		assert!(matches!(
			lex_err(b"<e><!-- a -- b --></e>"),
			Some(CrateError::NotWellFormed(WFError::InvalidSyntax(_)))
		));
	}

	#[test]
	fn lexes_doctype_as_skip_token() {
		let (toks, r) = lex(b"<!DOCTYPE html><r/>");
		r.unwrap();
		assert!(matches!(toks[0], Token::Doctype(_)));
		assert!(matches!(&toks[1], Token::ElementHeadStart(_, name) if name == "r"));
	}

	#[test]
	fn doctype_with_internal_subset_and_quotes() {
		let (toks, r) = lex(
			b"<!DOCTYPE r SYSTEM 'some.dtd' [ <!ENTITY x \"<junk>'\"> ]><r/>",
		);
		r.unwrap();
		assert!(matches!(toks[0], Token::Doctype(_)));
		assert!(matches!(&toks[1], Token::ElementHeadStart(_, name) if name == "r"));
	}

	#[test]
	fn rejects_processing_instruction() {
		assert!(matches!(
			lex_err(b"<r><?php echo ?></r>"),
			Some(CrateError::RestrictedXml("processing instructions"))
		));
	}

	#[test]
	fn folds_crlf_to_lf_in_text() {
		let (toks, r) = lex(b"<e>a\r\nb\rc</e>");
		r.unwrap();
		let texts: Vec<_> = toks
			.iter()
			.filter_map(|t| match t {
				Token::Text(_, s) => Some(s.as_str().to_string()),
				_ => None,
			})
			.collect();
		assert_eq!(texts.join(""), "a\nb\nc");
	}

	#[test]
	fn normalizes_whitespace_in_attribute_values() {
		let (toks, r) = lex(b"<e a='x\ty\nz\rw'/>");
		r.unwrap();
		assert!(matches!(&toks[3], Token::AttributeValue(_, v) if v == "x y z w"));
	}

	#[test]
	fn requires_space_between_attributes() {
		assert!(matches!(
			lex_err(b"<e a='x'b='y'/>"),
			Some(CrateError::NotWellFormed(WFError::InvalidSyntax(_)))
		));
	}

	#[test]
	fn rejects_forbidden_control_bytes_in_text() {
		assert!(matches!(
			lex_err(b"<e>\x01</e>"),
			Some(CrateError::NotWellFormed(WFError::InvalidChar(_, 1, false)))
		));
	}

	#[test]
	fn rejects_invalid_utf8() {
		assert!(matches!(
			lex_err(b"<e>\xff</e>"),
			Some(CrateError::InvalidUtf8Byte(0xff))
		));
	}

	#[test]
	fn splits_long_text_at_token_length_limit() {
		let mut doc = Vec::new();
		doc.extend_from_slice(b"<e>");
		doc.extend_from_slice(&[b'x'; 2048]);
		doc.extend_from_slice(b"</e>");
		let mut lexer = Lexer::with_options(LexerOptions::default().max_token_length(128));
		let mut window = &doc[..];
		let mut total = 0usize;
		let mut ntok = 0usize;
		loop {
			match lexer.lex_bytes(&mut window, true) {
				Ok(Some(Token::Text(_, t))) => {
					assert!(t.len() <= 128);
					total += t.len();
					ntok += 1;
				}
				Ok(Some(_)) => (),
				Ok(None) => break,
				Err(e) => panic!("unexpected error: {:?}", e),
			}
		}
		assert_eq!(total, 2048);
		assert!(ntok >= 16);
	}

	#[test]
	fn chunked_input_produces_identical_tokens() {
		let doc: &[u8] =
			b"<?xml version='1.0'?><root a='1&amp;2'><!--c--><child>text<![CDATA[&raw;]]></child></root>";
		let (reference, r) = lex_window(doc, 1024);
		r.unwrap();
		for size in [1usize, 2, 3, 7].iter() {
			let chunks: Vec<&[u8]> = doc.chunks(*size).collect();
			let (toks, r) = lex_chunked(&chunks[..]);
			r.unwrap();
			let strip = |ts: &[Token]| -> Vec<String> {
				ts.iter().map(|t| format!("{:?}", t)).collect::<Vec<_>>()
			};
			// token metrics are identical as well, so direct comparison
			// is fine
			assert_eq!(strip(&reference), strip(&toks), "chunk size {}", size);
		}
	}

	#[test]
	fn whitespace_after_xml_decl_is_skipped() {
		let (toks, r) = lex(b"<?xml version='1.0'?>\n\t <r/>");
		r.unwrap();
		assert!(matches!(toks[4], Token::XMLDeclEnd(_)));
		assert!(matches!(&toks[5], Token::ElementHeadStart(_, name) if name == "r"));
	}

	#[test]
	fn position_tracks_lines_and_columns() {
		let mut lexer = Lexer::new();
		let mut window: &[u8] = b"<a>\nx</a>";
		loop {
			match lexer.lex_bytes(&mut window, true) {
				Ok(Some(_)) => (),
				Ok(None) => break,
				Err(e) => panic!("unexpected error: {:?}", e),
			}
		}
		let pos = lexer.position();
		assert_eq!(pos.offset, 9);
		assert_eq!(pos.line, 2);
		assert_eq!(pos.column, 6);
	}

	#[test]
	fn token_metrics_cover_input_ranges() {
		let (toks, r) = lex(b"<a>xyz</a>");
		r.unwrap();
		match &toks[2] {
			Token::Text(m, _) => {
				assert_eq!(m.start(), 3);
				assert_eq!(m.end(), 6);
				assert_eq!(m.len(), 3);
			}
			other => panic!("unexpected token: {:?}", other),
		}
	}

	#[test]
	fn errors_are_sticky() {
		let mut lexer = Lexer::new();
		let mut window: &[u8] = b"<e>\x01</e>";
		let first = loop {
			match lexer.lex_bytes(&mut window, true) {
				Ok(Some(_)) => (),
				Ok(None) => panic!("lexer accepted invalid input"),
				Err(e) => break e,
			}
		};
		let mut empty: &[u8] = b"";
		match lexer.lex_bytes(&mut empty, true) {
			Err(e) => assert_eq!(format!("{:?}", e), format!("{:?}", first)),
			other => panic!("expected sticky error, got {:?}", other),
		}
	}
}
