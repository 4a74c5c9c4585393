/*!
Byte-window primitives for the lexer.

These functions operate on a `&mut &[u8]` window: bytes which have been
interpreted are split off the front of the slice, so the caller can tell
how much of the window was consumed by comparing lengths.
*/
use super::ranges::ByteSelect;

/// How a scan over the byte window ended.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Endbyte {
	/// The window was exhausted.
	Eof,
	/// The given length limit was reached.
	Limit,
	/// A byte not matched by the selector was encountered (and consumed).
	Delimiter(u8),
}

fn find_first_not<B: ByteSelect>(src: &[u8], selector: &B) -> Option<usize> {
	for (i, b) in src.iter().enumerate() {
		if !selector.select(*b) {
			return Some(i);
		}
	}
	None
}

/// Copy bytes matched by `selector` from the front of `r` into `into`,
/// up to `limit` bytes.
///
/// The delimiter byte, if any, is consumed from `r` but not copied.
pub fn copy_matched_bytes<B: ByteSelect>(
	r: &mut &[u8],
	selector: &B,
	limit: usize,
	into: &mut Vec<u8>,
) -> Endbyte {
	let end_pos = match find_first_not(*r, selector) {
		None => r.len().min(limit),
		Some(p) => p.min(limit),
	};
	let (matched, tail) = r.split_at(end_pos);
	into.extend_from_slice(matched);
	match tail.first() {
		None => {
			*r = tail;
			Endbyte::Eof
		}
		Some(b) if !selector.select(*b) => {
			*r = &tail[1..];
			Endbyte::Delimiter(*b)
		}
		// matched byte beyond end_pos means we stopped at the limit
		Some(_) => {
			*r = tail;
			Endbyte::Limit
		}
	}
}

/// Discard bytes matched by `selector` from the front of `r`.
///
/// Returns the number of discarded bytes. The delimiter byte, if any, is
/// consumed.
pub fn skip_matched_bytes<B: ByteSelect>(r: &mut &[u8], selector: &B) -> (usize, Endbyte) {
	let end_pos = match find_first_not(*r, selector) {
		None => r.len(),
		Some(p) => p,
	};
	let tail = &r[end_pos..];
	match tail.first() {
		None => {
			*r = tail;
			(end_pos, Endbyte::Eof)
		}
		Some(b) => {
			*r = &tail[1..];
			(end_pos, Endbyte::Delimiter(*b))
		}
	}
}
