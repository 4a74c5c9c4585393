/*!
# Queue of input buffers

[`BufferQueue`] decouples the arrival of input chunks from their
consumption by the lexer. Chunks are pushed in whole and consumed
byte-wise through [`std::io::BufRead`]; running out of buffered data
surfaces as a [`std::io::ErrorKind::WouldBlock`] error until the end of
input has been announced with [`BufferQueue::push_eof`].
*/
use std::collections::VecDeque;
use std::io;

use bytes::Bytes;

pub const ERR_NODATA: &'static str = "no data in buffer";

pub struct BufferQueue {
	q: VecDeque<Bytes>,
	offset: usize,
	len: usize,
	eof: bool,
}

impl BufferQueue {
	pub fn new() -> BufferQueue {
		BufferQueue {
			q: VecDeque::new(),
			offset: 0,
			len: 0,
			eof: false,
		}
	}

	/// Enqueue a chunk of data.
	///
	/// Empty chunks are dropped silently.
	///
	/// # Panics
	///
	/// If [`BufferQueue::push_eof`] has been called before.
	pub fn push<T: Into<Bytes>>(&mut self, new: T) {
		if self.eof {
			panic!("cannot push behind eof");
		}
		let new = new.into();
		if new.len() == 0 {
			return;
		}
		self.len = match self.len.checked_add(new.len()) {
			None => panic!("length overflow"),
			Some(v) => v,
		};
		self.q.push_back(new);
	}

	/// Announce the end of input.
	///
	/// Once the already-buffered data has been consumed, reads return the
	/// end-of-file condition instead of [`std::io::ErrorKind::WouldBlock`].
	pub fn push_eof(&mut self) {
		self.eof = true;
	}

	/// Number of unconsumed bytes in the queue.
	pub fn len(&self) -> usize {
		self.len
	}

	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	/// Whether [`BufferQueue::push_eof`] has been called.
	pub fn eof_pushed(&self) -> bool {
		self.eof
	}

	/// Drop all buffered data without consuming it.
	///
	/// This is useful to release memory after an error condition.
	pub fn clear(&mut self) {
		self.q.clear();
		self.offset = 0;
		self.len = 0;
	}

	fn advance(&mut self, amt: usize) {
		if amt == 0 {
			return;
		}
		let remaining = {
			let front = match self.q.front() {
				None => panic!("attempt to consume beyond end of buffer"),
				Some(v) => v,
			};
			debug_assert!(self.offset < front.len());
			if amt > front.len() - self.offset {
				panic!("attempt to consume beyond end of buffer");
			}
			self.offset += amt;
			front.len() - self.offset
		};
		if remaining == 0 {
			self.q.pop_front();
			self.offset = 0;
		}
		self.len -= amt;
	}
}

impl io::Read for BufferQueue {
	fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
		let to_read = {
			let front = match self.q.front() {
				None => {
					return if self.eof {
						Ok(0)
					} else {
						Err(io::Error::new(io::ErrorKind::WouldBlock, ERR_NODATA))
					};
				}
				Some(v) => v,
			};
			let src = &front[self.offset..];
			let to_read = src.len().min(dst.len());
			dst[..to_read].copy_from_slice(&src[..to_read]);
			to_read
		};
		self.advance(to_read);
		Ok(to_read)
	}
}

impl io::BufRead for BufferQueue {
	fn fill_buf(&mut self) -> io::Result<&[u8]> {
		match self.q.front() {
			None => {
				if self.eof {
					Ok(&[])
				} else {
					Err(io::Error::new(io::ErrorKind::WouldBlock, ERR_NODATA))
				}
			}
			Some(v) => Ok(&v[self.offset..]),
		}
	}

	fn consume(&mut self, amt: usize) {
		self.advance(amt)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::{BufRead, Read};

	fn filled() -> BufferQueue {
		let mut bq = BufferQueue::new();
		bq.push(&b"foo"[..]);
		bq.push(&b"bar"[..]);
		bq.push(&b"2342"[..]);
		bq
	}

	#[test]
	fn len_grows_with_pushed_buffers() {
		let mut bq = BufferQueue::new();
		assert_eq!(bq.len(), 0);
		bq.push(&b"foo"[..]);
		assert_eq!(bq.len(), 3);
		bq.push(&b"bar"[..]);
		assert_eq!(bq.len(), 6);
	}

	#[test]
	fn read_works_sequentially_across_chunk_edges() {
		let mut bq = filled();
		let mut buf = [0u8; 4];
		assert_eq!(bq.read(&mut buf[..]).unwrap(), 3);
		assert_eq!(&buf[..3], b"foo");
		assert_eq!(bq.read(&mut buf[..]).unwrap(), 3);
		assert_eq!(&buf[..3], b"bar");
		assert_eq!(bq.read(&mut buf[..]).unwrap(), 4);
		assert_eq!(&buf[..], b"2342");
		assert_eq!(bq.len(), 0);
	}

	#[test]
	fn read_returns_wouldblock_when_drained_without_eof() {
		let mut bq = BufferQueue::new();
		bq.push(&b"foo"[..]);
		let mut buf = [0u8; 4];
		assert_eq!(bq.read(&mut buf[..]).unwrap(), 3);
		assert_eq!(
			bq.read(&mut buf[..]).err().unwrap().kind(),
			io::ErrorKind::WouldBlock
		);
	}

	#[test]
	fn read_returns_eof_when_drained_after_push_eof() {
		let mut bq = BufferQueue::new();
		bq.push(&b"foo"[..]);
		bq.push_eof();
		let mut buf = [0u8; 4];
		assert_eq!(bq.read(&mut buf[..]).unwrap(), 3);
		assert_eq!(bq.read(&mut buf[..]).unwrap(), 0);
	}

	#[test]
	#[should_panic(expected = "cannot push behind eof")]
	fn push_after_eof_panics() {
		let mut bq = BufferQueue::new();
		bq.push_eof();
		bq.push(&b"foo"[..]);
	}

	#[test]
	fn empty_chunks_are_dropped() {
		let mut bq = BufferQueue::new();
		bq.push(&b""[..]);
		assert_eq!(bq.len(), 0);
		bq.push_eof();
		assert_eq!(bq.fill_buf().unwrap(), b"");
	}

	#[test]
	fn fill_buf_returns_front_without_consuming() {
		let mut bq = filled();
		assert_eq!(bq.fill_buf().unwrap(), b"foo");
		assert_eq!(bq.fill_buf().unwrap(), b"foo");
		assert_eq!(bq.len(), 10);
	}

	#[test]
	fn consume_moves_across_the_queue() {
		let mut bq = filled();
		bq.consume(1);
		assert_eq!(bq.fill_buf().unwrap(), b"oo");
		bq.consume(2);
		assert_eq!(bq.fill_buf().unwrap(), b"bar");
		bq.consume(3);
		assert_eq!(bq.fill_buf().unwrap(), b"2342");
		assert_eq!(bq.len(), 4);
	}

	#[test]
	fn fill_buf_wouldblock_on_empty_queue_without_eof() {
		let mut bq = BufferQueue::new();
		assert_eq!(
			bq.fill_buf().err().unwrap().kind(),
			io::ErrorKind::WouldBlock
		);
	}

	#[test]
	fn fill_buf_empty_slice_at_eof() {
		let mut bq = BufferQueue::new();
		bq.push_eof();
		assert_eq!(bq.fill_buf().unwrap(), b"");
	}

	#[test]
	#[should_panic(expected = "attempt to consume beyond end of buffer")]
	fn consume_beyond_chunk_boundary_panics() {
		let mut bq = filled();
		bq.consume(4);
	}

	#[test]
	fn zero_sized_consume_is_always_valid() {
		let mut bq = BufferQueue::new();
		bq.consume(0);
		bq.push_eof();
		bq.consume(0);
	}

	#[test]
	fn refill_after_depletion_works() {
		let mut bq = BufferQueue::new();
		bq.push(&b"foo"[..]);
		let mut buf = [0u8; 3];
		assert_eq!(bq.read(&mut buf[..]).unwrap(), 3);
		assert_eq!(bq.len(), 0);
		bq.push(&b"bar"[..]);
		assert_eq!(bq.read(&mut buf[..]).unwrap(), 3);
		assert_eq!(&buf[..], b"bar");
	}
}
