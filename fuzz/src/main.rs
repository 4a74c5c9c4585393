#[macro_use]
extern crate afl;
extern crate pushxml;

use pushxml::{SaxHandler, SaxParser};

struct Sink;

impl SaxHandler for Sink {}

fn main() {
	fuzz!(|data: &[u8]| {
		if data.is_empty() {
			return;
		}
		// derive a chunk size from the input so the corpus also explores
		// the resumption paths of the tokenizer
		let chunk_size = (data[0] as usize % 17) + 1;
		let mut parser = SaxParser::new(Sink);
		for chunk in data[1..].chunks(chunk_size) {
			if parser.receive(chunk).is_err() {
				return;
			}
		}
		let _ = parser.close();
	});
}
