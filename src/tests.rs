//! Cross-module integration tests.
//!
//! The components are tested extensively in their modules; the tests
//! here exercise the assembled pipeline, most importantly the guarantee
//! that chunking of the input never changes the observed document.
use super::*;

use std::io;

fn feed_events(data: &[u8], chunk_size: usize) -> Vec<ResolvedEvent> {
	let mut fp = FeedParser::default();
	let mut out = Vec::new();
	for chunk in data.chunks(chunk_size) {
		fp.feed(chunk.to_vec());
		loop {
			match fp.read() {
				Ok(Some(ev)) => out.push(ev),
				Ok(None) => break,
				Err(Error::IO(e)) if e.kind() == io::ErrorKind::WouldBlock => break,
				Err(e) => panic!("unexpected error: {:?}", e),
			}
		}
	}
	fp.feed_eof();
	loop {
		match fp.read() {
			Ok(Some(ev)) => out.push(ev),
			Ok(None) => break,
			Err(e) => panic!("unexpected error: {:?}", e),
		}
	}
	out
}

/// Merge adjacent text events; their segmentation is explicitly not part
/// of the event contract.
fn normalize(evs: Vec<ResolvedEvent>) -> Vec<ResolvedEvent> {
	let mut out: Vec<ResolvedEvent> = Vec::new();
	for ev in evs {
		if let ResolvedEvent::Text(next) = &ev {
			if let Some(ResolvedEvent::Text(prev)) = out.last_mut() {
				prev.push_cdata(next);
				continue;
			}
		}
		out.push(ev);
	}
	out
}

static RICH_DOC: &'static str = "<?xml version='1.0'?>\
<r xmlns='urn:root' xmlns:p='urn:p' p:a='1' b='2'>\
<p:child>text &amp; more</p:child>\
<!-- note -->\
<c><![CDATA[<raw>]]></c>\
\u{fc}n\u{ef}c\u{f8}d\u{e9}\
</r>";

#[test]
fn event_sequence_is_invariant_under_chunking() {
	let data = RICH_DOC.as_bytes();
	let reference = normalize(feed_events(data, data.len() + 1));
	for &size in [1usize, 7, 4095, 4096, 100000].iter() {
		let got = normalize(feed_events(data, size));
		assert_eq!(reference, got, "chunk size {}", size);
	}
}

#[test]
fn feedparser_reads_a_full_document() {
	let doc = b"<?xml version='1.0'?>\n<root xmlns='urn:uuid:fab98e86-7c09-477c-889c-0313d9877bb4' a=\"foo\" b='bar'><child>with some text</child></root>";
	let evs = normalize(feed_events(&doc[..], doc.len()));
	let mut iter = evs.iter();
	assert!(matches!(
		iter.next().unwrap(),
		ResolvedEvent::XMLDeclaration(XMLVersion::V1_0)
	));
	match iter.next().unwrap() {
		ResolvedEvent::StartElement(head) => {
			assert_eq!(head.localname, "root");
			assert_eq!(
				head.nsuri.as_ref().unwrap().as_str(),
				"urn:uuid:fab98e86-7c09-477c-889c-0313d9877bb4"
			);
			assert_eq!(head.attributes.len(), 2);
		}
		other => panic!("unexpected event: {:?}", other),
	}
	match iter.next().unwrap() {
		ResolvedEvent::StartElement(head) => {
			assert_eq!(head.localname, "child");
			assert_eq!(head.attributes.len(), 0);
		}
		other => panic!("unexpected event: {:?}", other),
	}
	match iter.next().unwrap() {
		ResolvedEvent::Text(t) => assert_eq!(t, "with some text"),
		other => panic!("unexpected event: {:?}", other),
	}
	assert!(matches!(
		iter.next().unwrap(),
		ResolvedEvent::EndElement(_)
	));
	assert!(matches!(
		iter.next().unwrap(),
		ResolvedEvent::EndElement(_)
	));
	assert!(iter.next().is_none());
}

#[test]
fn pullparser_reads_a_full_document() {
	let mut doc: &[u8] =
		b"<?xml version='1.0'?>\n<root a='x'><child>with some text</child></root>\n";
	let mut pp = PullParser::new(&mut doc);
	let mut out = Vec::new();
	pp.read_all(|ev| out.push(ev)).unwrap();
	let out = normalize(out);
	assert_eq!(out.len(), 6);
	assert!(matches!(
		out[0],
		ResolvedEvent::XMLDeclaration(XMLVersion::V1_0)
	));
	match &out[3] {
		ResolvedEvent::Text(t) => assert_eq!(t, "with some text"),
		other => panic!("unexpected event: {:?}", other),
	}
}

/// Tracks element nesting purely from dispatched callbacks.
#[derive(Default)]
struct DepthTracker {
	depth: usize,
	max_depth: usize,
	depth_at_end: Option<usize>,
	open: Vec<String>,
}

impl SaxHandler for DepthTracker {
	fn start_element(&mut self, head: &ElementHead) -> HandlerResult {
		self.depth += 1;
		self.max_depth = self.max_depth.max(self.depth);
		self.open.push(head.localname.to_string());
		Ok(())
	}

	fn end_element(&mut self, foot: &ElementFoot) -> HandlerResult {
		let top = self.open.pop().expect("end without matching start");
		assert_eq!(top, foot.localname.as_str());
		self.depth -= 1;
		Ok(())
	}

	fn end_document(&mut self) -> HandlerResult {
		self.depth_at_end = Some(self.depth);
		Ok(())
	}
}

#[test]
fn dispatched_events_nest_correctly() {
	let mut p = SaxParser::new(DepthTracker::default());
	for chunk in RICH_DOC.as_bytes().chunks(3) {
		p.receive(chunk).unwrap();
	}
	p.close().unwrap();
	let t = p.into_handler();
	assert_eq!(t.depth_at_end, Some(0));
	assert_eq!(t.max_depth, 2);
	assert!(t.open.is_empty());
}

/// Logs callbacks in a comparable form, merging adjacent character data.
#[derive(Default)]
struct EventLog(Vec<String>);

impl EventLog {
	fn chars(&mut self, data: &str) {
		if let Some(last) = self.0.last_mut() {
			if let Some(stripped) = last.clone().strip_prefix("chars:") {
				*last = format!("chars:{}{}", stripped, data);
				return;
			}
		}
		self.0.push(format!("chars:{}", data));
	}
}

impl SaxHandler for EventLog {
	fn start_document(&mut self) -> HandlerResult {
		self.0.push("start".into());
		Ok(())
	}

	fn end_document(&mut self) -> HandlerResult {
		self.0.push("end".into());
		Ok(())
	}

	fn start_element(&mut self, head: &ElementHead) -> HandlerResult {
		self.0.push(format!(
			"open:{}:{}",
			head.localname,
			head.nsuri.as_ref().map(|u| u.as_str()).unwrap_or("")
		));
		Ok(())
	}

	fn end_element(&mut self, foot: &ElementFoot) -> HandlerResult {
		self.0.push(format!("close:{}", foot.localname));
		Ok(())
	}

	fn characters(&mut self, data: &CDataStr) -> HandlerResult {
		self.chars(data);
		Ok(())
	}

	fn comment(&mut self, data: &CDataStr) -> HandlerResult {
		self.0.push(format!("comment:{}", data));
		Ok(())
	}
}

#[test]
fn sax_receive_is_invariant_under_chunk_sizes() {
	let data = RICH_DOC.as_bytes();
	let run = |size: usize| -> Vec<String> {
		let mut p = SaxParser::new(EventLog::default());
		for chunk in data.chunks(size) {
			p.receive(chunk).unwrap();
		}
		p.close().unwrap();
		p.into_handler().0
	};
	let reference = run(data.len());
	for &size in [1usize, 4095, 4096, 100000].iter() {
		assert_eq!(reference, run(size), "chunk size {}", size);
	}
}

/// Collects character data verbatim.
#[derive(Default)]
struct TextSink(String);

impl SaxHandler for TextSink {
	fn characters(&mut self, data: &CDataStr) -> HandlerResult {
		self.0.push_str(data);
		Ok(())
	}
}

#[test]
fn split_character_data_reassembles_byte_exactly() {
	let text = "pr\u{e9}cis & \u{1f980} crab <ok> ]] done";
	let doc = format!(
		"<a>{}</a>",
		text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
	);
	for &size in [1usize, 2, 3, 5].iter() {
		let mut p = SaxParser::new(TextSink::default());
		for chunk in doc.as_bytes().chunks(size) {
			p.receive(chunk).unwrap();
		}
		p.close().unwrap();
		assert_eq!(p.handler().0, text, "chunk size {}", size);
	}
}

#[test]
fn roundtrip_preserves_the_event_sequence() {
	for doc in [
		RICH_DOC,
		"<a><b>x</b></a>",
		"<a xmlns='urn:x'><b xmlns=''><c/></b>tail</a>",
		"<p:a xmlns:p='urn:p' p:k='&#60;v&#62;'>t<!--c--></p:a>",
	]
	.iter()
	{
		let tree = Document::parse_str(doc).unwrap();
		let serialized = writer::serialize_document(&tree).unwrap();
		let before = normalize(feed_events(doc.as_bytes(), 100000));
		let after = normalize(feed_events(&serialized[..], 100000));
		assert_eq!(before, after, "document {}", doc);
	}
}

#[test]
fn push_built_tree_equals_batch_built_tree() {
	let mut p = SaxParser::tree_builder();
	for chunk in RICH_DOC.as_bytes().chunks(11) {
		p.receive(chunk).unwrap();
	}
	let pushed = p.finish().unwrap();
	let batch = Document::parse_str(RICH_DOC).unwrap();
	// compare through the event lens; attribute storage order is not
	// significant and may differ between the two builds
	let evs_pushed = normalize(feed_events(
		&writer::serialize_document(&pushed).unwrap()[..],
		100000,
	));
	let evs_batch = normalize(feed_events(
		&writer::serialize_document(&batch).unwrap()[..],
		100000,
	));
	assert_eq!(evs_pushed, evs_batch);
}

#[test]
fn duplicate_attributes_fail_through_the_whole_pipeline() {
	assert!(matches!(
		Document::parse_str("<a x=\"1\" x=\"2\"/>").err().unwrap(),
		Error::NotWellFormed(WFError::DuplicateAttribute)
	));
	let mut p = SaxParser::new(sax_null::Null);
	let err = p.receive(b"<a x=\"1\" x=\"2\"/>").err().unwrap();
	assert!(matches!(
		err,
		Error::NotWellFormed(WFError::DuplicateAttribute)
	));
}

mod sax_null {
	use super::*;

	pub(super) struct Null;

	impl SaxHandler for Null {}
}

#[test]
fn position_is_tracked_across_receive_calls() {
	let mut p = SaxParser::new(sax_null::Null);
	p.receive(b"<a>\n<b>").unwrap();
	p.receive(b"xy").unwrap();
	let pos = p.position();
	assert_eq!(pos.line, 2);
	assert_eq!(pos.offset, 9);
}

#[test]
fn session_survives_chunks_smaller_than_tokens() {
	// every byte arrives alone, so each receive usually completes no
	// token at all
	let mut p = SaxParser::new(DepthTracker::default());
	for b in RICH_DOC.as_bytes().iter() {
		p.receive(std::slice::from_ref(b)).unwrap();
	}
	p.close().unwrap();
	assert_eq!(p.handler().depth_at_end, Some(0));
}

/// Holds on to the namespace names it sees.
#[derive(Default)]
struct UriGrabber(Vec<NamespaceName>);

impl SaxHandler for UriGrabber {
	fn start_element(&mut self, head: &ElementHead) -> HandlerResult {
		if let Some(uri) = head.nsuri.clone() {
			self.0.push(uri);
		}
		Ok(())
	}
}

#[test]
fn shared_context_interns_across_sessions() {
	let ctx = RcPtr::new(Context::new());
	let mut p1 = SaxParser::with_context(ctx.clone(), SaxConfig::default(), UriGrabber::default());
	p1.receive(b"<a xmlns='urn:shared'/>").unwrap();
	p1.close().unwrap();
	let u1 = p1.into_handler().0.pop().unwrap();
	let mut p2 = SaxParser::with_context(ctx.clone(), SaxConfig::default(), UriGrabber::default());
	p2.receive(b"<b xmlns='urn:shared'/>").unwrap();
	p2.close().unwrap();
	let u2 = p2.into_handler().0.pop().unwrap();
	// the same URI resolves to the same shared allocation
	assert!(RcPtr::ptr_eq(&u1, &u2));
}
