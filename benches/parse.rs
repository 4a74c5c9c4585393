use criterion::{black_box, criterion_group, criterion_main, Criterion};

use pushxml::{Document, EventRead, FeedParser, PullParser, SaxHandler, SaxParser};

static SAMPLE: &'static [u8] = br#"<?xml version='1.0'?>
<catalog xmlns='urn:example:catalog' xmlns:m='urn:example:meta'>
<book id='bk101' m:rev='3'><author>Gambardella, Matthew</author>
<title>XML Developer's Guide</title><genre>Computer</genre>
<price>44.95</price><publish_date>2000-10-01</publish_date>
<description>An in-depth look at creating applications with XML,
including &lt;escaped&gt; markup &amp; CDATA:
<![CDATA[<verbatim attr="x">]]></description></book>
<book id='bk102' m:rev='1'><author>Ralls, Kim</author>
<title>Midnight Rain</title><genre>Fantasy</genre>
<price>5.95</price><publish_date>2000-12-16</publish_date>
<description>A former architect battles corporate zombies and an
evil sorceress.</description></book>
<!-- end of sample data -->
</catalog>"#;

struct Sink;

impl SaxHandler for Sink {}

fn pull_events(data: &[u8]) -> usize {
	let mut n = 0;
	let mut src = data;
	let mut pp = PullParser::new(&mut src);
	pp.read_all(|ev| {
		black_box(&ev);
		n += 1;
	})
	.unwrap();
	n
}

fn feed_events_chunked(data: &[u8], chunk_size: usize) -> usize {
	let mut n = 0;
	let mut fp = FeedParser::default();
	for chunk in data.chunks(chunk_size) {
		fp.feed(chunk.to_vec());
		match fp.read_all_eof(|ev| {
			black_box(&ev);
			n += 1;
		}) {
			Ok(_) => (),
			Err(e) => panic!("unexpected error: {:?}", e),
		}
	}
	fp.feed_eof();
	fp.read_all(|ev| {
		black_box(&ev);
		n += 1;
	})
	.unwrap();
	n
}

fn sax_push(data: &[u8], chunk_size: usize) {
	let mut p = SaxParser::new(Sink);
	for chunk in data.chunks(chunk_size) {
		p.receive(chunk).unwrap();
	}
	p.close().unwrap();
}

pub fn benchmark(c: &mut Criterion) {
	c.bench_function("pull whole document", |b| {
		b.iter(|| pull_events(black_box(SAMPLE)))
	});
	c.bench_function("feed 256 byte chunks", |b| {
		b.iter(|| feed_events_chunked(black_box(SAMPLE), 256))
	});
	c.bench_function("sax push 4096 byte chunks", |b| {
		b.iter(|| sax_push(black_box(SAMPLE), 4096))
	});
	c.bench_function("build document tree", |b| {
		b.iter(|| Document::parse_bytes(black_box(SAMPLE)).unwrap())
	});
}

criterion_group!(benches, benchmark);
criterion_main!(benches);
