/*!
# Serialization of document trees

A plain (non-pretty) serializer: it writes the tree back out with the
prefixes and namespace declarations stored on the nodes, escaping where
the grammar requires it. The output of parsing followed by serializing is
an equivalent document — element structure, text content and attribute
sets survive the round trip, while insignificant details such as
attribute order or quote style may differ.
*/
use bytes::{BufMut, BytesMut};

use crate::strings::CDataStr;
use crate::tree::{Document, NodeId, NodeKind, TreeError, TreeResult, DOCUMENT_NODE};

static XML_DECL: &'static [u8] = b"<?xml version='1.0' encoding='utf-8'?>\n";

const TEXT_SPECIALS: &'static [u8] = &[b'<', b'>', b'&', b'\r'];

const ATTR_SPECIALS: &'static [u8] = &[b'"', b'\'', b'\r', b'\n', b'\t', b'<', b'>', b'&'];

fn escape<B: BufMut>(out: &mut B, data: &[u8], specials: &'static [u8]) {
	let mut last_index = 0;
	for (i, ch) in data.iter().enumerate() {
		if !specials.contains(ch) {
			continue;
		}
		if i > last_index {
			out.put_slice(&data[last_index..i]);
		}
		match ch {
			b'"' => out.put_slice(b"&#34;"),
			b'\'' => out.put_slice(b"&#39;"),
			b'<' => out.put_slice(b"&lt;"),
			b'>' => out.put_slice(b"&gt;"),
			b'&' => out.put_slice(b"&amp;"),
			b'\r' => out.put_slice(b"&#xd;"),
			b'\n' => out.put_slice(b"&#xa;"),
			b'\t' => out.put_slice(b"&#x9;"),
			_ => unreachable!("byte not in the specials table"),
		}
		last_index = i + 1;
	}
	out.put_slice(&data[last_index..]);
}

/// Write a CDATA section, splitting it wherever the content contains the
/// forbidden `]]>` sequence.
fn put_cdata_section<B: BufMut>(out: &mut B, data: &CDataStr) {
	out.put_slice(b"<![CDATA[");
	let mut rest = data.as_bytes();
	while let Some(pos) = rest.windows(3).position(|w| w == b"]]>") {
		out.put_slice(&rest[..pos + 2]);
		out.put_slice(b"]]><![CDATA[");
		rest = &rest[pos + 2..];
	}
	out.put_slice(rest);
	out.put_slice(b"]]>");
}

fn put_name_prefixed<B: BufMut>(out: &mut B, prefix: Option<&str>, localname: &str) {
	if let Some(prefix) = prefix {
		out.put_slice(prefix.as_bytes());
		out.put_u8(b':');
	}
	out.put_slice(localname.as_bytes());
}

fn serialize_node(doc: &Document, id: NodeId, out: &mut BytesMut) -> TreeResult<()> {
	match doc.kind(id)? {
		NodeKind::Document => {
			for child in doc.children(id)? {
				serialize_node(doc, child, out)?;
			}
			Ok(())
		}
		NodeKind::Element => {
			let prefix = doc.prefix(id)?.map(|p| p.as_str().to_string());
			let localname = match doc.localname(id)? {
				Some(l) => l.as_str().to_string(),
				None => return Err(TreeError::NotAnElement),
			};
			out.put_u8(b'<');
			put_name_prefixed(out, prefix.as_deref(), &localname);
			for decl in doc.namespace_decls(id)? {
				out.put_u8(b' ');
				match decl.prefix.as_ref() {
					Some(p) => {
						out.put_slice(b"xmlns:");
						out.put_slice(p.as_bytes());
					}
					None => out.put_slice(b"xmlns"),
				}
				out.put_slice(b"=\"");
				escape(out, decl.uri.as_bytes(), ATTR_SPECIALS);
				out.put_u8(b'"');
			}
			for attr in doc.attributes(id)? {
				out.put_u8(b' ');
				put_name_prefixed(
					out,
					attr.prefix.as_ref().map(|p| p.as_str()),
					&attr.localname,
				);
				out.put_slice(b"=\"");
				escape(out, attr.value.as_bytes(), ATTR_SPECIALS);
				out.put_u8(b'"');
			}
			if doc.first_child(id)?.is_none() {
				out.put_slice(b"/>");
				return Ok(());
			}
			out.put_u8(b'>');
			for child in doc.children(id)? {
				serialize_node(doc, child, out)?;
			}
			out.put_slice(b"</");
			put_name_prefixed(out, prefix.as_deref(), &localname);
			out.put_u8(b'>');
			Ok(())
		}
		NodeKind::Text => {
			let value = doc.value(id)?.expect("text node without value");
			escape(out, value.as_bytes(), TEXT_SPECIALS);
			Ok(())
		}
		NodeKind::CData => {
			let value = doc.value(id)?.expect("cdata node without value");
			put_cdata_section(out, value);
			Ok(())
		}
		NodeKind::Comment => {
			let value = doc.value(id)?.expect("comment node without value");
			out.put_slice(b"<!--");
			out.put_slice(value.as_bytes());
			out.put_slice(b"-->");
			Ok(())
		}
	}
}

/// Serialize a whole document to UTF-8 bytes.
///
/// An XML declaration is written if the document recorded one.
pub fn serialize_document(doc: &Document) -> TreeResult<Vec<u8>> {
	let mut out = BytesMut::new();
	if doc.version().is_some() {
		out.put_slice(XML_DECL);
	}
	serialize_node(doc, DOCUMENT_NODE, &mut out)?;
	Ok(out.to_vec())
}

/// Serialize the subtree rooted at `id` to UTF-8 bytes, without any
/// declaration.
pub fn serialize_subtree(doc: &Document, id: NodeId) -> TreeResult<Vec<u8>> {
	let mut out = BytesMut::new();
	serialize_node(doc, id, &mut out)?;
	Ok(out.to_vec())
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::convert::TryInto;

	fn serialize_str(doc: &Document) -> String {
		String::from_utf8(serialize_document(doc).unwrap()).unwrap()
	}

	#[test]
	fn serializes_simple_tree() {
		let doc = Document::parse_str("<a><b>x</b><c/></a>").unwrap();
		assert_eq!(serialize_str(&doc), "<a><b>x</b><c/></a>");
	}

	#[test]
	fn writes_declaration_when_document_has_one() {
		let doc = Document::parse_str("<?xml version='1.0'?><a/>").unwrap();
		assert_eq!(
			serialize_str(&doc),
			"<?xml version='1.0' encoding='utf-8'?>\n<a/>"
		);
	}

	#[test]
	fn escapes_text_and_attributes() {
		let doc = Document::parse_str("<a k='1&amp;2&lt;'>x&amp;y&lt;z</a>").unwrap();
		let s = serialize_str(&doc);
		assert_eq!(s, "<a k=\"1&amp;2&lt;\">x&amp;y&lt;z</a>");
	}

	#[test]
	fn writes_namespace_declarations_and_prefixes() {
		let doc =
			Document::parse_str("<p:a xmlns:p='urn:one' p:k='v'><b xmlns='urn:two'/></p:a>")
				.unwrap();
		let s = serialize_str(&doc);
		assert_eq!(
			s,
			"<p:a xmlns:p=\"urn:one\" p:k=\"v\"><b xmlns=\"urn:two\"/></p:a>"
		);
	}

	#[test]
	fn preserves_comments() {
		let doc = Document::parse_str("<a><!-- note --></a>").unwrap();
		assert_eq!(serialize_str(&doc), "<a><!-- note --></a>");
	}

	#[test]
	fn splits_cdata_sections_containing_the_end_marker() {
		let mut doc = Document::new();
		let root = doc.create_element(None, "a".try_into().unwrap(), None);
		doc.append_child(DOCUMENT_NODE, root).unwrap();
		let cd = doc.create_cdata("x]]>y".try_into().unwrap());
		doc.append_child(root, cd).unwrap();
		let s = String::from_utf8(serialize_document(&doc).unwrap()).unwrap();
		assert_eq!(s, "<a><![CDATA[x]]]]><![CDATA[>y]]></a>");
		// and the serialized form parses back to the same content
		let doc2 = Document::parse_str(&s).unwrap();
		let root2 = doc2.root_element().unwrap();
		assert_eq!(doc2.text_content(root2).unwrap(), "x]]>y");
	}

	#[test]
	fn serialize_subtree_omits_siblings() {
		let doc = Document::parse_str("<a><b>x</b><c>y</c></a>").unwrap();
		let root = doc.root_element().unwrap();
		let b = doc.first_child(root).unwrap().unwrap();
		let s = String::from_utf8(serialize_subtree(&doc, b).unwrap()).unwrap();
		assert_eq!(s, "<b>x</b>");
	}
}
