/*!
# Arena document tree

A DOM-like in-memory representation of an XML document. The tree is built
either by the parser (through [`TreeBuilder`], driven by the SAX frontend
or the batch [`Document::parse_str`] family) or by hand through the
mutation methods on [`Document`].
*/
mod builder;
mod document;
mod node;

pub use builder::TreeBuilder;
pub use document::{Children, Document, NodeHandle, TreeError, TreeResult, DOCUMENT_NODE};
pub use node::{Attribute, NamespaceDecl, NodeId, NodeKind};
