/*!
# Shared context for multiple parser sessions

Process-wide library state, made explicit: where the ancestor C library
kept interned strings in globals behind an init/cleanup pair, this crate
puts them in a [`Context`] value which the caller creates, shares between
sessions and drops when done.
*/
use std::borrow::Cow;
use std::fmt;

#[cfg(feature = "mt")]
use std::sync::{Mutex, MutexGuard};

#[cfg(not(feature = "mt"))]
use std::cell::{RefCell, RefMut};

use crate::strings;
use crate::{RcPtr, WeakPtr};

type CDataWeakSet = weak_table::WeakHashSet<WeakPtr<strings::CData>>;

/**
# Shared storage for interned strings

Namespace URIs repeat a lot, both within one document and across documents
of the same vocabulary. The context deduplicates them: interning the same
URI twice yields pointers to the same allocation, which makes namespace
comparisons cheap and keeps memory use flat when many parsers run in the
same application.

Even though the context is internally mutable, it can safely be shared
with an immutable reference between parsers. If the crate is built with
the `mt` feature, the context is Send and Sync, otherwise it is neither.
*/
pub struct Context {
	#[cfg(feature = "mt")]
	interned: Mutex<CDataWeakSet>,
	#[cfg(not(feature = "mt"))]
	interned: RefCell<CDataWeakSet>,
}

impl Context {
	/// Create a new, empty context.
	pub fn new() -> Context {
		Context {
			#[cfg(feature = "mt")]
			interned: Mutex::new(CDataWeakSet::new()),
			#[cfg(not(feature = "mt"))]
			interned: RefCell::new(CDataWeakSet::new()),
		}
	}

	#[cfg(feature = "mt")]
	fn lock<'a>(&'a self) -> MutexGuard<'a, CDataWeakSet> {
		self.interned.lock().unwrap()
	}

	#[cfg(not(feature = "mt"))]
	fn lock<'a>(&'a self) -> RefMut<'a, CDataWeakSet> {
		self.interned.borrow_mut()
	}

	/// Intern a piece of character data.
	///
	/// The given cdata is interned in the context and a refcounted pointer
	/// is returned. When the last reference to that pointer expires, the
	/// string is lazily removed from the internal storage.
	///
	/// The optimal course is taken depending on whether the Cow is
	/// borrowed or owned.
	pub fn intern_cdata<'a, T: Into<Cow<'a, strings::CDataStr>>>(
		&self,
		value: T,
	) -> RcPtr<strings::CData> {
		let value = value.into();
		let mut interned = self.lock();
		match interned.get(&*value) {
			Some(ptr) => ptr,
			None => {
				let ptr = RcPtr::new(value.into_owned());
				interned.insert(ptr.clone());
				ptr
			}
		}
	}

	/// Remove all unreferenced strings from storage and shrink the storage
	/// to fit the requirements.
	///
	/// This should rarely be necessary to call; the internal storage
	/// prefers expiring unused strings over reallocating.
	pub fn release_temporaries(&self) {
		let mut interned = self.lock();
		interned.remove_expired();
		interned.shrink_to_fit();
	}

	/// Return the number of strings interned, including strings which are
	/// unreferenced but not expired yet.
	pub fn interned_len(&self) -> usize {
		self.lock().len()
	}
}

impl Default for Context {
	fn default() -> Context {
		Context::new()
	}
}

impl fmt::Debug for Context {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("Context")
			.field("instance", &(self as *const Context))
			.field("interned", &self.lock().len())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::strings::CData;
	use std::convert::TryFrom;

	#[test]
	fn intern_cdata_deduplicates() {
		let ctx = Context::new();
		let a = ctx.intern_cdata(CData::try_from("urn:foo").unwrap());
		let b = ctx.intern_cdata(CData::try_from("urn:foo").unwrap());
		assert!(RcPtr::ptr_eq(&a, &b));
		assert_eq!(ctx.interned_len(), 1);
	}

	#[test]
	fn interned_strings_expire_with_last_reference() {
		let ctx = Context::new();
		{
			let _tmp = ctx.intern_cdata(CData::try_from("urn:foo").unwrap());
			assert_eq!(ctx.interned_len(), 1);
		}
		ctx.release_temporaries();
		assert_eq!(ctx.interned_len(), 0);
	}
}
