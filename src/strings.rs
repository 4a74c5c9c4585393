/*!
# Strongly-typed strings for XML 1.0 documents

String types which are guaranteed to conform to a grammatical production of
the XML specifications. Carrying the proof of validation in the type avoids
re-checking strings at every layer boundary.

## Type overview

- [`Name`] / [`NameStr`] represent the `Name` production; they are used for
  element and attribute names before namespace prefix expansion.
- [`NCName`] / [`NCNameStr`] represent a `Name` without colons; they are
  used for localnames and prefixes after prefix expansion.
- [`CData`] / [`CDataStr`] represent runs of XML `Char`s, used for
  attribute values and character data. References and CDATA sections are
  already expanded in values of this type.

Owned values are constructed via [`std::convert::TryFrom`] from `&str`,
[`String`] or the small-string type backing the storage. Widening
conversions (`NCName` → `Name` → `CData`) are available through
[`From`]/[`Into`] without re-validation.
*/
use std::borrow::{Borrow, Cow};
use std::convert::TryFrom;
use std::fmt;
use std::ops::Deref;
use std::result::Result as StdResult;

use smartstring::alias::String as SmartString;

use crate::error::{NWFError, ERRCTX_UNKNOWN};
use crate::selectors::{validate_cdata, validate_name, validate_ncname, ValidationError};

macro_rules! checked_string {
	(
		$(#[$outer:meta])*
		pub struct $name:ident use $check:ident => $borrowed:ident;
	) => {
		$(#[$outer])*
		#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
		#[repr(transparent)]
		pub struct $name(SmartString);

		impl $name {
			/// Wrap a string without checking it against the grammar.
			///
			/// # Safety
			///
			/// The caller must guarantee that the passed string is in fact
			/// a valid `
			#[doc = stringify!($name)]
			/// `.
			pub unsafe fn from_unchecked<T: Into<SmartString>>(s: T) -> Self {
				Self(s.into())
			}

			pub fn as_str(&self) -> &str {
				&self.0
			}
		}

		impl TryFrom<&str> for $name {
			type Error = ValidationError;

			fn try_from(s: &str) -> StdResult<Self, Self::Error> {
				$check(s)?;
				Ok(Self(s.into()))
			}
		}

		impl TryFrom<String> for $name {
			type Error = ValidationError;

			fn try_from(s: String) -> StdResult<Self, Self::Error> {
				$check(&s)?;
				Ok(Self(s.into()))
			}
		}

		impl TryFrom<SmartString> for $name {
			type Error = ValidationError;

			fn try_from(s: SmartString) -> StdResult<Self, Self::Error> {
				$check(&s)?;
				Ok(Self(s))
			}
		}

		impl Deref for $name {
			type Target = $borrowed;

			fn deref(&self) -> &$borrowed {
				unsafe { $borrowed::from_str_unchecked(&self.0) }
			}
		}

		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}

		impl AsRef<$borrowed> for $name {
			fn as_ref(&self) -> &$borrowed {
				self.deref()
			}
		}

		impl Borrow<$borrowed> for $name {
			fn borrow(&self) -> &$borrowed {
				self.deref()
			}
		}

		impl fmt::Display for $name {
			fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
				f.write_str(&self.0)
			}
		}

		impl PartialEq<str> for $name {
			fn eq(&self, other: &str) -> bool {
				self.as_str() == other
			}
		}

		impl PartialEq<$name> for str {
			fn eq(&self, other: &$name) -> bool {
				self == other.as_str()
			}
		}

		impl PartialEq<&str> for $name {
			fn eq(&self, other: &&str) -> bool {
				self.as_str() == *other
			}
		}

		impl PartialEq<$name> for &str {
			fn eq(&self, other: &$name) -> bool {
				*self == other.as_str()
			}
		}

		impl PartialEq<$borrowed> for $name {
			fn eq(&self, other: &$borrowed) -> bool {
				self.as_str() == other.as_str()
			}
		}

		impl PartialEq<&$borrowed> for $name {
			fn eq(&self, other: &&$borrowed) -> bool {
				self.as_str() == other.as_str()
			}
		}
	};
}

macro_rules! checked_str {
	(
		$(#[$outer:meta])*
		pub struct $name:ident => $owned:ident;
	) => {
		$(#[$outer])*
		#[derive(Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
		#[repr(transparent)]
		pub struct $name(str);

		impl $name {
			/// Reinterpret a `str` as `
			#[doc = stringify!($name)]
			/// ` without checking it against the grammar.
			///
			/// # Safety
			///
			/// The caller must guarantee that the passed string is in fact
			/// valid for this type.
			pub unsafe fn from_str_unchecked(s: &str) -> &Self {
				&*(s as *const str as *const Self)
			}

			pub fn as_str(&self) -> &str {
				&self.0
			}
		}

		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &str {
				&self.0
			}
		}

		impl ToOwned for $name {
			type Owned = $owned;

			fn to_owned(&self) -> Self::Owned {
				unsafe { $owned::from_unchecked(&self.0) }
			}
		}

		impl fmt::Display for $name {
			fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
				f.write_str(&self.0)
			}
		}

		impl PartialEq<str> for $name {
			fn eq(&self, other: &str) -> bool {
				&self.0 == other
			}
		}

		impl PartialEq<$name> for str {
			fn eq(&self, other: &$name) -> bool {
				self == &other.0
			}
		}
	};
}

checked_string! {
	/// An XML 1.0 `Name`, as used for element and attribute names before
	/// prefix expansion.
	pub struct Name use validate_name => NameStr;
}

checked_string! {
	/// An XML 1.0 `Name` which does not contain a colon; prefixes and
	/// localnames are of this type.
	pub struct NCName use validate_ncname => NCNameStr;
}

checked_string! {
	/// A run of XML 1.0 `Char`s, with references and CDATA sections
	/// already expanded.
	pub struct CData use validate_cdata => CDataStr;
}

checked_str! {
	/// `str`-flavoured counterpart of [`Name`].
	pub struct NameStr => Name;
}

checked_str! {
	/// `str`-flavoured counterpart of [`NCName`].
	pub struct NCNameStr => NCName;
}

checked_str! {
	/// `str`-flavoured counterpart of [`CData`].
	pub struct CDataStr => CData;
}

impl Name {
	/// Split the name at the colon, yielding a prefix/localname pair.
	///
	/// Names without a colon map to a `None` prefix. Names with more than
	/// one colon, an empty part on either side of the colon or a localname
	/// which does not satisfy the `NCName` production are rejected.
	pub fn split_name(self) -> StdResult<(Option<NCName>, NCName), NWFError> {
		let colon = match self.0.find(':') {
			// every colon-free Name is a valid NCName
			None => return Ok((None, NCName(self.0))),
			Some(pos) => pos,
		};
		if colon == 0 || colon == self.0.len() - 1 {
			return Err(NWFError::EmptyNamePart(ERRCTX_UNKNOWN));
		}
		{
			let localname = &self.0[colon + 1..];
			if localname.contains(':') {
				return Err(NWFError::MultiColonName(ERRCTX_UNKNOWN));
			}
			if validate_ncname(localname).is_err() {
				return Err(NWFError::InvalidLocalName(ERRCTX_UNKNOWN));
			}
		}
		let localname: SmartString = self.0[colon + 1..].into();
		let prefix: SmartString = {
			let mut s = self.0;
			s.truncate(colon);
			s
		};
		// the prefix is colon-free and starts with the NameStart char which
		// opened the whole name, so no further validation is required
		Ok((Some(NCName(prefix)), NCName(localname)))
	}
}

impl CData {
	/// Append another piece of character data.
	pub fn push_cdata(&mut self, other: &CDataStr) {
		self.0.push_str(other.as_str());
	}
}

impl From<NCName> for Name {
	fn from(other: NCName) -> Name {
		Name(other.0)
	}
}

impl From<NCName> for CData {
	fn from(other: NCName) -> CData {
		CData(other.0)
	}
}

impl From<Name> for CData {
	fn from(other: Name) -> CData {
		CData(other.0)
	}
}

impl<'x> From<&'x CDataStr> for Cow<'x, CDataStr> {
	fn from(other: &'x CDataStr) -> Self {
		Cow::Borrowed(other)
	}
}

impl<'x> From<CData> for Cow<'x, CDataStr> {
	fn from(other: CData) -> Self {
		Cow::Owned(other)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::convert::TryInto;

	#[test]
	fn name_rejects_invalid_strings() {
		assert!(Name::try_from("foo").is_ok());
		assert!(Name::try_from("foo:bar").is_ok());
		assert!(Name::try_from("").is_err());
		assert!(Name::try_from("foo bar").is_err());
	}

	#[test]
	fn ncname_rejects_colons() {
		assert!(NCName::try_from("foo").is_ok());
		assert!(NCName::try_from("foo:bar").is_err());
	}

	#[test]
	fn cdata_rejects_nonchars() {
		assert!(CData::try_from("hello <world>!").is_ok());
		assert!(CData::try_from("\x00").is_err());
	}

	#[test]
	fn split_name_without_colon() {
		let n: Name = "foo".try_into().unwrap();
		let (prefix, localname) = n.split_name().unwrap();
		assert!(prefix.is_none());
		assert_eq!(localname, "foo");
	}

	#[test]
	fn split_name_with_prefix() {
		let n: Name = "foo:bar".try_into().unwrap();
		let (prefix, localname) = n.split_name().unwrap();
		assert_eq!(prefix.unwrap(), "foo");
		assert_eq!(localname, "bar");
	}

	#[test]
	fn split_name_rejects_degenerate_names() {
		let n: Name = "foo:bar:baz".try_into().unwrap();
		assert!(matches!(
			n.split_name(),
			Err(NWFError::MultiColonName(_))
		));
		// ":foo" and "foo:" are Names per XML 1.0, but unsplittable
		let n: Name = ":foo".try_into().unwrap();
		assert!(matches!(n.split_name(), Err(NWFError::EmptyNamePart(_))));
		let n: Name = "foo:".try_into().unwrap();
		assert!(matches!(n.split_name(), Err(NWFError::EmptyNamePart(_))));
		let n: Name = "a:-b".try_into().unwrap();
		assert!(matches!(n.split_name(), Err(NWFError::InvalidLocalName(_))));
	}

	#[test]
	fn widening_conversions_preserve_content() {
		let nc: NCName = "foo".try_into().unwrap();
		let name: Name = nc.clone().into();
		assert_eq!(name, "foo");
		let cdata: CData = nc.into();
		assert_eq!(cdata, "foo");
	}

	#[test]
	fn comparisons_work_across_types() {
		let c: CData = "bar".try_into().unwrap();
		let cs: &CDataStr = &*c;
		assert_eq!(c, *cs);
		assert_eq!(c, "bar");
		assert_eq!(*cs, *"bar");
	}
}
