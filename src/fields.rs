//! Field presence checks for manifest records

use std::collections::BTreeSet;

use tracing::warn;

use crate::error::TableError;

/// Which expected fields must be present
#[derive(Debug, Clone, Copy)]
pub enum Required<'a> {
	All,
	Only(&'a [&'a str]),
}

impl Required<'_> {
	fn contains(&self, field: &str) -> bool {
		match self {
			Required::All => true,
			Required::Only(fields) => fields.contains(&field),
		}
	}
}

/// Compare the fields of a record against the expected set
///
/// A missing required field is a [`TableError::Schema`]; missing optional
/// fields and unexpected fields are reported as warnings.
pub fn check_fields<'a, I>(expected: &[&str], inputs: I, required: Required<'_>) -> Result<(), TableError>
where
	I: IntoIterator<Item = &'a str>,
{
	let inputs: BTreeSet<&str> = inputs.into_iter().collect();

	for field in expected.iter().filter(|f| !inputs.contains(*f)) {
		if required.contains(field) {
			return Err(TableError::Schema { field: field.to_string() });
		}
		warn!("Value for field \"{}\" not found; setting to default value", field);
	}

	for field in inputs.iter().filter(|f| !expected.contains(*f)) {
		warn!("Field \"{}\" not found; ignoring it", field);
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_all_present() {
		assert!(check_fields(&["a", "b"], ["b", "a"], Required::All).is_ok());
	}

	#[test]
	fn test_missing_required() {
		match check_fields(&["a", "b"], ["a"], Required::All) {
			Err(TableError::Schema { field }) => assert_eq!(field, "b"),
			other => panic!("unexpected {:?}", other),
		}
	}

	#[test]
	fn test_missing_optional_and_unknown() {
		assert!(check_fields(&["a", "b"], ["a", "zzz"], Required::Only(&["a"])).is_ok());
		assert!(check_fields(&["a", "b"], ["b"], Required::Only(&["a"])).is_err());
	}
}

// vim: ts=4
