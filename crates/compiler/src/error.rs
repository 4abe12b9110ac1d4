use std::{
	error::Error as StdError,
	fmt::{Display, Formatter, Result as FmtResult},
};

use forge_ir::PairingError;

#[derive(Debug)]
pub enum CompileError {
	/// A `[` or `]` with no partner, at the given byte of the source.
	Syntax { offset: usize },
	Pairing(PairingError),
}

impl Display for CompileError {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		match self {
			Self::Syntax { offset } => {
				f.write_str("unmatched bracket at byte ")?;
				Display::fmt(&offset, f)
			}
			Self::Pairing(..) => f.write_str("lowered program has invalid bracket pairing"),
		}
	}
}

impl StdError for CompileError {
	fn source(&self) -> Option<&(dyn StdError + 'static)> {
		match self {
			Self::Pairing(e) => Some(e),
			Self::Syntax { .. } => None,
		}
	}
}

impl From<PairingError> for CompileError {
	fn from(value: PairingError) -> Self {
		Self::Pairing(value)
	}
}
