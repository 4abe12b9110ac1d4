use std::{
	error::Error as StdError,
	fmt::{Display, Formatter, Result as FmtResult},
	io::Error as IoError,
};

#[derive(Debug)]
pub enum RuntimeError {
	/// The data pointer left `[0, heap_size)`.
	OutOfBounds { position: i64, heap_size: usize },
	Io(IoError),
}

impl Display for RuntimeError {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		match self {
			Self::OutOfBounds {
				position,
				heap_size,
			} => {
				f.write_str("pointer moved out of bounds to ")?;
				Display::fmt(&position, f)?;
				f.write_str(" (heap size ")?;
				Display::fmt(&heap_size, f)?;
				f.write_str(")")
			}
			Self::Io(..) => f.write_str("an IO error occurred during execution"),
		}
	}
}

impl StdError for RuntimeError {
	fn source(&self) -> Option<&(dyn StdError + 'static)> {
		match self {
			Self::Io(e) => Some(e),
			Self::OutOfBounds { .. } => None,
		}
	}
}

impl From<IoError> for RuntimeError {
	fn from(value: IoError) -> Self {
		Self::Io(value)
	}
}
