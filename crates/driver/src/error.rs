use std::{
	error::Error as StdError,
	fmt::{Display, Formatter, Result as FmtResult},
	io::Error as IoError,
};

use forge_compiler::CompileError;
use forge_interp::RuntimeError;

#[derive(Debug)]
pub enum Error {
	Io(IoError),
	Compile(CompileError),
	Runtime(RuntimeError),
	/// `compile` has not been called (or has failed) on this source.
	NotCompiled,
}

impl Display for Error {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		match self {
			Self::Io(..) => f.write_str("an IO error occurred"),
			Self::Compile(e) => Display::fmt(e, f),
			Self::Runtime(e) => Display::fmt(e, f),
			Self::NotCompiled => f.write_str("the source has not been compiled"),
		}
	}
}

impl StdError for Error {
	fn source(&self) -> Option<&(dyn StdError + 'static)> {
		match self {
			Self::Io(e) => Some(e),
			Self::Compile(e) => Some(e),
			Self::Runtime(e) => Some(e),
			Self::NotCompiled => None,
		}
	}
}

impl From<IoError> for Error {
	fn from(value: IoError) -> Self {
		Self::Io(value)
	}
}

impl From<CompileError> for Error {
	fn from(value: CompileError) -> Self {
		Self::Compile(value)
	}
}

impl From<RuntimeError> for Error {
	fn from(value: RuntimeError) -> Self {
		Self::Runtime(value)
	}
}
