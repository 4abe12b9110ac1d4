use std::{
	error::Error as StdError,
	fmt::{Display, Formatter, Result as FmtResult},
	str::FromStr,
};

/// An output format selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
	/// Transpiled C source.
	C,
	/// C++ source driving an Xbyak code generator.
	XbyakC,
	/// Windows PE, x86.
	WinX86,
	/// Windows PE, x64.
	WinX64,
	/// Static Linux ELF, x86.
	ElfX86,
	/// Static Linux ELF, x64.
	ElfX64,
	/// Static Linux ELF, ARM EABI.
	ElfArmeabi,
}

impl Target {
	pub const ALL: [Self; 7] = [
		Self::C,
		Self::XbyakC,
		Self::WinX86,
		Self::WinX64,
		Self::ElfX86,
		Self::ElfX64,
		Self::ElfArmeabi,
	];

	#[must_use]
	pub const fn name(self) -> &'static str {
		match self {
			Self::C => "c",
			Self::XbyakC => "xbyakc",
			Self::WinX86 => "winx86",
			Self::WinX64 => "winx64",
			Self::ElfX86 => "elfx86",
			Self::ElfX64 => "elfx64",
			Self::ElfArmeabi => "elfarmeabi",
		}
	}

	/// Suffix of the default output file name.
	#[must_use]
	pub const fn suffix(self) -> &'static str {
		match self {
			Self::C | Self::XbyakC => ".c",
			Self::WinX86 | Self::WinX64 => ".exe",
			Self::ElfX86 | Self::ElfX64 | Self::ElfArmeabi => ".out",
		}
	}

	/// Whether the output is a directly runnable image.
	#[must_use]
	pub const fn is_executable(self) -> bool {
		!matches!(self, Self::C | Self::XbyakC)
	}
}

impl Display for Target {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.write_str(self.name())
	}
}

impl FromStr for Target {
	type Err = ParseTargetError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::ALL
			.into_iter()
			.find(|target| target.name() == s)
			.ok_or_else(|| ParseTargetError(s.to_owned()))
	}
}

/// An unrecognised `--target` value.
#[derive(Debug, Clone)]
pub struct ParseTargetError(String);

impl Display for ParseTargetError {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.write_str("invalid target \"")?;
		f.write_str(&self.0)?;
		f.write_str("\", expected one of: ")?;

		for (i, target) in Target::ALL.into_iter().enumerate() {
			if i != 0 {
				f.write_str(", ")?;
			}
			f.write_str(target.name())?;
		}

		Ok(())
	}
}

impl StdError for ParseTargetError {}

#[cfg(test)]
mod tests {
	use super::Target;

	#[test]
	fn round_trips_names() {
		for target in Target::ALL {
			assert_eq!(target.name().parse::<Target>().unwrap(), target);
		}
	}

	#[test]
	fn rejects_unknown_names() {
		let err = "elfriscv".parse::<Target>().unwrap_err();

		assert!(err.to_string().contains("elfriscv"));
		assert!(err.to_string().contains("elfarmeabi"));
	}

	#[test]
	fn suffixes() {
		assert_eq!(Target::C.suffix(), ".c");
		assert_eq!(Target::WinX64.suffix(), ".exe");
		assert_eq!(Target::ElfArmeabi.suffix(), ".out");
	}
}
