use std::path::PathBuf;

use clap::Parser;
use forge_driver::Target;

#[derive(Debug, Clone, Parser)]
#[command(
	name = "brainforge",
	about = "An optimizing brainfuck interpreter and native-code compiler",
	disable_version_flag = true
)]
pub struct Args {
	/// Brainfuck source file; "-" reads standard input
	#[arg(value_name = "FILE", required_unless_present_any = ["eval", "version"])]
	pub file: Option<PathBuf>,

	/// Compile the given source text instead of a file
	#[arg(short, long, value_name = "SRC", conflicts_with = "file")]
	pub eval: Option<String>,

	/// Strip non-brainfuck characters from the source, print it and exit
	#[arg(short, long)]
	pub minify: bool,

	/// Output file; defaults to the input basename plus the target suffix
	#[arg(short, long, value_name = "FILE")]
	pub output: Option<PathBuf>,

	/// Output target: c, xbyakc, winx86, winx64, elfx86, elfx64 or elfarmeabi
	#[arg(short, long, value_name = "TARGET")]
	pub target: Option<Target>,

	/// Optimization level: 0 fused runs only, 1 full IR, 2 native-ready IR
	#[arg(
		short = 'O',
		long,
		value_name = "LEVEL",
		default_value_t = 1,
		value_parser = clap::value_parser!(u8).range(0..=2)
	)]
	pub optimize: u8,

	/// Print the compiled IR instead of executing, then exit
	#[arg(long)]
	pub dump_ir: bool,

	/// Flush program output after every write
	#[arg(long = "enable-synchronize-with-stdio")]
	pub sync_stdio: bool,

	/// Tape size in cells for the interpreter
	#[arg(long, value_name = "HEAP_SIZE", default_value_t = forge_driver::DEFAULT_HEAP_SIZE)]
	pub heap_size: usize,

	/// Insert a breakpoint before the first instruction
	#[arg(long)]
	pub top_break_point: bool,

	/// Print version information and exit
	#[arg(short = 'v', long)]
	pub version: bool,
}

#[cfg(test)]
mod tests {
	use clap::Parser as _;

	use super::Args;

	#[test]
	fn positional_file_and_defaults() {
		let args = Args::parse_from(["brainforge", "mandelbrot.bf"]);

		assert_eq!(args.file.unwrap().to_str().unwrap(), "mandelbrot.bf");
		assert_eq!(args.optimize, 1);
		assert_eq!(args.heap_size, 65536);
		assert!(args.target.is_none());
	}

	#[test]
	fn eval_replaces_the_file() {
		let args = Args::parse_from(["brainforge", "--eval", "+[]"]);

		assert_eq!(args.eval.as_deref(), Some("+[]"));
		assert!(args.file.is_none());
	}

	#[test]
	fn target_parses_by_name() {
		let args = Args::parse_from(["brainforge", "-t", "elfx64", "a.bf"]);

		assert_eq!(args.target.unwrap().name(), "elfx64");
	}

	#[test]
	fn unknown_target_is_rejected() {
		assert!(Args::try_parse_from(["brainforge", "-t", "mips", "a.bf"]).is_err());
	}

	#[test]
	fn optimize_level_is_bounded() {
		assert!(Args::try_parse_from(["brainforge", "-O", "3", "a.bf"]).is_err());
	}

	#[test]
	fn version_flag_needs_no_file() {
		let args = Args::parse_from(["brainforge", "-v"]);

		assert!(args.version);
		assert!(args.file.is_none());
	}

	#[test]
	fn a_file_is_required_otherwise() {
		assert!(Args::try_parse_from(["brainforge"]).is_err());
	}
}
