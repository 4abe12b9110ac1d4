mod args;

use std::{
	fs::File,
	io::{self, BufWriter, Write as _},
	path::{Path, PathBuf},
};

use anyhow::{Context as _, Result, bail};
use clap::Parser as _;
use forge_driver::{Brainfuck, CompileKind, Options, Target};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use self::args::Args;

fn main() -> Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::from_default_env())
		.with_writer(io::stderr)
		.init();

	let args = Args::parse();
	if args.version {
		println!("brainforge {}", env!("CARGO_PKG_VERSION"));
		return Ok(());
	}

	let options = Options {
		optimize_level: args.optimize,
		heap_size: args.heap_size,
		target: args.target,
		dump_ir: args.dump_ir,
		minify: args.minify,
		top_break_point: args.top_break_point,
		sync_stdio: args.sync_stdio,
	};

	let mut bf = Brainfuck::new();
	match (&args.eval, &args.file) {
		(Some(source), ..) => bf.load_source(source.clone()),
		(None, Some(path)) if path.as_os_str() == "-" => bf
			.load_reader(io::stdin().lock())
			.context("failed to read standard input")?,
		(None, Some(path)) => bf
			.load(path)
			.with_context(|| format!("failed to open: {}", path.display()))?,
		(None, None) => bail!("no brainfuck source specified"),
	}

	if options.minify {
		bf.trim();
		println!("{}", bf.source());
		return Ok(());
	}

	if options.dump_ir {
		bf.compile(CompileKind::Ir, &options)?;
		bf.dump_ir(&mut io::stdout().lock())?;
		return Ok(());
	}

	if let Some(target) = options.target {
		bf.compile(CompileKind::Jit, &options)?;

		let path = args
			.output
			.clone()
			.unwrap_or_else(|| default_output_name(args.file.as_deref(), target));
		let file = File::create(&path)
			.with_context(|| format!("failed to open: {}", path.display()))?;

		let mut sink = BufWriter::new(file);
		bf.emit(&mut sink, target)?;
		sink.flush()?;
		drop(sink);

		if target.is_executable() {
			make_executable(&path)?;
		}

		debug!("wrote {}", path.display());
		return Ok(());
	}

	let kind = if options.optimize_level >= 2 {
		CompileKind::Jit
	} else {
		CompileKind::Ir
	};
	bf.compile(kind, &options)?;
	bf.execute_with_stdio(options.heap_size, options.sync_stdio)?;

	Ok(())
}

/// The input basename with directory and extension removed, plus the
/// target suffix; stdin and `--eval` inputs fall back to `a`.
fn default_output_name(input: Option<&Path>, target: Target) -> PathBuf {
	let stem = input
		.filter(|path| path.as_os_str() != "-")
		.and_then(Path::file_stem)
		.map_or_else(|| "a".to_owned(), |stem| stem.to_string_lossy().into_owned());

	PathBuf::from(format!("{stem}{}", target.suffix()))
}

#[cfg(unix)]
fn make_executable(path: &Path) -> io::Result<()> {
	use std::os::unix::fs::PermissionsExt as _;

	let mut permissions = std::fs::metadata(path)?.permissions();
	permissions.set_mode(permissions.mode() | 0o111);
	std::fs::set_permissions(path, permissions)
}

#[cfg(not(unix))]
fn make_executable(_: &Path) -> io::Result<()> {
	Ok(())
}

#[cfg(test)]
mod tests {
	use std::path::Path;

	use forge_driver::Target;

	use super::default_output_name;

	#[test]
	fn output_name_strips_directory_and_extension() {
		assert_eq!(
			default_output_name(Some(Path::new("bench/mandelbrot.bf")), Target::ElfX64),
			Path::new("mandelbrot.out")
		);
		assert_eq!(
			default_output_name(Some(Path::new("hello.b.bf")), Target::WinX86),
			Path::new("hello.b.exe")
		);
		assert_eq!(
			default_output_name(Some(Path::new("plain")), Target::C),
			Path::new("plain.c")
		);
	}

	#[test]
	fn stdin_and_eval_fall_back_to_a() {
		assert_eq!(
			default_output_name(Some(Path::new("-")), Target::ElfArmeabi),
			Path::new("a.out")
		);
		assert_eq!(default_output_name(None, Target::C), Path::new("a.c"));
	}
}
