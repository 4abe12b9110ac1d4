use forge_codegen::Target;

/// Cells in the default interpreter tape.
pub const DEFAULT_HEAP_SIZE: usize = 65536;

/// Everything the front end can ask of the toolchain.
#[derive(Debug, Clone)]
pub struct Options {
	/// 0 runs fused ops only, 1 the full IR, 2 the full IR intended for a
	/// native-code target.
	pub optimize_level: u8,
	pub heap_size: usize,
	pub target: Option<Target>,
	pub dump_ir: bool,
	pub minify: bool,
	pub top_break_point: bool,
	/// Flush program output after every write instead of buffering until
	/// input or exit.
	pub sync_stdio: bool,
}

impl Default for Options {
	fn default() -> Self {
		Self {
			optimize_level: 1,
			heap_size: DEFAULT_HEAP_SIZE,
			target: None,
			dump_ir: false,
			minify: false,
			top_break_point: false,
			sync_stdio: false,
		}
	}
}
