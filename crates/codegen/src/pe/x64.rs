use std::io::{Result as IoResult, Seek, SeekFrom, Write};

use forge_utils::WriteLe as _;

use super::{
	CODE_RAW_OFFSET, EXIT_PROCESS, FILE_CHARACTERISTICS_64, GET_STD_HANDLE, HEADER_SIZE,
	IMAGE_FILE_MACHINE_AMD64, Layout, OPTIONAL_HEADER64_SIZE, READ_FILE, WRITE_FILE,
	idata_size, write_coff_header, write_dos_header, write_dos_stub, write_idata,
	write_optional_header64, write_section_headers,
};
use crate::{Backend, branch};

/// `cmp byte ptr [rbx], 0`.
const CMP_CELL: [u8; 3] = [0x80, 0x3b, 0x00];

/// Prologue offsets (relative to the start of the code) of the import
/// address and tape address immediates, patched in the footer once the
/// section layout is known.
const GET_STD_HANDLE_IMM: u64 = 14;
const WRITE_FILE_IMM: u64 = 42;
const READ_FILE_IMM: u64 = 50;
const TAPE_IMM: u64 = 57;

const IAT_WIDTH: u32 = 8;

/// x64 Windows executable importing `GetStdHandle`/`ReadFile`/`WriteFile`/
/// `ExitProcess` from kernel32. Register roles for the whole program:
/// rbx tape pointer, rsi stdout handle, rdi stdin handle, rbp WriteFile,
/// r12 ReadFile. I/O moves one byte directly to or from the current cell,
/// so a read that returns nothing (end of input) leaves the cell alone.
pub struct WinX64<W> {
	w: W,
	loops: Vec<u64>,
}

impl<W: Write + Seek> WinX64<W> {
	pub const fn new(w: W) -> Self {
		Self { w, loops: Vec::new() }
	}

	/// The shadow-space-and-locals frame set up by the prologue: the fifth
	/// WriteFile/ReadFile argument lives at [rsp+0x20], the byte-count
	/// out-parameter at [rsp+0x28].
	fn write_io_call_args(&mut self) -> IoResult<()> {
		// mov rdx, rbx (buffer = current cell)
		self.w.write_all(&[0x48, 0x89, 0xda])?;
		// mov r8d, 1 (one byte)
		self.w.write_all(&[0x41, 0xb8])?;
		self.w.write_u32_le(1)?;
		// lea r9, [rsp+0x28] (bytes-transferred out-parameter)
		self.w.write_all(&[0x4c, 0x8d, 0x4c, 0x24, 0x28])?;
		// mov qword ptr [rsp+0x20], 0 (no overlapped)
		self.w.write_all(&[0x48, 0xc7, 0x44, 0x24, 0x20])?;
		self.w.write_u32_le(0)
	}

	fn write_var_target(&mut self, opcode: u8, offset: i32) -> IoResult<()> {
		if !(-128..=127).contains(&offset) {
			self.w.write_all(&[opcode, 0x83])?;
			self.w.write_i32_le(offset)
		} else {
			self.w.write_all(&[opcode, 0x43, offset as u8])
		}
	}
}

impl<W: Write + Seek> Backend for WinX64<W> {
	fn header(&mut self) -> IoResult<()> {
		// Headers and .idata are back-filled by the footer.
		self.w.write_zeros(CODE_RAW_OFFSET as usize)?;

		// push rsi; push rdi; push rbx; push rbp; push r12
		self.w.write_all(&[0x56, 0x57, 0x53, 0x55, 0x41, 0x54])?;
		// sub rsp, 0x30
		self.w.write_all(&[0x48, 0x83, 0xec, 0x30])?;

		// mov rbp, [GetStdHandle]
		self.w.write_all(&[0x48, 0x8b, 0x2c, 0x25])?;
		self.w.write_u32_le(0)?;
		// mov ecx, STD_OUTPUT_HANDLE (-11); call rbp; mov rsi, rax
		self.w.write_u8(0xb9)?;
		self.w.write_i32_le(-11)?;
		self.w.write_all(&[0xff, 0xd5])?;
		self.w.write_all(&[0x48, 0x89, 0xc6])?;
		// mov ecx, STD_INPUT_HANDLE (-10); call rbp; mov rdi, rax
		self.w.write_u8(0xb9)?;
		self.w.write_i32_le(-10)?;
		self.w.write_all(&[0xff, 0xd5])?;
		self.w.write_all(&[0x48, 0x89, 0xc7])?;

		// mov rbp, [WriteFile]; mov r12, [ReadFile]
		self.w.write_all(&[0x48, 0x8b, 0x2c, 0x25])?;
		self.w.write_u32_le(0)?;
		self.w.write_all(&[0x4c, 0x8b, 0x24, 0x25])?;
		self.w.write_u32_le(0)?;
		// mov rbx, tape
		self.w.write_all(&[0x48, 0xc7, 0xc3])?;
		self.w.write_u32_le(0)
	}

	fn footer(&mut self) -> IoResult<()> {
		self.assign(b'\n')?;
		self.putchar()?;

		// mov rbp, [ExitProcess]; xor ecx, ecx; call rbp
		self.w.write_all(&[0x48, 0x8b, 0x2c, 0x25])?;
		let exit_imm = self.w.stream_position()?;
		self.w.write_u32_le(0)?;
		self.w.write_all(&[0x31, 0xc9])?;
		self.w.write_all(&[0xff, 0xd5])?;

		let code_size = self.w.stream_position()? as u32 - CODE_RAW_OFFSET;
		let layout = Layout::new(code_size);
		self.w
			.write_zeros((layout.code_size_padded - code_size) as usize)?;

		let import_size = idata_size(IAT_WIDTH);

		self.w.seek(SeekFrom::Start(0))?;
		write_dos_header(&mut self.w)?;
		write_dos_stub(&mut self.w)?;
		write_coff_header(
			&mut self.w,
			IMAGE_FILE_MACHINE_AMD64,
			OPTIONAL_HEADER64_SIZE,
			FILE_CHARACTERISTICS_64,
		)?;
		write_optional_header64(&mut self.w, &layout, import_size)?;
		write_section_headers(&mut self.w, &layout, import_size)?;

		self.w.seek(SeekFrom::Start(HEADER_SIZE.into()))?;
		write_idata(&mut self.w, layout.idata_rva(), IAT_WIDTH)?;

		let patches = [
			(GET_STD_HANDLE_IMM, layout.import_address(GET_STD_HANDLE, IAT_WIDTH)),
			(WRITE_FILE_IMM, layout.import_address(WRITE_FILE, IAT_WIDTH)),
			(READ_FILE_IMM, layout.import_address(READ_FILE, IAT_WIDTH)),
			(TAPE_IMM, layout.tape_address()),
		];
		for (offset, address) in patches {
			self.w
				.seek(SeekFrom::Start(u64::from(CODE_RAW_OFFSET) + offset))?;
			self.w.write_u32_le(address)?;
		}

		self.w.seek(SeekFrom::Start(exit_imm))?;
		self.w
			.write_u32_le(layout.import_address(EXIT_PROCESS, IAT_WIDTH))?;

		self.w.seek(SeekFrom::End(0))?;

		Ok(())
	}

	fn move_ptr(&mut self, delta: i32) -> IoResult<()> {
		if delta > 0 {
			if delta > 127 {
				// add rbx, delta
				self.w.write_all(&[0x48, 0x81, 0xc3])?;
				self.w.write_i32_le(delta)
			} else if delta > 1 {
				self.w.write_all(&[0x48, 0x83, 0xc3])?;
				self.w.write_u8(delta as u8)
			} else {
				// inc rbx
				self.w.write_all(&[0x48, 0xff, 0xc3])
			}
		} else if delta < -127 {
			// sub rbx, -delta
			self.w.write_all(&[0x48, 0x81, 0xeb])?;
			self.w.write_i32_le(-delta)
		} else if delta < -1 {
			self.w.write_all(&[0x48, 0x83, 0xeb])?;
			self.w.write_u8(-delta as u8)
		} else {
			// dec rbx
			self.w.write_all(&[0x48, 0xff, 0xcb])
		}
	}

	fn add(&mut self, value: i8) -> IoResult<()> {
		if value > 0 {
			if value > 1 {
				// add byte ptr [rbx], value
				self.w.write_all(&[0x80, 0x03, value as u8])
			} else {
				// inc byte ptr [rbx]
				self.w.write_all(&[0xfe, 0x03])
			}
		} else if value < -1 {
			// sub byte ptr [rbx], -value
			self.w.write_all(&[0x80, 0x2b, value.unsigned_abs()])
		} else {
			// dec byte ptr [rbx]
			self.w.write_all(&[0xfe, 0x0b])
		}
	}

	fn assign(&mut self, value: u8) -> IoResult<()> {
		// mov byte ptr [rbx], value
		self.w.write_all(&[0xc6, 0x03, value])
	}

	fn putchar(&mut self) -> IoResult<()> {
		// mov rcx, rsi (stdout handle)
		self.w.write_all(&[0x48, 0x89, 0xf1])?;
		self.write_io_call_args()?;
		// call rbp (WriteFile)
		self.w.write_all(&[0xff, 0xd5])
	}

	fn getchar(&mut self) -> IoResult<()> {
		// mov rcx, rdi (stdin handle)
		self.w.write_all(&[0x48, 0x89, 0xf9])?;
		self.write_io_call_args()?;
		// call r12 (ReadFile)
		self.w.write_all(&[0x41, 0xff, 0xd4])
	}

	fn loop_start(&mut self) -> IoResult<()> {
		branch::start_loop(&mut self.w, &mut self.loops, CMP_CELL)
	}

	fn loop_end(&mut self) -> IoResult<()> {
		branch::end_loop(&mut self.w, &mut self.loops)
	}

	fn if_end(&mut self) -> IoResult<()> {
		branch::end_if(&mut self.w, &mut self.loops)
	}

	fn add_var(&mut self, offset: i32) -> IoResult<()> {
		// mov al, byte ptr [rbx]; add byte ptr [rbx + offset], al
		self.w.write_all(&[0x8a, 0x03])?;
		self.write_var_target(0x00, offset)
	}

	fn sub_var(&mut self, offset: i32) -> IoResult<()> {
		self.w.write_all(&[0x8a, 0x03])?;
		self.write_var_target(0x28, offset)
	}

	fn add_mul_var(&mut self, offset: i32, factor: i8) -> IoResult<()> {
		// mov al, |factor|; mul byte ptr [rbx]
		self.w.write_all(&[0xb0, factor.unsigned_abs()])?;
		self.w.write_all(&[0xf6, 0x23])?;

		let opcode = if factor > 0 { 0x00 } else { 0x28 };
		self.write_var_target(opcode, offset)
	}

	fn inf_loop(&mut self) -> IoResult<()> {
		self.if_start()?;
		self.w.write_all(&[0xeb, 0xfe])?;
		self.if_end()
	}

	fn breakpoint(&mut self) -> IoResult<()> {
		self.w.write_u8(0xcc)
	}
}

#[cfg(test)]
mod tests {
	use std::io::Cursor;

	use forge_compiler::{LowerOptions, lower};

	use super::{CODE_RAW_OFFSET, TAPE_IMM};
	use crate::{WinX64, emit};

	fn build(source: &str) -> Vec<u8> {
		let program = lower(source.as_bytes(), LowerOptions::new()).unwrap();
		let mut out = Cursor::new(Vec::new());

		emit(&mut WinX64::new(&mut out), &program).unwrap();

		out.into_inner()
	}

	#[test]
	fn valid_pe_headers() {
		let image = build("");

		assert_eq!(&image[..2], b"MZ");
		assert_eq!(&image[0x80..0x84], b"PE\0\0");
		assert_eq!(
			u16::from_le_bytes([image[0x84], image[0x85]]),
			0x8664
		);
		assert_eq!(u16::from_le_bytes([image[0x86], image[0x87]]), 3); // sections

		// Optional header magic right after the 20-byte file header.
		assert_eq!(u16::from_le_bytes([image[0x98], image[0x99]]), 0x020b);
	}

	#[test]
	fn code_section_is_page_padded() {
		let image = build("");

		assert_eq!(image.len(), CODE_RAW_OFFSET as usize + 0x1000);
		assert_eq!(
			&image[CODE_RAW_OFFSET as usize..CODE_RAW_OFFSET as usize + 6],
			&[0x56, 0x57, 0x53, 0x55, 0x41, 0x54]
		);
	}

	#[test]
	fn idata_names_the_kernel32_imports() {
		let image = build("");
		let idata = &image[0x200..0x400];

		let find = |needle: &[u8]| {
			idata
				.windows(needle.len())
				.any(|window| window == needle)
		};
		assert!(find(b"kernel32.dll"));
		assert!(find(b"GetStdHandle"));
		assert!(find(b"ReadFile"));
		assert!(find(b"WriteFile"));
		assert!(find(b"ExitProcess"));
	}

	#[test]
	fn tape_address_is_patched_into_the_prologue() {
		let image = build("");
		let at = (CODE_RAW_OFFSET as u64 + TAPE_IMM) as usize;
		let tape = u32::from_le_bytes(image[at..at + 4].try_into().unwrap());

		// image base + code rva + one padded page + one alignment page
		assert_eq!(tape, 0x0040_0000 + 0x1000 + 0x1000 + 0x1000);
	}
}
