use std::io::{Result as IoResult, Seek, SeekFrom, Write};

use forge_utils::WriteLe as _;

use super::{
	CODE_RAW_OFFSET, EXIT_PROCESS, FILE_CHARACTERISTICS_32, GET_STD_HANDLE, HEADER_SIZE,
	IMAGE_FILE_MACHINE_I386, Layout, OPTIONAL_HEADER32_SIZE, READ_FILE, WRITE_FILE,
	idata_size, write_coff_header, write_dos_header, write_dos_stub, write_idata,
	write_optional_header32, write_section_headers,
};
use crate::{Backend, branch};

/// `cmp byte ptr [ebx], 0`.
const CMP_CELL: [u8; 3] = [0x80, 0x3b, 0x00];

/// Patch sites in the code prologue, as offsets from the start of the code.
const GET_STD_HANDLE_IMM: u64 = 9;
const WRITE_FILE_IMM: u64 = 27;
const READ_FILE_IMM: u64 = 33;
const TAPE_IMM: u64 = 42;

const IAT_WIDTH: u32 = 4;

/// x86 Windows executable with the same kernel32 import set as the x64
/// backend. Register roles: ebx tape pointer, esi stdout handle, edi stdin
/// handle, ebp WriteFile; the ReadFile pointer and the bytes-transferred
/// out-parameter live in a small stack frame.
pub struct WinX86<W> {
	w: W,
	loops: Vec<u64>,
}

impl<W: Write + Seek> WinX86<W> {
	pub const fn new(w: W) -> Self {
		Self { w, loops: Vec::new() }
	}

	/// Pushes the stdcall argument tail shared by ReadFile and WriteFile:
	/// lpOverlapped, the out-parameter, the byte count and the buffer.
	fn write_io_call_args(&mut self) -> IoResult<()> {
		// push 0 (no overlapped)
		self.w.write_all(&[0x6a, 0x00])?;
		// lea eax, [esp+4] (the scratch slot); push eax
		self.w.write_all(&[0x8d, 0x44, 0x24, 0x04])?;
		self.w.write_u8(0x50)?;
		// push 1 (one byte); push ebx (buffer = current cell)
		self.w.write_all(&[0x6a, 0x01])?;
		self.w.write_u8(0x53)
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

impl<W: Write + Seek> Backend for WinX86<W> {
	fn header(&mut self) -> IoResult<()> {
		self.w.write_zeros(CODE_RAW_OFFSET as usize)?;

		// push esi; push edi; push ebx; push ebp
		self.w.write_all(&[0x56, 0x57, 0x53, 0x55])?;
		// sub esp, 8 (scratch slot + ReadFile pointer)
		self.w.write_all(&[0x83, 0xec, 0x08])?;

		// mov ebp, [GetStdHandle]
		self.w.write_all(&[0x8b, 0x2d])?;
		self.w.write_u32_le(0)?;
		// push -11; call ebp; mov esi, eax (stdout)
		self.w.write_all(&[0x6a, 0xf5])?;
		self.w.write_all(&[0xff, 0xd5])?;
		self.w.write_all(&[0x89, 0xc6])?;
		// push -10; call ebp; mov edi, eax (stdin)
		self.w.write_all(&[0x6a, 0xf6])?;
		self.w.write_all(&[0xff, 0xd5])?;
		self.w.write_all(&[0x89, 0xc7])?;

		// mov ebp, [WriteFile]
		self.w.write_all(&[0x8b, 0x2d])?;
		self.w.write_u32_le(0)?;
		// mov ecx, [ReadFile]; mov [esp+4], ecx
		self.w.write_all(&[0x8b, 0x0d])?;
		self.w.write_u32_le(0)?;
		self.w.write_all(&[0x89, 0x4c, 0x24, 0x04])?;
		// mov ebx, tape
		self.w.write_u8(0xbb)?;
		self.w.write_u32_le(0)
	}

	fn footer(&mut self) -> IoResult<()> {
		self.assign(b'\n')?;
		self.putchar()?;

		// mov ebp, [ExitProcess]; push 0; call ebp
		self.w.write_all(&[0x8b, 0x2d])?;
		let exit_imm = self.w.stream_position()?;
		self.w.write_u32_le(0)?;
		self.w.write_all(&[0x6a, 0x00])?;
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
			IMAGE_FILE_MACHINE_I386,
			OPTIONAL_HEADER32_SIZE,
			FILE_CHARACTERISTICS_32,
		)?;
		write_optional_header32(&mut self.w, &layout, import_size)?;
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
				// add ebx, delta
				self.w.write_all(&[0x81, 0xc3])?;
				self.w.write_i32_le(delta)
			} else if delta > 1 {
				self.w.write_all(&[0x83, 0xc3])?;
				self.w.write_u8(delta as u8)
			} else {
				// inc ebx
				self.w.write_u8(0x43)
			}
		} else if delta < -127 {
			// sub ebx, -delta
			self.w.write_all(&[0x81, 0xeb])?;
			self.w.write_i32_le(-delta)
		} else if delta < -1 {
			self.w.write_all(&[0x83, 0xeb])?;
			self.w.write_u8(-delta as u8)
		} else {
			// dec ebx
			self.w.write_u8(0x4b)
		}
	}

	fn add(&mut self, value: i8) -> IoResult<()> {
		if value > 0 {
			if value > 1 {
				// add byte ptr [ebx], value
				self.w.write_all(&[0x80, 0x03, value as u8])
			} else {
				// inc byte ptr [ebx]
				self.w.write_all(&[0xfe, 0x03])
			}
		} else if value < -1 {
			// sub byte ptr [ebx], -value
			self.w.write_all(&[0x80, 0x2b, value.unsigned_abs()])
		} else {
			// dec byte ptr [ebx]
			self.w.write_all(&[0xfe, 0x0b])
		}
	}

	fn assign(&mut self, value: u8) -> IoResult<()> {
		// mov byte ptr [ebx], value
		self.w.write_all(&[0xc6, 0x03, value])
	}

	fn putchar(&mut self) -> IoResult<()> {
		self.write_io_call_args()?;
		// push esi (stdout handle); call ebp (WriteFile)
		self.w.write_u8(0x56)?;
		self.w.write_all(&[0xff, 0xd5])
	}

	fn getchar(&mut self) -> IoResult<()> {
		self.write_io_call_args()?;
		// push edi (stdin handle); call [esp+0x1c] (the ReadFile slot)
		self.w.write_u8(0x57)?;
		self.w.write_all(&[0xff, 0x54, 0x24, 0x1c])
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
		// mov al, byte ptr [ebx]; add byte ptr [ebx + offset], al
		self.w.write_all(&[0x8a, 0x03])?;
		self.write_var_target(0x00, offset)
	}

	fn sub_var(&mut self, offset: i32) -> IoResult<()> {
		self.w.write_all(&[0x8a, 0x03])?;
		self.write_var_target(0x28, offset)
	}

	fn add_mul_var(&mut self, offset: i32, factor: i8) -> IoResult<()> {
		// mov al, |factor|; mul byte ptr [ebx]
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
