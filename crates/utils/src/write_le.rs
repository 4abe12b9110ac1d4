use std::io::{Result as IoResult, Write};

/// Explicit little-endian integer emission on top of [`Write`].
///
/// Executable image headers and instruction immediates are little-endian on
/// every target we emit, so byte order is spelled out here rather than left
/// to the host.
pub trait WriteLe: Write {
	fn write_u8(&mut self, value: u8) -> IoResult<()> {
		self.write_all(&[value])
	}

	fn write_u16_le(&mut self, value: u16) -> IoResult<()> {
		self.write_all(&value.to_le_bytes())
	}

	fn write_u32_le(&mut self, value: u32) -> IoResult<()> {
		self.write_all(&value.to_le_bytes())
	}

	fn write_u64_le(&mut self, value: u64) -> IoResult<()> {
		self.write_all(&value.to_le_bytes())
	}

	fn write_i32_le(&mut self, value: i32) -> IoResult<()> {
		self.write_all(&value.to_le_bytes())
	}

	fn write_zeros(&mut self, len: usize) -> IoResult<()> {
		const ZEROS: [u8; 64] = [0; 64];

		let mut remaining = len;
		while remaining > 0 {
			let chunk = remaining.min(ZEROS.len());
			self.write_all(&ZEROS[..chunk])?;
			remaining -= chunk;
		}

		Ok(())
	}
}

impl<W: Write + ?Sized> WriteLe for W {}
