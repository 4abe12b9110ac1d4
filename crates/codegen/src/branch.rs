//! Forward/backward branch emission shared by the x86-family binary
//! backends. The `cmp` encoding differs per pointer register; the jump
//! and backpatch mechanics do not.

use std::io::{Error as IoError, Result as IoResult, Seek, SeekFrom, Write};

use forge_utils::WriteLe as _;

/// `cmp byte ptr [reg], 0` is three bytes and `je rel32` is six, so the
/// placeholder displacement always sits at `site + 5`.
const JE_IMM_OFFSET: u64 = 5;

/// Emits the compare and a forward `je` with a zero displacement, pushing
/// the site for [`end_loop`]/[`end_if`] to patch.
pub(crate) fn start_loop<W: Write + Seek>(
	w: &mut W,
	stack: &mut Vec<u64>,
	cmp: [u8; 3],
) -> IoResult<()> {
	stack.push(w.stream_position()?);

	w.write_all(&cmp)?;
	w.write_all(&[0x0f, 0x84])?;
	w.write_u32_le(0)
}

/// Emits the back-jump (short when it fits in an i8, near otherwise) and
/// patches the pending forward displacement.
pub(crate) fn end_loop<W: Write + Seek>(w: &mut W, stack: &mut Vec<u64>) -> IoResult<()> {
	let site = pop_site(stack)?;

	let offset = site as i64 - w.stream_position()? as i64 - 1;
	if offset - 1 < -128 {
		w.write_u8(0xe9)?;
		w.write_i32_le((offset - 4) as i32)?;
	} else {
		w.write_u8(0xeb)?;
		w.write_u8((offset - 1) as i8 as u8)?;
	}

	patch_forward(w, site)
}

/// Patches the pending forward displacement without a back-jump.
pub(crate) fn end_if<W: Write + Seek>(w: &mut W, stack: &mut Vec<u64>) -> IoResult<()> {
	let site = pop_site(stack)?;

	patch_forward(w, site)
}

fn pop_site(stack: &mut Vec<u64>) -> IoResult<u64> {
	stack
		.pop()
		.ok_or_else(|| IoError::other("loop end emitted without a matching start"))
}

fn patch_forward<W: Write + Seek>(w: &mut W, site: u64) -> IoResult<()> {
	let here = w.stream_position()?;

	w.seek(SeekFrom::Start(site + JE_IMM_OFFSET))?;
	w.write_u32_le((here - (site + JE_IMM_OFFSET) - 4) as u32)?;
	w.seek(SeekFrom::Start(here))?;

	Ok(())
}
