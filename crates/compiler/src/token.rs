use logos::Logos;

/// The brainfuck alphabet plus the `#` breakpoint, scanned over raw
/// bytes. Everything else is comment text and skipped, whether or not it
/// is valid UTF-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Logos)]
#[logos(source = [u8])]
#[logos(skip r"[^+\-<>.,\[\]#]+")]
pub(crate) enum Token {
	#[token(b"+")]
	Increment,
	#[token(b"-")]
	Decrement,
	#[token(b"<")]
	MoveLeft,
	#[token(b">")]
	MoveRight,
	#[token(b".")]
	Output,
	#[token(b",")]
	Input,
	#[token(b"[")]
	LoopStart,
	#[token(b"]")]
	LoopEnd,
	#[token(b"#")]
	Break,
}
