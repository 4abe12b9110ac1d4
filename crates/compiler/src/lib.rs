#![cfg_attr(docsrs, feature(doc_auto_cfg, doc_cfg))]

mod error;
mod lower;
mod token;

pub use self::{
	error::CompileError,
	lower::{LowerOptions, lower},
};
