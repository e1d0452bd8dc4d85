/*!
A minimal PDF object model and content-stream lexer.

This crate provides the two collaborator surfaces that content-stream
interpretation is built on: typed access to PDF objects (dictionaries,
arrays, names, numbers, streams, indirect references resolved through a
[`Store`]) and a pull-based [`Lexer`] that turns raw content-stream bytes
into operands and operator mnemonics.

It deliberately does *not* cover cross-reference parsing, stream filters or
encryption; callers hand it already-decoded bytes and a populated object
store.
*/

mod lexer;
mod object;
mod reader;

pub use lexer::{Lexer, Token};
pub use object::{Array, Dict, FromObject, Name, Number, ObjRef, Object, Store, Stream};
pub use reader::Reader;
