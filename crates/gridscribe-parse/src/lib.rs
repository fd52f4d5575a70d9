//! Formula lexing and reference extraction.
//!
//! Formulas are never evaluated here: the lexer only separates literals,
//! functions and operands so that [`extract_references`] can report which
//! cells, ranges and defined names a formula reads.

pub mod references;
pub mod tokenizer;

pub use references::{FormulaRef, FormulaReferences, Operand, classify_operand, extract_references};
pub use tokenizer::{LexError, Token, TokenKind, formula_body, tokenize};
