pub mod symbol_table;

pub use symbol_table::{BOW, BoundarySymbols, EOW, SymbolTable};
