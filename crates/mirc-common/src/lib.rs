pub mod mir;
pub mod symbols;
