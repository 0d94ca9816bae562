pub mod ast;
pub mod exec;
pub mod lexer;
pub mod parser;
