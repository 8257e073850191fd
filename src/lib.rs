//! sqlingo: schema-aware retrieval pipeline that turns natural-language
//! questions into SQL
//!
//! A registered tenant's database schema is reflected, split into text
//! chunks and indexed in its own collection. Questions retrieve the closest
//! schema chunks and worked examples, are answered by a generation service,
//! and the answer is normalized to a single SQL statement.

pub mod chunk;
pub mod commands;
pub mod config;
pub mod embed;
pub mod error;
pub mod generate;
pub mod meta;
pub mod postprocess;
pub mod progress;
pub mod reflect;
pub mod retrieve;
pub mod store;
