pub mod catalog;
pub mod crypto;
pub mod enrich;
pub mod masker;
pub mod parser;
pub mod summary;
