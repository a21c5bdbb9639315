pub mod alias;
pub mod error;
pub mod indexer;
pub mod publish;
pub mod repos;
pub mod service;
pub mod trash;
pub mod urls;
