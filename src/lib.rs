pub mod audit;
pub mod classify;
pub mod config;
pub mod db;
pub mod error;
pub mod execute;
pub mod introspect;
pub mod llm;
pub mod pipeline;
pub mod render;
pub mod translate;

#[cfg(test)]
mod testing;
