pub mod battle;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod guard;
pub mod llm_client;
pub mod narrative_parser;
pub mod orchestrator;
pub mod progression;
pub mod prompt_builder;
pub mod protocol;
pub mod store;
pub mod stream_decoder;
pub mod tool_catalog;
