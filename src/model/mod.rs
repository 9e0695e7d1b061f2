pub mod actor;
pub mod battle;
pub mod game_state;
pub mod llm_decode;
pub mod message;
pub mod narrative;
pub mod tool_call;
pub mod tool_request;
