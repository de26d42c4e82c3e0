pub mod chat_route;
pub mod code_routes;
pub mod config_route;
pub mod discovery_routes;
pub mod health_route;
pub mod kb_routes;
pub mod llm_routes;
