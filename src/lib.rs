// Credential and access-token lifecycle
pub mod auth;

// TOML + environment configuration
pub mod config;

// SQLite config store and encryption at rest
pub mod credentials;

// JSON-RPC dispatch and transports
pub mod mcp;

// MCP tools over the WeChat API
pub mod tools;

// Authenticated WeChat API client
pub mod wechat;
