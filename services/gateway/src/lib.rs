// gateway: the long-running process that embeds gw-core's northbound
// contract. No REST/WebSocket surface of its own — an external transport
// layer embeds `bootstrap::build` as a library API.

pub mod bootstrap;
pub mod config;
