/// OpenAPI documentation generation.
pub mod documentation;
/// Delivery of coordinator output to sockets and the lobby SSE stream.
pub mod fanout;
/// Health check service.
pub mod health_service;
/// Read-only game lookups for the REST API.
pub mod lobby_service;
/// Ordered storage writer and registry hydration.
pub mod persistence;
/// Session coordinator owning every lobby mutation.
pub mod session_service;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Storage reconnection supervisor toggling degraded mode.
pub mod storage_supervisor;
/// WebSocket connection and message handling service.
pub mod websocket_service;
