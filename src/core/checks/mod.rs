// src/core/checks/mod.rs

// Individual check implementations. Each is a thin I/O wrapper honoring
// the handler contract: take a domain or URL, return JSON-serializable
// output or fail with a descriptive error. Orchestration lives elsewhere.
pub mod dns;
pub mod host;
pub mod http;
pub mod page;
pub mod tls;
