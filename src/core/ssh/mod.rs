mod client;

pub use client::{is_connection_error, is_local_host, HostKeyPolicy, SshClient};
