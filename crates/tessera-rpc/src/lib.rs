// crates/tessera-rpc/src/lib.rs
//
// tessera-rpc: JSON-RPC over tonic for the Tessera consensus engine.
//
// Peers push their signed slot scores here; operators query slot state,
// commits, trust and node health.

pub mod handlers;
pub mod middleware;
pub mod server;

pub use server::{rpc_url, JsonRpcRequest, JsonRpcResponse, RpcConfig, TesseraRpcServer, RPC_PATH};
