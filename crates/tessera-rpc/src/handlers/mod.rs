// crates/tessera-rpc/src/handlers/mod.rs
//
// Handler modules, one per API group. Each defines its request/response
// types and async handler functions.

pub mod node;
pub mod peer;
pub mod slot;
pub mod trust;
