// crates/tessera-rpc/src/middleware.rs
//
// Request interceptor for the RPC server.

use tonic::{Request, Status};

/// Log every incoming call at debug level.
pub fn logging_interceptor(req: Request<()>) -> Result<Request<()>, Status> {
    tracing::debug!("Incoming RPC request: {:?}", req.metadata());
    Ok(req)
}
