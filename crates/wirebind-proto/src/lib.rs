//! Generated reference types for the `wirebind.tests` schema.
//!
//! Built with `tonic-build` from `proto/`; used to check that dynamic messages and
//! the dynamic RPC stack speak the same wire format as generated code.

pub mod wirebind {
    pub mod tests {
        tonic::include_proto!("wirebind.tests");
    }
}

pub use wirebind::tests::*;

pub use wirebind::tests::test_service_client::TestServiceClient;
pub use wirebind::tests::test_service_server::{TestService, TestServiceServer};
