//! Generated protobuf/gRPC types, compiled from `proto/mavlink_bridge.proto`
//! by `build.rs` via `tonic-build`.

tonic::include_proto!("mavlinkbridge");
