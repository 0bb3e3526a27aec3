fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::configure().compile(&["proto/mavlink_bridge.proto"], &["proto"])?;
    Ok(())
}
