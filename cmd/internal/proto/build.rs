fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::compile_protos("proto/g2disk.proto")?;
    println!("cargo:rerun-if-changed=proto/g2disk.proto");
    Ok(())
}
