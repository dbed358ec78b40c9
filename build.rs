fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=protos/store.proto");
    #[cfg(feature = "protoc")]
    tonic_build::configure()
        .type_attribute(".", "#[derive(serde::Serialize, serde::Deserialize)]")
        .compile_protos(&["protos/store.proto"], &["protos/"])?;
    Ok(())
}
