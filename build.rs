fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only rerun if proto files change
    println!("cargo:rerun-if-changed=proto/credit_ledger/v1/ledger.proto");

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto/credit_ledger/v1/ledger.proto"], &["proto"])?;
    Ok(())
}
