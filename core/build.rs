fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=../proto/coordinator.proto");

    // Fall back to the bundled protoc when none is configured
    if std::env::var_os("PROTOC").is_none() {
        let protoc = protoc_bin_vendored::protoc_bin_path()?;
        // SAFETY: build scripts are single-threaded at this point
        unsafe { std::env::set_var("PROTOC", protoc) };
    }

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["../proto/coordinator.proto"], &["../proto"])?;

    Ok(())
}
