fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Use the vendored protoc so no system toolchain is needed.
    let protoc_path = protoc_bin_vendored::protoc_bin_path()?;
    unsafe {
        std::env::set_var("PROTOC", protoc_path);
    }
    let include_path = protoc_bin_vendored::include_path()?;
    unsafe {
        std::env::set_var("PROTOC_INCLUDE", include_path.as_os_str());
    }

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(
            &["proto/testservice.proto", "proto/fieldtypes.proto"],
            &["proto", &include_path.to_string_lossy()],
        )?;
    Ok(())
}
