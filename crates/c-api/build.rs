use std::env;

fn main() {
    let crate_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
    let config = cbindgen::Config {
        language: cbindgen::Language::C,
        include_guard: Some("HFTOK_H".to_string()),
        enumeration: cbindgen::EnumConfig {
            prefix_with_name: true,
            ..Default::default()
        },
        ..Default::default()
    };
    let bindings = cbindgen::generate_with_config(crate_dir, config).unwrap();
    bindings.write_to_file("include/hftok.h");
}
