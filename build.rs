fn main() {
    let date = chrono::Utc::now().format("%Y-%m-%d");
    println!("cargo:rustc-env=NETWMCTL_BUILD_DATE={}", date);
    println!("cargo:rerun-if-changed=build.rs");
}
