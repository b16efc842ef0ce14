/// winws build script.
///
/// The window shells, router, surfaces and scheduler are platform-neutral and
/// build everywhere.  Only the Win32 backend is gated on the target; on other
/// hosts the crate still builds and tests against the headless backend, so
/// this script just tells the user which backend they are getting.
fn main() {
    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if target_os != "windows" {
        println!(
            "cargo:warning=winws: target_os = {target_os:?}; \
             only the headless backend is available"
        );
    }

    println!("cargo:rerun-if-changed=build.rs");
}
